use std::collections::HashMap;

use transition::{DecodedImage, TextureKey};
use wgpu::util::DeviceExt;

/// GPU copies of decoded slide images, keyed by the cache's texture keys.
///
/// Slots whose image is missing (still loading, or failed to decode) are
/// served the shared opaque black 1x1 texture.
pub struct TextureArena {
    format: wgpu::TextureFormat,
    textures: HashMap<TextureKey, (wgpu::Texture, wgpu::TextureView)>,
    fallback: wgpu::TextureView,
}

impl TextureArena {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let (_, fallback) = create_rgba_texture(
            device,
            queue,
            "fallback image",
            format,
            1,
            1,
            &[0, 0, 0, 255],
        );
        Self {
            format,
            textures: HashMap::new(),
            fallback,
        }
    }

    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, image: &DecodedImage) {
        if self.textures.contains_key(&image.key) {
            return;
        }
        let (width, height) = image.pixels.dimensions();
        if width == 0 || height == 0 {
            tracing::warn!(url = %image.url, "skipping empty image");
            return;
        }
        let max = device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            tracing::warn!(url = %image.url, width, height, max, "image exceeds GPU texture limit");
            return;
        }
        let texture = create_rgba_texture(
            device,
            queue,
            &image.url,
            self.format,
            width,
            height,
            image.pixels.as_raw(),
        );
        tracing::debug!(url = %image.url, width, height, "uploaded image texture");
        self.textures.insert(image.key, texture);
    }

    pub fn contains(&self, key: TextureKey) -> bool {
        self.textures.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn view(&self, key: Option<TextureKey>) -> &wgpu::TextureView {
        key.and_then(|key| self.textures.get(&key))
            .map(|(_, view)| view)
            .unwrap_or(&self.fallback)
    }
}

pub(crate) fn create_rgba_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
