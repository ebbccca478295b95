use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FIELD_ID: AtomicU64 = AtomicU64::new(0);

/// One grid texture the solver renders into and samples from.
pub struct Field {
    /// Unique per texture; keys cached bind groups.
    pub id: u64,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl Field {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
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
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            id: NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed),
            texture,
            view,
            width,
            height,
        }
    }

    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
}

/// Read/write pair. Passes sample `read` and render into `write`, then swap.
pub struct DoubleField {
    fields: [Field; 2],
    read_index: usize,
}

impl DoubleField {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            fields: [
                Field::new(device, &format!("{label} 0"), width, height, format),
                Field::new(device, &format!("{label} 1"), width, height, format),
            ],
            read_index: 0,
        }
    }

    pub fn read(&self) -> &Field {
        &self.fields[self.read_index]
    }

    pub fn write(&self) -> &Field {
        &self.fields[1 - self.read_index]
    }

    pub fn swap(&mut self) {
        self.read_index = 1 - self.read_index;
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.read().texel_size()
    }
}

