//! Copies GPU textures back into CPU memory.
//!
//! Only tests and diagnostics use this path; it blocks on the device.

use half::f16;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadbackError {
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("readback callback was dropped before completing")]
    Disconnected,
}

/// CPU copy of a field, one RGBA `f32` per texel, texel row 0 first.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[f32; 4]>,
}

impl FieldImage {
    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.data[(y * self.width + x) as usize]
    }

    /// Nearest texel to normalized field coordinates.
    pub fn sample_uv(&self, u: f32, v: f32) -> [f32; 4] {
        let x = (u.clamp(0.0, 1.0) * self.width as f32) as u32;
        let y = (v.clamp(0.0, 1.0) * self.height as f32) as u32;
        self.get(x, y)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().flatten().all(|value| value.is_finite())
    }

    /// Largest absolute value across the field, looking only at the first
    /// `channels` channels. Narrow fields read back with alpha 1, so callers
    /// pass the channel count the field actually stores.
    pub fn max_abs(&self, channels: usize) -> f32 {
        let channels = channels.min(4);
        self.data
            .iter()
            .flat_map(|texel| texel[..channels].iter())
            .fold(0.0_f32, |max, value| max.max(value.abs()))
    }
}

/// 8-bit RGBA copy of a color target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[u8; 4]>,
}

impl PixelImage {
    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.data[(y * self.width + x) as usize]
    }
}

/// Reads an `Rgba16Float` texture, widening each channel to `f32`.
pub fn read_rgba16f(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<FieldImage, ReadbackError> {
    let (width, height, rows) = read_rows(device, queue, texture, 8)?;
    let data = rows
        .iter()
        .flat_map(|row| row.chunks_exact(8))
        .map(decode_rgba16f)
        .collect();
    Ok(FieldImage {
        width,
        height,
        data,
    })
}

pub fn read_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<PixelImage, ReadbackError> {
    let (width, height, rows) = read_rows(device, queue, texture, 4)?;
    let data = rows
        .iter()
        .flat_map(|row| row.chunks_exact(4))
        .map(|texel| [texel[0], texel[1], texel[2], texel[3]])
        .collect();
    Ok(PixelImage {
        width,
        height,
        data,
    })
}

fn decode_rgba16f(texel: &[u8]) -> [f32; 4] {
    let mut out = [0.0_f32; 4];
    for (channel, bytes) in out.iter_mut().zip(texel.chunks_exact(2)) {
        *channel = f16::from_le_bytes([bytes[0], bytes[1]]).to_f32();
    }
    out
}

/// Copies `texture` into a mapped buffer and returns its unpadded rows.
fn read_rows(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    bytes_per_texel: u32,
) -> Result<(u32, u32, Vec<Vec<u8>>), ReadbackError> {
    let width = texture.width();
    let height = texture.height();
    let unpadded = width * bytes_per_texel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(padded) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::Wait)?;
    rx.recv().map_err(|_| ReadbackError::Disconnected)??;

    let rows = {
        let mapped = slice.get_mapped_range();
        mapped
            .chunks_exact(padded as usize)
            .map(|row| row[..unpadded as usize].to_vec())
            .collect()
    };
    buffer.unmap();
    Ok((width, height, rows))
}
