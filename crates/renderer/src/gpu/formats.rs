//! Render-target format negotiation for the fluid fields.
//!
//! Every field is a half-float texture. Narrow formats are preferred and fall
//! back to wider ones when the adapter cannot render to them; if not even
//! `Rgba16Float` is renderable the solver cannot run at all.

use wgpu::{TextureFormat, TextureFormatFeatureFlags, TextureUsages};

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("no renderable half-float texture format is available")]
    NoRenderableHalfFloat,
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// How the advection pass reconstructs values between texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvectionMode {
    /// Sampler does the bilinear filtering.
    Hardware,
    /// Four nearest taps blended in the shader.
    ManualBilinear,
}

/// Formats chosen for each field kind plus the filtering capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFormats {
    pub velocity: TextureFormat,
    pub dye: TextureFormat,
    pub scalar: TextureFormat,
    pub linear_filtering: bool,
    pub advection: AdvectionMode,
}

/// Answers capability questions about texture formats.
pub trait FormatProbe {
    /// True when a texture of `format` can be created and rendered into.
    fn renderable(&self, format: TextureFormat) -> bool;
    /// True when `format` supports linear filtering.
    fn filterable(&self, format: TextureFormat) -> bool;
}

/// Probes a live adapter by creating and discarding a small render target.
pub struct AdapterProbe<'a> {
    adapter: &'a wgpu::Adapter,
    device: &'a wgpu::Device,
}

impl<'a> AdapterProbe<'a> {
    pub fn new(adapter: &'a wgpu::Adapter, device: &'a wgpu::Device) -> Self {
        Self { adapter, device }
    }
}

impl FormatProbe for AdapterProbe<'_> {
    fn renderable(&self, format: TextureFormat) -> bool {
        let features = self.adapter.get_texture_format_features(format);
        let usage = TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING;
        if !features.allowed_usages.contains(usage) {
            return false;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("format probe"),
            size: wgpu::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let error = pollster::block_on(self.device.pop_error_scope());
        texture.destroy();

        if let Some(error) = error {
            tracing::debug!(?format, %error, "format probe rejected");
            return false;
        }
        true
    }

    fn filterable(&self, format: TextureFormat) -> bool {
        self.adapter
            .get_texture_format_features(format)
            .flags
            .contains(TextureFormatFeatureFlags::FILTERABLE)
    }
}

/// Picks the field formats `probe` supports, or fails when none is renderable.
pub fn negotiate(probe: &dyn FormatProbe) -> Result<FieldFormats, CapabilityError> {
    let rgba = TextureFormat::Rgba16Float;
    if !probe.renderable(rgba) {
        return Err(CapabilityError::NoRenderableHalfFloat);
    }

    let velocity = first_renderable(probe, &[TextureFormat::Rg16Float], rgba);
    let scalar = first_renderable(
        probe,
        &[TextureFormat::R16Float, TextureFormat::Rg16Float],
        rgba,
    );
    let dye = rgba;

    let linear_filtering = probe.filterable(velocity) && probe.filterable(dye);
    let advection = if linear_filtering {
        AdvectionMode::Hardware
    } else {
        AdvectionMode::ManualBilinear
    };

    let formats = FieldFormats {
        velocity,
        dye,
        scalar,
        linear_filtering,
        advection,
    };
    tracing::info!(
        velocity = ?formats.velocity,
        dye = ?formats.dye,
        scalar = ?formats.scalar,
        linear_filtering,
        advection = ?formats.advection,
        "negotiated fluid field formats"
    );
    Ok(formats)
}

fn first_renderable(
    probe: &dyn FormatProbe,
    candidates: &[TextureFormat],
    fallback: TextureFormat,
) -> TextureFormat {
    candidates
        .iter()
        .copied()
        .find(|format| probe.renderable(*format))
        .unwrap_or(fallback)
}
