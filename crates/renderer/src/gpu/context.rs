use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::formats::{negotiate, AdapterProbe, CapabilityError, FieldFormats};
use crate::types::{AdapterProfile, ColorSpaceMode, GpuPowerPreference};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SurfaceColorSpace {
    Gamma,
    Linear,
}

impl SurfaceColorSpace {
    pub(crate) fn from_mode(mode: ColorSpaceMode) -> Self {
        match mode {
            ColorSpaceMode::Auto | ColorSpaceMode::Gamma => SurfaceColorSpace::Gamma,
            ColorSpaceMode::Linear => SurfaceColorSpace::Linear,
        }
    }

    /// Format slide images are uploaded in. sRGB views decode to linear on sample.
    pub(crate) fn image_format(self) -> wgpu::TextureFormat {
        match self {
            SurfaceColorSpace::Gamma => wgpu::TextureFormat::Rgba8Unorm,
            SurfaceColorSpace::Linear => wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }
}

pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
    pub color_space: SurfaceColorSpace,
    pub adapter_profile: AdapterProfile,
    pub formats: FieldFormats,
}

impl GpuContext {
    pub(crate) fn new(
        window: Arc<Window>,
        initial_size: PhysicalSize<u32>,
        color_space: ColorSpaceMode,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self> {
        let instance = create_instance();
        let surface = instance
            .create_surface(window)
            .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: gpu_power.to_wgpu(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_profile = log_adapter(&adapter);
        let limits = adapter.limits();

        let max_dimension = limits.max_texture_dimension_2d;
        let requested_width = initial_size.width.max(1);
        let requested_height = initial_size.height.max(1);
        if requested_width > max_dimension || requested_height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}",
                max_dimension = max_dimension,
                width = requested_width,
                height = requested_height
            );
        }

        let (device, queue) = open_device(&adapter).context("failed to create GPU device")?;
        let formats = negotiate(&AdapterProbe::new(&adapter, &device))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let color_space = SurfaceColorSpace::from_mode(color_space);
        let first_format = surface_caps
            .formats
            .first()
            .copied()
            .context("surface reports no supported formats")?;

        let surface_format = match color_space {
            SurfaceColorSpace::Linear => surface_caps
                .formats
                .iter()
                .copied()
                .find(|format| format.is_srgb())
                .unwrap_or_else(|| {
                    tracing::warn!(
                        fallback = ?first_format,
                        "no sRGB surface format available; falling back"
                    );
                    first_format
                }),
            SurfaceColorSpace::Gamma => surface_caps
                .formats
                .iter()
                .copied()
                .find(|format| !format.is_srgb())
                .unwrap_or_else(|| {
                    tracing::warn!(
                        fallback = ?first_format,
                        "no non-sRGB surface format available; falling back"
                    );
                    first_format
                }),
        };

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| surface_caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        tracing::debug!(?surface_format, ?present_mode, "configuring surface");

        let size = PhysicalSize::new(requested_width, requested_height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            size,
            surface_format,
            color_space,
            adapter_profile,
            formats,
        })
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        let max_dimension = self.device.limits().max_texture_dimension_2d;
        let size = clamp_surface_size(new_size, max_dimension);
        if size != new_size {
            tracing::warn!(
                requested = ?new_size,
                clamped = ?size,
                max_dimension,
                "surface exceeds the GPU texture limit"
            );
        }

        self.size = size;
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }
}

/// Limits each side to `max_dimension` and at least one pixel.
fn clamp_surface_size(size: PhysicalSize<u32>, max_dimension: u32) -> PhysicalSize<u32> {
    let max_dimension = max_dimension.max(1);
    PhysicalSize::new(
        size.width.clamp(1, max_dimension),
        size.height.clamp(1, max_dimension),
    )
}

/// Windowless device for probing and offscreen rendering.
pub struct HeadlessGpu {
    _instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: AdapterProfile,
    pub formats: FieldFormats,
}

impl HeadlessGpu {
    pub fn new(gpu_power: GpuPowerPreference) -> Result<Self, CapabilityError> {
        let instance = create_instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: gpu_power.to_wgpu(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let profile = log_adapter(&adapter);
        let (device, queue) = open_device(&adapter)?;
        let formats = negotiate(&AdapterProbe::new(&adapter, &device))?;

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
            profile,
            formats,
        })
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn log_adapter(adapter: &wgpu::Adapter) -> AdapterProfile {
    let profile = AdapterProfile::from_wgpu(&adapter.get_info());
    tracing::debug!(
        name = %profile.name,
        backend = ?profile.backend,
        device_type = ?profile.device_type,
        is_software = profile.is_software(),
        "selected GPU adapter"
    );
    profile
}

fn open_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), wgpu::RequestDeviceError> {
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("backdrop device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_surfaces_are_clamped_per_side() {
        let clamped = clamp_surface_size(PhysicalSize::new(9000, 1200), 8192);
        assert_eq!(clamped, PhysicalSize::new(8192, 1200));

        let clamped = clamp_surface_size(PhysicalSize::new(1920, 20_000), 4096);
        assert_eq!(clamped, PhysicalSize::new(1920, 4096));
    }

    #[test]
    fn surfaces_within_limits_are_untouched() {
        let size = PhysicalSize::new(2560, 1440);
        assert_eq!(clamp_surface_size(size, 8192), size);
        assert_eq!(clamp_surface_size(size, 2560), size);
    }
}
