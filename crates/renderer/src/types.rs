use std::fmt;
use std::sync::Arc;

use sceneconfig::SceneConfig;
use transition::ImageSource;

/// Output color handling for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// Behave like a WebGL canvas: gamma-encoded swapchain, images passed through untouched.
    #[default]
    Auto,
    /// Treat image texels and compositor output as gamma-encoded; use non-sRGB surfaces.
    Gamma,
    /// Decode images to linear and let an sRGB swapchain re-encode on present.
    Linear,
}

/// Which adapter class to ask wgpu for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

impl GpuPowerPreference {
    pub(crate) fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Summary of the adapter wgpu handed us, for logs and `--probe` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            driver: info.driver.clone(),
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

impl fmt::Display for AdapterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors CLI flags: the scene to play, where its images
/// come from, the initial window size and the GPU preferences.
#[derive(Clone)]
pub struct RendererConfig {
    /// Initial window size in logical pixels.
    pub surface_size: (u32, u32),
    /// Step table, sequence and tuning.
    pub scene: SceneConfig,
    /// Resolves the scene's image urls to encoded bytes.
    pub images: Arc<dyn ImageSource>,
    pub color_space: ColorSpaceMode,
    pub gpu_power: GpuPowerPreference,
    /// Fetch every image of the active variant up front.
    pub preload: bool,
    /// Seeds the splat tint generator; overrides the scene's seed.
    pub seed: Option<u64>,
}

impl RendererConfig {
    /// 1280x800 window with default GPU preferences.
    pub fn new(scene: SceneConfig, images: Arc<dyn ImageSource>) -> Self {
        Self {
            surface_size: (1280, 800),
            scene,
            images,
            color_space: ColorSpaceMode::default(),
            gpu_power: GpuPowerPreference::default(),
            preload: true,
            seed: None,
        }
    }

    pub(crate) fn fluid_seed(&self) -> Option<u64> {
        self.seed.or(self.scene.fluid.seed)
    }
}

impl fmt::Debug for RendererConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererConfig")
            .field("surface_size", &self.surface_size)
            .field("color_space", &self.color_space)
            .field("gpu_power", &self.gpu_power)
            .field("preload", &self.preload)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
