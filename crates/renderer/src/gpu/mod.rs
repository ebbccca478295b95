//! GPU side of the backdrop.
//!
//! - `context` owns the wgpu instance, device and surface, and builds the
//!   windowless [`HeadlessGpu`] used by probes and tests.
//! - `formats` negotiates half-float render targets and the advection path.
//! - `fields` and `passes` hold the ping-pong textures and the per-pass
//!   encoding shared by every solver step.
//! - `fluid` runs the stable-fluids step; `compositor` blends the two slide
//!   images through the dye field into the swapchain.
//! - `textures` keeps uploaded slide images; `readback` copies targets back
//!   to the CPU.
//! - `state` glues everything together for the window loop.

mod compositor;
mod context;
mod fields;
mod fluid;
mod formats;
mod passes;
mod readback;
mod shaders;
mod state;
mod textures;
mod uniforms;

pub use compositor::Compositor;
pub use context::HeadlessGpu;
pub use fluid::{passes_per_step, FluidField, FluidSolver, JACOBI_ITERATIONS};
pub use formats::{
    negotiate, AdapterProbe, AdvectionMode, CapabilityError, FieldFormats, FormatProbe,
};
pub use readback::{read_rgba16f, read_rgba8, FieldImage, PixelImage, ReadbackError};
pub use textures::TextureArena;
pub use uniforms::CompositeParams;

pub(crate) use state::GpuState;
