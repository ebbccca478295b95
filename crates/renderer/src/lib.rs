//! Renderer crate for the backdrop: a fluid simulation driving a two-image
//! transition compositor.
//!
//! The overall flow is:
//!
//! ```text
//!   CLI / backdrop
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ WindowState ──▶ winit event loop ──▶ render_frame()
//!          ▲               │                                  │
//!   CommandSender ──▶ CommandBridge ──▶ TransitionEngine      ├─▶ FluidSolver::encode_step
//!                                            │                └─▶ Compositor::encode
//!                                            └──▶ CompositeState ─┘
//! ```
//!
//! `WindowState` owns every GPU resource and the transition engine. Pointer
//! motion becomes fluid splats; wheel input and key presses become
//! [`SceneCommand`](transition::SceneCommand)s on the same channel external
//! choreography uses, so the engine only ever changes between frames.

pub mod gpu;
pub mod input;
mod types;
mod window;

use anyhow::Result;
use crossbeam_channel::Receiver;
use transition::{command_channel, CommandSender, SceneCommand};

pub use gpu::{CapabilityError, FieldFormats, HeadlessGpu};
pub use types::{AdapterProfile, ColorSpaceMode, GpuPowerPreference, RendererConfig};

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
    sender: CommandSender,
    commands: Receiver<SceneCommand>,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        let (sender, commands) = command_channel();
        Self {
            config,
            sender,
            commands,
        }
    }

    /// Sender for scene commands; they are applied before each frame.
    pub fn command_sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Opens the window and runs until it is closed.
    pub fn run(self) -> Result<()> {
        window::run_window(&self.config, self.sender, self.commands)
    }
}

/// Opens a headless device and reports the adapter and negotiated field formats.
pub fn probe(power: GpuPowerPreference) -> Result<(AdapterProfile, FieldFormats), CapabilityError> {
    let gpu = HeadlessGpu::new(power)?;
    Ok((gpu.profile, gpu.formats))
}
