use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;
use transition::{CommandBridge, CommandSender, ImageCache, SceneCommand, TransitionEngine};
use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::gpu::GpuState;
use crate::input::{render_size, PointerTracker, ScrollDriver};
use crate::types::{AdapterProfile, RendererConfig};

/// Sections scrolled per wheel line.
const SECTIONS_PER_LINE: f32 = 0.05;
/// How long start-up waits for the first images before showing the window.
const PRELOAD_GRACE: Duration = Duration::from_millis(250);

/// Aggregates GPU state, the transition engine and input tracking for the window.
pub(crate) struct WindowState {
    window: Arc<Window>,
    gpu: GpuState,
    engine: TransitionEngine,
    bridge: CommandBridge,
    commands: Receiver<SceneCommand>,
    sender: CommandSender,
    pointer: PointerTracker,
    scroll: ScrollDriver,
    scale_factor: f64,
    carousel_locked: bool,
    hidden: bool,
}

impl WindowState {
    pub(crate) fn new(
        window: Arc<Window>,
        config: &RendererConfig,
        sender: CommandSender,
        commands: Receiver<SceneCommand>,
    ) -> Result<Self> {
        let scene = &config.scene;
        let scale_factor = window.scale_factor();
        let logical: LogicalSize<f64> = window.inner_size().to_logical(scale_factor);
        let size = render_size(logical, scale_factor);

        let gpu = GpuState::new(
            window.clone(),
            size,
            config.color_space,
            config.gpu_power,
            &scene.fluid,
            &scene.appearance,
            config.fluid_seed(),
        )?;

        let cache = ImageCache::new(config.images.clone());
        let mobile = scene.is_mobile_width(logical.width);
        let mut engine = TransitionEngine::from_scene(scene, cache, mobile);
        if config.preload {
            let set = engine.preload_all();
            info!(images = set.len(), mobile, "preloading scene images");
            if let Some(first) = engine.preload_step(&scene.default_step) {
                engine.wait_for_preload(&first, PRELOAD_GRACE);
            }
        } else {
            engine.preload_step(&scene.default_step);
        }
        engine.set_step(&scene.default_step);

        Ok(Self {
            window,
            gpu,
            engine,
            bridge: CommandBridge::from_scene(scene),
            commands,
            sender,
            pointer: PointerTracker::new(&scene.pointer),
            scroll: ScrollDriver::new(scene.sequence.clone()),
            scale_factor,
            carousel_locked: false,
            hidden: false,
        })
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        self.gpu.adapter_profile()
    }

    pub(crate) fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn logical_size(&self) -> LogicalSize<f64> {
        self.window.inner_size().to_logical(self.scale_factor)
    }

    pub(crate) fn resize(&mut self, physical: PhysicalSize<u32>) {
        let logical: LogicalSize<f64> = physical.to_logical(self.scale_factor);
        self.gpu.resize(render_size(logical, self.scale_factor));
        self.send(SceneCommand::Viewport {
            logical_width: logical.width,
        });
    }

    fn send(&self, command: SceneCommand) {
        if self.sender.send(command).is_err() {
            warn!("scene command channel closed");
        }
    }

    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        let logical = position.to_logical::<f64>(self.scale_factor);
        let viewport = self.logical_size();
        if let Some(splat) = self
            .pointer
            .on_move(logical.x, logical.y, viewport, Instant::now())
        {
            self.gpu.splat(splat.x, splat.y, splat.dx, splat.dy);
        }
    }

    fn handle_wheel(&mut self, delta: MouseScrollDelta) {
        let sections = match delta {
            MouseScrollDelta::LineDelta(_, y) => -y * SECTIONS_PER_LINE,
            MouseScrollDelta::PixelDelta(position) => {
                let height = self.logical_size().height.max(1.0);
                (-position.to_logical::<f64>(self.scale_factor).y / height) as f32
            }
        };
        for command in self.scroll.scroll(sections) {
            self.send(command);
        }
    }

    /// Returns `true` when the key asks to close the window.
    fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return false;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => return true,
            Key::Character(value) => match value.as_str() {
                "l" | "L" => {
                    self.carousel_locked = !self.carousel_locked;
                    self.send(if self.carousel_locked {
                        SceneCommand::LockCarousel
                    } else {
                        SceneCommand::UnlockCarousel
                    });
                }
                "h" | "H" => {
                    self.hidden = !self.hidden;
                    self.send(if self.hidden {
                        SceneCommand::Hide
                    } else {
                        SceneCommand::Show
                    });
                }
                digit => {
                    if let Some(index) = slide_for_digit(digit) {
                        self.send(SceneCommand::ChangeSlide {
                            index: Some(index),
                            step: None,
                        });
                    }
                }
            },
            _ => {}
        }
        false
    }

    fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let applied = self.bridge.drain(&mut self.engine, &self.commands, now);
        if applied > 0 {
            debug!(
                applied,
                step = self.engine.step_key().unwrap_or("-"),
                slide = self.engine.slide_index(),
                "applied scene commands"
            );
        }
        self.gpu.render(&mut self.engine, now)
    }
}

/// Number keys 1-9 select slides 0-8.
fn slide_for_digit(key: &str) -> Option<usize> {
    let mut chars = key.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    match ch.to_digit(10)? {
        0 => None,
        digit => Some(digit as usize - 1),
    }
}

pub(crate) fn run_window(
    config: &RendererConfig,
    sender: CommandSender,
    commands: Receiver<SceneCommand>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<()>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }
    let event_loop = builder
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (width, height) = config.surface_size;
    let window = WindowBuilder::new()
        .with_title("Backdrop")
        .with_inner_size(LogicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, config, sender, commands)?;
    let profile = state.adapter_profile().clone();
    if profile.is_software() {
        warn!(adapter = %profile, "software rasterizer detected; expect a low frame rate");
    }
    state.window().request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        elwt.exit();
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if state.handle_key(&event) {
                            elwt.exit();
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        state.handle_cursor_moved(position);
                    }
                    WindowEvent::CursorLeft { .. } => {
                        state.pointer.reset();
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        state.handle_wheel(delta);
                    }
                    WindowEvent::Resized(new_size) => {
                        state.resize(new_size);
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        state.scale_factor = scale_factor;
                        let size = state.window().inner_size();
                        state.resize(size);
                    }
                    WindowEvent::RedrawRequested => match state.render_frame() {
                        Ok(()) => {}
                        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                            let size = state.window().inner_size();
                            state.resize(size);
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            error!("surface out of memory; exiting");
                            elwt.exit();
                        }
                        Err(wgpu::SurfaceError::Timeout) => {
                            warn!("surface timeout; retrying next frame");
                        }
                        Err(other) => {
                            warn!(error = ?other, "surface error; retrying next frame");
                        }
                    },
                    _ => {}
                }
            }
            Event::AboutToWait => {
                state.window().request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_map_to_zero_based_slides() {
        assert_eq!(slide_for_digit("1"), Some(0));
        assert_eq!(slide_for_digit("9"), Some(8));
        assert_eq!(slide_for_digit("0"), None);
        assert_eq!(slide_for_digit("12"), None);
        assert_eq!(slide_for_digit("x"), None);
    }
}
