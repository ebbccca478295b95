use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use sceneconfig::{Appearance, FluidSettings};
use tracing::debug;
use transition::TransitionEngine;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::compositor::Compositor;
use super::context::GpuContext;
use super::fluid::FluidSolver;
use super::textures::TextureArena;
use super::uniforms::CompositeParams;
use crate::types::{AdapterProfile, ColorSpaceMode, GpuPowerPreference};

pub(crate) struct GpuState {
    context: GpuContext,
    solver: FluidSolver,
    compositor: Compositor,
    textures: TextureArena,
    appearance: Appearance,
    start_time: Instant,
    frame_count: u64,
    last_fps_update: Instant,
    frames_since_last_update: u32,
    frames_per_second: f32,
}

impl GpuState {
    pub(crate) fn new(
        window: Arc<Window>,
        initial_size: PhysicalSize<u32>,
        color_space: ColorSpaceMode,
        gpu_power: GpuPowerPreference,
        fluid: &FluidSettings,
        appearance: &Appearance,
        seed: Option<u64>,
    ) -> Result<Self> {
        let context = GpuContext::new(window, initial_size, color_space, gpu_power)?;
        let formats = context.formats;

        let mut solver = FluidSolver::new(&context.device, &formats, fluid, seed);
        solver.set_aspect_ratio(aspect_ratio(context.size));
        let compositor = Compositor::new(
            &context.device,
            context.surface_format,
            formats.linear_filtering,
        );
        let textures = TextureArena::new(
            &context.device,
            &context.queue,
            context.color_space.image_format(),
        );

        let now = Instant::now();
        Ok(Self {
            context,
            solver,
            compositor,
            textures,
            appearance: appearance.clone(),
            start_time: now,
            frame_count: 0,
            last_fps_update: now,
            frames_since_last_update: 0,
            frames_per_second: 60.0,
        })
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.context.resize(new_size);
        self.solver.set_aspect_ratio(aspect_ratio(new_size));
    }

    pub(crate) fn splat(&mut self, x: f32, y: f32, dx: f32, dy: f32) {
        self.solver.splat(x, y, dx, dy);
    }

    /// Steps the fluid once and composites the current slides into the next frame.
    pub(crate) fn render(
        &mut self,
        engine: &mut TransitionEngine,
        now: Instant,
    ) -> Result<(), wgpu::SurfaceError> {
        let frame = self.context.surface.get_current_texture()?;

        self.frame_count += 1;
        self.frames_since_last_update += 1;
        let elapsed_since_fps_update = now.saturating_duration_since(self.last_fps_update);
        if elapsed_since_fps_update >= Duration::from_secs(1) {
            self.frames_per_second =
                self.frames_since_last_update as f32 / elapsed_since_fps_update.as_secs_f32();
            self.frames_since_last_update = 0;
            self.last_fps_update = now;
            debug!(
                fps = self.frames_per_second.round(),
                frame_count = self.frame_count,
                fluid_steps = self.solver.steps(),
                textures = self.textures.len(),
                phase = ?engine.phase().blend_mode(),
                "render stats"
            );
        }

        engine.tick(now);
        for image in engine.take_uploads() {
            self.textures
                .upload(&self.context.device, &self.context.queue, &image);
        }
        let state = engine.composite_state();

        let time = now.saturating_duration_since(self.start_time).as_secs_f32();
        let params = CompositeParams::new(
            [self.context.size.width as f32, self.context.size.height as f32],
            &self.appearance,
            &state,
            time,
        );

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });

        self.solver
            .encode_step(&self.context.device, &self.context.queue, &mut encoder);
        self.compositor.encode(
            &self.context.device,
            &mut encoder,
            &view,
            self.solver.texture(),
            self.textures.view(state.texture_a),
            self.textures.view(state.texture_b),
            &params,
        );

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn aspect_ratio(size: PhysicalSize<u32>) -> f32 {
    size.width.max(1) as f32 / size.height.max(1) as f32
}
