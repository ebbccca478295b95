//! Stable-fluids solver on ping-pong render targets.
//!
//! One `encode_step` records the full pass chain for a fixed timestep:
//! splats, curl, vorticity confinement, divergence, pressure decay, Jacobi
//! relaxation, gradient subtraction, then advection of velocity and dye.
//! Field coordinates put texel row 0 at `v = 0`, which is the bottom of the
//! screen; `splat` takes top-left based pointer coordinates and flips them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sceneconfig::FluidSettings;

use super::fields::{DoubleField, Field};
use super::formats::FieldFormats;
use super::passes::{
    dynamic_uniform_layout, texture_layout_entries, FieldSamplers, FluidPipelines, PassEncoder,
    Source, READBACK_FORMAT,
};
use super::readback::{read_rgba16f, FieldImage, ReadbackError};
use super::uniforms::FluidParams;

/// Relaxation sweeps per step.
pub const JACOBI_ITERATIONS: usize = 8;

/// Solver fields that can be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidField {
    Velocity,
    Dye,
    Pressure,
    Divergence,
    Curl,
}

impl FluidField {
    /// Channels the field actually stores; the rest read back as 0 or 1.
    pub fn channels(self) -> usize {
        match self {
            FluidField::Velocity => 2,
            FluidField::Dye => 3,
            FluidField::Pressure | FluidField::Divergence | FluidField::Curl => 1,
        }
    }
}

/// Render passes recorded by one step with `splats` queued impulses.
pub fn passes_per_step(splats: usize) -> usize {
    2 * splats + 7 + JACOBI_ITERATIONS
}

#[derive(Debug, Clone, Copy)]
struct Splat {
    point: [f32; 2],
    force: [f32; 2],
    tint: [f32; 3],
}

pub struct FluidSolver {
    settings: FluidSettings,
    pipelines: FluidPipelines,
    passes: PassEncoder,
    velocity: DoubleField,
    dye: DoubleField,
    pressure: DoubleField,
    divergence: Field,
    curl: Field,
    splats: Vec<Splat>,
    aspect_ratio: f32,
    rng: StdRng,
    steps: u64,
}

impl FluidSolver {
    pub fn new(
        device: &wgpu::Device,
        formats: &FieldFormats,
        settings: &FluidSettings,
        seed: Option<u64>,
    ) -> Self {
        let uniforms = dynamic_uniform_layout(
            device,
            "fluid uniform layout",
            std::mem::size_of::<FluidParams>() as u64,
        );
        let filterable = formats.linear_filtering;
        let sources = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fluid source layout"),
            entries: &texture_layout_entries(&[filterable, filterable]),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fluid pipeline layout"),
            bind_group_layouts: &[&uniforms, &sources],
            push_constant_ranges: &[],
        });
        let pipelines = FluidPipelines::new(device, &layout, formats);
        let samplers = FieldSamplers::new(device, formats.linear_filtering);
        let passes = PassEncoder::new(device, uniforms, sources, samplers);

        let sim = settings.sim_resolution;
        let dye = settings.dye_resolution;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::debug!(sim, dye, ?seed, "creating fluid solver");

        Self {
            settings: settings.clone(),
            pipelines,
            passes,
            velocity: DoubleField::new(device, "velocity", sim, sim, formats.velocity),
            dye: DoubleField::new(device, "dye", dye, dye, formats.dye),
            pressure: DoubleField::new(device, "pressure", sim, sim, formats.scalar),
            divergence: Field::new(device, "divergence", sim, sim, formats.scalar),
            curl: Field::new(device, "curl", sim, sim, formats.scalar),
            splats: Vec::new(),
            aspect_ratio: 1.0,
            rng,
            steps: 0,
        }
    }

    /// Queues an impulse at pointer coordinates (`0,0` top-left) moving by
    /// `(dx, dy)` in the same space. Applied on the next step.
    pub fn splat(&mut self, x: f32, y: f32, dx: f32, dy: f32) {
        let force = self.settings.force;
        let tint = [
            self.rng.gen::<f32>() * 0.25 + 0.1,
            self.rng.gen::<f32>() * 0.25 + 0.1,
            self.rng.gen::<f32>() * 0.25 + 0.1,
        ];
        self.splats.push(Splat {
            point: [x, 1.0 - y],
            force: [dx * force, -dy * force],
            tint,
        });
    }

    pub fn pending_splats(&self) -> usize {
        self.splats.len()
    }

    /// Width over height of the surface the dye is shown on.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            self.aspect_ratio = aspect_ratio;
        }
    }

    /// Completed steps since creation.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Current dye field, sampled by the compositor.
    pub fn texture(&self) -> &wgpu::TextureView {
        &self.dye.read().view
    }

    /// Advances one fixed step and submits it.
    pub fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("fluid step encoder"),
        });
        self.encode_step(device, queue, &mut encoder);
        queue.submit(std::iter::once(encoder.finish()));
    }

    /// Records one fixed step into `encoder` and stages its uniforms on
    /// `queue`. The encoder must be submitted before the next step or
    /// readback is encoded, since both reuse the same uniform slots.
    pub fn encode_step(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let splats = std::mem::take(&mut self.splats);
        self.passes.begin(device, passes_per_step(splats.len()));
        for splat in &splats {
            self.apply_splat(device, encoder, splat);
        }

        let sim_texel = self.velocity.texel_size();
        let grid = FluidParams::grid(sim_texel);

        self.passes.draw(
            device,
            encoder,
            "curl",
            &self.pipelines.curl,
            &grid,
            Source::Smooth(self.velocity.read()),
            Source::Smooth(self.velocity.read()),
            &self.curl.view,
        );

        let vorticity = FluidParams {
            curl_strength: self.settings.curl,
            dt: self.settings.dt,
            ..grid
        };
        self.passes.draw(
            device,
            encoder,
            "vorticity",
            &self.pipelines.vorticity,
            &vorticity,
            Source::Smooth(self.velocity.read()),
            Source::Nearest(&self.curl),
            &self.velocity.write().view,
        );
        self.velocity.swap();

        self.passes.draw(
            device,
            encoder,
            "divergence",
            &self.pipelines.divergence,
            &grid,
            Source::Smooth(self.velocity.read()),
            Source::Smooth(self.velocity.read()),
            &self.divergence.view,
        );

        let decay = FluidParams {
            value: self.settings.pressure_dissipation,
            ..grid
        };
        self.passes.draw(
            device,
            encoder,
            "pressure decay",
            &self.pipelines.clear,
            &decay,
            Source::Nearest(self.pressure.read()),
            Source::Nearest(self.pressure.read()),
            &self.pressure.write().view,
        );
        self.pressure.swap();

        for _ in 0..JACOBI_ITERATIONS {
            self.passes.draw(
                device,
                encoder,
                "pressure",
                &self.pipelines.pressure,
                &grid,
                Source::Nearest(self.pressure.read()),
                Source::Nearest(&self.divergence),
                &self.pressure.write().view,
            );
            self.pressure.swap();
        }

        self.passes.draw(
            device,
            encoder,
            "gradient subtract",
            &self.pipelines.gradient_subtract,
            &grid,
            Source::Nearest(self.pressure.read()),
            Source::Smooth(self.velocity.read()),
            &self.velocity.write().view,
        );
        self.velocity.swap();

        let advect_velocity = FluidParams {
            dt: self.settings.dt,
            dissipation: self.settings.velocity_dissipation,
            ..grid
        };
        self.passes.draw(
            device,
            encoder,
            "advect velocity",
            &self.pipelines.advect_velocity,
            &advect_velocity,
            Source::Smooth(self.velocity.read()),
            Source::Smooth(self.velocity.read()),
            &self.velocity.write().view,
        );
        self.velocity.swap();

        let advect_dye = FluidParams {
            dye_texel_size: self.dye.texel_size(),
            dt: self.settings.dt,
            dissipation: self.settings.density_dissipation,
            ..grid
        };
        self.passes.draw(
            device,
            encoder,
            "advect dye",
            &self.pipelines.advect_dye,
            &advect_dye,
            Source::Smooth(self.velocity.read()),
            Source::Smooth(self.dye.read()),
            &self.dye.write().view,
        );
        self.dye.swap();

        self.passes.flush(queue);
        self.steps += 1;
    }

    fn apply_splat(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        splat: &Splat,
    ) {
        let velocity = FluidParams {
            point: splat.point,
            aspect_ratio: self.aspect_ratio,
            radius: self.settings.splat_radius,
            color: [splat.force[0], splat.force[1], 1.0, 0.0],
            ..FluidParams::grid(self.velocity.texel_size())
        };
        self.passes.draw(
            device,
            encoder,
            "splat velocity",
            &self.pipelines.splat_velocity,
            &velocity,
            Source::Smooth(self.velocity.read()),
            Source::Smooth(self.velocity.read()),
            &self.velocity.write().view,
        );
        self.velocity.swap();

        let [r, g, b] = splat.tint;
        let dye = FluidParams {
            texel_size: self.dye.texel_size(),
            dye_texel_size: self.dye.texel_size(),
            color: [r, g, b, 0.0],
            ..velocity
        };
        self.passes.draw(
            device,
            encoder,
            "splat dye",
            &self.pipelines.splat_dye,
            &dye,
            Source::Smooth(self.dye.read()),
            Source::Smooth(self.dye.read()),
            &self.dye.write().view,
        );
        self.dye.swap();
    }

    /// Copies `field` into CPU memory. Blocks until the GPU is idle.
    pub fn read_field(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        field: FluidField,
    ) -> Result<FieldImage, ReadbackError> {
        let source = match field {
            FluidField::Velocity => self.velocity.read(),
            FluidField::Dye => self.dye.read(),
            FluidField::Pressure => self.pressure.read(),
            FluidField::Divergence => &self.divergence,
            FluidField::Curl => &self.curl,
        };
        let target = Field::new(
            device,
            "readback target",
            source.width,
            source.height,
            READBACK_FORMAT,
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback conversion encoder"),
        });
        let copy = FluidParams {
            value: 1.0,
            ..FluidParams::grid(source.texel_size())
        };
        self.passes.begin(device, 1);
        self.passes.draw(
            device,
            &mut encoder,
            "readback conversion",
            &self.pipelines.readback,
            &copy,
            Source::Nearest(source),
            Source::Nearest(source),
            &target.view,
        );
        self.passes.flush(queue);
        queue.submit(std::iter::once(encoder.finish()));

        read_rgba16f(device, queue, &target.texture)
    }
}
