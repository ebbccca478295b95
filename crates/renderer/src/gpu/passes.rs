use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU64;

use super::fields::Field;
use super::formats::FieldFormats;
use super::shaders::{compile_field_vertex, compile_fluid_fragment, FluidShader};
use super::uniforms::FluidParams;

/// Format of the conversion target used to read fields back to the CPU.
/// Negotiation fails unless it is renderable, so readback never needs a
/// capability of its own.
pub(crate) const READBACK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// A texture plus the sampler it is read through.
#[derive(Clone, Copy)]
pub(crate) struct Binding<'a> {
    pub view: &'a wgpu::TextureView,
    pub sampler: &'a wgpu::Sampler,
}

pub(crate) struct FieldSamplers {
    /// Linear when the adapter filters half floats, nearest otherwise.
    pub smooth: wgpu::Sampler,
    pub nearest: wgpu::Sampler,
}

impl FieldSamplers {
    pub fn new(device: &wgpu::Device, linear_filtering: bool) -> Self {
        let nearest = create_sampler(device, "field nearest sampler", wgpu::FilterMode::Nearest);
        let smooth = if linear_filtering {
            create_sampler(device, "field linear sampler", wgpu::FilterMode::Linear)
        } else {
            nearest.clone()
        };
        Self { smooth, nearest }
    }
}

pub(crate) fn create_sampler(
    device: &wgpu::Device,
    label: &str,
    filter: wgpu::FilterMode,
) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

pub(crate) fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Uniform layout whose single binding is addressed by a dynamic offset.
pub(crate) fn dynamic_uniform_layout(
    device: &wgpu::Device,
    label: &str,
    size: u64,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        }],
    })
}

/// Texture/sampler pairs at bindings `2n` and `2n + 1`.
pub(crate) fn texture_layout_entries(filterable: &[bool]) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(filterable.len() * 2);
    for (index, &filterable) in filterable.iter().enumerate() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        let sampler = if filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler),
            count: None,
        });
    }
    entries
}

pub(crate) fn texture_entries<'a>(bindings: &[Binding<'a>]) -> Vec<wgpu::BindGroupEntry<'a>> {
    let mut entries = Vec::with_capacity(bindings.len() * 2);
    for (index, binding) in bindings.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2,
            resource: wgpu::BindingResource::TextureView(binding.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: (index as u32) * 2 + 1,
            resource: wgpu::BindingResource::Sampler(binding.sampler),
        });
    }
    entries
}

pub(crate) fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

/// Every solver pipeline, each compiled for the format of the field it writes.
pub(crate) struct FluidPipelines {
    pub splat_velocity: wgpu::RenderPipeline,
    pub splat_dye: wgpu::RenderPipeline,
    pub curl: wgpu::RenderPipeline,
    pub vorticity: wgpu::RenderPipeline,
    pub divergence: wgpu::RenderPipeline,
    pub clear: wgpu::RenderPipeline,
    pub pressure: wgpu::RenderPipeline,
    pub gradient_subtract: wgpu::RenderPipeline,
    pub advect_velocity: wgpu::RenderPipeline,
    pub advect_dye: wgpu::RenderPipeline,
    pub readback: wgpu::RenderPipeline,
}

impl FluidPipelines {
    pub fn new(device: &wgpu::Device, layout: &wgpu::PipelineLayout, formats: &FieldFormats) -> Self {
        let vertex = compile_field_vertex(device);
        let build = |shader: FluidShader, format: wgpu::TextureFormat| {
            let fragment = compile_fluid_fragment(device, shader);
            create_fullscreen_pipeline(device, shader.label(), layout, &vertex, &fragment, format)
        };
        let advection = FluidShader::Advection(formats.advection);

        Self {
            splat_velocity: build(FluidShader::Splat, formats.velocity),
            splat_dye: build(FluidShader::Splat, formats.dye),
            curl: build(FluidShader::Curl, formats.scalar),
            vorticity: build(FluidShader::Vorticity, formats.velocity),
            divergence: build(FluidShader::Divergence, formats.scalar),
            clear: build(FluidShader::Clear, formats.scalar),
            pressure: build(FluidShader::Pressure, formats.scalar),
            gradient_subtract: build(FluidShader::GradientSubtract, formats.velocity),
            advect_velocity: build(advection, formats.velocity),
            advect_dye: build(advection, formats.dye),
            readback: build(FluidShader::Clear, READBACK_FORMAT),
        }
    }
}

/// How a pass samples one of its input fields.
#[derive(Clone, Copy)]
pub(crate) enum Source<'a> {
    /// Linear when the adapter filters half floats.
    Smooth(&'a Field),
    Nearest(&'a Field),
}

impl<'a> Source<'a> {
    fn key(self) -> (u64, bool) {
        match self {
            Source::Smooth(field) => (field.id, true),
            Source::Nearest(field) => (field.id, false),
        }
    }

    fn field(self) -> &'a Field {
        match self {
            Source::Smooth(field) | Source::Nearest(field) => field,
        }
    }
}

type SourceKey = ((u64, bool), (u64, bool));

/// Per-pass uniform slots for one step, uploaded in a single write.
struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    staged: Vec<u8>,
}

/// Encodes full-screen solver passes.
///
/// Every pass of a step gets its own slot in one uniform buffer, bound with a
/// dynamic offset, so passes recorded back to back never observe each
/// other's parameters. Source bind groups are built once per field pair and
/// reused for the life of the solver.
///
/// Usage per submission: [`begin`](Self::begin) with the number of passes,
/// any number of [`draw`](Self::draw) calls, then [`flush`](Self::flush)
/// before the encoder is submitted.
pub(crate) struct PassEncoder {
    uniform_layout: wgpu::BindGroupLayout,
    source_layout: wgpu::BindGroupLayout,
    samplers: FieldSamplers,
    slot_size: u64,
    arena: RefCell<UniformArena>,
    sources: RefCell<HashMap<SourceKey, wgpu::BindGroup>>,
}

impl PassEncoder {
    const INITIAL_SLOTS: usize = 32;

    pub fn new(
        device: &wgpu::Device,
        uniform_layout: wgpu::BindGroupLayout,
        source_layout: wgpu::BindGroupLayout,
        samplers: FieldSamplers,
    ) -> Self {
        let params_size = std::mem::size_of::<FluidParams>() as u64;
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment).max(1);
        let slot_size = params_size.div_ceil(alignment) * alignment;
        let arena = create_arena(device, &uniform_layout, slot_size, Self::INITIAL_SLOTS);
        Self {
            uniform_layout,
            source_layout,
            samplers,
            slot_size,
            arena: RefCell::new(arena),
            sources: RefCell::new(HashMap::new()),
        }
    }

    /// Reserves room for `passes` draws and forgets previously staged values.
    pub fn begin(&self, device: &wgpu::Device, passes: usize) {
        let mut arena = self.arena.borrow_mut();
        arena.staged.clear();
        if passes > arena.capacity {
            let capacity = passes.next_power_of_two();
            tracing::debug!(capacity, "growing fluid uniform arena");
            *arena = create_arena(device, &self.uniform_layout, self.slot_size, capacity);
        }
    }

    /// Uploads the staged uniform values. Must precede the submit.
    pub fn flush(&self, queue: &wgpu::Queue) {
        let arena = self.arena.borrow();
        if !arena.staged.is_empty() {
            queue.write_buffer(&arena.buffer, 0, &arena.staged);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        params: &FluidParams,
        source: Source<'_>,
        aux: Source<'_>,
        target: &wgpu::TextureView,
    ) {
        let mut arena = self.arena.borrow_mut();
        let offset = arena.staged.len();
        if offset as u64 / self.slot_size >= arena.capacity as u64 {
            tracing::error!(pass = label, capacity = arena.capacity, "fluid pass exceeds reserved uniform slots");
            return;
        }
        arena.staged.extend_from_slice(bytemuck::bytes_of(params));
        arena.staged.resize(offset + self.slot_size as usize, 0);

        let key = (source.key(), aux.key());
        let mut sources = self.sources.borrow_mut();
        let bind_group = sources.entry(key).or_insert_with(|| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.source_layout,
                entries: &texture_entries(&[self.binding(source), self.binding(aux)]),
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &arena.bind_group, &[offset as u32]);
        pass.set_bind_group(1, &*bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn binding<'a>(&'a self, source: Source<'a>) -> Binding<'a> {
        let sampler = match source {
            Source::Smooth(_) => &self.samplers.smooth,
            Source::Nearest(_) => &self.samplers.nearest,
        };
        Binding {
            view: &source.field().view,
            sampler,
        }
    }
}

fn create_arena(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    slot_size: u64,
    capacity: usize,
) -> UniformArena {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("fluid uniform arena"),
        size: slot_size * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("fluid uniform bind group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<FluidParams>() as u64),
            }),
        }],
    });
    UniformArena {
        buffer,
        bind_group,
        capacity,
        staged: Vec::with_capacity(slot_size as usize * capacity),
    }
}
