use wgpu::util::DeviceExt;

use super::passes::{
    create_fullscreen_pipeline, create_sampler, texture_entries, texture_layout_entries,
    uniform_layout, Binding,
};
use super::shaders::{compile_composite_fragment, compile_screen_vertex};
use super::uniforms::CompositeParams;

/// Final full-screen pass: fluid-distorted blend of the two slide images.
pub struct Compositor {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    fluid_sampler: wgpu::Sampler,
    image_sampler: wgpu::Sampler,
}

impl Compositor {
    /// `fluid_filterable` must match the solver's negotiated filtering support.
    pub fn new(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        fluid_filterable: bool,
    ) -> Self {
        let uniforms = uniform_layout(device, "composite uniform layout");
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite texture layout"),
            entries: &texture_layout_entries(&[fluid_filterable, true, true]),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite pipeline layout"),
            bind_group_layouts: &[&uniforms, &texture_layout],
            push_constant_ranges: &[],
        });

        let vertex = compile_screen_vertex(device);
        let fragment = compile_composite_fragment(device);
        let pipeline = create_fullscreen_pipeline(
            device,
            "composite pipeline",
            &layout,
            &vertex,
            &fragment,
            target_format,
        );

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("composite uniform buffer"),
            size: std::mem::size_of::<CompositeParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite uniform bind group"),
            layout: &uniforms,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let fluid_filter = if fluid_filterable {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };

        Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            fluid_sampler: create_sampler(device, "composite fluid sampler", fluid_filter),
            image_sampler: create_sampler(
                device,
                "composite image sampler",
                wgpu::FilterMode::Linear,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        fluid: &wgpu::TextureView,
        map_a: &wgpu::TextureView,
        map_b: &wgpu::TextureView,
        params: &CompositeParams,
    ) {
        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("composite uniform staging"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &self.uniform_buffer,
            0,
            std::mem::size_of::<CompositeParams>() as u64,
        );

        let textures = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("composite texture bind group"),
            layout: &self.texture_layout,
            entries: &texture_entries(&[
                Binding {
                    view: fluid,
                    sampler: &self.fluid_sampler,
                },
                Binding {
                    view: map_a,
                    sampler: &self.image_sampler,
                },
                Binding {
                    view: map_b,
                    sampler: &self.image_sampler,
                },
            ]),
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, &textures, &[]);
        pass.draw(0..3, 0..1);
    }
}
