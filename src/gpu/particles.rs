//! Particle draw pass.
//!
//! One instanced quad per state texel. The vertex stage fetches the
//! particle's `(lon, lat)`, projects it through Web Mercator and the
//! viewport matrix, and expands it into a `particle_size` pixel square. The
//! fragment stage discards particles outside the field and colors the rest by
//! local wind speed.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::{RenderConfig, PARTICLE_ALPHA, REFERENCE_MAX_SPEED};
use crate::field::GeoBounds;
use crate::projection::ProjectionMatrix;
use crate::shader_utils::all_utils_wgsl;

use super::{ParticleStateStore, RenderContext, VectorFieldTexture, TRAIL_BLEND, TRAIL_FORMAT};

/// Uniforms for the draw program.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct DrawUniforms {
    matrix: [[f32; 4]; 3],
    field_min: [f32; 2],
    field_max: [f32; 2],
    color0: [f32; 4],
    color1: [f32; 4],
    viewport_size: [f32; 2],
    particle_size: f32,
    state_resolution: u32,
    field_size: [u32; 2],
    is_gradient: u32,
    max_speed: f32,
}

/// Per-frame inputs to the draw pass.
pub struct DrawFrame<'a> {
    pub projection: &'a ProjectionMatrix,
    pub config: &'a RenderConfig,
    pub bounds: &'a GeoBounds,
    pub field_size: [u32; 2],
    pub viewport_size: (u32, u32),
    pub state_resolution: u32,
}

/// GPU resources for drawing particles.
pub struct ParticleRenderStage {
    params_buffer: wgpu::Buffer,
    /// `bind_groups[i]` reads state texture `i`.
    bind_groups: [wgpu::BindGroup; 2],
}

impl ParticleRenderStage {
    pub fn new(
        device: &wgpu::Device,
        ctx: &RenderContext,
        state: &ParticleStateStore,
        field: &VectorFieldTexture,
    ) -> Self {
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Draw Params Buffer"),
            contents: bytemuck::bytes_of(&DrawUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_groups = create_bind_groups(device, ctx, state, field, &params_buffer);
        Self {
            params_buffer,
            bind_groups,
        }
    }

    /// Rebuild bind groups after the state store or field texture changed.
    pub fn rebind(
        &mut self,
        device: &wgpu::Device,
        ctx: &RenderContext,
        state: &ParticleStateStore,
        field: &VectorFieldTexture,
    ) {
        self.bind_groups = create_bind_groups(device, ctx, state, field, &self.params_buffer);
    }

    /// Upload this frame's parameters.
    pub fn update(&self, queue: &wgpu::Queue, frame: &DrawFrame<'_>) {
        let (color0, color1, is_gradient) = frame.config.color.gpu_stops();
        let uniforms = DrawUniforms {
            matrix: frame.projection.to_gpu(),
            field_min: frame.bounds.min().to_array(),
            field_max: frame.bounds.max().to_array(),
            color0,
            color1,
            viewport_size: [frame.viewport_size.0 as f32, frame.viewport_size.1 as f32],
            particle_size: frame.config.particle_size,
            state_resolution: frame.state_resolution,
            field_size: frame.field_size,
            is_gradient,
            max_speed: REFERENCE_MAX_SPEED,
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// Draw every particle of the current state onto `target`, blending over
    /// what is already there.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        ctx: &RenderContext,
        state: &ParticleStateStore,
        target: &wgpu::TextureView,
    ) {
        let mut pass = super::begin_pass(encoder, target, "Particle Draw Pass", wgpu::LoadOp::Load);
        pass.set_pipeline(&ctx.draw_pipeline);
        pass.set_bind_group(0, &self.bind_groups[state.current_index()], &[]);
        pass.draw(0..6, 0..state.texel_count());
    }
}

fn create_bind_groups(
    device: &wgpu::Device,
    ctx: &RenderContext,
    state: &ParticleStateStore,
    field: &VectorFieldTexture,
    params_buffer: &wgpu::Buffer,
) -> [wgpu::BindGroup; 2] {
    [0, 1].map(|index| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Draw Bind Group"),
            layout: &ctx.draw_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(state.view(index)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(field.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        })
    })
}

pub(super) fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Particle Draw Bind Group Layout"),
        entries: &[
            super::texture_entry(0, wgpu::ShaderStages::VERTEX),
            super::texture_entry(1, wgpu::ShaderStages::FRAGMENT),
            super::uniform_entry(2, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
        ],
    })
}

pub(super) fn create_pipeline(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Particle Draw Shader"),
        source: wgpu::ShaderSource::Wgsl(generate_shader().into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Particle Draw Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Particle Draw Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TRAIL_FORMAT,
                blend: Some(TRAIL_BLEND),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn generate_shader() -> String {
    format!(
        r#"{utils}
const PARTICLE_ALPHA: f32 = {alpha:?};

struct DrawParams {{
    matrix: mat3x3<f32>,
    field_min: vec2<f32>,
    field_max: vec2<f32>,
    color0: vec4<f32>,
    color1: vec4<f32>,
    viewport_size: vec2<f32>,
    particle_size: f32,
    state_resolution: u32,
    field_size: vec2<u32>,
    is_gradient: u32,
    max_speed: f32,
}};

@group(0) @binding(0) var state_texture: texture_2d<f32>;
@group(0) @binding(1) var wind_texture: texture_2d<f32>;
@group(0) @binding(2) var<uniform> params: DrawParams;

struct VertexOutput {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) @interpolate(flat) lonlat: vec2<f32>,
}};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
) -> VertexOutput {{
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );

    let res = params.state_resolution;
    let texel = vec2<i32>(i32(instance_index % res), i32(instance_index / res));
    let lonlat = textureLoad(state_texture, texel, 0).xy;
    let projected = params.matrix * vec3<f32>(mercator(lonlat), 1.0);

    // Quad spans particle_size pixels; clip space is 2 units across
    let offset = corners[vertex_index] * params.particle_size / params.viewport_size;

    var out: VertexOutput;
    out.clip_position = vec4<f32>(projected.xy + offset, 0.0, 1.0);
    out.lonlat = lonlat;
    return out;
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let t = field_coord(in.lonlat, params.field_min, params.field_max);
    if !inside_unit(t) {{
        discard;
    }}

    let wind = textureLoad(wind_texture, field_texel(t, params.field_size), 0).rg;
    var color = params.color0.rgb;
    if params.is_gradient != 0u {{
        let speed = clamp(length(wind) / params.max_speed, 0.0, 1.0);
        color = mix(params.color0.rgb, params.color1.rgb, speed);
    }}
    return vec4<f32>(color, PARTICLE_ALPHA);
}}
"#,
        utils = all_utils_wgsl(),
        alpha = PARTICLE_ALPHA,
    )
}
