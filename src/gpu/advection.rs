//! Advection pass: one fragment per particle-state texel.
//!
//! Reads the current state texture and the wind field, writes the advanced
//! positions into the other state texture. The rule is the one implemented
//! on the CPU by [`crate::advection::advect`]; both draw from the same
//! integer hash and streams.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::advection::AdvectionParams;
use crate::shader_utils::{all_utils_wgsl, STREAM_DROP, STREAM_LAT, STREAM_LON};

use super::{ParticleStateStore, RenderContext, VectorFieldTexture, STATE_FORMAT};

/// Uniforms for the advection program.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct AdvectUniforms {
    field_min: [f32; 2],
    field_max: [f32; 2],
    field_size: [u32; 2],
    state_resolution: u32,
    seed: u32,
    speed_factor: f32,
    drop_rate: f32,
    _pad: [f32; 2],
}

/// GPU resources for the advection pass.
pub struct AdvectionStage {
    params_buffer: wgpu::Buffer,
    /// `bind_groups[i]` reads state texture `i`.
    bind_groups: [wgpu::BindGroup; 2],
}

impl AdvectionStage {
    pub fn new(
        device: &wgpu::Device,
        ctx: &RenderContext,
        state: &ParticleStateStore,
        field: &VectorFieldTexture,
    ) -> Self {
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Advection Params Buffer"),
            contents: bytemuck::bytes_of(&AdvectUniforms::zeroed()),
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
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        params: &AdvectionParams,
        field_size: [u32; 2],
        state_resolution: u32,
    ) {
        let uniforms = AdvectUniforms {
            field_min: params.bounds.min().to_array(),
            field_max: params.bounds.max().to_array(),
            field_size,
            state_resolution,
            seed: params.seed,
            speed_factor: params.speed_factor,
            drop_rate: params.drop_rate,
            _pad: [0.0; 2],
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// Encode one step from the current state into the next one.
    ///
    /// The caller swaps the store once the step is recorded.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext, state: &ParticleStateStore) {
        let mut pass = super::clear_pass(encoder, state.next_view(), "Advection Pass");
        pass.set_pipeline(&ctx.advect_pipeline);
        pass.set_bind_group(0, &self.bind_groups[state.current_index()], &[]);
        pass.draw(0..3, 0..1);
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
            label: Some("Advection Bind Group"),
            layout: &ctx.advect_layout,
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
        label: Some("Advection Bind Group Layout"),
        entries: &[
            super::texture_entry(0, wgpu::ShaderStages::FRAGMENT),
            super::texture_entry(1, wgpu::ShaderStages::FRAGMENT),
            super::uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
        ],
    })
}

pub(super) fn create_pipeline(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Advection Shader"),
        source: wgpu::ShaderSource::Wgsl(generate_shader().into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Advection Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Advection Pipeline"),
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
                format: STATE_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn generate_shader() -> String {
    format!(
        r#"{utils}
struct AdvectParams {{
    field_min: vec2<f32>,
    field_max: vec2<f32>,
    field_size: vec2<u32>,
    state_resolution: u32,
    seed: u32,
    speed_factor: f32,
    drop_rate: f32,
}};

@group(0) @binding(0) var state_texture: texture_2d<f32>;
@group(0) @binding(1) var wind_texture: texture_2d<f32>;
@group(0) @binding(2) var<uniform> params: AdvectParams;

{fullscreen}

fn respawn(index: u32) -> vec4<f32> {{
    let t = vec2<f32>(
        rand_unit(index, params.seed, {stream_lon}u),
        rand_unit(index, params.seed, {stream_lat}u),
    );
    return vec4<f32>(params.field_min + t * (params.field_max - params.field_min), 0.0, 1.0);
}}

@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {{
    let texel = vec2<i32>(frag_coord.xy);
    let index = u32(texel.y) * params.state_resolution + u32(texel.x);
    let pos = textureLoad(state_texture, texel, 0).xy;

    let t = field_coord(pos, params.field_min, params.field_max);
    if !inside_unit(t) || rand_unit(index, params.seed, {stream_drop}u) < params.drop_rate {{
        return respawn(index);
    }}

    let wind = textureLoad(wind_texture, field_texel(t, params.field_size), 0).rg;
    let next = vec2<f32>(
        pos.x + wind.x * params.speed_factor / cos(radians(pos.y)),
        pos.y + wind.y * params.speed_factor,
    );

    if !inside_unit(field_coord(next, params.field_min, params.field_max)) {{
        return respawn(index);
    }}
    return vec4<f32>(next, 0.0, 1.0);
}}
"#,
        utils = all_utils_wgsl(),
        fullscreen = super::FULLSCREEN_VS,
        stream_drop = STREAM_DROP,
        stream_lon = STREAM_LON,
        stream_lat = STREAM_LAT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<AdvectUniforms>(), 48);
    }

    #[test]
    fn test_shader_validates() {
        super::super::validate_wgsl(&generate_shader());
    }

    #[test]
    fn test_shader_uses_all_streams() {
        let shader = generate_shader();
        assert!(shader.contains("params.seed, 0u"));
        assert!(shader.contains("params.seed, 1u"));
        assert!(shader.contains("params.seed, 2u"));
    }
}
