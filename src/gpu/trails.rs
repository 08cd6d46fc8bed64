//! Trail compositor.
//!
//! Two viewport-sized images accumulate particle history. Each frame:
//!
//! 1. clear `temp`, draw `screen` into it at the fade opacity
//! 2. draw particles onto `temp` (blended, done by the draw stage)
//! 3. clear `screen`, copy `temp` into it unchanged
//!
//! and [`TrailCompositor::encode_present`] blends `screen` over the host's
//! output.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::GpuError;

use super::{RenderContext, TRAIL_FORMAT};

/// Which trail image to read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrailImage {
    /// The composited trail image presented each frame.
    Screen,
    /// Scratch image of the current frame.
    Temp,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct ScreenUniforms {
    opacity: f32,
    _pad: [f32; 3],
}

struct TrailTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// GPU resources for the trail images.
pub struct TrailCompositor {
    screen: TrailTarget,
    temp: TrailTarget,
    width: u32,
    height: u32,
    fade_buffer: wgpu::Buffer,
    copy_buffer: wgpu::Buffer,
    /// `screen` at fade opacity.
    fade_bind_group: wgpu::BindGroup,
    /// `temp` at full opacity.
    copy_bind_group: wgpu::BindGroup,
    /// `screen` at full opacity.
    present_bind_group: wgpu::BindGroup,
}

impl TrailCompositor {
    pub fn new(
        device: &wgpu::Device,
        ctx: &RenderContext,
        width: u32,
        height: u32,
        fade_opacity: f32,
    ) -> Result<Self, GpuError> {
        let screen = create_image(device, "Trail Screen Texture", width, height)?;
        let temp = create_image(device, "Trail Temp Texture", width, height)?;

        let fade_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Trail Fade Params Buffer"),
            contents: bytemuck::bytes_of(&ScreenUniforms {
                opacity: fade_opacity,
                _pad: [0.0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let copy_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Trail Copy Params Buffer"),
            contents: bytemuck::bytes_of(&ScreenUniforms {
                opacity: 1.0,
                _pad: [0.0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let fade_bind_group = create_bind_group(device, ctx, &screen.view, &fade_buffer);
        let copy_bind_group = create_bind_group(device, ctx, &temp.view, &copy_buffer);
        let present_bind_group = create_bind_group(device, ctx, &screen.view, &copy_buffer);

        log::debug!("Created {}x{} trail images", width, height);

        Ok(Self {
            screen,
            temp,
            width,
            height,
            fade_buffer,
            copy_buffer,
            fade_bind_group,
            copy_bind_group,
            present_bind_group,
        })
    }

    /// Recreate both images at a new size. Their contents start empty.
    pub fn resize(&mut self, device: &wgpu::Device, ctx: &RenderContext, width: u32, height: u32) -> Result<(), GpuError> {
        let screen = create_image(device, "Trail Screen Texture", width, height)?;
        let temp = create_image(device, "Trail Temp Texture", width, height)?;

        self.fade_bind_group = create_bind_group(device, ctx, &screen.view, &self.fade_buffer);
        self.copy_bind_group = create_bind_group(device, ctx, &temp.view, &self.copy_buffer);
        self.present_bind_group = create_bind_group(device, ctx, &screen.view, &self.copy_buffer);
        self.screen = screen;
        self.temp = temp;
        self.width = width;
        self.height = height;

        log::info!("Resized trail images to {}x{}", width, height);
        Ok(())
    }

    /// Image size as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Set how much of the previous frame survives each frame.
    pub fn set_fade_opacity(&self, queue: &wgpu::Queue, opacity: f32) {
        let uniforms = ScreenUniforms {
            opacity,
            _pad: [0.0; 3],
        };
        queue.write_buffer(&self.fade_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// Encode a clear of both images to transparent.
    pub fn encode_clear(&self, encoder: &mut wgpu::CommandEncoder) {
        drop(super::clear_pass(encoder, &self.screen.view, "Trail Clear Screen Pass"));
        drop(super::clear_pass(encoder, &self.temp.view, "Trail Clear Temp Pass"));
    }

    /// Clear both images and submit immediately.
    pub fn clear(&self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Trail Clear Encoder"),
        });
        self.encode_clear(&mut encoder);
        queue.submit(std::iter::once(encoder.finish()));
    }

    /// Step 1: faded copy of `screen` into a cleared `temp`.
    pub fn encode_fade(&self, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext) {
        let mut pass = super::clear_pass(encoder, &self.temp.view, "Trail Fade Pass");
        pass.set_pipeline(&ctx.fade_pipeline);
        pass.set_bind_group(0, &self.fade_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Target for step 2.
    pub fn temp_view(&self) -> &wgpu::TextureView {
        &self.temp.view
    }

    /// Step 3: `temp` copied into a cleared `screen`.
    pub fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext) {
        let mut pass = super::clear_pass(encoder, &self.screen.view, "Trail Copy Pass");
        pass.set_pipeline(&ctx.fade_pipeline);
        pass.set_bind_group(0, &self.copy_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Blend `screen` over whatever `output` already holds.
    pub fn encode_present(&self, encoder: &mut wgpu::CommandEncoder, ctx: &RenderContext, output: &wgpu::TextureView) {
        let mut pass = super::begin_pass(encoder, output, "Trail Present Pass", wgpu::LoadOp::Load);
        pass.set_pipeline(&ctx.present_pipeline);
        pass.set_bind_group(0, &self.present_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub fn screen_view(&self) -> &wgpu::TextureView {
        &self.screen.view
    }

    /// Read an image back as 8-bit RGBA.
    pub fn read_image(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        which: TrailImage,
    ) -> Result<image::RgbaImage, GpuError> {
        let target = match which {
            TrailImage::Screen => &self.screen,
            TrailImage::Temp => &self.temp,
        };
        let bytes = super::read_texture(device, queue, &target.texture, 4)?;
        image::RgbaImage::from_raw(self.width, self.height, bytes)
            .ok_or_else(|| GpuError::BufferMapping("readback size mismatch".to_string()))
    }
}

fn create_image(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Result<TrailTarget, GpuError> {
    let (texture, view) = super::create_target(device, label, width, height, TRAIL_FORMAT)?;
    Ok(TrailTarget { texture, view })
}

fn create_bind_group(
    device: &wgpu::Device,
    ctx: &RenderContext,
    view: &wgpu::TextureView,
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Trail Bind Group"),
        layout: &ctx.screen_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: params.as_entire_binding(),
            },
        ],
    })
}

pub(super) fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Trail Bind Group Layout"),
        entries: &[
            super::texture_entry(0, wgpu::ShaderStages::FRAGMENT),
            super::uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
        ],
    })
}

pub(super) fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    label: &str,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Trail Screen Shader"),
        source: wgpu::ShaderSource::Wgsl(generate_shader().into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Trail Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
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
                format,
                blend,
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
        r#"
struct ScreenParams {{
    opacity: f32,
}};

@group(0) @binding(0) var image: texture_2d<f32>;
@group(0) @binding(1) var<uniform> params: ScreenParams;

{fullscreen}

@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {{
    let size = textureDimensions(image);
    let texel = min(vec2<u32>(frag_coord.xy), size - vec2<u32>(1u));
    let color = textureLoad(image, texel, 0);
    return vec4<f32>(color.rgb, color.a * params.opacity);
}}
"#,
        fullscreen = super::FULLSCREEN_VS,
    )
}
