//! GPU resources for the wind layer.
//!
//! Pipelines and bind-group layouts live in a [`RenderContext`] built once
//! per attach; each stage owns its textures, uniform buffers, and bind
//! groups and borrows the context when it encodes work.

mod advection;
mod field_texture;
mod particle_state;
mod particles;
mod trails;

use std::sync::mpsc;
use std::sync::Arc;

pub use advection::AdvectionStage;
pub use field_texture::VectorFieldTexture;
pub use particle_state::ParticleStateStore;
pub use particles::{DrawFrame, ParticleRenderStage};
pub use trails::{TrailCompositor, TrailImage};

use crate::error::GpuError;

/// Particle positions: `(lon, lat, 0, 1)` per texel.
pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Wind field: `(u, v)` per texel.
pub const FIELD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Float;
/// Trail images.
pub const TRAIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Full-screen triangle used by every image-space program.
const FULLSCREEN_VS: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    return vec4<f32>(positions[vertex_index], 0.0, 1.0);
}
"#;

/// `src * a + dst * (1 - a)` on color and alpha alike.
///
/// Alpha uses the same factors as color so that trail alpha decays
/// geometrically with the fade opacity.
pub const TRAIL_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Adapter, device, and queue shared by a layer and its host.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Request an adapter and device, optionally compatible with `surface`.
    pub async fn request(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        log::info!("Using GPU: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Wind Layer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {}", error);
        }));

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Blocking device creation for presenting to `surface`.
    pub fn for_surface(instance: &wgpu::Instance, surface: &wgpu::Surface<'_>) -> Result<Self, GpuError> {
        pollster::block_on(Self::request(instance, Some(surface)))
    }

    /// Blocking device creation without a surface (offscreen use, tests).
    pub fn new_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        pollster::block_on(Self::request(&instance, None))
    }

    /// Fail unless particle state can be rendered to and the field sampled.
    pub fn check_float_support(&self) -> Result<(), GpuError> {
        let state = self.adapter.get_texture_format_features(STATE_FORMAT);
        if !state
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
        {
            return Err(GpuError::MissingFloatTextures(STATE_FORMAT));
        }
        let field = self.adapter.get_texture_format_features(FIELD_FORMAT);
        if !field.allowed_usages.contains(wgpu::TextureUsages::TEXTURE_BINDING) {
            return Err(GpuError::MissingFloatTextures(FIELD_FORMAT));
        }
        Ok(())
    }
}

/// Programs and layouts, created once and borrowed by every draw.
pub struct RenderContext {
    pub(crate) advect_layout: wgpu::BindGroupLayout,
    pub(crate) advect_pipeline: wgpu::RenderPipeline,
    pub(crate) draw_layout: wgpu::BindGroupLayout,
    pub(crate) draw_pipeline: wgpu::RenderPipeline,
    pub(crate) screen_layout: wgpu::BindGroupLayout,
    /// Image copy into a trail image, no blending.
    pub(crate) fade_pipeline: wgpu::RenderPipeline,
    /// Screen image blended onto the host's output.
    pub(crate) present_pipeline: wgpu::RenderPipeline,
}

impl RenderContext {
    /// Build every program; any compile or link error is fatal.
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Result<Self, GpuError> {
        let advect_layout = advection::create_bind_group_layout(device);
        let advect_pipeline = checked(device, "Advection", || {
            advection::create_pipeline(device, &advect_layout)
        })?;

        let draw_layout = particles::create_bind_group_layout(device);
        let draw_pipeline = checked(device, "Particle draw", || {
            particles::create_pipeline(device, &draw_layout)
        })?;

        let screen_layout = trails::create_bind_group_layout(device);
        let fade_pipeline = checked(device, "Trail fade", || {
            trails::create_pipeline(device, &screen_layout, TRAIL_FORMAT, None, "Trail Fade Pipeline")
        })?;
        let present_pipeline = checked(device, "Trail present", || {
            trails::create_pipeline(
                device,
                &screen_layout,
                output_format,
                Some(TRAIL_BLEND),
                "Trail Present Pipeline",
            )
        })?;

        Ok(Self {
            advect_layout,
            advect_pipeline,
            draw_layout,
            draw_pipeline,
            screen_layout,
            fade_pipeline,
            present_pipeline,
        })
    }
}

/// Run `build` inside a validation error scope.
fn checked<T>(device: &wgpu::Device, stage: &'static str, build: impl FnOnce() -> T) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => {
            log::error!("{} program failed: {}", stage, err);
            Err(GpuError::ShaderCompilation {
                stage,
                message: err.to_string(),
            })
        }
        None => Ok(value),
    }
}

/// Create a 2D texture that can be sampled and rendered to.
fn create_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> Result<(wgpu::Texture, wgpu::TextureView), GpuError> {
    check_dimensions(device, width, height)?;
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok((texture, view))
}

fn check_dimensions(device: &wgpu::Device, width: u32, height: u32) -> Result<(), GpuError> {
    let max = device.limits().max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(GpuError::TextureTooLarge { width, height, max });
    }
    Ok(())
}

/// Begin a pass that clears `view` to transparent before drawing.
fn clear_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    label: &str,
) -> wgpu::RenderPass<'e> {
    begin_pass(encoder, view, label, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT))
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    label: &str,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn texture_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Copy a whole texture back to the CPU, rows tightly packed.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    bytes_per_pixel: u32,
) -> Result<Vec<u8>, GpuError> {
    let width = texture.width();
    let height = texture.height();
    let unpadded = width * bytes_per_pixel;
    // Must be aligned to COPY_BYTES_PER_ROW_ALIGNMENT (256)
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size: padded as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("Buffer map failed: {}", e);
            return Err(GpuError::BufferMapping(e.to_string()));
        }
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            return Err(GpuError::BufferMapping("map callback dropped".to_string()));
        }
    }

    let mut out = Vec::with_capacity(unpadded as usize * height as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks(padded as usize) {
            out.extend_from_slice(&row[..unpadded as usize]);
        }
    }
    staging.unmap();
    Ok(out)
}

#[cfg(test)]
pub(crate) fn validate_wgsl(source: &str) {
    use naga::valid::{Capabilities, ValidationFlags, Validator};

    let module = match naga::front::wgsl::parse_str(source) {
        Ok(module) => module,
        Err(err) => panic!("{}", err.emit_to_string(source)),
    };
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    if let Err(err) = validator.validate(&module) {
        panic!("validation failed: {:?}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullscreen_vertex_validates() {
        validate_wgsl(FULLSCREEN_VS);
    }

    #[test]
    fn test_trail_blend_uses_source_alpha_for_alpha() {
        assert_eq!(TRAIL_BLEND.alpha.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(TRAIL_BLEND.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }
}
