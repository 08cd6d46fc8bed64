//! The wind field as a two-channel float texture.

use crate::error::GpuError;
use crate::field::VectorField;

use super::FIELD_FORMAT;

/// `Rg32Float` texture holding `(u, v)` per cell, row 0 southernmost.
pub struct VectorFieldTexture {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl VectorFieldTexture {
    /// Upload `field`. Null cells are written as zero wind.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, field: &VectorField) -> Result<Self, GpuError> {
        let width = field.width();
        let height = field.height();
        super::check_dimensions(device, width, height)?;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Wind Field Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FIELD_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let texels = field.texels();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 8),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("Uploaded {}x{} wind field", width, height);

        Ok(Self {
            view,
            width,
            height,
        })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Grid size as `[width, height]`.
    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}
