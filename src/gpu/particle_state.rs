//! Ping-pong particle state textures.
//!
//! Particle `i` lives at texel `(i % res, i / res)` of a square
//! `Rgba32Float` texture as `(lon, lat, 0, 1)`. Two textures alternate roles:
//! one is read by advection and drawing, the other is written by the next
//! advection step, and [`ParticleStateStore::swap`] exchanges them.

use glam::Vec2;

use crate::error::GpuError;

use super::STATE_FORMAT;

pub struct ParticleStateStore {
    textures: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    current: usize,
    resolution: u32,
}

impl ParticleStateStore {
    /// Particle count for a `resolution`-sided state texture, or
    /// `TextureTooLarge` if the device cannot hold it.
    ///
    /// Call before building the positions for [`new`](Self::new).
    pub fn checked_texel_count(device: &wgpu::Device, resolution: u32) -> Result<usize, GpuError> {
        super::check_dimensions(device, resolution, resolution)?;
        (resolution as usize)
            .checked_mul(resolution as usize)
            .ok_or_else(|| GpuError::TextureTooLarge {
                width: resolution,
                height: resolution,
                max: device.limits().max_texture_dimension_2d,
            })
    }

    /// Allocate both textures and write `positions` into the current one.
    ///
    /// `positions` must hold `resolution * resolution` entries.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        resolution: u32,
        positions: &[Vec2],
    ) -> Result<Self, GpuError> {
        let (texture_a, view_a) =
            super::create_target(device, "Particle State A", resolution, resolution, STATE_FORMAT)?;
        let (texture_b, view_b) =
            super::create_target(device, "Particle State B", resolution, resolution, STATE_FORMAT)?;

        let store = Self {
            textures: [texture_a, texture_b],
            views: [view_a, view_b],
            current: 0,
            resolution,
        };
        store.upload(queue, positions);

        log::info!(
            "Allocated particle state {}x{} ({} particles)",
            resolution,
            resolution,
            store.texel_count()
        );
        Ok(store)
    }

    /// Overwrite the current state with `positions`.
    pub fn upload(&self, queue: &wgpu::Queue, positions: &[Vec2]) {
        let count = self.texel_count() as usize;
        let mut texels = vec![[0.0f32, 0.0, 0.0, 1.0]; count];
        for (texel, pos) in texels.iter_mut().zip(positions) {
            texel[0] = pos.x;
            texel[1] = pos.y;
        }
        if positions.len() != count {
            log::warn!("Expected {} particle positions, got {}", count, positions.len());
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.textures[self.current],
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.resolution * 16),
                rows_per_image: Some(self.resolution),
            },
            wgpu::Extent3d {
                width: self.resolution,
                height: self.resolution,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Swap read and write roles.
    #[inline]
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Index of the texture holding the current state.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Index of the texture the next advection step writes.
    #[inline]
    pub fn next_index(&self) -> usize {
        1 - self.current
    }

    pub fn view(&self, index: usize) -> &wgpu::TextureView {
        &self.views[index]
    }

    pub fn current_view(&self) -> &wgpu::TextureView {
        &self.views[self.current]
    }

    pub fn next_view(&self) -> &wgpu::TextureView {
        &self.views[self.next_index()]
    }

    /// Side length of the square state textures.
    #[inline]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of simulated particles.
    #[inline]
    pub fn texel_count(&self) -> u32 {
        self.resolution * self.resolution
    }

    /// Read the current positions back, particle `i` at index `i`.
    pub fn read_positions(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<Vec2>, GpuError> {
        let bytes = super::read_texture(device, queue, &self.textures[self.current], 16)?;
        Ok(bytes
            .chunks_exact(16)
            .map(|chunk| {
                let texel: [f32; 4] = bytemuck::pod_read_unaligned(chunk);
                Vec2::new(texel[0], texel[1])
            })
            .collect())
    }
}
