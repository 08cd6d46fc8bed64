//! The host-facing wind layer.
//!
//! [`WindLayer`] ties the GPU stages together and exposes the operations a
//! map host needs: attach/detach, configuration setters, viewport
//! notifications, and one call per display refresh.
//!
//! # Frame sequence
//!
//! Each [`WindLayer::encode_frame`] records, in order:
//!
//! 1. advection from the current state into the next, then a swap
//! 2. trail fade of `screen` into `temp`
//! 3. particles drawn onto `temp`
//! 4. `temp` copied into `screen`
//! 5. `screen` blended onto the host's output view
//!
//! Configuration set between frames is snapshotted at the start of the next
//! frame. Viewport notifications take effect immediately.
//!
//! ```ignore
//! let gpu = GpuContext::new_headless()?;
//! let mut layer = WindLayer::attach(&gpu, format, field, RenderConfig::new(), viewport)?;
//! layer.set_fade_opacity(0.97);
//! while layer.render_frame(&output_view) == TickStatus::Continue {
//!     // present, wait for the next refresh
//! }
//! ```

use std::sync::Arc;

use glam::Vec2;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::advection::{seed_positions, AdvectionParams};
use crate::config::{ColorMode, RenderConfig};
use crate::error::{ConfigError, GpuError, LayerError, ViewportError};
use crate::field::VectorField;
use crate::gpu::{
    AdvectionStage, DrawFrame, GpuContext, ParticleRenderStage, ParticleStateStore, RenderContext,
    TrailCompositor, TrailImage, VectorFieldTexture,
};
use crate::projection::ProjectionMatrix;
use crate::scheduler::FrameScheduler;
use crate::viewport::{Viewport, ViewportChange};

/// Whether the host should schedule another frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickStatus {
    /// A frame was encoded; request the next one.
    Continue,
    /// The layer is detached; stop scheduling.
    Stopped,
}

/// Every GPU object owned by an attached layer.
struct LayerResources {
    ctx: RenderContext,
    field: VectorFieldTexture,
    state: ParticleStateStore,
    advection: AdvectionStage,
    particles: ParticleRenderStage,
    trails: TrailCompositor,
}

impl LayerResources {
    fn rebind(&mut self, device: &wgpu::Device) {
        self.advection.rebind(device, &self.ctx, &self.state, &self.field);
        self.particles.rebind(device, &self.ctx, &self.state, &self.field);
    }
}

/// Animated wind particles with fading trails over a host map.
pub struct WindLayer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    scheduler: FrameScheduler,
    /// Settings changed by setters since the last frame.
    pending: RenderConfig,
    /// Settings the last frame ran with.
    active: RenderConfig,
    reseed_requested: bool,
    field: VectorField,
    /// Latest viewport, moving or settled.
    viewport: Viewport,
    /// Viewport of the last settled change.
    settled: Viewport,
    projection: ProjectionMatrix,
    seeder: SmallRng,
    resources: Option<LayerResources>,
}

impl WindLayer {
    /// Allocate GPU resources, seed particles, and start the frame loop.
    ///
    /// Fails if the adapter lacks float texture support, a program fails to
    /// build, or the field or viewport is degenerate. Nothing is rendered in
    /// that case.
    pub fn attach(
        gpu: &GpuContext,
        output_format: wgpu::TextureFormat,
        field: VectorField,
        config: RenderConfig,
        viewport: Viewport,
    ) -> Result<Self, LayerError> {
        Self::attach_with_seed(gpu, output_format, field, config, viewport, None)
    }

    /// Like [`attach`](Self::attach), with every random draw derived from
    /// `seed` when given.
    pub fn attach_with_seed(
        gpu: &GpuContext,
        output_format: wgpu::TextureFormat,
        field: VectorField,
        config: RenderConfig,
        viewport: Viewport,
        seed: Option<u64>,
    ) -> Result<Self, LayerError> {
        gpu.check_float_support()?;
        field.validate()?;
        let projection =
            ProjectionMatrix::from_viewport(&viewport).ok_or(ViewportError::DegenerateBounds)?;

        let device = gpu.device.clone();
        let queue = gpu.queue.clone();
        let (mut scheduler, mut seeder) = match seed {
            Some(seed) => (
                FrameScheduler::with_seed(seed),
                SmallRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (FrameScheduler::new(), SmallRng::from_entropy()),
        };

        let ctx = RenderContext::new(&device, output_format)?;
        let field_texture = VectorFieldTexture::new(&device, &queue, &field)?;

        let resolution = config.state_resolution();
        let count = ParticleStateStore::checked_texel_count(&device, resolution)?;
        let positions = seed_positions(&mut seeder, &field.bounds(), count);
        let state = ParticleStateStore::new(&device, &queue, resolution, &positions)?;

        let advection = AdvectionStage::new(&device, &ctx, &state, &field_texture);
        let particles = ParticleRenderStage::new(&device, &ctx, &state, &field_texture);
        let (width, height) = viewport.size();
        let trails = TrailCompositor::new(&device, &ctx, width, height, config.fade_opacity)?;
        trails.clear(&device, &queue);

        scheduler.attach();
        log::info!(
            "Wind layer attached: {}x{} field (max speed {:.1}), {} particles, {}x{} viewport",
            field.width(),
            field.height(),
            field.max_speed(),
            state.texel_count(),
            width,
            height
        );

        Ok(Self {
            device,
            queue,
            scheduler,
            pending: config.clone(),
            active: config,
            reseed_requested: false,
            field,
            viewport,
            settled: viewport,
            projection,
            seeder,
            resources: Some(LayerResources {
                ctx,
                field: field_texture,
                state,
                advection,
                particles,
                trails,
            }),
        })
    }

    /// Stop the frame loop and release every GPU resource.
    pub fn detach(&mut self) {
        self.scheduler.detach();
        if self.resources.take().is_some() {
            log::info!("Wind layer detached");
        }
    }

    pub fn is_active(&self) -> bool {
        self.scheduler.is_active()
    }

    // ========== Configuration ==========

    /// Change the particle count. Particles are reseeded next frame, even if
    /// the count is unchanged.
    pub fn set_particle_count(&mut self, count: u32) -> Result<(), ConfigError> {
        self.pending.set_particle_count(count)?;
        self.reseed_requested = true;
        Ok(())
    }

    pub fn set_speed_factor(&mut self, factor: f32) {
        self.pending.set_speed_factor(factor);
    }

    pub fn set_drop_rate(&mut self, rate: f32) {
        self.pending.set_drop_rate(rate);
    }

    pub fn set_fade_opacity(&mut self, opacity: f32) {
        self.pending.set_fade_opacity(opacity);
    }

    pub fn set_particle_size(&mut self, size: f32) {
        self.pending.set_particle_size(size);
    }

    pub fn set_color(&mut self, color: ColorMode) {
        self.pending.set_color(color);
    }

    /// Replace the wind field. Particles are reseeded inside the new bounds
    /// and the trails cleared.
    pub fn set_field(&mut self, field: VectorField) -> Result<(), LayerError> {
        field.validate()?;
        if let Some(res) = self.resources.as_mut() {
            res.field = VectorFieldTexture::new(&self.device, &self.queue, &field)?;
            res.rebind(&self.device);

            let positions = seed_positions(
                &mut self.seeder,
                &field.bounds(),
                res.state.texel_count() as usize,
            );
            res.state.upload(&self.queue, &positions);
            res.trails.clear(&self.device, &self.queue);
        }
        log::debug!(
            "Replaced wind field with {}x{} grid, max speed {:.1}",
            field.width(),
            field.height(),
            field.max_speed()
        );
        self.field = field;
        Ok(())
    }

    // ========== Viewport ==========

    /// Continuous pan/zoom in progress: recompute the projection only.
    pub fn on_viewport_moving(&mut self, viewport: Viewport) {
        self.update_projection(&viewport);
        self.viewport = viewport;
    }

    /// Pan, zoom, or resize settled.
    ///
    /// Recomputes the projection, recreates the trail images if the pixel
    /// size changed, and clears them, all before the next frame.
    ///
    /// If the trail images cannot be recreated at the new size, the old
    /// ones are cleared, the previous viewport is kept, and the error is
    /// returned.
    pub fn on_viewport_change(&mut self, viewport: Viewport) -> Result<ViewportChange, LayerError> {
        let change = viewport.change_from(&self.settled);

        if let Some(res) = self.resources.as_mut() {
            let (width, height) = viewport.size();
            let resized = res.trails.size() != (width, height);
            if resized {
                if let Err(e) = res.trails.resize(&self.device, &res.ctx, width, height) {
                    log::warn!("Cannot resize trails to {}x{}: {}", width, height, e);
                    res.trails.clear(&self.device, &self.queue);
                    return Err(e.into());
                }
            }
            if resized || change != ViewportChange::Unchanged {
                res.trails.clear(&self.device, &self.queue);
            }
        }
        self.update_projection(&viewport);
        self.viewport = viewport;
        self.settled = viewport;
        log::debug!("Viewport {:?}: {}x{}", change, viewport.pixel_width, viewport.pixel_height);
        Ok(change)
    }

    fn update_projection(&mut self, viewport: &Viewport) {
        match ProjectionMatrix::from_viewport(viewport) {
            Some(projection) => self.projection = projection,
            None => log::warn!("Degenerate viewport projection, keeping the previous one"),
        }
    }

    // ========== Frames ==========

    /// Record one frame into `encoder`, composited onto `output`.
    ///
    /// Uniforms are written through the queue, so submit each frame's
    /// encoder before encoding the next.
    pub fn encode_frame(&mut self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView) -> TickStatus {
        let Some(tick) = self.scheduler.begin_tick() else {
            return TickStatus::Stopped;
        };
        let Some(res) = self.resources.as_mut() else {
            return TickStatus::Stopped;
        };

        let mut config = self.pending.clone();
        if self.reseed_requested {
            self.reseed_requested = false;
            let bounds = self.field.bounds();
            let resolution = config.state_resolution();
            if let Err(e) = reseed(&self.device, &self.queue, res, &mut self.seeder, &bounds, resolution) {
                log::error!("Failed to reallocate particles: {}", e);
                config.particle_count = self.active.particle_count;
                self.pending.particle_count = self.active.particle_count;
            }
        }
        self.active = config;
        let config = &self.active;

        let bounds = self.field.bounds();
        let field_size = res.field.size();
        let state_resolution = res.state.resolution();

        res.advection.update(
            &self.queue,
            &AdvectionParams {
                bounds,
                speed_factor: config.step_factor(),
                drop_rate: config.drop_rate,
                seed: tick.seed,
            },
            field_size,
            state_resolution,
        );
        res.particles.update(
            &self.queue,
            &DrawFrame {
                projection: &self.projection,
                config,
                bounds: &bounds,
                field_size,
                viewport_size: res.trails.size(),
                state_resolution,
            },
        );
        res.trails.set_fade_opacity(&self.queue, config.fade_opacity);

        res.advection.encode(encoder, &res.ctx, &res.state);
        res.state.swap();

        res.trails.encode_fade(encoder, &res.ctx);
        res.particles.encode(encoder, &res.ctx, &res.state, res.trails.temp_view());
        res.trails.encode_copy(encoder, &res.ctx);
        res.trails.encode_present(encoder, &res.ctx, output);

        TickStatus::Continue
    }

    /// Encode and submit one frame.
    pub fn render_frame(&mut self, output: &wgpu::TextureView) -> TickStatus {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Wind Layer Frame Encoder"),
        });
        let status = self.encode_frame(&mut encoder, output);
        if status == TickStatus::Continue {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        status
    }

    // ========== Inspection ==========

    /// The composited trail image, for hosts that draw it themselves.
    pub fn screen_view(&self) -> Option<&wgpu::TextureView> {
        self.resources.as_ref().map(|res| res.trails.screen_view())
    }

    /// Read the composited trail image back.
    pub fn read_screen(&self) -> Result<image::RgbaImage, LayerError> {
        self.read_trail(TrailImage::Screen)
    }

    /// Read either trail image back.
    pub fn read_trail(&self, which: TrailImage) -> Result<image::RgbaImage, LayerError> {
        let res = self.resources.as_ref().ok_or(LayerError::Detached)?;
        Ok(res.trails.read_image(&self.device, &self.queue, which)?)
    }

    /// Read the current particle positions back.
    pub fn read_positions(&self) -> Result<Vec<Vec2>, LayerError> {
        let res = self.resources.as_ref().ok_or(LayerError::Detached)?;
        Ok(res.state.read_positions(&self.device, &self.queue)?)
    }

    /// Side length of the particle state textures, 0 once detached.
    pub fn state_resolution(&self) -> u32 {
        self.resources.as_ref().map_or(0, |res| res.state.resolution())
    }

    /// Number of simulated particles, 0 once detached.
    pub fn particle_count(&self) -> u32 {
        self.resources.as_ref().map_or(0, |res| res.state.texel_count())
    }

    /// Settings as they will apply on the next frame.
    pub fn config(&self) -> &RenderConfig {
        &self.pending
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn projection(&self) -> &ProjectionMatrix {
        &self.projection
    }

    pub fn field(&self) -> &VectorField {
        &self.field
    }

    /// Frames rendered since attach.
    pub fn frame(&self) -> u64 {
        self.scheduler.frame()
    }
}

/// Fresh positions for every particle, reallocating when the resolution
/// changes.
fn reseed(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    res: &mut LayerResources,
    seeder: &mut SmallRng,
    bounds: &crate::field::GeoBounds,
    resolution: u32,
) -> Result<(), GpuError> {
    let count = ParticleStateStore::checked_texel_count(device, resolution)?;
    let positions = seed_positions(seeder, bounds, count);
    if resolution == res.state.resolution() {
        res.state.upload(queue, &positions);
    } else {
        res.state = ParticleStateStore::new(device, queue, resolution, &positions)?;
        res.rebind(device);
    }
    log::debug!("Reseeded {} particles", positions.len());
    Ok(())
}
