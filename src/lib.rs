//! # windflow - GPU wind particles for map overlays
//!
//! Animates a 2D wind (or ocean current) field as thousands of short-lived
//! particles with fading trails, composited over a Web Mercator map.
//!
//! Particle positions live in a pair of float textures and are advected
//! entirely on the GPU; the host only supplies the field, the viewport, and
//! a render target each frame.
//!
//! ## Quick Start
//!
//! ```ignore
//! use windflow::prelude::*;
//!
//! let bounds = GeoBounds::new(-180.0, -80.0, 180.0, 80.0);
//! let field = VectorField::new(360, 161, u, v, bounds)?;
//! let viewport = Viewport::new(DVec2::new(40.0, 60.0), DVec2::new(-20.0, 30.0), 1280, 720, 4.0)?;
//!
//! let gpu = GpuContext::new_headless()?;
//! let mut layer = WindLayer::attach(
//!     &gpu,
//!     wgpu::TextureFormat::Rgba8UnormSrgb,
//!     field,
//!     RenderConfig::new().with_particle_count(65_536),
//!     viewport,
//! )?;
//!
//! // Once per display refresh
//! layer.render_frame(&output_view);
//! ```
//!
//! ## Core Concepts
//!
//! ### Field
//!
//! A [`VectorField`] is a regular lon/lat grid of `(u, v)` velocities with
//! rows ordered north to south. Null or non-finite cells read as calm air.
//!
//! ### Particles
//!
//! Each frame every particle steps along the field by
//! `speed_factor * 0.01 * (u / cos(lat), v)` degrees. A particle that leaves
//! the field, or loses a per-frame random draw against `drop_rate`, respawns
//! at a uniformly random point inside the field.
//!
//! ### Trails
//!
//! The previous frame is faded by `fade_opacity` and the new particles are
//! drawn on top, so each trail pixel decays geometrically.
//!
//! ### Viewport
//!
//! Call [`WindLayer::on_viewport_moving`] during continuous pans and
//! [`WindLayer::on_viewport_change`] when a pan, zoom, or resize settles.
//! Settled changes clear the trails.
//!
//! ## Configuration
//!
//! | Setting | Default | |
//! |---------|---------|---|
//! | `particle_count` | 32768 | rounded up to a square |
//! | `speed_factor` | 0.8 | opaque multiplier |
//! | `drop_rate` | 0.003 | clamped to 0-1 |
//! | `fade_opacity` | 0.96 | clamped to 0-1 |
//! | `particle_size` | 2.0 | pixels |
//! | `color` | cyan → red | by speed, 0-15 |

pub mod advection;
pub mod config;
pub mod error;
pub mod field;
pub mod gpu;
mod layer;
pub mod projection;
pub mod scheduler;
pub mod shader_utils;
pub mod viewport;

pub use config::{ColorMode, RenderConfig, Rgb};
pub use error::{ConfigError, FieldError, GpuError, LayerError, ViewportError};
pub use field::{GeoBounds, VectorField};
pub use glam::{DVec2, Vec2};
pub use gpu::{GpuContext, TrailImage};
pub use layer::{TickStatus, WindLayer};
pub use projection::ProjectionMatrix;
pub use scheduler::{FrameScheduler, FrameTick};
pub use viewport::{Viewport, ViewportChange};

/// Convenient re-exports for common usage.
///
/// # Usage
///
/// ```ignore
/// use windflow::prelude::*;
/// ```
///
/// This imports:
/// - [`WindLayer`] and [`TickStatus`] - the layer and its frame status
/// - [`RenderConfig`], [`ColorMode`], [`Rgb`] - settings
/// - [`VectorField`], [`GeoBounds`] - field data
/// - [`Viewport`] - the host's visible region
/// - [`GpuContext`] - adapter and device
/// - [`Vec2`], [`DVec2`] - glam vector types
pub mod prelude {
    pub use crate::config::{ColorMode, RenderConfig, Rgb};
    pub use crate::error::LayerError;
    pub use crate::field::{GeoBounds, VectorField};
    pub use crate::gpu::GpuContext;
    pub use crate::layer::{TickStatus, WindLayer};
    pub use crate::viewport::{Viewport, ViewportChange};
    pub use crate::{DVec2, Vec2};
}
