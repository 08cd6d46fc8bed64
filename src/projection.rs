//! Web Mercator projection and the viewport clip-space transform.
//!
//! Particles are projected on the GPU with the same formula as [`mercator`]
//! and then multiplied by a [`ProjectionMatrix`] that maps the viewport's
//! north-east corner to clip `(+1, +1)` and its south-west corner to
//! `(-1, -1)`. wgpu clip space is Y-up, so north stays at the top without an
//! extra flip.

use glam::{DMat3, DVec2};

use crate::viewport::Viewport;

/// Latitude limit of Web Mercator, in degrees.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Project `(lon, lat)` in degrees to Mercator `(x, y)` in radians.
///
/// Latitude is clamped to ±[`MAX_MERCATOR_LAT`].
pub fn mercator(lonlat: DVec2) -> DVec2 {
    let lat = lonlat.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    DVec2::new(
        lonlat.x.to_radians(),
        (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    )
}

/// Inverse of [`mercator`].
pub fn inverse_mercator(xy: DVec2) -> DVec2 {
    let lat = 2.0 * xy.y.exp().atan() - std::f64::consts::FRAC_PI_2;
    DVec2::new(xy.x.to_degrees(), lat.to_degrees())
}

/// Affine 3×3 transform from Mercator coordinates to clip space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionMatrix {
    matrix: DMat3,
}

impl ProjectionMatrix {
    /// Build from geographic corners. Returns `None` if they span no area.
    pub fn from_corners(north_east: DVec2, south_west: DVec2) -> Option<Self> {
        let ne = mercator(north_east);
        let sw = mercator(south_west);
        let span = ne - sw;
        if !(span.x > 0.0 && span.y > 0.0) || !span.is_finite() {
            return None;
        }

        let scale = DVec2::new(2.0 / span.x, 2.0 / span.y);
        let offset = -(ne + sw) / span;

        Some(Self {
            matrix: DMat3::from_cols_array(&[
                scale.x, 0.0, 0.0, //
                0.0, scale.y, 0.0, //
                offset.x, offset.y, 1.0,
            ]),
        })
    }

    /// Build from a viewport's corners.
    pub fn from_viewport(viewport: &Viewport) -> Option<Self> {
        Self::from_corners(viewport.north_east, viewport.south_west)
    }

    /// The underlying matrix.
    #[inline]
    pub fn matrix(&self) -> DMat3 {
        self.matrix
    }

    /// Transform a Mercator-projected point to clip space.
    #[inline]
    pub fn transform(&self, mercator_xy: DVec2) -> DVec2 {
        self.matrix.transform_point2(mercator_xy)
    }

    /// Project `(lon, lat)` and transform it to clip space.
    #[inline]
    pub fn project_lonlat(&self, lonlat: DVec2) -> DVec2 {
        self.transform(mercator(lonlat))
    }

    /// Columns padded to 16 bytes, the WGSL `mat3x3<f32>` uniform layout.
    pub fn to_gpu(&self) -> [[f32; 4]; 3] {
        let cols = self.matrix.to_cols_array_2d();
        cols.map(|c| [c[0] as f32, c[1] as f32, c[2] as f32, 0.0])
    }
}
