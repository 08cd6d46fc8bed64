//! Wind/current vector fields on a regular lon/lat grid.
//!
//! A [`VectorField`] holds one `(u, v)` velocity per grid cell together with
//! the geographic [`GeoBounds`] the grid covers. Source rows are ordered
//! north to south: row 0 lies at `max_lat`, the last row at `min_lat`.
//!
//! # Addressing
//!
//! Positions are mapped into normalized field coordinates `t ∈ [0,1]²` with
//! [`GeoBounds::normalize`] (`t.y = 0` at `min_lat`). The texture uploaded to
//! the GPU stores rows south to north so that texel row `floor(t.y * height)`
//! matches the coordinate directly; [`VectorField::sample`] uses the same
//! addressing so CPU and GPU agree cell for cell.
//!
//! # Example
//!
//! ```ignore
//! let bounds = GeoBounds::new(-180.0, -80.0, 180.0, 80.0);
//! let field = VectorField::new(360, 161, u, v, bounds)?;
//! let wind = field.sample(bounds.normalize(Vec2::new(10.0, 45.0)));
//! ```

use glam::Vec2;

use crate::error::FieldError;

/// Geographic extent of a vector field, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBounds {
    /// Western edge (longitude).
    pub min_lon: f32,
    /// Southern edge (latitude).
    pub min_lat: f32,
    /// Eastern edge (longitude).
    pub max_lon: f32,
    /// Northern edge (latitude).
    pub max_lat: f32,
}

impl GeoBounds {
    /// Create bounds from `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn new(min_lon: f32, min_lat: f32, max_lon: f32, max_lat: f32) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// South-west corner as `(lon, lat)`.
    #[inline]
    pub fn min(&self) -> Vec2 {
        Vec2::new(self.min_lon, self.min_lat)
    }

    /// North-east corner as `(lon, lat)`.
    #[inline]
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.max_lon, self.max_lat)
    }

    /// Extent in degrees.
    #[inline]
    pub fn span(&self) -> Vec2 {
        self.max() - self.min()
    }

    /// Whether the bounds are finite and span a positive area.
    pub fn is_valid(&self) -> bool {
        let finite = [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite());
        finite && self.max_lon > self.min_lon && self.max_lat > self.min_lat
    }

    /// Map `(lon, lat)` to normalized field coordinates.
    #[inline]
    pub fn normalize(&self, pos: Vec2) -> Vec2 {
        (pos - self.min()) / self.span()
    }

    /// Map normalized field coordinates back to `(lon, lat)`.
    #[inline]
    pub fn denormalize(&self, t: Vec2) -> Vec2 {
        self.min() + t * self.span()
    }

    /// Whether a normalized coordinate lies in the closed unit square.
    ///
    /// NaN coordinates are outside.
    #[inline]
    pub fn is_inside_normalized(t: Vec2) -> bool {
        (0.0..=1.0).contains(&t.x) && (0.0..=1.0).contains(&t.y)
    }

    /// Whether `(lon, lat)` lies inside the bounds (edges included).
    #[inline]
    pub fn contains(&self, pos: Vec2) -> bool {
        Self::is_inside_normalized(self.normalize(pos))
    }
}

/// A 2D velocity field sampled on a regular lon/lat grid.
///
/// Immutable once built; replace it wholesale to load new data.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VectorField {
    width: u32,
    height: u32,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "nullable::deserialize"))]
    u: Vec<f32>,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "nullable::deserialize"))]
    v: Vec<f32>,
    bounds: GeoBounds,
}

impl VectorField {
    /// Build a field from row-major `u`/`v` components (row 0 = north).
    ///
    /// Non-finite components are accepted and read as zero velocity.
    pub fn new(
        width: u32,
        height: u32,
        u: Vec<f32>,
        v: Vec<f32>,
        bounds: GeoBounds,
    ) -> Result<Self, FieldError> {
        let field = Self {
            width,
            height,
            u,
            v,
            bounds,
        };
        field.validate()?;
        Ok(field)
    }

    /// A field with the same velocity in every cell.
    pub fn uniform(width: u32, height: u32, bounds: GeoBounds, u: f32, v: f32) -> Result<Self, FieldError> {
        let cells = width as usize * height as usize;
        Self::new(width, height, vec![u; cells], vec![v; cells], bounds)
    }

    /// Build a field by evaluating `f(lon, lat)` at each cell center.
    pub fn from_fn<F>(width: u32, height: u32, bounds: GeoBounds, f: F) -> Result<Self, FieldError>
    where
        F: Fn(f32, f32) -> Vec2,
    {
        if width == 0 || height == 0 {
            return Err(FieldError::EmptyGrid);
        }
        let cells = width as usize * height as usize;
        let mut u = Vec::with_capacity(cells);
        let mut v = Vec::with_capacity(cells);
        let span = bounds.span();
        for row in 0..height {
            // Row 0 is the northern edge
            let lat = bounds.max_lat - (row as f32 + 0.5) / height as f32 * span.y;
            for col in 0..width {
                let lon = bounds.min_lon + (col as f32 + 0.5) / width as f32 * span.x;
                let w = f(lon, lat);
                u.push(w.x);
                v.push(w.y);
            }
        }
        Self::new(width, height, u, v, bounds)
    }

    /// Check grid dimensions, component lengths, and bounds.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.width == 0 || self.height == 0 {
            return Err(FieldError::EmptyGrid);
        }
        let expected = self.cell_count();
        if self.u.len() != expected {
            return Err(FieldError::LengthMismatch {
                component: "u",
                expected,
                actual: self.u.len(),
            });
        }
        if self.v.len() != expected {
            return Err(FieldError::LengthMismatch {
                component: "v",
                expected,
                actual: self.v.len(),
            });
        }
        if !self.bounds.is_valid() {
            return Err(FieldError::DegenerateBounds);
        }
        Ok(())
    }

    /// Grid width in cells.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of grid cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Geographic extent of the grid.
    #[inline]
    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Raw `u` components, row 0 = north.
    pub fn u(&self) -> &[f32] {
        &self.u
    }

    /// Raw `v` components, row 0 = north.
    pub fn v(&self) -> &[f32] {
        &self.v
    }

    /// Velocity stored at a source cell, with non-finite components read as zero.
    pub fn cell(&self, col: u32, row: u32) -> Vec2 {
        let i = row as usize * self.width as usize + col as usize;
        Vec2::new(finite_or_zero(self.u[i]), finite_or_zero(self.v[i]))
    }

    /// Interleaved `(u, v)` texels for a `Rg32Float` upload.
    ///
    /// Rows are flipped so texture row 0 holds the southernmost source row,
    /// and non-finite values are replaced by zero.
    pub fn texels(&self) -> Vec<[f32; 2]> {
        let mut texels = Vec::with_capacity(self.cell_count());
        for tex_row in 0..self.height {
            let source_row = self.height - 1 - tex_row;
            for col in 0..self.width {
                texels.push(self.cell(col, source_row).to_array());
            }
        }
        texels
    }

    /// Nearest-cell velocity at a normalized coordinate.
    ///
    /// Returns `None` outside `[0,1]²`; callers treat that as "outside field"
    /// rather than clamping.
    pub fn sample(&self, t: Vec2) -> Option<Vec2> {
        if !GeoBounds::is_inside_normalized(t) {
            return None;
        }
        let col = ((t.x * self.width as f32) as u32).min(self.width - 1);
        let tex_row = ((t.y * self.height as f32) as u32).min(self.height - 1);
        Some(self.cell(col, self.height - 1 - tex_row))
    }

    /// Wind speed at a normalized coordinate.
    pub fn speed_at(&self, t: Vec2) -> Option<f32> {
        self.sample(t).map(|w| w.length())
    }

    /// Largest finite speed in the field.
    pub fn max_speed(&self) -> f32 {
        self.u
            .iter()
            .zip(&self.v)
            .map(|(&u, &v)| Vec2::new(finite_or_zero(u), finite_or_zero(v)).length())
            .fold(0.0, f32::max)
    }
}

#[inline]
fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[cfg(feature = "serde")]
mod nullable {
    use serde::{Deserialize, Deserializer};

    /// Accept `null` grid entries as NaN (read later as zero velocity).
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values: Vec<Option<f32>> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}
