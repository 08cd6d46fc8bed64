//! Host map viewport state.
//!
//! The host map reports its visible geographic corners and pixel size on
//! every pan, zoom, and resize. A size change rebuilds the trail buffers; a
//! bounds-only change just recomputes the projection.

use glam::DVec2;

use crate::error::ViewportError;

/// Visible map region, as reported by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// North-east corner as `(lon, lat)` in degrees.
    pub north_east: DVec2,
    /// South-west corner as `(lon, lat)` in degrees.
    pub south_west: DVec2,
    /// Width of the drawing surface in pixels.
    pub pixel_width: u32,
    /// Height of the drawing surface in pixels.
    pub pixel_height: u32,
    /// Host zoom level (informational).
    pub zoom: f64,
}

/// What changed between two viewports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportChange {
    /// Nothing changed.
    Unchanged,
    /// Corners or zoom changed at the same pixel size.
    Bounds,
    /// Pixel size changed.
    Resized,
}

impl Viewport {
    /// Create a validated viewport.
    ///
    /// An east edge west of the west edge is taken to cross the antimeridian
    /// and is unwrapped by +360°.
    pub fn new(
        north_east: DVec2,
        south_west: DVec2,
        pixel_width: u32,
        pixel_height: u32,
        zoom: f64,
    ) -> Result<Self, ViewportError> {
        if pixel_width == 0 || pixel_height == 0 {
            return Err(ViewportError::ZeroSize);
        }
        if !north_east.is_finite() || !south_west.is_finite() {
            return Err(ViewportError::DegenerateBounds);
        }
        let mut north_east = north_east;
        if north_east.x < south_west.x {
            north_east.x += 360.0;
        }
        if north_east.x <= south_west.x || north_east.y <= south_west.y {
            return Err(ViewportError::DegenerateBounds);
        }
        Ok(Self {
            north_east,
            south_west,
            pixel_width,
            pixel_height,
            zoom,
        })
    }

    /// Pixel size as `(width, height)`.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.pixel_width, self.pixel_height)
    }

    /// Classify the change from `previous` to `self`.
    pub fn change_from(&self, previous: &Viewport) -> ViewportChange {
        if self.size() != previous.size() {
            ViewportChange::Resized
        } else if self.north_east != previous.north_east
            || self.south_west != previous.south_west
            || self.zoom != previous.zoom
        {
            ViewportChange::Bounds
        } else {
            ViewportChange::Unchanged
        }
    }

    /// Geographic position under a pixel, linear in Mercator space.
    pub fn unproject_pixel(&self, x: f64, y: f64) -> DVec2 {
        let ne = crate::projection::mercator(self.north_east);
        let sw = crate::projection::mercator(self.south_west);
        let tx = x / self.pixel_width as f64;
        let ty = y / self.pixel_height as f64;
        let mx = sw.x + (ne.x - sw.x) * tx;
        let my = ne.y - (ne.y - sw.y) * ty;
        crate::projection::inverse_mercator(DVec2::new(mx, my))
    }

    /// Shift the view by a pixel delta (drag to the right moves the map east).
    pub fn panned(&self, dx: f64, dy: f64) -> Viewport {
        let ne = crate::projection::mercator(self.north_east);
        let sw = crate::projection::mercator(self.south_west);
        let shift = DVec2::new(
            -dx / self.pixel_width as f64 * (ne.x - sw.x),
            dy / self.pixel_height as f64 * (ne.y - sw.y),
        );
        Viewport {
            north_east: crate::projection::inverse_mercator(ne + shift),
            south_west: crate::projection::inverse_mercator(sw + shift),
            ..*self
        }
    }

    /// Scale the view around its center by `factor` (> 1 zooms in).
    pub fn zoomed(&self, factor: f64) -> Viewport {
        let ne = crate::projection::mercator(self.north_east);
        let sw = crate::projection::mercator(self.south_west);
        let center = (ne + sw) * 0.5;
        let half = (ne - sw) * 0.5 / factor;
        Viewport {
            north_east: crate::projection::inverse_mercator(center + half),
            south_west: crate::projection::inverse_mercator(center - half),
            zoom: self.zoom + factor.log2(),
            ..*self
        }
    }

    /// Scale the view by `factor` keeping the point under pixel `(x, y)`
    /// fixed on screen.
    pub fn zoomed_at(&self, factor: f64, x: f64, y: f64) -> Viewport {
        let anchor = crate::projection::mercator(self.unproject_pixel(x, y));
        let ne = crate::projection::mercator(self.north_east);
        let sw = crate::projection::mercator(self.south_west);
        Viewport {
            north_east: crate::projection::inverse_mercator(anchor + (ne - anchor) / factor),
            south_west: crate::projection::inverse_mercator(anchor + (sw - anchor) / factor),
            zoom: self.zoom + factor.log2(),
            ..*self
        }
    }

    /// Same center and scale at a new pixel size.
    pub fn resized(&self, pixel_width: u32, pixel_height: u32) -> Viewport {
        let ne = crate::projection::mercator(self.north_east);
        let sw = crate::projection::mercator(self.south_west);
        let center = (ne + sw) * 0.5;
        let ratio = DVec2::new(
            pixel_width as f64 / self.pixel_width as f64,
            pixel_height as f64 / self.pixel_height as f64,
        );
        let half = (ne - sw) * 0.5 * ratio;
        Viewport {
            north_east: crate::projection::inverse_mercator(center + half),
            south_west: crate::projection::inverse_mercator(center - half),
            pixel_width,
            pixel_height,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn europe() -> Viewport {
        Viewport::new(DVec2::new(30.0, 60.0), DVec2::new(-10.0, 35.0), 800, 600, 4.0).unwrap()
    }

    #[test]
    fn test_rejects_zero_size() {
        let err = Viewport::new(DVec2::new(1.0, 1.0), DVec2::ZERO, 0, 10, 1.0).unwrap_err();
        assert_eq!(err, ViewportError::ZeroSize);
    }

    #[test]
    fn test_rejects_degenerate_corners() {
        let err = Viewport::new(DVec2::new(1.0, 0.0), DVec2::ZERO, 10, 10, 1.0).unwrap_err();
        assert_eq!(err, ViewportError::DegenerateBounds);
        let err = Viewport::new(DVec2::new(f64::NAN, 1.0), DVec2::ZERO, 10, 10, 1.0).unwrap_err();
        assert_eq!(err, ViewportError::DegenerateBounds);
    }

    #[test]
    fn test_antimeridian_unwrapped() {
        let vp = Viewport::new(DVec2::new(-170.0, 10.0), DVec2::new(170.0, -10.0), 10, 10, 1.0).unwrap();
        assert_eq!(vp.north_east.x, 190.0);
    }

    #[test]
    fn test_change_classification() {
        let vp = europe();
        assert_eq!(vp.change_from(&vp), ViewportChange::Unchanged);
        assert_eq!(vp.panned(10.0, 0.0).change_from(&vp), ViewportChange::Bounds);
        assert_eq!(vp.zoomed(2.0).change_from(&vp), ViewportChange::Bounds);
        assert_eq!(vp.resized(1024, 600).change_from(&vp), ViewportChange::Resized);
    }

    #[test]
    fn test_pan_moves_corners_east_when_dragging_left() {
        let vp = europe();
        let panned = vp.panned(-80.0, 0.0);
        assert!(panned.north_east.x > vp.north_east.x);
        assert!((panned.north_east.y - vp.north_east.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_in_shrinks_span() {
        let vp = europe();
        let zoomed = vp.zoomed(2.0);
        let span = vp.north_east.x - vp.south_west.x;
        let zoomed_span = zoomed.north_east.x - zoomed.south_west.x;
        assert!((zoomed_span - span / 2.0).abs() < 1e-9);
        assert!((zoomed.zoom - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_resize_keeps_scale() {
        let vp = europe();
        let wider = vp.resized(1600, 600);
        let span = vp.north_east.x - vp.south_west.x;
        let wider_span = wider.north_east.x - wider.south_west.x;
        assert!((wider_span - 2.0 * span).abs() < 1e-9);
        assert!((wider.north_east.y - vp.north_east.y).abs() < 1e-9);
    }

    #[test]
    fn test_unproject_corners() {
        let vp = europe();
        let top_right = vp.unproject_pixel(800.0, 0.0);
        let bottom_left = vp.unproject_pixel(0.0, 600.0);
        assert!((top_right - vp.north_east).length() < 1e-9);
        assert!((bottom_left - vp.south_west).length() < 1e-9);
    }

    #[test]
    fn test_zoom_at_cursor_keeps_point_fixed() {
        let vp = europe();
        let (x, y) = (200.0, 450.0);
        let before = vp.unproject_pixel(x, y);
        let zoomed = vp.zoomed_at(1.5, x, y);
        assert!((zoomed.unproject_pixel(x, y) - before).length() < 1e-9);
        let span = vp.north_east.x - vp.south_west.x;
        let zoomed_span = zoomed.north_east.x - zoomed.south_west.x;
        assert!((zoomed_span - span / 1.5).abs() < 1e-9);
    }
}
