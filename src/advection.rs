//! CPU reference model of the particle advection step.
//!
//! The frame loop advects particles entirely on the GPU (see
//! `gpu::advection`). This module implements the same per-particle rule on
//! the CPU, drawing from the same integer hash, so the statistical behavior
//! of the simulation (reseed rate, drift, bounds) can be checked without a
//! device.
//!
//! # Rule
//!
//! For particle `index` at `(lon, lat)` with frame seed `seed`:
//!
//! 1. If the position is outside the field bounds, or the drop draw is below
//!    `drop_rate`, respawn uniformly inside the bounds.
//! 2. Otherwise sample `(u, v)` and step
//!    `lon += u * k / cos(lat)`, `lat += v * k`.
//! 3. If the step left the bounds, respawn in the same frame.

use glam::Vec2;
use rand::Rng;

use crate::field::{GeoBounds, VectorField};
use crate::shader_utils::{random_unit, STREAM_DROP, STREAM_LAT, STREAM_LON};

/// Inputs to one advection step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdvectionParams {
    /// Field bounds; particles live inside them.
    pub bounds: GeoBounds,
    /// Per-frame step multiplier (already scaled, see `RenderConfig::step_factor`).
    pub speed_factor: f32,
    /// Per-frame respawn probability.
    pub drop_rate: f32,
    /// Frame seed.
    pub seed: u32,
}

/// Why a particle respawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReseedCause {
    /// It started the frame outside the bounds.
    OutOfBounds,
    /// The random drop draw fired.
    Dropped,
    /// The step carried it outside the bounds.
    LeftBounds,
}

/// Outcome of advecting one particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Moved along the field.
    Advected,
    /// Respawned inside the bounds.
    Reseeded(ReseedCause),
}

/// Per-frame counts for a batch of particles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdvectionStats {
    pub advected: usize,
    pub out_of_bounds: usize,
    pub dropped: usize,
    pub left_bounds: usize,
}

impl AdvectionStats {
    /// Total number of respawned particles.
    pub fn reseeded(&self) -> usize {
        self.out_of_bounds + self.dropped + self.left_bounds
    }

    fn record(&mut self, step: Step) {
        match step {
            Step::Advected => self.advected += 1,
            Step::Reseeded(ReseedCause::OutOfBounds) => self.out_of_bounds += 1,
            Step::Reseeded(ReseedCause::Dropped) => self.dropped += 1,
            Step::Reseeded(ReseedCause::LeftBounds) => self.left_bounds += 1,
        }
    }
}

/// Respawn position for a particle, uniform inside `bounds`.
pub fn reseed_position(bounds: &GeoBounds, index: u32, seed: u32) -> Vec2 {
    bounds.denormalize(Vec2::new(
        random_unit(index, seed, STREAM_LON),
        random_unit(index, seed, STREAM_LAT),
    ))
}

/// Advance one particle by one frame.
pub fn advect(field: &VectorField, params: &AdvectionParams, index: u32, pos: Vec2) -> (Vec2, Step) {
    let bounds = &params.bounds;
    let Some(wind) = field.sample(bounds.normalize(pos)) else {
        return (
            reseed_position(bounds, index, params.seed),
            Step::Reseeded(ReseedCause::OutOfBounds),
        );
    };
    if random_unit(index, params.seed, STREAM_DROP) < params.drop_rate {
        return (
            reseed_position(bounds, index, params.seed),
            Step::Reseeded(ReseedCause::Dropped),
        );
    }

    let lat_rad = pos.y.to_radians();
    let next = Vec2::new(
        pos.x + wind.x * params.speed_factor / lat_rad.cos(),
        pos.y + wind.y * params.speed_factor,
    );

    if bounds.contains(next) {
        (next, Step::Advected)
    } else {
        (
            reseed_position(bounds, index, params.seed),
            Step::Reseeded(ReseedCause::LeftBounds),
        )
    }
}

/// Advance every particle in place; `positions[i]` is particle `i`.
pub fn advect_all(field: &VectorField, params: &AdvectionParams, positions: &mut [Vec2]) -> AdvectionStats {
    let mut stats = AdvectionStats::default();
    for (index, pos) in positions.iter_mut().enumerate() {
        let (next, step) = advect(field, params, index as u32, *pos);
        *pos = next;
        stats.record(step);
    }
    stats
}

/// Uniform random initial positions inside `bounds`.
pub fn seed_positions<R: Rng + ?Sized>(rng: &mut R, bounds: &GeoBounds, count: usize) -> Vec<Vec2> {
    (0..count)
        .map(|_| bounds.denormalize(Vec2::new(rng.gen::<f32>(), rng.gen::<f32>())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn bounds() -> GeoBounds {
        GeoBounds::new(-60.0, -50.0, 60.0, 50.0)
    }

    fn params(speed_factor: f32, drop_rate: f32, seed: u32) -> AdvectionParams {
        AdvectionParams {
            bounds: bounds(),
            speed_factor,
            drop_rate,
            seed,
        }
    }

    #[test]
    fn test_out_of_bounds_reseeds() {
        let field = VectorField::uniform(8, 8, bounds(), 1.0, 0.0).unwrap();
        let (pos, step) = advect(&field, &params(0.01, 0.0, 3), 0, Vec2::new(100.0, 0.0));
        assert_eq!(step, Step::Reseeded(ReseedCause::OutOfBounds));
        assert!(bounds().contains(pos));
    }

    #[test]
    fn test_drop_rate_one_always_reseeds() {
        let field = VectorField::uniform(8, 8, bounds(), 1.0, 0.0).unwrap();
        let (_, step) = advect(&field, &params(0.01, 1.0, 3), 5, Vec2::ZERO);
        assert_eq!(step, Step::Reseeded(ReseedCause::Dropped));
    }

    #[test]
    fn test_step_applies_meridian_correction() {
        let field = VectorField::uniform(8, 8, bounds(), 2.0, 1.0).unwrap();
        let start = Vec2::new(0.0, 45.0);
        let (pos, step) = advect(&field, &params(0.5, 0.0, 0), 0, start);
        assert_eq!(step, Step::Advected);
        let expected_lon = 2.0 * 0.5 / 45f32.to_radians().cos();
        assert!((pos.x - expected_lon).abs() < 1e-5);
        assert!((pos.y - 45.5).abs() < 1e-5);
    }

    #[test]
    fn test_leaving_bounds_reseeds_same_frame() {
        let field = VectorField::uniform(8, 8, bounds(), 10.0, 0.0).unwrap();
        let (pos, step) = advect(&field, &params(1.0, 0.0, 9), 0, Vec2::new(59.0, 0.0));
        assert_eq!(step, Step::Reseeded(ReseedCause::LeftBounds));
        assert!(bounds().contains(pos));
    }

    #[test]
    fn test_null_cells_stall_particles() {
        let b = bounds();
        let field = VectorField::new(1, 1, vec![f32::NAN], vec![f32::NAN], b).unwrap();
        let start = Vec2::new(1.0, 2.0);
        let (pos, step) = advect(&field, &params(1.0, 0.0, 0), 0, start);
        assert_eq!(step, Step::Advected);
        assert_eq!(pos, start);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let field = VectorField::uniform(8, 8, bounds(), 3.0, -1.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut a = seed_positions(&mut rng, &bounds(), 256);
        let mut b = a.clone();
        for seed in 0..20 {
            advect_all(&field, &params(0.05, 0.02, seed), &mut a);
            advect_all(&field, &params(0.05, 0.02, seed), &mut b);
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_seed_positions_inside_bounds() {
        let mut rng = SmallRng::seed_from_u64(42);
        let positions = seed_positions(&mut rng, &bounds(), 1000);
        assert_eq!(positions.len(), 1000);
        assert!(positions.iter().all(|p| bounds().contains(*p)));
    }

    #[test]
    fn test_stats_count_every_particle() {
        let field = VectorField::uniform(8, 8, bounds(), 0.0, 0.0).unwrap();
        let mut positions = vec![Vec2::ZERO; 500];
        positions[0] = Vec2::new(500.0, 0.0);
        let stats = advect_all(&field, &params(1.0, 0.1, 77), &mut positions);
        assert_eq!(stats.advected + stats.reseeded(), 500);
        assert_eq!(stats.out_of_bounds, 1);
        assert_eq!(stats.left_bounds, 0);
    }
}
