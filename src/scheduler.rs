//! Frame scheduling for the wind layer.
//!
//! The host drives frames (typically from its redraw callback). The scheduler
//! only tracks whether the layer is still attached and hands out a frame
//! number and a fresh random seed per tick; once detached, every later tick is
//! refused so no frame is rendered after removal.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Inputs for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTick {
    /// Frames rendered before this one.
    pub frame: u64,
    /// Seed for this frame's random draws.
    pub seed: u32,
}

pub struct FrameScheduler {
    active: bool,
    frame: u64,
    rng: SmallRng,
}

impl FrameScheduler {
    /// Inactive scheduler seeded from system entropy.
    pub fn new() -> Self {
        Self {
            active: false,
            frame: 0,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Inactive scheduler with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            active: false,
            frame: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn attach(&mut self) {
        if !self.active {
            log::debug!("Frame loop started");
        }
        self.active = true;
    }

    pub fn detach(&mut self) {
        if self.active {
            log::debug!("Frame loop stopped after {} frames", self.frame);
        }
        self.active = false;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Frames started so far.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Start a frame, or `None` once detached.
    pub fn begin_tick(&mut self) -> Option<FrameTick> {
        if !self.active {
            return None;
        }
        let tick = FrameTick {
            frame: self.frame,
            seed: self.rng.gen(),
        };
        self.frame += 1;
        Some(tick)
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}
