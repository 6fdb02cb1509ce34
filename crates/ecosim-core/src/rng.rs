//! Seeded Randomness
//!
//! Every stochastic decision in a run draws from one `SimRng`, so a seed fully
//! determines the run.

use bevy_ecs::prelude::*;
use ecosim_events::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Seeded random number generator resource
#[derive(Resource)]
pub struct SimRng(pub SmallRng);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(SmallRng::seed_from_u64(seed))
    }
}

/// Convenience draws layered over any `Rng`
pub trait RandomExt: Rng {
    /// True with probability `p`; values outside [0, 1] saturate.
    fn chance(&mut self, p: f32) -> bool {
        if p <= 0.0 {
            false
        } else if p >= 1.0 {
            true
        } else {
            self.gen::<f32>() < p
        }
    }

    /// Uniform in [0, 1).
    fn unit(&mut self) -> f32 {
        self.gen::<f32>()
    }

    /// Uniform in [min, max); a degenerate interval returns `min`.
    fn between(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            min
        } else {
            self.gen_range(min..max)
        }
    }

    /// Uniform in [-half, half].
    fn spread(&mut self, half: f32) -> f32 {
        if half <= 0.0 {
            0.0
        } else {
            self.gen_range(-half..=half)
        }
    }

    /// Random planar unit vector.
    fn unit_direction(&mut self) -> Vec3 {
        let angle = self.gen_range(0.0..std::f32::consts::TAU);
        Vec3::planar(angle.cos(), angle.sin())
    }

    /// Index drawn proportionally to `weights`. Returns None when no weight is positive.
    fn pick_weighted(&mut self, weights: &[f32]) -> Option<usize> {
        let total: f32 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = self.gen::<f32>() * total;
        let mut last = None;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            last = Some(i);
            if roll < *w {
                return Some(i);
            }
            roll -= w;
        }
        last
    }
}

impl<R: Rng + ?Sized> RandomExt for R {}
