use std::f64::consts::PI;

use super::{RateSchedule, check_rate, required_rate, required_steps};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
};

/// Linear warmup followed by a half cosine decay from `rate` down to `min_rate`.
#[derive(Debug, Clone, Copy)]
pub struct Cosine {
    rate: f64,
    min_rate: f64,
    warmup_steps: u64,
    total_steps: u64,
}

impl Cosine {
    /// Creates a new `Cosine` schedule.
    ///
    /// # Arguments
    /// * `rate` - The peak learning rate.
    /// * `min_rate` - The rate at `total_steps` and afterwards.
    /// * `warmup_steps` - The amount of warmup updates, may be zero.
    /// * `total_steps` - The total amount of updates including warmup.
    pub fn new(rate: f64, min_rate: f64, warmup_steps: u64, total_steps: u64) -> Result<Self> {
        if total_steps <= warmup_steps {
            return Err(OptimErr::config("total_steps must exceed warmup_steps"));
        }

        if min_rate > rate {
            return Err(OptimErr::config("min_rate can't exceed the peak rate"));
        }

        Ok(Self {
            rate,
            min_rate,
            warmup_steps,
            total_steps,
        })
    }

    pub(super) fn from_kwargs(params: &mut Kwargs) -> Result<Self> {
        let rate = required_rate(params, "rate")?;
        let total_steps = required_steps(params, "total_steps")?;
        let warmup_steps = params.take_opt_u64("warmup_steps")?.unwrap_or(0);
        let min_rate = check_rate("min_rate", params.take_f32("min_rate", 0.)?)?;
        Self::new(rate, min_rate, warmup_steps, total_steps)
    }
}

impl RateSchedule for Cosine {
    fn rate_at(&self, step: u64) -> f32 {
        let s = step.saturating_add(1);

        if s <= self.warmup_steps {
            return (self.rate * s as f64 / self.warmup_steps as f64) as f32;
        }

        let decay_steps = (self.total_steps - self.warmup_steps) as f64;
        let progress = ((s - self.warmup_steps) as f64 / decay_steps).min(1.);
        let cosine = 0.5 * (1. + (PI * progress).cos());
        (self.min_rate + (self.rate - self.min_rate) * cosine) as f32
    }
}
