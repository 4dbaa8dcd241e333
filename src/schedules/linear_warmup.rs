use super::{RateSchedule, check_rate, required_rate, required_steps};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
};

/// Linear warmup to a peak rate, optionally followed by a linear decay.
///
/// With `s = step + 1`:
/// * `s <= warmup_steps`: `rate * s / warmup_steps`.
/// * afterwards, if `total_steps` is set, linear decay reaching `end_rate` at `total_steps`,
///   otherwise `rate`.
#[derive(Debug, Clone, Copy)]
pub struct LinearWarmup {
    rate: f64,
    warmup_steps: u64,
    total_steps: Option<u64>,
    end_rate: f64,
}

impl LinearWarmup {
    /// Creates a new `LinearWarmup` schedule.
    ///
    /// # Arguments
    /// * `rate` - The peak learning rate.
    /// * `warmup_steps` - The amount of updates to reach the peak, at least one.
    /// * `total_steps` - Where the decay reaches `end_rate`, must exceed `warmup_steps`.
    /// * `end_rate` - The final learning rate, at most `rate`.
    pub fn new(
        rate: f64,
        warmup_steps: u64,
        total_steps: Option<u64>,
        end_rate: f64,
    ) -> Result<Self> {
        if warmup_steps == 0 {
            return Err(OptimErr::config("warmup_steps must be at least 1"));
        }

        if total_steps.is_some_and(|total| total <= warmup_steps) {
            return Err(OptimErr::config("total_steps must exceed warmup_steps"));
        }

        if end_rate > rate {
            return Err(OptimErr::config("end_rate can't exceed the peak rate"));
        }

        Ok(Self {
            rate,
            warmup_steps,
            total_steps,
            end_rate,
        })
    }

    pub(super) fn from_kwargs(params: &mut Kwargs) -> Result<Self> {
        let rate = required_rate(params, "rate")?;
        let warmup_steps = required_steps(params, "warmup_steps")?;
        let total_steps = params.take_opt_u64("total_steps")?;
        let end_rate = check_rate("end_rate", params.take_f32("end_rate", 0.)?)?;
        Self::new(rate, warmup_steps, total_steps, end_rate)
    }
}

impl RateSchedule for LinearWarmup {
    fn rate_at(&self, step: u64) -> f32 {
        let s = step.saturating_add(1);

        if s <= self.warmup_steps {
            return (self.rate * s as f64 / self.warmup_steps as f64) as f32;
        }

        let Some(total) = self.total_steps else {
            return self.rate as f32;
        };

        if s >= total {
            return self.end_rate as f32;
        }

        let progress = (s - self.warmup_steps) as f64 / (total - self.warmup_steps) as f64;
        (self.rate + (self.end_rate - self.rate) * progress) as f32
    }
}
