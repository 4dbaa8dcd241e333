use super::{RateSchedule, required_rate, required_steps};
use crate::{configs::Kwargs, error::Result};

/// Linear warmup followed by a decay proportional to the inverse square root of the step.
#[derive(Debug, Clone, Copy)]
pub struct InverseSqrt {
    rate: f64,
    warmup_steps: u64,
}

impl InverseSqrt {
    /// Creates a new `InverseSqrt` schedule peaking at `rate` after `warmup_steps` updates.
    pub fn new(rate: f64, warmup_steps: u64) -> Self {
        Self { rate, warmup_steps }
    }

    pub(super) fn from_kwargs(params: &mut Kwargs) -> Result<Self> {
        let rate = required_rate(params, "rate")?;
        let warmup_steps = required_steps(params, "warmup_steps")?;
        Ok(Self::new(rate, warmup_steps))
    }
}

impl RateSchedule for InverseSqrt {
    fn rate_at(&self, step: u64) -> f32 {
        let s = step.saturating_add(1) as f64;
        let warmup = self.warmup_steps as f64;

        let rate = if s < warmup {
            self.rate * s / warmup
        } else {
            self.rate * (warmup / s).sqrt()
        };

        rate as f32
    }
}
