use super::{RateSchedule, check_rate, required_steps};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
};

/// The transformer schedule: `factor * d_model^-0.5 * min(s^-0.5, s * warmup^-1.5)`.
#[derive(Debug, Clone, Copy)]
pub struct Noam {
    d_model: u64,
    warmup_steps: u64,
    factor: f64,
}

impl Noam {
    /// Creates a new `Noam` schedule.
    pub fn new(d_model: u64, warmup_steps: u64, factor: f64) -> Self {
        Self {
            d_model,
            warmup_steps,
            factor,
        }
    }

    pub(super) fn from_kwargs(params: &mut Kwargs) -> Result<Self> {
        let d_model = params
            .take_opt_u64("d_model")?
            .filter(|&d| d > 0)
            .ok_or_else(|| OptimErr::config("noam rate schedule requires a positive `d_model`"))?;

        let warmup_steps = required_steps(params, "warmup_steps")?;
        let factor = check_rate("factor", params.take_f32("factor", 1.)?)?;
        Ok(Self::new(d_model, warmup_steps, factor))
    }
}

impl RateSchedule for Noam {
    fn rate_at(&self, step: u64) -> f32 {
        let s = step.saturating_add(1) as f64;
        let warmup = self.warmup_steps as f64;
        let scale = (s.powf(-0.5)).min(s * warmup.powf(-1.5));
        (self.factor * (self.d_model as f64).powf(-0.5) * scale) as f32
    }
}
