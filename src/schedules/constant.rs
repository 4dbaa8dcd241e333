use super::{RateSchedule, required_rate};
use crate::{configs::Kwargs, error::Result};

/// The same learning rate for every update.
#[derive(Debug, Clone, Copy)]
pub struct Constant {
    rate: f64,
}

impl Constant {
    /// Creates a new `Constant` schedule.
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    pub(super) fn from_kwargs(params: &mut Kwargs) -> Result<Self> {
        Ok(Self::new(required_rate(params, "rate")?))
    }
}

impl RateSchedule for Constant {
    fn rate_at(&self, _step: u64) -> f32 {
        self.rate as f32
    }
}
