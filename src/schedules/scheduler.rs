use std::fmt;

/// A learning rate policy: a deterministic function of the update index.
pub trait RateSchedule: fmt::Debug + Send {
    /// Returns the learning rate for the update with index `step`, counting from zero.
    fn rate_at(&self, step: u64) -> f32;
}

/// A built rate schedule together with its step counter.
///
/// The counter only moves forward through `advance`, once per optimizer update.
#[derive(Debug)]
pub struct Scheduler {
    policy: Box<dyn RateSchedule>,
    step: u64,
}

impl Scheduler {
    /// Creates a new `Scheduler` positioned at step zero.
    ///
    /// # Arguments
    /// * `policy` - The rate policy.
    pub fn new(policy: Box<dyn RateSchedule>) -> Self {
        Self { policy, step: 0 }
    }

    /// The learning rate for the next update.
    pub fn rate(&self) -> f32 {
        self.policy.rate_at(self.step)
    }

    /// The amount of updates taken so far.
    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// Moves the schedule one update forward.
    pub fn advance(&mut self) {
        self.step = self.step.saturating_add(1);
    }

    /// Repositions the counter when resuming from a saved state.
    pub(crate) fn restore(&mut self, step: u64) {
        self.step = step;
    }
}
