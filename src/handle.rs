use std::{num::NonZeroUsize, path::Path};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    optimization::{OptimizerStage, StageState},
    parameters::ParameterGroup,
    persistence::StateStore,
    schedules::Scheduler,
};

/// Everything needed to resume an optimizer exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDict {
    #[serde(flatten)]
    pub stage: StageState,
    /// The rate schedule's step counter.
    pub step: u64,
}

/// The object a training loop drives: the stage chain and its rate schedule.
///
/// The optimizer and the schedule always advance together, one `step` is one update of
/// both.
pub struct OptimizerHandle {
    optimizer: Box<dyn OptimizerStage>,
    scheduler: Scheduler,
    update_frequency: NonZeroUsize,
}

impl OptimizerHandle {
    /// Creates a new `OptimizerHandle`.
    pub(crate) fn new(
        optimizer: Box<dyn OptimizerStage>,
        scheduler: Scheduler,
        update_frequency: NonZeroUsize,
    ) -> Self {
        Self {
            optimizer,
            scheduler,
            update_frequency,
        }
    }

    /// Applies one update at the schedule's current rate, then advances the schedule.
    ///
    /// # Returns
    /// The error of the update, in which case the schedule doesn't advance.
    pub async fn step(&mut self) -> Result<()> {
        let lr = self.scheduler.rate();
        self.optimizer.set_lr(lr);
        self.optimizer.step().await?;
        self.scheduler.advance();

        debug!(step = self.scheduler.step_count(), lr = lr; "optimizer step");
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.optimizer.zero_grad();
    }

    /// Signals that the backward pass of one micro batch finished.
    pub async fn backward_pass(&mut self) -> Result<()> {
        self.optimizer.backward_pass().await
    }

    /// Scales a loss term before its backward pass, the identity without mixed precision.
    pub fn scale_loss(&mut self, loss: f32, loss_id: usize) -> f32 {
        self.optimizer.scale_loss(loss, loss_id)
    }

    /// The learning rate the next `step` uses.
    pub fn rate(&self) -> f32 {
        self.scheduler.rate()
    }

    /// The amount of updates applied so far.
    pub fn step_count(&self) -> u64 {
        self.scheduler.step_count()
    }

    /// The amount of backward passes accumulated into each update.
    pub fn update_frequency(&self) -> usize {
        self.update_frequency.get()
    }

    pub fn groups(&self) -> &[ParameterGroup] {
        self.optimizer.groups()
    }

    pub fn state_dict(&self) -> StateDict {
        StateDict {
            stage: self.optimizer.state_dict(),
            step: self.scheduler.step_count(),
        }
    }

    /// Restores a state taken from a handle built from the same configuration.
    ///
    /// # Returns
    /// A `ResumeMismatch` error if the state's layout doesn't fit this handle, in which
    /// case the schedule is left untouched.
    pub fn load_state_dict(&mut self, state: StateDict) -> Result<()> {
        self.optimizer.load_state_dict(state.stage)?;
        self.scheduler.restore(state.step);
        Ok(())
    }

    /// Saves the current state through `store`.
    pub fn save(&self, store: &impl StateStore, path: &Path) -> Result<()> {
        store.save(path, &self.state_dict())
    }

    /// Loads and restores a state saved through `store`.
    pub fn load(&mut self, store: &impl StateStore, path: &Path) -> Result<()> {
        let state = store.load(path)?;
        self.load_state_dict(state)
    }
}
