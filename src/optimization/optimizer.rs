use std::fmt;

use super::SlotState;
use crate::error::Result;

/// The hyperparameters of the group a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyper {
    pub lr: f32,
    /// The group's explicit weight decay, `None` falls back to the optimizer's own.
    pub weight_decay: Option<f32>,
}

/// Defines the strategy for updating model parameters based on their gradients.
///
/// Implementations keep one slot of buffers per parameter, allocated up front from
/// the parameter sizes they were built with.
pub trait Optimizer: fmt::Debug + Send {
    /// The algorithm's name, recorded in saved states.
    fn name(&self) -> &'static str;

    /// Called once at the start of every update, before any `update_params`.
    fn begin_step(&mut self) {}

    /// Updates a single parameter in place.
    ///
    /// # Arguments
    /// * `slot` - The index of the parameter across every group.
    /// * `hyper` - The hyperparameters of the parameter's group.
    /// * `params` - The parameter values.
    /// * `grad` - The parameter gradient.
    ///
    /// # Returns
    /// An error if the sizes of `params`, `grad` and the slot's buffers differ.
    fn update_params(
        &mut self,
        slot: usize,
        hyper: Hyper,
        params: &mut [f32],
        grad: &[f32],
    ) -> Result<()>;

    /// Copies out the update count and every slot buffer.
    fn export_state(&self) -> SlotState;

    /// Restores a previously exported state.
    ///
    /// # Returns
    /// A `ResumeMismatch` error if the buffer layout differs.
    fn import_state(&mut self, state: SlotState) -> Result<()>;
}
