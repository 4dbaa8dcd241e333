use super::{Hyper, Optimizer, SlotState};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
    parameters::check_len,
};

/// Adagrad: per coordinate rates shrinking with the accumulated squared gradients.
#[derive(Debug)]
pub struct Adagrad {
    lr_decay: f32,
    weight_decay: f32,
    epsilon: f32,
    state: SlotState,
}

impl Adagrad {
    /// Creates a new `Adagrad` optimizer.
    ///
    /// # Arguments
    /// * `sizes` - The size of every parameter this instance updates.
    /// * `lr_decay` - Decays the learning rate as `lr / (1 + (t - 1) * lr_decay)`.
    /// * `weight_decay` - The default L2 penalty for groups without their own.
    /// * `initial_accumulator_value` - The starting value of the squared gradient sums.
    /// * `epsilon` - Added to the denominator for numerical stability.
    pub fn new(
        sizes: &[usize],
        lr_decay: f32,
        weight_decay: f32,
        initial_accumulator_value: f32,
        epsilon: f32,
    ) -> Result<Self> {
        if initial_accumulator_value < 0. || lr_decay < 0. {
            return Err(OptimErr::config(
                "lr_decay and initial_accumulator_value must be non negative",
            ));
        }

        Ok(Self {
            lr_decay,
            weight_decay,
            epsilon,
            state: SlotState::zeroed(sizes, 1, initial_accumulator_value),
        })
    }

    pub(super) fn from_kwargs(sizes: &[usize], kwargs: &mut Kwargs) -> Result<Self> {
        let lr_decay = kwargs.take_f32("lr_decay", 0.)?;
        let weight_decay = kwargs.take_f32("weight_decay", 0.)?;
        let initial = kwargs.take_f32("initial_accumulator_value", 0.)?;
        let epsilon = kwargs.take_f32("eps", 1e-10)?;
        Self::new(sizes, lr_decay, weight_decay, initial, epsilon)
    }
}

impl Optimizer for Adagrad {
    fn name(&self) -> &'static str {
        "Adagrad"
    }

    fn begin_step(&mut self) {
        self.state.updates += 1;
    }

    fn update_params(
        &mut self,
        slot: usize,
        hyper: Hyper,
        params: &mut [f32],
        grad: &[f32],
    ) -> Result<()> {
        check_len("gradient", grad.len(), params.len())?;

        let wd = hyper.weight_decay.unwrap_or(self.weight_decay);
        let eps = self.epsilon;
        let t = self.state.updates.saturating_sub(1) as f32;
        let clr = hyper.lr / (1. + t * self.lr_decay);

        let buffers = self.state.buffers_mut(slot, params.len())?;

        params
            .iter_mut()
            .zip(grad)
            .zip(buffers[0].iter_mut())
            .for_each(|((p, g), sum)| {
                let g = g + wd * *p;
                *sum += g * g;
                *p -= clr * g / (sum.sqrt() + eps);
            });

        Ok(())
    }

    fn export_state(&self) -> SlotState {
        self.state.clone()
    }

    fn import_state(&mut self, state: SlotState) -> Result<()> {
        self.state.replace_with(state)
    }
}
