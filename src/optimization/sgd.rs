use super::{Hyper, Optimizer, SlotState};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
    parameters::check_len,
};

/// Stochastic gradient descent with optional momentum and L2 weight decay.
#[derive(Debug)]
pub struct Sgd {
    momentum: f32,
    dampening: f32,
    weight_decay: f32,
    nesterov: bool,
    state: SlotState,
}

impl Sgd {
    /// Creates a new `Sgd` optimizer.
    ///
    /// # Arguments
    /// * `sizes` - The size of every parameter this instance updates.
    /// * `momentum` - The velocity decay, `0` disables the momentum buffer.
    /// * `dampening` - Dampening applied to new gradients in the momentum buffer.
    /// * `weight_decay` - The default L2 penalty for groups without their own.
    /// * `nesterov` - Whether to use Nesterov momentum.
    ///
    /// # Returns
    /// A new `Sgd` instance or an error if Nesterov momentum is misconfigured.
    pub fn new(
        sizes: &[usize],
        momentum: f32,
        dampening: f32,
        weight_decay: f32,
        nesterov: bool,
    ) -> Result<Self> {
        if nesterov && (momentum <= 0. || dampening != 0.) {
            return Err(OptimErr::config(
                "nesterov momentum requires a momentum and zero dampening",
            ));
        }

        let per_param = if momentum != 0. { 1 } else { 0 };

        Ok(Self {
            momentum,
            dampening,
            weight_decay,
            nesterov,
            state: SlotState::zeroed(sizes, per_param, 0.),
        })
    }

    pub(super) fn from_kwargs(sizes: &[usize], kwargs: &mut Kwargs) -> Result<Self> {
        let momentum = kwargs.take_f32("momentum", 0.)?;
        let dampening = kwargs.take_f32("dampening", 0.)?;
        let weight_decay = kwargs.take_f32("weight_decay", 0.)?;
        let nesterov = kwargs.take_bool("nesterov", false)?;
        Self::new(sizes, momentum, dampening, weight_decay, nesterov)
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        "SGD"
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

        let Self {
            momentum: mu,
            dampening,
            nesterov,
            ..
        } = *self;

        let lr = hyper.lr;
        let wd = hyper.weight_decay.unwrap_or(self.weight_decay);
        let first = self.state.updates <= 1;
        let buffers = self.state.buffers_mut(slot, params.len())?;

        let Some(velocity) = buffers.first_mut() else {
            params.iter_mut().zip(grad).for_each(|(p, g)| {
                *p -= lr * (g + wd * *p);
            });

            return Ok(());
        };

        params
            .iter_mut()
            .zip(grad)
            .zip(velocity.iter_mut())
            .for_each(|((p, g), v)| {
                let d_p = g + wd * *p;
                *v = if first {
                    d_p
                } else {
                    mu * *v + (1. - dampening) * d_p
                };

                *p -= lr * if nesterov { d_p + mu * *v } else { *v };
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
