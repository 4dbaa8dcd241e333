use super::{Hyper, Optimizer, SlotState};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
    parameters::check_len,
};

/// RMSprop with optional momentum and centering.
#[derive(Debug)]
pub struct RmsProp {
    alpha: f32,
    epsilon: f32,
    weight_decay: f32,
    momentum: f32,
    // Buffer positions, the squared average is always the first one.
    momentum_idx: Option<usize>,
    grad_avg_idx: Option<usize>,
    state: SlotState,
}

impl RmsProp {
    /// Creates a new `RmsProp` optimizer.
    ///
    /// # Arguments
    /// * `sizes` - The size of every parameter this instance updates.
    /// * `alpha` - The smoothing constant of the squared gradient average.
    /// * `epsilon` - Added to the denominator for numerical stability.
    /// * `weight_decay` - The default L2 penalty for groups without their own.
    /// * `momentum` - The momentum factor, `0` disables the momentum buffer.
    /// * `centered` - Whether to normalize by the estimated gradient variance.
    pub fn new(
        sizes: &[usize],
        alpha: f32,
        epsilon: f32,
        weight_decay: f32,
        momentum: f32,
        centered: bool,
    ) -> Result<Self> {
        if !(0. ..=1.).contains(&alpha) {
            return Err(OptimErr::config(format!(
                "alpha must be within [0, 1], got {alpha}"
            )));
        }

        let mut buffers = 1;
        let mut next = || {
            buffers += 1;
            buffers - 1
        };

        let momentum_idx = (momentum > 0.).then(&mut next);
        let grad_avg_idx = centered.then(&mut next);

        Ok(Self {
            alpha,
            epsilon,
            weight_decay,
            momentum,
            momentum_idx,
            grad_avg_idx,
            state: SlotState::zeroed(sizes, buffers, 0.),
        })
    }

    pub(super) fn from_kwargs(sizes: &[usize], kwargs: &mut Kwargs) -> Result<Self> {
        let alpha = kwargs.take_f32("alpha", 0.99)?;
        let epsilon = kwargs.take_f32("eps", 1e-8)?;
        let weight_decay = kwargs.take_f32("weight_decay", 0.)?;
        let momentum = kwargs.take_f32("momentum", 0.)?;
        let centered = kwargs.take_bool("centered", false)?;
        Self::new(sizes, alpha, epsilon, weight_decay, momentum, centered)
    }
}

impl Optimizer for RmsProp {
    fn name(&self) -> &'static str {
        "RMSprop"
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
            alpha,
            epsilon: eps,
            momentum: mu,
            momentum_idx,
            grad_avg_idx,
            ..
        } = *self;

        let lr = hyper.lr;
        let wd = hyper.weight_decay.unwrap_or(self.weight_decay);
        let buffers = self.state.buffers_mut(slot, params.len())?;

        for (i, p) in params.iter_mut().enumerate() {
            let g = grad[i] + wd * *p;

            let square_avg = &mut buffers[0][i];
            *square_avg = alpha * *square_avg + (1. - alpha) * g * g;
            let mut avg = *square_avg;

            if let Some(idx) = grad_avg_idx {
                let grad_avg = &mut buffers[idx][i];
                *grad_avg = alpha * *grad_avg + (1. - alpha) * g;
                avg -= *grad_avg * *grad_avg;
            }

            let denom = avg.sqrt() + eps;

            match momentum_idx {
                Some(idx) => {
                    let velocity = &mut buffers[idx][i];
                    *velocity = mu * *velocity + g / denom;
                    *p -= lr * *velocity;
                }
                None => *p -= lr * g / denom,
            }
        }

        Ok(())
    }

    fn export_state(&self) -> SlotState {
        self.state.clone()
    }

    fn import_state(&mut self, state: SlotState) -> Result<()> {
        self.state.replace_with(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_count_follows_the_options() {
        let count = |momentum, centered| {
            RmsProp::new(&[2], 0.99, 1e-8, 0., momentum, centered)
                .unwrap()
                .export_state()
                .slots[0]
                .len()
        };

        assert_eq!(count(0., false), 1);
        assert_eq!(count(0.9, false), 2);
        assert_eq!(count(0., true), 2);
        assert_eq!(count(0.9, true), 3);
    }

    #[test]
    fn first_step_normalizes_the_gradient() {
        let mut rmsprop = RmsProp::new(&[1], 0.75, 0., 0., 0., false).unwrap();
        let hyper = Hyper {
            lr: 1.,
            weight_decay: None,
        };
        let mut params = [0.];

        rmsprop.begin_step();
        rmsprop.update_params(0, hyper, &mut params, &[4.]).unwrap();

        // square_avg = 0.25 * 16 = 4, so the step is 4 / 2.
        assert_eq!(params, [-2.]);
    }
}
