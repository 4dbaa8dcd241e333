use super::{Hyper, Optimizer, SlotState};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
    parameters::check_len,
};

const FIRST_MOMENT: usize = 0;
const SECOND_MOMENT: usize = 1;
const MAX_SECOND_MOMENT: usize = 2;

/// Adam, and AdamW when weight decay is decoupled from the gradient.
#[derive(Debug)]
pub struct Adam {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    amsgrad: bool,
    decoupled: bool,
    state: SlotState,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `sizes` - The size of every parameter this instance updates.
    /// * `betas` - The decay rates of the first and second moment estimates.
    /// * `epsilon` - Added to the denominator for numerical stability.
    /// * `weight_decay` - The default weight decay for groups without their own.
    /// * `amsgrad` - Whether to use the maximum of past second moments.
    /// * `decoupled` - Whether weight decay shrinks the weights directly (AdamW)
    ///   instead of being added to the gradient.
    ///
    /// # Returns
    /// A new `Adam` instance or an error if a beta is outside `[0, 1)`.
    pub fn new(
        sizes: &[usize],
        (beta1, beta2): (f32, f32),
        epsilon: f32,
        weight_decay: f32,
        amsgrad: bool,
        decoupled: bool,
    ) -> Result<Self> {
        if !(0. ..1.).contains(&beta1) || !(0. ..1.).contains(&beta2) {
            return Err(OptimErr::config(format!(
                "betas must be within [0, 1), got ({beta1}, {beta2})"
            )));
        }

        if epsilon < 0. {
            return Err(OptimErr::config(format!("invalid epsilon {epsilon}")));
        }

        let per_param = if amsgrad { 3 } else { 2 };

        Ok(Self {
            beta1,
            beta2,
            epsilon,
            weight_decay,
            amsgrad,
            decoupled,
            state: SlotState::zeroed(sizes, per_param, 0.),
        })
    }

    pub(super) fn from_kwargs(
        sizes: &[usize],
        kwargs: &mut Kwargs,
        decoupled: bool,
    ) -> Result<Self> {
        let default_decay = if decoupled { 0.01 } else { 0. };

        let betas = kwargs.take_pair("betas", (0.9, 0.999))?;
        let epsilon = kwargs.take_f32("eps", 1e-8)?;
        let weight_decay = kwargs.take_f32("weight_decay", default_decay)?;
        let amsgrad = kwargs.take_bool("amsgrad", false)?;
        Self::new(sizes, betas, epsilon, weight_decay, amsgrad, decoupled)
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        if self.decoupled { "AdamW" } else { "Adam" }
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
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            amsgrad,
            decoupled,
            ..
        } = *self;

        let lr = hyper.lr;
        let wd = hyper.weight_decay.unwrap_or(self.weight_decay);

        let t = self.state.updates.min(i32::MAX as u64) as i32;
        let bc1 = 1. - b1.powi(t);
        let bc2_sqrt = (1. - b2.powi(t)).sqrt();
        let step_size = lr / bc1;

        let buffers = self.state.buffers_mut(slot, params.len())?;

        for (i, p) in params.iter_mut().enumerate() {
            let mut g = grad[i];

            if decoupled {
                *p *= 1. - lr * wd;
            } else {
                g += wd * *p;
            }

            let m = &mut buffers[FIRST_MOMENT][i];
            *m = b1 * *m + (1. - b1) * g;
            let m = *m;

            let v = &mut buffers[SECOND_MOMENT][i];
            *v = b2 * *v + (1. - b2) * g * g;
            let mut v = *v;

            if amsgrad {
                let v_max = &mut buffers[MAX_SECOND_MOMENT][i];
                *v_max = (*v_max).max(v);
                v = *v_max;
            }

            *p -= step_size * m / (v.sqrt() / bc2_sqrt + eps);
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
