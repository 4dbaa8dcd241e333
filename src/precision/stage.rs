use std::num::NonZeroUsize;

use async_trait::async_trait;
use half::f16;
use log::{debug, warn};

use super::{LossScaleConfig, LossScaler};
use crate::{
    error::{OptimErr, Result},
    optimization::{OptimizerStage, StageState},
    parameters::{Parameter, ParameterGroup, gather, scatter},
};

/// Dynamic loss scaling around a full precision stage.
///
/// Each backward pass is checked for half precision overflow and folded, unscaled, into
/// full precision master gradients. An update is skipped when any of them overflowed.
pub struct MixedPrecisionStage {
    inner: Box<dyn OptimizerStage>,
    scalers: Vec<LossScaler>,
    master_grads: Vec<f32>,
    pending: Option<usize>,
}

impl MixedPrecisionStage {
    /// Creates a new `MixedPrecisionStage`.
    ///
    /// # Arguments
    /// * `inner` - The stage updating the master weights.
    /// * `num_losses` - The amount of loss terms, each one gets its own scaler.
    /// * `config` - The loss scaling configuration shared by every scaler.
    pub fn new(
        inner: Box<dyn OptimizerStage>,
        num_losses: NonZeroUsize,
        config: LossScaleConfig,
    ) -> Self {
        let len: usize = inner
            .groups()
            .iter()
            .flat_map(|group| group.handles())
            .map(Parameter::len)
            .sum();

        Self {
            inner,
            scalers: vec![LossScaler::new(config); num_losses.get()],
            master_grads: vec![0.; len],
            pending: None,
        }
    }

    /// The current scale of every loss term.
    pub fn scales(&self) -> Vec<f32> {
        self.scalers.iter().map(LossScaler::scale).collect()
    }

    fn params(&self) -> impl Iterator<Item = &Parameter> + Clone {
        self.inner.groups().iter().flat_map(|group| group.handles())
    }

    /// Moves the gradients of the last backward pass into the master gradients.
    fn fold(&mut self, loss_id: usize) {
        let grads = gather(self.params(), |t| t.grad.as_slice());
        self.params().for_each(Parameter::zero_grad);

        let scaler = &mut self.scalers[loss_id];
        let inv_scale = 1. / scaler.scale();
        let mut overflow = false;

        for (master, g) in self.master_grads.iter_mut().zip(grads) {
            let half = f16::from_f32(g);
            overflow |= !half.is_finite();
            *master += half.to_f32() * inv_scale;
        }

        if overflow {
            debug!(loss_id = loss_id; "half precision gradient overflow");
            scaler.record_overflow();
        }
    }
}

#[async_trait]
impl OptimizerStage for MixedPrecisionStage {
    async fn backward_pass(&mut self) -> Result<()> {
        let loss_id = self.pending.take().unwrap_or_default();
        self.fold(loss_id);
        Ok(())
    }

    async fn step(&mut self) -> Result<()> {
        if let Some(loss_id) = self.pending.take() {
            self.fold(loss_id);
        }

        // Workers skip or apply the update together.
        let mut flags: Vec<f32> = self
            .scalers
            .iter()
            .map(|scaler| if scaler.overflowed() { 1. } else { 0. })
            .collect();

        self.inner.agree_on_flags(&mut flags).await?;

        for (scaler, flag) in self.scalers.iter_mut().zip(flags) {
            if flag > 0. {
                scaler.record_overflow();
            }
        }

        let skip = self.scalers.iter().any(LossScaler::overflowed);
        self.scalers
            .iter_mut()
            .for_each(|scaler| scaler.end_window(!skip));

        if skip {
            warn!(
                "gradient overflow, skipping the update, loss scales are now {:?}",
                self.scales()
            );
            self.master_grads.fill(0.);
            return Ok(());
        }

        scatter(self.params(), &self.master_grads, |t| &mut t.grad)?;
        self.master_grads.fill(0.);
        self.inner.step().await
    }

    async fn agree_on_flags(&mut self, flags: &mut [f32]) -> Result<()> {
        self.inner.agree_on_flags(flags).await
    }

    fn zero_grad(&mut self) {
        self.inner.zero_grad();
        self.master_grads.fill(0.);
        self.pending = None;
        self.scalers.iter_mut().for_each(LossScaler::reset_window);
    }

    fn set_lr(&mut self, lr: f32) {
        self.inner.set_lr(lr);
    }

    fn scale_loss(&mut self, loss: f32, loss_id: usize) -> f32 {
        let loss_id = loss_id % self.scalers.len();
        self.pending = Some(loss_id);
        self.scalers[loss_id].scale_loss(loss)
    }

    fn groups(&self) -> &[ParameterGroup] {
        self.inner.groups()
    }

    fn state_dict(&self) -> StageState {
        StageState {
            loss_scalers: self.scalers.iter().map(LossScaler::state).collect(),
            ..self.inner.state_dict()
        }
    }

    fn load_state_dict(&mut self, state: StageState) -> Result<()> {
        let StageState {
            optimizer,
            loss_scalers,
        } = state;

        if loss_scalers.len() != self.scalers.len() {
            return Err(OptimErr::resume(format!(
                "state has {} loss scalers, expected {}",
                loss_scalers.len(),
                self.scalers.len()
            )));
        }

        self.inner.load_state_dict(StageState {
            optimizer,
            loss_scalers: Vec::new(),
        })?;

        self.scalers
            .iter_mut()
            .zip(loss_scalers)
            .for_each(|(scaler, state)| scaler.load_state(state));

        Ok(())
    }
}
