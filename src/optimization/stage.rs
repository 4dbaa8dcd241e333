use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GroupState, Hyper, Optimizer, OptimizerState};
use crate::{
    error::{OptimErr, Result},
    parameters::{ParameterGroup, Tensor},
    precision::ScalerState,
};

/// The state of a whole stage chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub optimizer: OptimizerState,
    /// Only present when mixed precision is enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loss_scalers: Vec<ScalerState>,
}

/// A link in the optimizer chain: the base optimizer or a stage wrapping another one.
#[async_trait]
pub trait OptimizerStage: Send {
    /// Notifies the stage that one backward pass over a micro batch finished.
    async fn backward_pass(&mut self) -> Result<()> {
        Ok(())
    }

    /// Applies one update to every parameter.
    async fn step(&mut self) -> Result<()>;

    /// Combines per worker flags, entries above zero afterwards were raised by at least
    /// one worker. A single worker keeps its own flags.
    ///
    /// Every worker must call this the same amount of times.
    async fn agree_on_flags(&mut self, _flags: &mut [f32]) -> Result<()> {
        Ok(())
    }

    /// Clears the gradients of every parameter.
    fn zero_grad(&mut self);

    /// Sets the learning rate of every group.
    fn set_lr(&mut self, lr: f32);

    /// Scales a loss before its backward pass.
    fn scale_loss(&mut self, loss: f32, _loss_id: usize) -> f32 {
        loss
    }

    fn groups(&self) -> &[ParameterGroup];

    fn state_dict(&self) -> StageState;

    fn load_state_dict(&mut self, state: StageState) -> Result<()>;
}

/// The innermost stage, applying the optimization algorithm to every group.
#[derive(Debug)]
pub struct BaseStage {
    optimizer: Box<dyn Optimizer>,
    groups: Vec<ParameterGroup>,
    clip_norm: f32,
}

impl BaseStage {
    /// Creates a new `BaseStage`.
    ///
    /// # Arguments
    /// * `optimizer` - The algorithm, built for the sizes of `groups` in order.
    /// * `groups` - The parameter groups.
    /// * `lr` - The initial learning rate of every group.
    /// * `clip_norm` - The maximum global gradient norm, `0` disables clipping.
    pub fn new(
        optimizer: Box<dyn Optimizer>,
        mut groups: Vec<ParameterGroup>,
        lr: f32,
        clip_norm: f32,
    ) -> Self {
        groups.iter_mut().for_each(|group| group.set_lr(lr));

        Self {
            optimizer,
            groups,
            clip_norm,
        }
    }

    /// Rescales every gradient so their global L2 norm is at most `clip_norm`.
    fn clip_grad_norm(&self) {
        let params = || self.groups.iter().flat_map(|group| group.handles());

        let norm = params()
            .map(|param| param.lock().grad.iter().map(|g| g * g).sum::<f32>())
            .sum::<f32>()
            .sqrt();

        if norm <= self.clip_norm {
            return;
        }

        let coef = self.clip_norm / (norm + 1e-6);
        for param in params() {
            param.lock().grad.iter_mut().for_each(|g| *g *= coef);
        }
    }
}

#[async_trait]
impl OptimizerStage for BaseStage {
    async fn step(&mut self) -> Result<()> {
        if self.clip_norm > 0. {
            self.clip_grad_norm();
        }

        self.optimizer.begin_step();

        let mut slot = 0;
        for group in &self.groups {
            let hyper = Hyper {
                lr: group.lr(),
                weight_decay: group.weight_decay(),
            };

            for param in group.handles() {
                let mut tensor = param.lock();
                let Tensor { data, grad } = &mut *tensor;
                self.optimizer
                    .update_params(slot, hyper, data.as_mut_slice(), grad.as_slice())?;
                slot += 1;
            }
        }

        Ok(())
    }

    fn zero_grad(&mut self) {
        self.groups
            .iter()
            .flat_map(|group| group.handles())
            .for_each(|param| param.zero_grad());
    }

    fn set_lr(&mut self, lr: f32) {
        self.groups.iter_mut().for_each(|group| group.set_lr(lr));
    }

    fn groups(&self) -> &[ParameterGroup] {
        &self.groups
    }

    fn state_dict(&self) -> StageState {
        StageState {
            optimizer: OptimizerState {
                algorithm: self.optimizer.name().to_string(),
                groups: self.groups.iter().map(GroupState::from).collect(),
                buffers: self.optimizer.export_state(),
            },
            loss_scalers: Vec::new(),
        }
    }

    fn load_state_dict(&mut self, state: StageState) -> Result<()> {
        if !state.loss_scalers.is_empty() {
            return Err(OptimErr::resume(
                "state holds loss scalers but mixed precision is disabled",
            ));
        }

        let current = self.state_dict().optimizer;
        state.optimizer.check_layout(&current)?;
        self.optimizer.import_state(state.optimizer.buffers)
    }
}
