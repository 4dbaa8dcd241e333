use std::num::NonZeroUsize;

use async_trait::async_trait;
use log::{debug, info};

use super::{Collective, Compression};
use crate::{
    error::Result,
    optimization::{OptimizerStage, StageState},
    parameters::{Parameter, ParameterGroup, gather, scatter},
};

/// Averages gradients across workers before the wrapped stage updates the parameters.
///
/// A reduction happens every `update_frequency` backward passes, and on `step` when
/// gradients changed since the last one, so each update sees reduced gradients exactly once.
pub struct DistributedStage {
    inner: Box<dyn OptimizerStage>,
    collective: Box<dyn Collective>,
    compression: Compression,
    update_frequency: NonZeroUsize,
    passes: usize,
    reduced: bool,
}

impl DistributedStage {
    /// Wraps `inner` and synchronizes the initial state of every worker.
    ///
    /// The root's parameter values and optimizer state are broadcast to every other rank,
    /// every rank must call this at the same point.
    ///
    /// # Arguments
    /// * `inner` - The stage to wrap.
    /// * `collective` - The collective runtime of this worker.
    /// * `compression` - How gradients travel during reductions.
    /// * `update_frequency` - Backward passes per reduction.
    ///
    /// # Returns
    /// The wrapped stage or an error if a broadcast fails.
    pub async fn wrap(
        inner: Box<dyn OptimizerStage>,
        collective: Box<dyn Collective>,
        compression: Compression,
        update_frequency: NonZeroUsize,
    ) -> Result<Self> {
        let mut stage = Self {
            inner,
            collective,
            compression,
            update_frequency,
            passes: 0,
            reduced: false,
        };

        stage.broadcast_parameters().await?;
        stage.broadcast_optimizer_state().await?;

        info!(
            rank = stage.collective.rank(),
            world_size = stage.collective.world_size();
            "optimizer wrapped for distributed execution, compression={compression:?} update_frequency={update_frequency}"
        );

        Ok(stage)
    }

    fn params(&self) -> impl Iterator<Item = &Parameter> + Clone {
        self.inner.groups().iter().flat_map(|group| group.handles())
    }

    async fn broadcast_parameters(&mut self) -> Result<()> {
        let mut flat = gather(self.params(), |t| t.data.as_slice());
        self.collective.broadcast(&mut flat).await?;
        scatter(self.params(), &flat, |t| &mut t.data)
    }

    async fn broadcast_optimizer_state(&mut self) -> Result<()> {
        let mut bytes = if self.collective.is_root() {
            serde_json::to_vec(&self.inner.state_dict())?
        } else {
            Vec::new()
        };

        self.collective.broadcast_bytes(&mut bytes).await?;

        if !self.collective.is_root() {
            let state: StageState = serde_json::from_slice(&bytes)?;
            self.inner.load_state_dict(state)?;
        }

        Ok(())
    }

    async fn reduce_gradients(&mut self) -> Result<()> {
        let mut flat = gather(self.params(), |t| t.grad.as_slice());
        self.collective.all_reduce(&mut flat, self.compression).await?;
        scatter(self.params(), &flat, |t| &mut t.grad)?;

        debug!(passes = self.passes; "gradients reduced");
        self.passes = 0;
        self.reduced = true;
        Ok(())
    }
}

#[async_trait]
impl OptimizerStage for DistributedStage {
    async fn backward_pass(&mut self) -> Result<()> {
        self.inner.backward_pass().await?;
        self.passes += 1;

        if self.passes == self.update_frequency.get() {
            self.reduce_gradients().await?;
        }

        Ok(())
    }

    async fn step(&mut self) -> Result<()> {
        if self.passes > 0 || !self.reduced {
            self.reduce_gradients().await?;
        }

        self.reduced = false;
        self.inner.step().await
    }

    async fn agree_on_flags(&mut self, flags: &mut [f32]) -> Result<()> {
        self.inner.agree_on_flags(flags).await?;
        self.collective.all_reduce(flags, Compression::None).await?;

        debug!("flags agreed: {flags:?}");
        Ok(())
    }

    fn zero_grad(&mut self) {
        self.inner.zero_grad();
        self.passes = 0;
        self.reduced = false;
    }

    fn set_lr(&mut self, lr: f32) {
        self.inner.set_lr(lr);
    }

    fn scale_loss(&mut self, loss: f32, loss_id: usize) -> f32 {
        self.inner.scale_loss(loss, loss_id)
    }

    fn groups(&self) -> &[ParameterGroup] {
        self.inner.groups()
    }

    fn state_dict(&self) -> StageState {
        self.inner.state_dict()
    }

    fn load_state_dict(&mut self, state: StageState) -> Result<()> {
        self.inner.load_state_dict(state)
    }
}
