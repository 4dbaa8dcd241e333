use crate::{
    distributed::{Collective, ROOT_RANK},
    precision::LossScaleConfig,
};

/// The execution environment an optimizer is built for.
///
/// Replaces any process wide state: the worker count, the collective runtime and the
/// precision flags are all passed explicitly.
pub struct Environment {
    collective: Option<Box<dyn Collective>>,
    fp16_compression: bool,
    loss_scale: LossScaleConfig,
}

impl Environment {
    /// A single worker environment, no collective calls are ever made.
    pub fn local() -> Self {
        Self {
            collective: None,
            fp16_compression: false,
            loss_scale: LossScaleConfig::default(),
        }
    }

    /// An environment taking part in a distributed run through `collective`.
    pub fn distributed(collective: impl Collective + 'static) -> Self {
        Self {
            collective: Some(Box::new(collective)),
            ..Self::local()
        }
    }

    /// Requests gradients to be reduced in half precision.
    pub fn with_fp16_compression(mut self, enabled: bool) -> Self {
        self.fp16_compression = enabled;
        self
    }

    /// Overrides the dynamic loss scaling used by the mixed precision rewrite.
    pub fn with_loss_scale(mut self, config: LossScaleConfig) -> Self {
        self.loss_scale = config;
        self
    }

    pub fn world_size(&self) -> usize {
        self.collective.as_ref().map_or(1, |c| c.world_size())
    }

    pub fn rank(&self) -> usize {
        self.collective.as_ref().map_or(ROOT_RANK, |c| c.rank())
    }

    pub fn fp16_compression(&self) -> bool {
        self.fp16_compression
    }

    pub fn loss_scale(&self) -> LossScaleConfig {
        self.loss_scale
    }

    pub(crate) fn take_collective(&mut self) -> Option<Box<dyn Collective>> {
        self.collective.take()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::local()
    }
}
