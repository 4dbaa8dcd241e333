use log::info;

use crate::{
    configs::{ConfigResolver, RawConfig},
    distributed::{Compression, DistributedStage},
    environment::Environment,
    error::{OptimErr, Result},
    handle::OptimizerHandle,
    optimization::{BaseStage, OptimizerRegistry, OptimizerStage},
    parameters::{Model, partition},
    precision::{MixedPrecisionModel, MixedPrecisionStage, PreparedModel},
};

/// Builds optimizer handles from raw configurations.
///
/// Construction either completes or fails before anything observable happened: the
/// configuration, the optimizer class and the precision flags are validated before the
/// first object is built or the first collective call is made.
#[derive(Debug, Default)]
pub struct OptimizerBuilder {
    registry: OptimizerRegistry,
}

impl OptimizerBuilder {
    /// Creates a new `OptimizerBuilder` knowing only the built-in algorithms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `OptimizerBuilder` consulting `registry` before the built-in algorithms.
    pub fn with_registry(registry: OptimizerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry_mut(&mut self) -> &mut OptimizerRegistry {
        &mut self.registry
    }

    /// Builds the optimizer for `model`.
    ///
    /// # Arguments
    /// * `model` - The model to optimize, its parameters are shared with the optimizer.
    /// * `raw` - The optimizer configuration.
    /// * `env` - The execution environment.
    /// * `enable_mixed_precision` - Whether to apply the mixed precision rewrite.
    ///
    /// # Returns
    /// The possibly rewritten model and the optimizer handle.
    pub async fn build<M: Model + Send>(
        &self,
        model: M,
        raw: &RawConfig,
        mut env: Environment,
        enable_mixed_precision: bool,
    ) -> Result<(PreparedModel<M>, OptimizerHandle)> {
        let config = ConfigResolver::new().resolve(raw)?;

        let world_size = env.world_size();
        if world_size > 1 && env.fp16_compression() && enable_mixed_precision {
            return Err(OptimErr::PrecisionConflict);
        }

        let kind = self.registry.resolve(&config.class)?;

        info!("building optimizer from config {}", config.to_pretty_json());

        let scheduler = config.lr.build()?;
        let groups = partition(model.named_parameters(), config.no_decay.as_ref());

        if groups.iter().all(|group| group.params().is_empty()) {
            return Err(OptimErr::config("the model has no parameters to optimize"));
        }

        let sizes: Vec<_> = groups.iter().flat_map(|group| group.sizes()).collect();
        let optimizer = self.registry.instantiate(&kind, &sizes, config.kwargs)?;
        let update_frequency = config.update_frequency;

        let mut stage: Box<dyn OptimizerStage> = Box::new(BaseStage::new(
            optimizer,
            groups,
            scheduler.rate(),
            config.clip_norm,
        ));

        if let Some(collective) = env.take_collective().filter(|_| world_size > 1) {
            let compression = if env.fp16_compression() {
                Compression::Fp16
            } else {
                Compression::None
            };

            stage = Box::new(
                DistributedStage::wrap(stage, collective, compression, update_frequency).await?,
            );
        }

        let model = if enable_mixed_precision {
            info!("applying the mixed precision rewrite with {update_frequency} loss scaler(s)");
            stage = Box::new(MixedPrecisionStage::new(
                stage,
                update_frequency,
                env.loss_scale(),
            ));

            PreparedModel::Mixed(MixedPrecisionModel::new(model))
        } else {
            PreparedModel::Full(model)
        };

        Ok((model, OptimizerHandle::new(stage, scheduler, update_frequency)))
    }
}

/// Builds an optimizer for `model` with the built-in algorithms only.
///
/// See `OptimizerBuilder::build`.
pub async fn build_optimizer<M: Model + Send>(
    model: M,
    raw: &RawConfig,
    env: Environment,
    enable_mixed_precision: bool,
) -> Result<(PreparedModel<M>, OptimizerHandle)> {
    OptimizerBuilder::new()
        .build(model, raw, env, enable_mixed_precision)
        .await
}
