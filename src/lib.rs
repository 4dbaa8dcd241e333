pub mod builder;
pub mod configs;
pub mod distributed;
pub mod environment;
pub mod error;
pub mod handle;
pub mod optimization;
pub mod parameters;
pub mod persistence;
pub mod precision;
pub mod schedules;

pub use builder::{OptimizerBuilder, build_optimizer};
pub use configs::{RawConfig, read_config};
pub use environment::Environment;
pub use error::{OptimErr, Result};
pub use handle::{OptimizerHandle, StateDict};
pub use parameters::{Model, Parameter};
pub use persistence::{JsonStateStore, StateStore};
pub use precision::PreparedModel;
