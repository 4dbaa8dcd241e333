mod adagrad;
mod adam;
mod optimizer;
mod registry;
mod rmsprop;
mod sgd;
mod stage;
mod state;

pub use adagrad::Adagrad;
pub use adam::Adam;
pub use optimizer::{Hyper, Optimizer};
pub use registry::{Ecosystem, OptimizerCtor, OptimizerKind, OptimizerRegistry};
pub use rmsprop::RmsProp;
pub use sgd::Sgd;
pub use stage::{BaseStage, OptimizerStage, StageState};
pub use state::{GroupState, OptimizerState, SlotState};
