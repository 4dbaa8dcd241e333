mod model;
mod scaler;
mod stage;

pub use model::{MixedPrecisionModel, PreparedModel};
pub use scaler::{LossScaleConfig, LossScaler, ScalerState};
pub use stage::MixedPrecisionStage;
