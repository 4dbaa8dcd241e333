mod group;
mod parameter;

pub use group::{ParameterGroup, partition};
pub use parameter::{Model, Parameter, Tensor};
pub(crate) use parameter::{check_len, gather, scatter};
