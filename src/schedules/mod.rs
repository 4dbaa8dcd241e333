mod constant;
mod cosine;
mod inverse_sqrt;
mod linear_warmup;
mod noam;
mod scheduler;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use serde::Serialize;

pub use constant::Constant;
pub use cosine::Cosine;
pub use inverse_sqrt::InverseSqrt;
pub use linear_warmup::LinearWarmup;
pub use noam::Noam;
pub use scheduler::{RateSchedule, Scheduler};

use crate::{
    configs::{ConfigValue, Kwargs},
    error::{OptimErr, Result},
};

/// The unbuilt configuration of a learning rate schedule, the `lr` entry of an
/// optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleConfig {
    class: String,
    #[serde(flatten)]
    params: Kwargs,
}

impl ScheduleConfig {
    /// Creates the configuration of a constant schedule.
    ///
    /// # Arguments
    /// * `rate` - The learning rate for every step.
    pub fn constant(rate: f64) -> Self {
        let mut params = Kwargs::new();
        params.insert("rate", ConfigValue::Float(rate));

        Self {
            class: "constant".to_string(),
            params,
        }
    }

    /// Creates a configuration from a nested mapping with a `class` key.
    ///
    /// # Arguments
    /// * `map` - The mapping found under `lr`.
    ///
    /// # Returns
    /// The configuration or an error if `class` is missing.
    pub fn from_map(mut map: BTreeMap<String, ConfigValue>) -> Result<Self> {
        let class = match map.remove("class") {
            Some(ConfigValue::Str(class)) => class,
            Some(other) => {
                return Err(OptimErr::config(format!(
                    "lr.class must be a string, got a {}",
                    other.type_name()
                )));
            }
            None => return Err(OptimErr::config("missing required key `lr.class`")),
        };

        Ok(Self {
            class,
            params: map.into_iter().collect(),
        })
    }

    /// The schedule's class name as configured.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Builds the configured policy into a `Scheduler` positioned at step zero.
    ///
    /// # Returns
    /// A new scheduler or a configuration error for unknown classes and invalid parameters.
    pub fn build(self) -> Result<Scheduler> {
        let Self { class, mut params } = self;

        let policy: Box<dyn RateSchedule> = match class.to_lowercase().as_str() {
            "constant" => Box::new(Constant::from_kwargs(&mut params)?),
            "linear_warmup" | "linear" => Box::new(LinearWarmup::from_kwargs(&mut params)?),
            "cosine" => Box::new(Cosine::from_kwargs(&mut params)?),
            "inverse_square_root" | "inverse_sqrt" => {
                Box::new(InverseSqrt::from_kwargs(&mut params)?)
            }
            "noam" => Box::new(Noam::from_kwargs(&mut params)?),
            _ => {
                return Err(OptimErr::config(format!(
                    "unknown rate schedule class {class:?}"
                )));
            }
        };

        params.finish(&format!("{class} rate schedule"))?;
        Ok(Scheduler::new(policy))
    }
}

/// Takes a required, finite and non negative rate-like parameter.
fn required_rate(params: &mut Kwargs, key: &str) -> Result<f64> {
    let value = params
        .take_opt_f32(key)?
        .ok_or_else(|| OptimErr::config(format!("rate schedule requires `{key}`")))?;

    check_rate(key, value)
}

fn check_rate(key: &str, value: f32) -> Result<f64> {
    if !value.is_finite() || value < 0. {
        return Err(OptimErr::config(format!(
            "{key} must be a non negative number, got {value}"
        )));
    }

    Ok(value as f64)
}

/// Takes a required amount of steps that must be at least one.
fn required_steps(params: &mut Kwargs, key: &str) -> Result<u64> {
    match params.take_opt_u64(key)? {
        Some(steps) if steps > 0 => Ok(steps),
        Some(_) => Err(OptimErr::config(format!("{key} must be at least 1"))),
        None => Err(OptimErr::config(format!("rate schedule requires `{key}`"))),
    }
}
