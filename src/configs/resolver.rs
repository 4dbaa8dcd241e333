use std::{fs::File, io::BufReader, num::NonZeroUsize, path::Path};

use serde::Serialize;
use serde_json::Value;

use super::{ConfigValue, Kwargs};
use crate::{
    error::{OptimErr, Result},
    schedules::ScheduleConfig,
};

/// The raw optimizer configuration mapping, as read from a JSON document.
pub type RawConfig = serde_json::Map<String, Value>;

/// Zero weight decay routing for parameters whose names match any pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoDecay {
    #[serde(rename = "no_decay")]
    pub patterns: Vec<String>,
    pub weight_decay: f32,
}

/// The typed construction arguments of an optimizer.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub class: String,
    pub lr: ScheduleConfig,
    #[serde(flatten)]
    pub no_decay: Option<NoDecay>,
    pub update_frequency: NonZeroUsize,
    pub clip_norm: f32,
    #[serde(flatten)]
    pub kwargs: Kwargs,
}

impl ResolvedConfig {
    /// Renders the configuration as pretty, key sorted JSON for audit logs.
    pub fn to_pretty_json(&self) -> String {
        // Going through `Value` sorts the keys of flattened fields too.
        serde_json::to_value(self)
            .and_then(|value| serde_json::to_string_pretty(&value))
            .unwrap_or_else(|e| format!("<unprintable: {e}>"))
    }
}

/// Normalizes a `RawConfig` into a `ResolvedConfig`.
#[derive(Debug, Default)]
pub struct ConfigResolver;

impl ConfigResolver {
    /// Creates a new `ConfigResolver`.
    pub fn new() -> Self {
        Self
    }

    /// Resolves a raw configuration.
    ///
    /// # Arguments
    /// * `raw` - The raw configuration mapping, it's left untouched.
    ///
    /// # Returns
    /// The resolved configuration or a configuration error.
    pub fn resolve(&self, raw: &RawConfig) -> Result<ResolvedConfig> {
        let class = match raw.get("class") {
            Some(Value::String(class)) => class.clone(),
            Some(other) => {
                return Err(OptimErr::config(format!(
                    "class must be a string, got {other}"
                )));
            }
            None => return Err(OptimErr::config("missing required key `class`")),
        };

        let mut kwargs: Kwargs = raw
            .iter()
            .filter(|(key, _)| key.as_str() != "class")
            .map(|(key, value)| (key.clone(), ConfigValue::from_json(value)))
            .collect();

        let lr = self.resolve_lr(kwargs.take("lr"))?;
        let no_decay = self.resolve_no_decay(&mut kwargs)?;
        let update_frequency = self.resolve_update_frequency(kwargs.take("update_frequency"))?;
        let clip_norm = kwargs.take_f32("clip_norm", 0.)?;

        if !clip_norm.is_finite() || clip_norm < 0. {
            return Err(OptimErr::config(format!(
                "clip_norm must be a non negative number, got {clip_norm}"
            )));
        }

        Ok(ResolvedConfig {
            class,
            lr,
            no_decay,
            update_frequency,
            clip_norm,
            kwargs,
        })
    }

    fn resolve_lr(&self, lr: Option<ConfigValue>) -> Result<ScheduleConfig> {
        match lr {
            None => Err(OptimErr::config("missing required key `lr`")),
            Some(ConfigValue::Map(map)) => ScheduleConfig::from_map(map),
            Some(value) => match value.as_f64() {
                Some(rate) => Ok(ScheduleConfig::constant(rate)),
                None => Err(OptimErr::config(format!(
                    "lr must be a rate schedule mapping or a number, got a {}",
                    value.type_name()
                ))),
            },
        }
    }

    fn resolve_no_decay(&self, kwargs: &mut Kwargs) -> Result<Option<NoDecay>> {
        let Some(value) = kwargs.take("no_decay") else {
            return Ok(None);
        };

        let patterns = match value {
            ConfigValue::Str(pattern) => vec![pattern],
            ConfigValue::List(items) => items
                .into_iter()
                .map(|item| match item {
                    ConfigValue::Str(pattern) => Ok(pattern),
                    other => Err(OptimErr::config(format!(
                        "no_decay entries must be strings, got a {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<_>>()?,
            other => {
                return Err(OptimErr::config(format!(
                    "no_decay must be a list of strings, got a {}",
                    other.type_name()
                )));
            }
        };

        let weight_decay = kwargs
            .take_opt_f32("weight_decay")?
            .ok_or_else(|| OptimErr::config("no_decay is set but weight_decay is missing"))?;

        Ok(Some(NoDecay {
            patterns,
            weight_decay,
        }))
    }

    fn resolve_update_frequency(&self, value: Option<ConfigValue>) -> Result<NonZeroUsize> {
        match value {
            None => Ok(NonZeroUsize::MIN),
            Some(ConfigValue::Int(freq)) => usize::try_from(freq)
                .ok()
                .and_then(NonZeroUsize::new)
                .ok_or_else(|| {
                    OptimErr::config(format!("update_frequency must be at least 1, got {freq}"))
                }),
            Some(other) => Err(OptimErr::config(format!(
                "update_frequency must be an integer, got a {}",
                other.type_name()
            ))),
        }
    }
}

/// Reads a raw configuration from a JSON file.
///
/// # Arguments
/// * `path` - The path of a JSON document holding a single object.
///
/// # Returns
/// The raw configuration or an error if the file can't be read or isn't an object.
pub fn read_config(path: &Path) -> Result<RawConfig> {
    let file = File::open(path).map_err(OptimErr::Persistence)?;

    match serde_json::from_reader(BufReader::new(file))? {
        Value::Object(raw) => Ok(raw),
        other => Err(OptimErr::config(format!(
            "the configuration must be a JSON object, got {other}"
        ))),
    }
}
