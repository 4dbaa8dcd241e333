use std::collections::BTreeMap;

use serde::Serialize;

use super::ConfigValue;
use crate::error::{OptimErr, Result};

/// The keyword arguments left over after resolving a configuration.
///
/// Consumers take the keys they understand and call `finish`, any key left
/// behind is reported as an unexpected argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Kwargs(BTreeMap<String, ConfigValue>);

impl Kwargs {
    /// Creates an empty set of keyword arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a keyword argument, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.0.insert(key.into(), value);
    }

    /// Returns whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Removes and returns the raw value of `key`.
    pub fn take(&mut self, key: &str) -> Option<ConfigValue> {
        self.0.remove(key)
    }

    /// Removes `key` as a float.
    ///
    /// # Arguments
    /// * `key` - The keyword.
    /// * `default` - The value when `key` is absent.
    ///
    /// # Returns
    /// The value or a configuration error if it isn't numeric.
    pub fn take_f32(&mut self, key: &str, default: f32) -> Result<f32> {
        Ok(self.take_opt_f32(key)?.unwrap_or(default))
    }

    /// Removes `key` as a float if present.
    pub fn take_opt_f32(&mut self, key: &str) -> Result<Option<f32>> {
        self.take(key)
            .map(|value| {
                value
                    .as_f64()
                    .map(|v| v as f32)
                    .ok_or_else(|| Self::wrong_type(key, "number", &value))
            })
            .transpose()
    }

    /// Removes `key` as a non negative integer if present.
    pub fn take_opt_u64(&mut self, key: &str) -> Result<Option<u64>> {
        self.take(key)
            .map(|value| match value {
                ConfigValue::Int(i) if i >= 0 => Ok(i as u64),
                other => Err(Self::wrong_type(key, "non negative integer", &other)),
            })
            .transpose()
    }

    /// Removes `key` as a boolean.
    pub fn take_bool(&mut self, key: &str, default: bool) -> Result<bool> {
        match self.take(key) {
            None => Ok(default),
            Some(ConfigValue::Bool(b)) => Ok(b),
            Some(other) => Err(Self::wrong_type(key, "boolean", &other)),
        }
    }

    /// Removes `key` as a pair of floats, such as Adam's `betas`.
    pub fn take_pair(&mut self, key: &str, default: (f32, f32)) -> Result<(f32, f32)> {
        let Some(value) = self.take(key) else {
            return Ok(default);
        };

        match &value {
            ConfigValue::List(items) if items.len() == 2 => {
                match (items[0].as_f64(), items[1].as_f64()) {
                    (Some(a), Some(b)) => Ok((a as f32, b as f32)),
                    _ => Err(Self::wrong_type(key, "pair of numbers", &value)),
                }
            }
            _ => Err(Self::wrong_type(key, "pair of numbers", &value)),
        }
    }

    /// Consumes the arguments, failing if any of them wasn't taken.
    ///
    /// # Arguments
    /// * `owner` - Who received the arguments, used in the error message.
    pub fn finish(self, owner: &str) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }

        let keys: Vec<_> = self.0.into_keys().collect();
        Err(OptimErr::config(format!(
            "{owner} got unexpected keyword argument(s): {}",
            keys.join(", ")
        )))
    }

    fn wrong_type(key: &str, expected: &str, got: &ConfigValue) -> OptimErr {
        OptimErr::config(format!(
            "{key} must be a {expected}, got a {} ({got:?})",
            got.type_name()
        ))
    }
}

impl FromIterator<(String, ConfigValue)> for Kwargs {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
