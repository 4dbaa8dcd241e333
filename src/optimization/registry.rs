use std::{collections::HashMap, fmt};

use super::{Adagrad, Adam, Optimizer, RmsProp, Sgd};
use crate::{
    configs::Kwargs,
    error::{OptimErr, Result},
};

/// Constructs an optimizer for parameters of the given sizes, taking the keyword
/// arguments it understands.
pub type OptimizerCtor =
    Box<dyn Fn(&[usize], &mut Kwargs) -> Result<Box<dyn Optimizer>> + Send + Sync>;

/// The optimization algorithms available without registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Sgd,
    Adam,
    AdamW,
    Adagrad,
    RmsProp,
}

impl Ecosystem {
    const ALL: [Ecosystem; 5] = [
        Self::Sgd,
        Self::Adam,
        Self::AdamW,
        Self::Adagrad,
        Self::RmsProp,
    ];

    /// The canonical name of the algorithm.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sgd => "SGD",
            Self::Adam => "Adam",
            Self::AdamW => "AdamW",
            Self::Adagrad => "Adagrad",
            Self::RmsProp => "RMSprop",
        }
    }

    /// Looks up an algorithm by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    fn instantiate(self, sizes: &[usize], kwargs: &mut Kwargs) -> Result<Box<dyn Optimizer>> {
        let optimizer: Box<dyn Optimizer> = match self {
            Self::Sgd => Box::new(Sgd::from_kwargs(sizes, kwargs)?),
            Self::Adam => Box::new(Adam::from_kwargs(sizes, kwargs, false)?),
            Self::AdamW => Box::new(Adam::from_kwargs(sizes, kwargs, true)?),
            Self::Adagrad => Box::new(Adagrad::from_kwargs(sizes, kwargs)?),
            Self::RmsProp => Box::new(RmsProp::from_kwargs(sizes, kwargs)?),
        };

        Ok(optimizer)
    }
}

/// Where an optimizer class resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerKind {
    /// A registered implementation, by its lowercase name.
    Custom(String),
    Ecosystem(Ecosystem),
}

/// Custom optimizer implementations, consulted before the built-in algorithms.
#[derive(Default)]
pub struct OptimizerRegistry {
    ctors: HashMap<String, OptimizerCtor>,
}

impl fmt::Debug for OptimizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.ctors.keys().collect();
        names.sort();
        f.debug_struct("OptimizerRegistry")
            .field("ctors", &names)
            .finish()
    }
}

impl OptimizerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom optimizer under `name`, matched case insensitively.
    ///
    /// # Arguments
    /// * `name` - The optimizer class name.
    /// * `ctor` - Builds the optimizer from the parameter sizes and keyword arguments.
    ///
    /// # Returns
    /// A configuration error if `name` is already registered.
    pub fn register<F>(&mut self, name: &str, ctor: F) -> Result<()>
    where
        F: Fn(&[usize], &mut Kwargs) -> Result<Box<dyn Optimizer>> + Send + Sync + 'static,
    {
        let key = name.to_lowercase();

        if self.ctors.contains_key(&key) {
            return Err(OptimErr::config(format!(
                "an optimizer named {name:?} is already registered"
            )));
        }

        self.ctors.insert(key, Box::new(ctor));
        Ok(())
    }

    /// Resolves an optimizer class, custom implementations first.
    ///
    /// # Returns
    /// The resolved kind or `UnknownOptimizer` if neither tier knows `class`.
    pub fn resolve(&self, class: &str) -> Result<OptimizerKind> {
        let key = class.to_lowercase();

        if self.ctors.contains_key(&key) {
            return Ok(OptimizerKind::Custom(key));
        }

        Ecosystem::from_name(class)
            .map(OptimizerKind::Ecosystem)
            .ok_or_else(|| OptimErr::UnknownOptimizer {
                name: class.to_string(),
            })
    }

    /// Constructs the optimizer of a resolved kind.
    ///
    /// Every keyword argument must be consumed by the constructor.
    ///
    /// # Arguments
    /// * `kind` - A kind returned by `resolve`.
    /// * `sizes` - The size of every parameter across all groups, in order.
    /// * `kwargs` - The optimizer's keyword arguments.
    pub fn instantiate(
        &self,
        kind: &OptimizerKind,
        sizes: &[usize],
        mut kwargs: Kwargs,
    ) -> Result<Box<dyn Optimizer>> {
        let (optimizer, owner) = match kind {
            OptimizerKind::Custom(name) => {
                let ctor = self.ctors.get(name).ok_or_else(|| OptimErr::UnknownOptimizer {
                    name: name.clone(),
                })?;

                (ctor(sizes, &mut kwargs)?, name.as_str())
            }
            OptimizerKind::Ecosystem(kind) => (kind.instantiate(sizes, &mut kwargs)?, kind.name()),
        };

        kwargs.finish(owner)?;
        Ok(optimizer)
    }
}
