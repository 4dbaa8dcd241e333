use super::Parameter;
use crate::configs::NoDecay;

/// A set of named parameters sharing the same optimizer hyperparameters.
///
/// Membership is fixed once the group is constructed, only the learning rate changes.
#[derive(Debug, Clone)]
pub struct ParameterGroup {
    params: Vec<(String, Parameter)>,
    weight_decay: Option<f32>,
    lr: f32,
}

impl ParameterGroup {
    /// Creates a new `ParameterGroup`.
    ///
    /// # Arguments
    /// * `params` - The named parameters of this group.
    /// * `weight_decay` - An explicit weight decay, or `None` to use the optimizer's own.
    pub fn new(params: Vec<(String, Parameter)>, weight_decay: Option<f32>) -> Self {
        Self {
            params,
            weight_decay,
            lr: 0.,
        }
    }

    pub fn params(&self) -> &[(String, Parameter)] {
        &self.params
    }

    /// Iterates over the parameter handles without their names.
    pub fn handles(&self) -> impl Iterator<Item = &Parameter> + Clone {
        self.params.iter().map(|(_, param)| param)
    }

    pub fn weight_decay(&self) -> Option<f32> {
        self.weight_decay
    }

    /// The learning rate used for the next update of this group.
    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub(crate) fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    /// The sizes of every parameter, in order.
    pub fn sizes(&self) -> Vec<usize> {
        self.handles().map(Parameter::len).collect()
    }
}

/// Splits a model's parameters into optimizer groups.
///
/// Without `no_decay` all parameters form one group that inherits the optimizer's weight decay.
/// Otherwise the first group holds every parameter whose name matches none of the patterns,
/// with the configured weight decay, and the second one the matching parameters with no decay.
///
/// # Arguments
/// * `named` - The model's named parameters.
/// * `no_decay` - The zero weight decay patterns, if any.
///
/// # Returns
/// The parameter groups, which together hold every parameter exactly once.
pub fn partition(
    named: Vec<(String, Parameter)>,
    no_decay: Option<&NoDecay>,
) -> Vec<ParameterGroup> {
    let Some(no_decay) = no_decay else {
        return vec![ParameterGroup::new(named, None)];
    };

    let (excluded, decayed): (Vec<_>, Vec<_>) = named.into_iter().partition(|(name, _)| {
        no_decay
            .patterns
            .iter()
            .any(|pattern| name.contains(pattern.as_str()))
    });

    vec![
        ParameterGroup::new(decayed, Some(no_decay.weight_decay)),
        ParameterGroup::new(excluded, Some(0.)),
    ]
}
