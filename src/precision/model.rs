use half::f16;

use crate::parameters::{Model, Parameter};

/// A model rewritten for mixed precision training.
///
/// The wrapped parameters stay the full precision master weights, the forward pass reads
/// the half precision working copies from `half_weights`.
#[derive(Debug, Clone)]
pub struct MixedPrecisionModel<M> {
    model: M,
}

impl<M: Model> MixedPrecisionModel<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn inner(&self) -> &M {
        &self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }

    /// Rounds the current master weights to half precision.
    pub fn half_weights(&self) -> Vec<(String, Vec<f16>)> {
        self.model
            .named_parameters()
            .into_iter()
            .map(|(name, param)| {
                let half = param.lock().data.iter().copied().map(f16::from_f32).collect();
                (name, half)
            })
            .collect()
    }
}

impl<M: Model> Model for MixedPrecisionModel<M> {
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.model.named_parameters()
    }
}

/// The model as returned by the optimizer factory.
#[derive(Debug, Clone)]
pub enum PreparedModel<M> {
    /// The model as given, trained in full precision.
    Full(M),
    Mixed(MixedPrecisionModel<M>),
}

impl<M: Model> PreparedModel<M> {
    pub fn is_mixed_precision(&self) -> bool {
        matches!(self, Self::Mixed(_))
    }

    pub fn as_mixed(&self) -> Option<&MixedPrecisionModel<M>> {
        match self {
            Self::Mixed(model) => Some(model),
            Self::Full(_) => None,
        }
    }

    /// Unwraps the original model.
    pub fn into_inner(self) -> M {
        match self {
            Self::Full(model) => model,
            Self::Mixed(model) => model.into_inner(),
        }
    }
}

impl<M: Model> Model for PreparedModel<M> {
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        match self {
            Self::Full(model) => model.named_parameters(),
            Self::Mixed(model) => model.named_parameters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_weights_track_the_master_weights() {
        let param = Parameter::new(vec![1. / 3., 70000.]);
        let model = MixedPrecisionModel::new(vec![("w".to_string(), param.clone())]);

        let half = model.half_weights();
        assert_eq!(half[0].0, "w");
        assert_eq!(half[0].1[0], f16::from_f32(1. / 3.));
        assert!(half[0].1[1].is_infinite());

        param.lock().data[1] = 2.;
        assert_eq!(model.half_weights()[0].1[1], f16::from_f32(2.));

        let prepared = PreparedModel::Mixed(model);
        assert!(prepared.is_mixed_precision());
        assert!(prepared.named_parameters()[0].1.ptr_eq(&param));
    }
}
