use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{OptimErr, Result};

/// The values of a trainable tensor together with its gradient.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tensor {
    pub data: Vec<f32>,
    pub grad: Vec<f32>,
}

impl Tensor {
    /// Creates a new `Tensor` with a zeroed gradient.
    pub fn new(data: Vec<f32>) -> Self {
        let grad = vec![0.; data.len()];
        Self { data, grad }
    }

    /// The amount of scalars in this tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A shared handle to a model tensor.
///
/// Cloning the handle doesn't copy the tensor, the model and the optimizer see the same values.
#[derive(Debug, Clone)]
pub struct Parameter(Arc<Mutex<Tensor>>);

impl Parameter {
    /// Creates a new `Parameter` from its initial values.
    pub fn new(data: Vec<f32>) -> Self {
        Self(Arc::new(Mutex::new(Tensor::new(data))))
    }

    /// Locks the underlying tensor.
    ///
    /// The guard must not be held across an await point.
    pub fn lock(&self) -> MutexGuard<'_, Tensor> {
        self.0.lock()
    }

    /// The amount of scalars in this parameter.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `self` and `other` are handles to the same tensor.
    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A copy of the current values.
    pub fn data(&self) -> Vec<f32> {
        self.lock().data.clone()
    }

    /// A copy of the current gradient.
    pub fn grad(&self) -> Vec<f32> {
        self.lock().grad.clone()
    }

    /// Adds `grad` into the stored gradient, as a backward pass would.
    ///
    /// # Returns
    /// An error if `grad` doesn't have the parameter's size.
    pub fn accumulate_grad(&self, grad: &[f32]) -> Result<()> {
        let mut tensor = self.lock();
        check_len("gradient", grad.len(), tensor.len())?;
        tensor.grad.iter_mut().zip(grad).for_each(|(acc, g)| *acc += g);
        Ok(())
    }

    /// Resets the stored gradient to zero.
    pub fn zero_grad(&self) {
        self.lock().grad.fill(0.);
    }
}

/// A model exposes its trainable tensors by name.
pub trait Model {
    /// Returns every trainable parameter with its name, in a stable order.
    fn named_parameters(&self) -> Vec<(String, Parameter)>;
}

impl Model for Vec<(String, Parameter)> {
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.clone()
    }
}

pub(crate) fn check_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(OptimErr::SizeMismatch {
            what,
            got,
            expected,
        });
    }

    Ok(())
}

/// Concatenates one field of every parameter into a flat buffer.
pub(crate) fn gather<'a, I>(params: I, field: impl Fn(&Tensor) -> &[f32]) -> Vec<f32>
where
    I: IntoIterator<Item = &'a Parameter>,
{
    let mut flat = Vec::new();

    for param in params {
        let tensor = param.lock();
        flat.extend_from_slice(field(&*tensor));
    }

    flat
}

/// Splits a flat buffer back into one field of every parameter.
///
/// # Returns
/// An error if `flat` isn't exactly as long as the parameters combined.
pub(crate) fn scatter<'a, I>(
    params: I,
    flat: &[f32],
    field: impl Fn(&mut Tensor) -> &mut Vec<f32>,
) -> Result<()>
where
    I: IntoIterator<Item = &'a Parameter> + Clone,
{
    let expected: usize = params.clone().into_iter().map(Parameter::len).sum();
    check_len("flat buffer", flat.len(), expected)?;

    let mut offset = 0;
    for param in params {
        let mut tensor = param.lock();
        let dst = field(&mut *tensor);
        let len = dst.len();
        dst.copy_from_slice(&flat[offset..offset + len]);
        offset += len;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_tensor() {
        let param = Parameter::new(vec![1., 2.]);
        let other = param.clone();

        other.accumulate_grad(&[0.5, 0.5]).unwrap();
        other.accumulate_grad(&[0.5, 1.]).unwrap();

        assert!(param.ptr_eq(&other));
        assert_eq!(param.grad(), vec![1., 1.5]);

        param.zero_grad();
        assert_eq!(other.grad(), vec![0., 0.]);
    }

    #[test]
    fn accumulate_grad_checks_the_size() {
        let param = Parameter::new(vec![1., 2.]);
        assert!(matches!(
            param.accumulate_grad(&[1.]),
            Err(OptimErr::SizeMismatch {
                got: 1,
                expected: 2,
                ..
            })
        ));
    }

    #[test]
    fn gather_and_scatter_follow_parameter_order() {
        let params = [Parameter::new(vec![1., 2.]), Parameter::new(vec![3.])];

        assert_eq!(gather(&params, |t| t.data.as_slice()), vec![1., 2., 3.]);

        scatter(&params, &[4., 5., 6.], |t| &mut t.grad).unwrap();
        assert_eq!(params[0].grad(), vec![4., 5.]);
        assert_eq!(params[1].grad(), vec![6.]);

        assert!(scatter(&params, &[1.], |t| &mut t.data).is_err());
    }
}
