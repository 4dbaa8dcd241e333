use serde::{Deserialize, Serialize};

use crate::{
    error::{OptimErr, Result},
    parameters::{ParameterGroup, check_len},
};

/// Per parameter buffers of an optimizer, such as momentum or second moments.
///
/// `slots[i][k]` is the `k`-th buffer of the `i`-th parameter, counting parameters
/// across every group in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    pub updates: u64,
    pub slots: Vec<Vec<Vec<f32>>>,
}

impl SlotState {
    /// Allocates zeroed buffers.
    ///
    /// # Arguments
    /// * `sizes` - The size of every parameter.
    /// * `per_param` - How many buffers each parameter holds.
    /// * `init` - The initial value of every buffer entry.
    pub fn zeroed(sizes: &[usize], per_param: usize, init: f32) -> Self {
        let slots = sizes
            .iter()
            .map(|&size| vec![vec![init; size]; per_param])
            .collect();

        Self { updates: 0, slots }
    }

    /// The buffers of the parameter at `slot`, checked against the parameter's size.
    pub(crate) fn buffers_mut(&mut self, slot: usize, len: usize) -> Result<&mut [Vec<f32>]> {
        let count = self.slots.len();
        let buffers = self.slots.get_mut(slot).ok_or(OptimErr::SizeMismatch {
            what: "optimizer slots",
            got: slot + 1,
            expected: count,
        })?;

        for buffer in buffers.iter() {
            check_len("optimizer buffer", len, buffer.len())?;
        }

        Ok(buffers)
    }

    /// Replaces `self` with `loaded` if both have the same buffer layout.
    ///
    /// # Returns
    /// A `ResumeMismatch` error naming the first difference.
    pub fn replace_with(&mut self, loaded: SlotState) -> Result<()> {
        if loaded.slots.len() != self.slots.len() {
            return Err(OptimErr::resume(format!(
                "state holds buffers for {} parameters, the optimizer has {}",
                loaded.slots.len(),
                self.slots.len()
            )));
        }

        for (i, (ours, theirs)) in self.slots.iter().zip(&loaded.slots).enumerate() {
            let ours: Vec<_> = ours.iter().map(Vec::len).collect();
            let theirs: Vec<_> = theirs.iter().map(Vec::len).collect();

            if ours != theirs {
                return Err(OptimErr::resume(format!(
                    "parameter {i} has buffer shapes {theirs:?} in the state, expected {ours:?}"
                )));
            }
        }

        *self = loaded;
        Ok(())
    }
}

/// The layout of a parameter group, used to validate a resumed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupState {
    pub params: Vec<String>,
    pub sizes: Vec<usize>,
    pub weight_decay: Option<f32>,
}

impl From<&ParameterGroup> for GroupState {
    fn from(group: &ParameterGroup) -> Self {
        Self {
            params: group.params().iter().map(|(name, _)| name.clone()).collect(),
            sizes: group.sizes(),
            weight_decay: group.weight_decay(),
        }
    }
}

/// The serializable state of a base optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub algorithm: String,
    pub groups: Vec<GroupState>,
    #[serde(flatten)]
    pub buffers: SlotState,
}

impl OptimizerState {
    /// Checks that `self` was taken from an optimizer laid out like `expected`.
    pub fn check_layout(&self, expected: &OptimizerState) -> Result<()> {
        if !self.algorithm.eq_ignore_ascii_case(&expected.algorithm) {
            return Err(OptimErr::resume(format!(
                "state was saved by {}, the optimizer is {}",
                self.algorithm, expected.algorithm
            )));
        }

        if self.groups.len() != expected.groups.len() {
            return Err(OptimErr::resume(format!(
                "state has {} parameter groups, the optimizer has {}",
                self.groups.len(),
                expected.groups.len()
            )));
        }

        for (i, (got, want)) in self.groups.iter().zip(&expected.groups).enumerate() {
            if got.params != want.params || got.sizes != want.sizes {
                return Err(OptimErr::resume(format!(
                    "parameter group {i} doesn't match: got {:?}, expected {:?}",
                    got.params, want.params
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_with_rejects_other_layouts() {
        let mut state = SlotState::zeroed(&[2, 3], 1, 0.);

        let fewer = SlotState::zeroed(&[2], 1, 0.);
        assert!(matches!(
            state.replace_with(fewer),
            Err(OptimErr::ResumeMismatch(_))
        ));

        let reshaped = SlotState::zeroed(&[3, 2], 1, 0.);
        assert!(matches!(
            state.replace_with(reshaped),
            Err(OptimErr::ResumeMismatch(_))
        ));

        let mut same = SlotState::zeroed(&[2, 3], 1, 0.5);
        same.updates = 7;
        state.replace_with(same.clone()).unwrap();
        assert_eq!(state, same);
    }
}
