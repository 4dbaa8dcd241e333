#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use orchestra_optim::{
    Model, Parameter, RawConfig, Result,
    distributed::{Collective, Compression},
};
use serde_json::Value;

pub fn raw(value: Value) -> RawConfig {
    match value {
        Value::Object(raw) => raw,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A fixed set of named parameters.
#[derive(Debug, Clone)]
pub struct Toy {
    pub params: Vec<(String, Parameter)>,
}

impl Toy {
    pub fn new(shapes: &[(&str, &[f32])]) -> Self {
        let params = shapes
            .iter()
            .map(|(name, data)| (name.to_string(), Parameter::new(data.to_vec())))
            .collect();

        Self { params }
    }

    pub fn layers() -> Self {
        Self::new(&[
            ("encoder.weight", &[0.5, -0.5, 1.0]),
            ("encoder.bias", &[0.1]),
            ("encoder.LayerNorm.weight", &[1.0, 1.0]),
            ("decoder.weight", &[-1.0, 2.0]),
        ])
    }

    pub fn values(&self) -> Vec<Vec<f32>> {
        self.params.iter().map(|(_, p)| p.data()).collect()
    }

    /// Accumulates a deterministic gradient depending on the current values and `seed`.
    pub fn backward(&self, seed: f32) {
        for (i, (_, param)) in self.params.iter().enumerate() {
            let grad: Vec<f32> = param
                .data()
                .iter()
                .enumerate()
                .map(|(j, w)| w * 0.5 + seed * 0.1 + (i + j) as f32 * 0.01)
                .collect();

            param.accumulate_grad(&grad).unwrap();
        }
    }
}

impl Model for Toy {
    fn named_parameters(&self) -> Vec<(String, Parameter)> {
        self.params.clone()
    }
}

/// Counts of the collective calls made through a `Recording` collective.
#[derive(Debug, Default)]
pub struct Calls {
    pub broadcasts: AtomicUsize,
    pub byte_broadcasts: AtomicUsize,
    pub all_reduces: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
            + self.byte_broadcasts.load(Ordering::SeqCst)
            + self.all_reduces.load(Ordering::SeqCst)
    }

    pub fn all_reduces(&self) -> usize {
        self.all_reduces.load(Ordering::SeqCst)
    }
}

/// A root rank whose peers all hold the same values as the root.
///
/// Broadcasts and reductions leave buffers untouched, only the calls are counted.
pub struct Recording {
    pub world_size: usize,
    pub calls: Arc<Calls>,
}

impl Recording {
    pub fn new(world_size: usize) -> (Self, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let recording = Self {
            world_size,
            calls: Arc::clone(&calls),
        };

        (recording, calls)
    }
}

#[async_trait]
impl Collective for Recording {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    async fn broadcast(&mut self, _buf: &mut [f32]) -> Result<()> {
        self.calls.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn broadcast_bytes(&mut self, _bytes: &mut Vec<u8>) -> Result<()> {
        self.calls.byte_broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn all_reduce(&mut self, _buf: &mut [f32], _compression: Compression) -> Result<()> {
        self.calls.all_reduces.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
