use std::io;

use async_trait::async_trait;

use crate::error::{OptimErr, Result};

/// The rank every broadcast originates from.
pub const ROOT_RANK: usize = 0;

/// How gradients travel during a reduction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    /// IEEE half precision on the wire, results are rounded to half precision on every rank.
    Fp16,
}

/// The collective operations of a distributed run.
///
/// Every operation must be invoked by every rank in the same order, otherwise the
/// run hangs.
#[async_trait]
pub trait Collective: Send {
    /// This worker's rank, in `0..world_size`.
    fn rank(&self) -> usize;

    /// The amount of workers in the run.
    fn world_size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }

    /// Overwrites `buf` on every rank with the root's values.
    async fn broadcast(&mut self, buf: &mut [f32]) -> Result<()>;

    /// Overwrites `bytes` on every rank with the root's bytes.
    async fn broadcast_bytes(&mut self, bytes: &mut Vec<u8>) -> Result<()>;

    /// Replaces `buf` on every rank with the average of every rank's `buf`.
    async fn all_reduce(&mut self, buf: &mut [f32], compression: Compression) -> Result<()>;
}

/// A protocol violation reported as a collective failure.
pub(crate) fn protocol_err(msg: impl Into<String>) -> OptimErr {
    OptimErr::Collective(io::Error::new(io::ErrorKind::InvalidData, msg.into()))
}
