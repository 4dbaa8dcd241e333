//! The sending end of a framed link.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN, Serialize};

/// The sending end handle of the communication.
///
/// Every message goes out as one frame: a big endian length, the serialized head and,
/// for data messages, the borrowed payload written without copying it.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    head: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    /// Creates a new `OnoSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            head: Vec::new(),
        }
    }

    /// Sends `msg` as a single frame and flushes it.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// An `io::Error` of kind `InvalidInput` if the frame exceeds `MAX_FRAME_LEN`,
    /// or the error of the underlying writer.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { tx, head } = self;

        head.clear();
        head.resize(LEN_TYPE_SIZE, 0);

        let tail = msg.serialize(head);
        let frame_len = head.len() - LEN_TYPE_SIZE + tail.map_or(0, <[u8]>::len);

        if frame_len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {frame_len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"),
            ));
        }

        head[..LEN_TYPE_SIZE].copy_from_slice(&(frame_len as LenType).to_be_bytes());
        tx.write_all(head).await?;

        if let Some(tail) = tail {
            tx.write_all(tail).await?;
        }

        tx.flush().await
    }

    /// Shuts the writer down, the other end reads an end of stream after the
    /// frames already sent.
    pub async fn close(&mut self) -> io::Result<()> {
        self.tx.shutdown().await
    }
}
