use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Align4, Deserialize, LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN};

/// The receiving end handle of the communication.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    /// Creates a new `OnoReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Waits for the next frame and deserializes it.
    ///
    /// # Arguments
    /// * `buf` - The storage of the frame, its 4 byte alignment lets numeric payloads be
    ///   borrowed in place. The returned `T` borrows from it.
    ///
    /// # Returns
    /// The message, or an `io::Error` if the stream ended, the announced length exceeds
    /// `MAX_FRAME_LEN` or the frame is malformed.
    pub async fn recv_into<'buf, T, B>(&mut self, buf: &'buf mut Vec<B>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
        B: Align4,
    {
        let mut len_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut len_buf).await?;

        let len = usize::try_from(LenType::from_be_bytes(len_buf))
            .ok()
            .filter(|&len| len <= MAX_FRAME_LEN)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("announced frame exceeds the {MAX_FRAME_LEN} bytes limit"),
                )
            })?;

        buf.resize(len.div_ceil(size_of::<B>()), B::zeroed());

        let frame = &mut bytemuck::cast_slice_mut::<B, u8>(buf.as_mut_slice())[..len];
        self.rx.read_exact(frame).await?;

        T::deserialize(frame)
    }
}
