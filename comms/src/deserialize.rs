use std::io;

/// Reads a message out of a received byte buffer, borrowing from it when possible.
pub trait Deserialize<'a>: Sized {
    /// Deserializes an instance from `buf`.
    ///
    /// # Arguments
    /// * `buf` - The bytes of exactly one frame, without the length prefix.
    ///
    /// # Returns
    /// The message or an `io::Error` of kind `InvalidData`.
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
