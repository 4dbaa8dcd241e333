/// Writes a message into a byte buffer for the sending end of the protocol.
pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer where the header and any owned bytes are written.
    ///
    /// # Returns
    /// A trailing slice to be written as is after `buf`, avoiding a copy of large payloads.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
