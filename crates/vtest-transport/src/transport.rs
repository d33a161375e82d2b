use crate::error::TransportError;

/// A reliable, ordered byte stream to the renderer.
///
/// Both operations either move the whole buffer or fail; there are no short
/// transfers. Interrupted system calls are retried internally. After a failed
/// read the stream position is unknown and the transport must not be reused.
pub trait Transport: Send {
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Acknowledge data consumed by the last reads. Only the shared-memory
    /// ring needs this; stream sockets do nothing.
    fn sync_after_read(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Short description for logs.
    fn describe(&self) -> String;
}
