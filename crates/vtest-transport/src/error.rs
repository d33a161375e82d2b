#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream before a read was satisfied. The connection
    /// cannot be resumed mid-message.
    #[error("connection lost: peer closed the stream")]
    Disconnected,

    #[error("failed to connect to {endpoint} after {attempts} attempts: {source}")]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("ring transport error: {0}")]
    Ring(String),
}

impl TransportError {
    /// True when the stream is gone and every further request would fail.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, TransportError::Disconnected)
            || matches!(self, TransportError::Io(e) if is_lost_kind(e.kind()))
    }

    /// Classify a read failure: an early close becomes `Disconnected`.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if is_lost_kind(err.kind()) {
            TransportError::Disconnected
        } else {
            TransportError::Io(err)
        }
    }
}

fn is_lost_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(kind, UnexpectedEof | ConnectionReset | ConnectionAborted | BrokenPipe)
}
