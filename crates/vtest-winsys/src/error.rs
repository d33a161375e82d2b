use std::path::PathBuf;

use vtest_core::CoreError;
use vtest_protocol::{ProtocolError, ResourceHandle};
use vtest_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum WinsysError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("allocation failure: could not grow {what} to {requested} entries")]
    AllocationFailure { what: &'static str, requested: usize },

    #[error("resource handle space exhausted")]
    HandlesExhausted,

    #[error("all {0} display target slots are in use")]
    DisplayTargetsExhausted(u32),

    #[error("{0} needs a display target but no display backend is configured")]
    NoDisplayBackend(ResourceHandle),

    #[error("display backend error: {0}")]
    Display(String),

    #[error("invalid transfer region: {0}")]
    InvalidRegion(String),

    #[error("ring transport requested at {0} but no ring provider was supplied")]
    RingUnavailable(PathBuf),
}

impl WinsysError {
    /// True when the renderer connection is gone. The owner decides whether
    /// to shut down or reconnect; nothing in this crate retries.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            WinsysError::Transport(e) => e.is_connection_lost(),
            WinsysError::Protocol(ProtocolError::Desync(_)) => true,
            _ => false,
        }
    }
}
