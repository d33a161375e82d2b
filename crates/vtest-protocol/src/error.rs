#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The response stream no longer lines up with the expected message shape.
    /// The byte stream cannot be realigned once this happens.
    #[error("protocol desynchronized: {0}")]
    Desync(String),

    #[error("unexpected response to {command}: got command id {got}")]
    UnexpectedResponse { command: &'static str, got: u32 },

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("invalid client identifier: {0}")]
    InvalidIdentifier(String),
}
