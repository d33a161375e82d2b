//! Request/response framing.
//!
//! Every message is a two-word header `[payload_len, command_id]` followed by
//! the payload. Words travel in native byte order: client and server are
//! expected to share a representation, so nothing here swaps bytes.

use crate::commands::CommandId;
use crate::error::ProtocolError;

/// Header size in 32-bit words.
pub const HEADER_WORDS: usize = 2;

/// Header size in bytes.
pub const HEADER_SIZE: usize = HEADER_WORDS * 4;

/// Index of the payload length inside the header.
pub const CMD_LEN: usize = 0;
/// Index of the command id inside the header.
pub const CMD_ID: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length. Usually in words; see `CommandId::CreateRenderer` and
    /// caps replies for the exceptions.
    pub len: u32,
    pub id: u32,
}

impl Header {
    pub fn new(id: CommandId, len: u32) -> Self {
        Self { len, id: id as u32 }
    }

    pub fn to_words(self) -> [u32; HEADER_WORDS] {
        let mut words = [0u32; HEADER_WORDS];
        words[CMD_LEN] = self.len;
        words[CMD_ID] = self.id;
        words
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(bytemuck::cast_slice(&self.to_words()));
        bytes
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let len = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let id = u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self { len, id }
    }

    pub fn command(self) -> Option<CommandId> {
        CommandId::from_raw(self.id)
    }
}

/// View a word slice as raw bytes for transmission.
pub fn words_as_bytes(words: &[u32]) -> &[u8] {
    bytemuck::cast_slice(words)
}

/// Decode native-order words from a byte buffer. Trailing bytes that do not
/// form a whole word are rejected.
pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>, ProtocolError> {
    if bytes.len() % 4 != 0 {
        return Err(ProtocolError::Desync(format!(
            "{} bytes is not a whole number of words",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Frame a request whose payload is a word array.
pub fn encode_request(id: CommandId, payload: &[u32]) -> Result<Vec<u8>, ProtocolError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::PayloadTooLarge(payload.len() * 4))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() * 4);
    frame.extend_from_slice(&Header::new(id, len).to_bytes());
    frame.extend_from_slice(words_as_bytes(payload));
    Ok(frame)
}
