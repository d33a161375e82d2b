//! Typed requests over one renderer connection.
//!
//! Each method performs one complete exchange (header, payload, and any reply
//! or data stream) while holding the transport lock, so concurrent callers
//! never interleave bytes on the wire.

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use vtest_protocol::caps::{CAPS_V1_SIZE, CAPS_V2_SIZE};
use vtest_protocol::commands::{PutLength, MAX_IDENTIFIER_LEN};
use vtest_protocol::wire::{self, HEADER_SIZE};
use vtest_protocol::{
    BusyWaitFlags, Caps, CommandId, DtCommand, Header, ProtocolError, ResourceCreate,
    ResourceHandle, TransferCommand,
};
use vtest_transport::{Transport, TransportError};

use crate::error::WinsysError;
use crate::transfer::TransferRegion;

/// Chunk size used when discarding unwanted reply bytes.
const DISCARD_CHUNK: usize = 4096;

pub struct Connection {
    transport: Mutex<Box<dyn Transport>>,
    put_length: PutLength,
    label: String,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>, put_length: PutLength) -> Self {
        let label = transport.describe();
        Self {
            transport: Mutex::new(transport),
            put_length,
            label,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Announce the client. The renderer accepts unconditionally and sends no reply.
    ///
    /// The header length of this command counts bytes (identifier plus NUL),
    /// not words.
    pub fn create_renderer(&self, name: &str) -> Result<(), WinsysError> {
        if name.contains('\0') {
            return Err(ProtocolError::InvalidIdentifier(name.to_string()).into());
        }
        let name = vtest_common::platform::truncate_on_char_boundary(name, MAX_IDENTIFIER_LEN);

        let mut frame = Vec::with_capacity(HEADER_SIZE + name.len() + 1);
        frame.extend_from_slice(
            &Header::new(CommandId::CreateRenderer, name.len() as u32 + 1).to_bytes(),
        );
        frame.extend_from_slice(name.as_bytes());
        frame.push(0);

        debug!(connection = %self.label, client = name, "create renderer");
        self.transport.lock().write_exact(&frame)?;
        Ok(())
    }

    /// Negotiate capabilities.
    ///
    /// Both requests go out in one write. A renderer that understands GET_CAPS2
    /// answers both, so after a v2 reply the v1 reply is still read and
    /// dropped to keep the stream aligned.
    ///
    /// Returns `Ok(None)` when the renderer hangs up instead of answering;
    /// the caller falls back to [`Caps::defaults`].
    pub fn get_caps(&self) -> Result<Option<Caps>, WinsysError> {
        let mut request = Vec::with_capacity(2 * wire::HEADER_WORDS);
        request.extend_from_slice(&Header::new(CommandId::GetCaps2, 0).to_words());
        request.extend_from_slice(&Header::new(CommandId::GetCaps, 0).to_words());

        let mut t = self.transport.lock();
        t.write_exact(wire::words_as_bytes(&request))?;

        let header = match read_header(&mut **t) {
            Ok(h) => h,
            Err(TransportError::Disconnected) => {
                warn!(connection = %self.label, "renderer sent no capabilities");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut caps = Caps::defaults();
        // The header carries the body size in bytes plus one, and the struct
        // version in place of a command id.
        let body = header.len.saturating_sub(1) as usize;

        if header.id == 2 {
            read_truncated(&mut **t, &mut caps.v2_bytes_mut()[..body.min(CAPS_V2_SIZE)], body, "caps v2")?;

            let v1 = read_header(&mut **t).map_err(|e| desync(e, "caps v1 header after v2"))?;
            discard(&mut **t, v1.len.saturating_sub(1) as usize)
                .map_err(|e| desync(e, "caps v1 body after v2"))?;
            caps.version = 2;
        } else {
            read_truncated(&mut **t, &mut caps.v1_bytes_mut()[..body.min(CAPS_V1_SIZE)], body, "caps v1")?;
            caps.version = 1;
        }

        debug!(connection = %self.label, version = caps.version, bytes = body, "capabilities received");
        Ok(Some(caps))
    }

    pub fn resource_create(&self, args: &ResourceCreate) -> Result<(), WinsysError> {
        debug!(
            handle = %args.handle,
            bind = ?args.bind,
            format = args.format,
            width = args.width,
            height = args.height,
            "resource create"
        );
        self.send(CommandId::ResourceCreate, &args.to_words())
    }

    pub fn resource_unref(&self, handle: ResourceHandle) -> Result<(), WinsysError> {
        debug!(%handle, "resource unref");
        self.send(CommandId::ResourceUnref, &[handle.raw()])
    }

    /// Query (or with [`BusyWaitFlags::WAIT`], block until) the resource's
    /// busy state. Returns `true` while the renderer still uses it.
    pub fn busy_wait(&self, handle: ResourceHandle, flags: BusyWaitFlags) -> Result<bool, WinsysError> {
        let frame = wire::encode_request(CommandId::ResourceBusyWait, &[handle.raw(), flags.bits()])?;

        let mut t = self.transport.lock();
        t.write_exact(&frame)?;

        let header = read_header(&mut **t)?;
        if header.id != CommandId::ResourceBusyWait as u32 {
            return Err(ProtocolError::UnexpectedResponse {
                command: CommandId::ResourceBusyWait.name(),
                got: header.id,
            }
            .into());
        }
        let mut result = [0u8; 4];
        t.read_exact(&mut result)?;
        let busy = u32::from_ne_bytes(result) == 1;
        trace!(%handle, ?flags, busy, "busy wait");
        Ok(busy)
    }

    /// Send a command buffer. The protocol defines no acknowledgment.
    pub fn submit_cmd(&self, words: &[u32]) -> Result<(), WinsysError> {
        trace!(words = words.len(), "submit command buffer");
        self.send(CommandId::SubmitCmd, words)
    }

    pub fn dt_command(&self, cmd: &DtCommand) -> Result<(), WinsysError> {
        debug!(sub = ?cmd.cmd, id = cmd.id, handle = %cmd.handle, "display target command");
        self.send(CommandId::DtCommand, &cmd.to_words())
    }

    /// TRANSFER_PUT followed by `data` (exactly `cmd.data_size` bytes).
    pub fn transfer_put(&self, cmd: &TransferCommand, data: &[u8]) -> Result<(), WinsysError> {
        if data.len() != cmd.data_size as usize {
            return Err(WinsysError::InvalidRegion(format!(
                "put of {} declares {} bytes but carries {}",
                cmd.handle,
                cmd.data_size,
                data.len()
            )));
        }
        let header = Header::new(CommandId::TransferPut, cmd.put_header_len(self.put_length)?);

        let mut frame = Vec::with_capacity(HEADER_SIZE + 4 * cmd.to_words().len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(wire::words_as_bytes(&cmd.to_words()));

        let mut t = self.transport.lock();
        t.write_exact(&frame)?;
        t.write_exact(data)?;
        Ok(())
    }

    /// TRANSFER_GET, then read `region.total_bytes` back row by row.
    ///
    /// Each row arrives at `valid_stride` bytes; only the packed part is
    /// copied into `dst`, which is laid out at the same stride. Padding
    /// between rows and layers is consumed and dropped.
    pub fn transfer_get(
        &self,
        cmd: &TransferCommand,
        region: &TransferRegion,
        dst: &mut [u8],
    ) -> Result<(), WinsysError> {
        if dst.len() < region.required_len() {
            return Err(WinsysError::InvalidRegion(format!(
                "get of {} needs {} bytes, destination has {}",
                cmd.handle,
                region.required_len(),
                dst.len()
            )));
        }
        let frame = wire::encode_request(CommandId::TransferGet, &cmd.to_words())?;

        let stride = region.valid_stride as usize;
        let layer_stride = region.valid_layer_stride as usize;
        let packed = region.packed_row as usize;
        let rows = region.rows as usize;

        let mut t = self.transport.lock();
        t.write_exact(&frame)?;

        let mut line = vec![0u8; stride];
        for layer in 0..region.layers as usize {
            let base = layer * layer_stride;
            for row in 0..rows {
                t.read_exact(&mut line)?;
                t.sync_after_read()?;
                let at = base + row * stride;
                dst[at..at + packed].copy_from_slice(&line[..packed]);
            }
            let padding = layer_stride.saturating_sub(rows * stride);
            if padding > 0 {
                discard(&mut **t, padding)?;
                t.sync_after_read()?;
            }
        }
        Ok(())
    }

    fn send(&self, id: CommandId, payload: &[u32]) -> Result<(), WinsysError> {
        let frame = wire::encode_request(id, payload)?;
        self.transport.lock().write_exact(&frame)?;
        Ok(())
    }
}

fn read_header(t: &mut dyn Transport) -> Result<Header, TransportError> {
    let mut bytes = [0u8; HEADER_SIZE];
    t.read_exact(&mut bytes)?;
    Ok(Header::from_bytes(&bytes))
}

/// Read `total` bytes, keeping the first `dst.len()` and dropping the rest.
fn read_truncated(
    t: &mut dyn Transport,
    dst: &mut [u8],
    total: usize,
    what: &'static str,
) -> Result<(), WinsysError> {
    t.read_exact(dst).map_err(|e| desync(e, what))?;
    let excess = total - dst.len();
    if excess > 0 {
        debug!(what, excess, "dropping unknown capability fields");
        discard(t, excess).map_err(|e| desync(e, what))?;
    }
    Ok(())
}

fn discard(t: &mut dyn Transport, mut len: usize) -> Result<(), TransportError> {
    let mut scratch = [0u8; DISCARD_CHUNK];
    while len > 0 {
        let n = len.min(DISCARD_CHUNK);
        t.read_exact(&mut scratch[..n])?;
        len -= n;
    }
    Ok(())
}

/// A short read in the middle of a reply leaves the stream misaligned.
fn desync(err: TransportError, what: &str) -> WinsysError {
    match err {
        TransportError::Disconnected => {
            ProtocolError::Desync(format!("stream ended while reading {}", what)).into()
        }
        other => other.into(),
    }
}
