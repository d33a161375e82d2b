//! Shared-memory ring backend.
//!
//! The ring itself (setup, memory layout, cross-process signalling) is owned
//! by an external component. This module only adapts its byte-oriented
//! contract to [`Transport`].

use std::path::Path;

use tracing::debug;

use crate::error::TransportError;
use crate::socket::SocketTransport;
use crate::transport::Transport;

/// Byte-oriented contract of an attached ring.
pub trait Ring: Send {
    /// Write all of `buf`, blocking while the ring is full.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Fill all of `buf`, blocking while the ring is empty.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<()>;

    /// Publish the read position so the writer can reuse the space.
    fn sync_write(&mut self) -> std::io::Result<()>;
}

/// Attaches a ring to a freshly connected control socket.
pub trait RingProvider {
    fn attach(
        &self,
        control: SocketTransport,
        shm_dir: &Path,
        client_name: &str,
    ) -> Result<Box<dyn Ring>, TransportError>;
}

pub struct RingTransport {
    ring: Box<dyn Ring>,
    label: String,
}

impl RingTransport {
    pub fn new(ring: Box<dyn Ring>, label: impl Into<String>) -> Self {
        Self { ring, label: label.into() }
    }

    /// Connect through `provider`, handing over the control socket.
    pub fn attach(
        provider: &dyn RingProvider,
        control: SocketTransport,
        shm_dir: &Path,
        client_name: &str,
    ) -> Result<Self, TransportError> {
        let label = format!("ring:{} via {}", shm_dir.display(), control.endpoint());
        let ring = provider.attach(control, shm_dir, client_name)?;
        debug!(%label, "ring transport attached");
        Ok(Self::new(ring, label))
    }
}

impl Transport for RingTransport {
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.ring.write(buf).map_err(TransportError::Io)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.ring.read(buf).map_err(TransportError::from_read)
    }

    fn sync_after_read(&mut self) -> Result<(), TransportError> {
        self.ring.sync_write().map_err(TransportError::Io)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
