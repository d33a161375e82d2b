//! Blocking socket backend.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::transport::Transport;

enum Stream {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

/// A connected Unix-domain or TCP stream to the renderer.
pub struct SocketTransport {
    endpoint: Endpoint,
    stream: Stream,
}

impl SocketTransport {
    /// Connect, retrying up to `retries` extra times with `retry_delay` between attempts.
    pub fn connect(
        endpoint: &Endpoint,
        retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, TransportError> {
        let attempts = retries.saturating_add(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(retry_delay);
            }

            match Self::try_connect(endpoint) {
                Ok(stream) => {
                    debug!(%endpoint, attempt, "connected to renderer");
                    return Ok(Self { endpoint: endpoint.clone(), stream });
                }
                Err(e) => {
                    warn!(%endpoint, attempt, "connect failed: {}", e);
                    last_err = Some(e);
                }
            }
        }

        Err(TransportError::ConnectFailed {
            endpoint: endpoint.to_string(),
            attempts,
            source: last_err
                .unwrap_or_else(|| std::io::Error::other("no connection attempt was made")),
        })
    }

    fn try_connect(endpoint: &Endpoint) -> std::io::Result<Stream> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = std::os::unix::net::UnixStream::connect(path)?;
                Ok(Stream::Unix(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("unix sockets unavailable on this platform: {}", path.display()),
            )),
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                // Requests are small and latency bound.
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Raw descriptor, for ring providers that pass it to the renderer.
    #[cfg(unix)]
    pub fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        match &self.stream {
            Stream::Unix(s) => s.as_raw_fd(),
            Stream::Tcp(s) => s.as_raw_fd(),
        }
    }
}

impl Transport for SocketTransport {
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        // write_all retries ErrorKind::Interrupted and never returns a short write.
        let res = match &mut self.stream {
            #[cfg(unix)]
            Stream::Unix(s) => s.write_all(buf),
            Stream::Tcp(s) => s.write_all(buf),
        };
        res.map_err(TransportError::Io)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let res = match &mut self.stream {
            #[cfg(unix)]
            Stream::Unix(s) => s.read_exact(buf),
            Stream::Tcp(s) => s.read_exact(buf),
        };
        res.map_err(|e| {
            let err = TransportError::from_read(e);
            warn!(endpoint = %self.endpoint, wanted = buf.len(), "read failed: {}", err);
            err
        })
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}
