use std::fmt;
use std::path::PathBuf;

use crate::error::TransportError;

/// Where the renderer listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix-domain stream socket.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Parse a socket target. Anything containing a `:` is `host:port`,
    /// split at the first colon; everything else is a socket path.
    pub fn parse(target: &str) -> Result<Self, TransportError> {
        if target.is_empty() {
            return Err(TransportError::InvalidEndpoint("empty target".to_string()));
        }
        match target.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    TransportError::InvalidEndpoint(format!("bad port in {}: {}", target, e))
                })?;
                let host = if host.is_empty() { "127.0.0.1" } else { host };
                Ok(Endpoint::Tcp { host: host.to_string(), port })
            }
            None => Ok(Endpoint::Unix(PathBuf::from(target))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp { host, port } => write!(f, "tcp:{}:{}", host, port),
        }
    }
}
