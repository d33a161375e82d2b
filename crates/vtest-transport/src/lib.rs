pub mod endpoint;
pub mod error;
pub mod ring;
pub mod socket;
pub mod transport;

pub use endpoint::Endpoint;
pub use error::TransportError;
pub use ring::{Ring, RingProvider, RingTransport};
pub use socket::SocketTransport;
pub use transport::Transport;
