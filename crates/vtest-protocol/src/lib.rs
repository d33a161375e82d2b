pub mod caps;
pub mod commands;
pub mod error;
pub mod format;
pub mod handle;
pub mod resource;
pub mod wire;

pub use caps::{Caps, CapsV1, CapsV2};
pub use commands::{BusyWaitFlags, CommandId, DtCommand, DtSubCommand, ResourceCreate, TransferCommand};
pub use error::ProtocolError;
pub use format::{FormatLayout, FormatTable};
pub use handle::ResourceHandle;
pub use resource::{BindFlags, PipeBox, TextureTarget};
pub use wire::Header;
