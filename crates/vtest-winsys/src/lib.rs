//! Client side of the vtest remote rendering protocol.
//!
//! A [`Winsys`] owns one connection to the renderer and hands out resources,
//! command buffers and fences on top of it. Released vertex/index/constant
//! buffers and fences are parked in a short-lived cache and reused instead of
//! being destroyed and recreated remotely.

pub mod cache;
pub mod cmd_buf;
pub mod connection;
pub mod display;
pub mod error;
pub mod fence;
pub mod registry;
pub mod resource;
pub mod transfer;
pub mod winsys;

pub use cmd_buf::CommandBuffer;
pub use connection::Connection;
pub use display::{DisplayBackend, FrontGeometry, FrontbufferPresenter, Rect, SoftwareTarget};
pub use error::WinsysError;
pub use fence::{Fence, WaitTimeout};
pub use registry::Registry;
pub use resource::{Resource, ResourceDesc, ResourceMap};
pub use transfer::{compute_region, TransferRegion};
pub use winsys::Winsys;
