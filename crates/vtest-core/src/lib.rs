pub mod config;
pub mod error;
pub mod handle;

pub use config::VtestConfig;
pub use error::CoreError;
pub use handle::HandleAllocator;
