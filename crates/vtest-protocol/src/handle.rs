use std::fmt;

/// A client-issued resource identifier.
/// Unique for the lifetime of a connection; 0 never names a live resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceHandle(pub u32);

impl ResourceHandle {
    /// The reserved invalid handle.
    pub const NULL: ResourceHandle = ResourceHandle(0);

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}
