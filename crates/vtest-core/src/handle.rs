use std::sync::atomic::{AtomicU32, Ordering};

use vtest_protocol::ResourceHandle;

/// Per-connection resource handle allocator.
/// Handles start at 1; 0 is the reserved invalid handle. Handles are never
/// handed out twice, so a cached or still-referenced handle cannot collide
/// with a fresh allocation.
pub struct HandleAllocator {
    next: AtomicU32,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocate the next handle, or `None` once the 32-bit space is exhausted.
    pub fn alloc(&self) -> Option<ResourceHandle> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .ok()
            .map(ResourceHandle)
    }

    /// Number of handles handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
