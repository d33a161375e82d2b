//! Client-side view of a renderer resource.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::warn;
use vtest_protocol::{BindFlags, ResourceCreate, ResourceHandle, TextureTarget};

use crate::display::DisplayTarget;
use crate::error::WinsysError;

/// Everything needed to create a resource remotely, plus the size of its
/// local backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDesc {
    pub target: TextureTarget,
    pub format: u32,
    pub bind: BindFlags,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub last_level: u32,
    pub nr_samples: u32,
    /// Bytes of host memory backing the resource.
    pub size: u32,
}

impl ResourceDesc {
    /// A linear buffer of `size` bytes.
    pub fn buffer(bind: BindFlags, size: u32) -> Self {
        Self {
            target: TextureTarget::Buffer,
            format: vtest_protocol::format::R8_UNORM,
            bind,
            width: size,
            height: 1,
            depth: 1,
            array_size: 1,
            last_level: 0,
            nr_samples: 0,
            size,
        }
    }

    /// A single-level 2D texture.
    pub fn texture_2d(bind: BindFlags, format: u32, width: u32, height: u32, size: u32) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            format,
            bind,
            width,
            height,
            depth: 1,
            array_size: 1,
            last_level: 0,
            nr_samples: 0,
            size,
        }
    }

    pub(crate) fn create_command(&self, handle: ResourceHandle) -> ResourceCreate {
        ResourceCreate {
            handle,
            target: self.target,
            format: self.format,
            bind: self.bind,
            width: self.width,
            height: self.height,
            depth: self.depth,
            array_size: self.array_size,
            last_level: self.last_level,
            nr_samples: self.nr_samples,
        }
    }
}

pub(crate) enum Backing {
    Host(Vec<u8>),
    Display(DisplayTarget),
    /// Destroyed; the remote handle has been unreferenced.
    Released,
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Host(mem) => mem.as_slice(),
            Backing::Display(dt) => dt.target.pixels(),
            Backing::Released => &[],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Backing::Host(mem) => mem.as_mut_slice(),
            Backing::Display(dt) => dt.target.pixels_mut(),
            Backing::Released => &mut [],
        }
    }

    fn begin_map(&mut self) {
        if let Backing::Display(dt) = self {
            dt.target.begin_map();
        }
    }

    fn end_map(&mut self) {
        if let Backing::Display(dt) = self {
            dt.target.end_map();
        }
    }
}

pub struct Resource {
    handle: ResourceHandle,
    desc: ResourceDesc,
    cacheable: bool,
    /// Row stride of the display target, 0 for host-backed resources.
    stride: u32,
    backing: Mutex<Backing>,
    refcount: AtomicU32,
    cs_refs: AtomicU32,
}

impl Resource {
    pub(crate) fn new(handle: ResourceHandle, desc: ResourceDesc, backing: Backing, stride: u32) -> Self {
        Self {
            handle,
            desc,
            cacheable: desc.bind.is_cacheable(),
            stride,
            backing: Mutex::new(backing),
            refcount: AtomicU32::new(1),
            cs_refs: AtomicU32::new(0),
        }
    }

    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    pub fn bind(&self) -> BindFlags {
        self.desc.bind
    }

    pub fn format(&self) -> u32 {
        self.desc.format
    }

    pub fn size(&self) -> u32 {
        self.desc.size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// True while some unsubmitted command buffer references this resource.
    pub fn is_referenced(&self) -> bool {
        self.cs_refs.load(Ordering::Acquire) != 0
    }

    pub fn display_target_id(&self) -> Option<u32> {
        match &*self.backing.lock() {
            Backing::Display(dt) => Some(dt.id),
            _ => None,
        }
    }

    /// Map the local backing store. Display targets are mapped through the
    /// software backend for the lifetime of the map.
    ///
    /// The map does not hold the resource lock, so transfers and front-buffer
    /// flushes of the same resource may run while it is alive.
    pub fn map(&self) -> ResourceMap<'_> {
        self.backing.lock().begin_map();
        ResourceMap { res: self }
    }

    /// Run `f` on the mapped bytes with the backing locked.
    pub(crate) fn with_mapped<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut backing = self.backing.lock();
        backing.begin_map();
        let out = f(backing.bytes_mut());
        backing.end_map();
        out
    }

    pub(crate) fn lock_backing(&self) -> MutexGuard<'_, Backing> {
        self.backing.lock()
    }

    pub(crate) fn acquire(&self) -> u32 {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one owner, returning the remaining count, or `None` when the
    /// resource had no owner left.
    pub(crate) fn release(&self) -> Option<u32> {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|prev| prev - 1)
    }

    /// Revive a pooled resource for a new owner.
    pub(crate) fn revive(&self) {
        self.refcount.store(1, Ordering::Release);
    }

    pub(crate) fn add_cs_ref(&self) {
        self.cs_refs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn drop_cs_ref(&self) {
        let dropped = self
            .cs_refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if dropped.is_err() {
            warn!(handle = %self.handle, "command buffer reference dropped below zero");
        }
    }

    /// Take the backing store out, leaving the resource released.
    pub(crate) fn take_backing(&self) -> Backing {
        std::mem::replace(&mut *self.backing.lock(), Backing::Released)
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("handle", &self.handle)
            .field("bind", &self.desc.bind)
            .field("format", &self.desc.format)
            .field("size", &self.desc.size)
            .field("refcount", &self.refcount())
            .finish()
    }
}

/// Mapped view of a resource's local memory.
///
/// Each accessor locks the backing only for its own duration; a caller must
/// not start a transfer of the same resource from inside a closure.
pub struct ResourceMap<'a> {
    res: &'a Resource,
}

impl ResourceMap<'_> {
    pub fn len(&self) -> usize {
        self.res.backing.lock().bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.res.backing.lock().bytes())
    }

    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(self.res.backing.lock().bytes_mut())
    }

    /// Copy `data` into the mapping at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), WinsysError> {
        let handle = self.res.handle;
        self.with_mut(|bytes| {
            let mapped = bytes.len();
            let dst = offset
                .checked_add(data.len())
                .and_then(|end| bytes.get_mut(offset..end))
                .ok_or_else(|| {
                    WinsysError::InvalidRegion(format!(
                        "write of {} bytes at offset {} exceeds the {} mapped bytes of {}",
                        data.len(),
                        offset,
                        mapped,
                        handle
                    ))
                })?;
            dst.copy_from_slice(data);
            Ok(())
        })
    }

    pub fn fill(&mut self, value: u8) {
        self.with_mut(|bytes| bytes.fill(value));
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.with(|bytes| bytes.to_vec())
    }
}

impl Drop for ResourceMap<'_> {
    fn drop(&mut self) {
        self.res.backing.lock().end_map();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(size: u32) -> Resource {
        let desc = ResourceDesc::buffer(BindFlags::VERTEX_BUFFER, size);
        Resource::new(ResourceHandle(7), desc, Backing::Host(vec![0; size as usize]), 0)
    }

    #[test]
    fn refcount_does_not_underflow() {
        let res = host(16);
        assert_eq!(res.acquire(), 2);
        assert_eq!(res.release(), Some(1));
        assert_eq!(res.release(), Some(0));
        assert_eq!(res.release(), None);
        res.revive();
        assert_eq!(res.refcount(), 1);
    }

    #[test]
    fn map_is_writable_until_released() {
        let res = host(4);
        res.map().write(0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(res.map().to_vec(), vec![1, 2, 3, 4]);

        assert!(matches!(res.take_backing(), Backing::Host(_)));
        assert!(res.map().is_empty());
    }

    #[test]
    fn maps_do_not_hold_the_resource_lock() {
        let res = host(8);
        let mut first = res.map();
        let second = res.map();
        first.write(4, &[9; 4]).unwrap();
        assert_eq!(res.with_mapped(|bytes| bytes[4]), 9);
        assert_eq!(second.to_vec(), vec![0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn out_of_range_write_is_rejected() {
        let res = host(4);
        let err = res.map().write(2, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, WinsysError::InvalidRegion(_)));
        assert!(res.map().write(usize::MAX, &[1]).is_err());
        assert_eq!(res.map().to_vec(), vec![0; 4]);
    }

    #[test]
    fn command_buffer_count_stops_at_zero() {
        let res = host(1);
        res.add_cs_ref();
        res.drop_cs_ref();
        res.drop_cs_ref();
        assert!(!res.is_referenced());
        res.add_cs_ref();
        assert!(res.is_referenced());
    }

    #[test]
    fn combined_binds_are_not_cacheable() {
        assert!(host(1).is_cacheable());
        let desc = ResourceDesc::buffer(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER, 1);
        let res = Resource::new(ResourceHandle(1), desc, Backing::Host(vec![0]), 0);
        assert!(!res.is_cacheable());
    }
}
