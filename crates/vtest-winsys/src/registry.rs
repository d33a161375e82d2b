//! Resource lifetime: creation, reference counting and the reuse cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use vtest_core::HandleAllocator;
use vtest_protocol::{BusyWaitFlags, DtCommand, ResourceHandle};

use crate::cache::DelayedPool;
use crate::connection::Connection;
use crate::display::{
    DisplayBackend, DisplayIds, DisplayTarget, DISPLAY_TARGET_ALIGNMENT, MAX_DISPLAY_TARGETS,
};
use crate::error::WinsysError;
use crate::resource::{Backing, Resource, ResourceDesc};

pub struct Registry {
    conn: Arc<Connection>,
    handles: HandleAllocator,
    /// Released cacheable resources. The lock is held across the busy poll
    /// of a reuse candidate.
    pool: Mutex<DelayedPool>,
    /// Resources with at least one owner.
    live: DashMap<ResourceHandle, Arc<Resource>>,
    retention: Duration,
    display: Option<Arc<dyn DisplayBackend>>,
    dt_ids: DisplayIds,
}

impl Registry {
    pub fn new(
        conn: Arc<Connection>,
        retention: Duration,
        display: Option<Arc<dyn DisplayBackend>>,
    ) -> Self {
        Self {
            conn,
            handles: HandleAllocator::new(),
            pool: Mutex::new(DelayedPool::new()),
            live: DashMap::new(),
            retention,
            display,
            dt_ids: DisplayIds::default(),
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Create a resource, reusing an idle pooled one when the bind is cacheable.
    pub fn create(&self, desc: ResourceDesc) -> Result<Arc<Resource>, WinsysError> {
        if desc.bind.is_cacheable() {
            if let Some(res) = self.reuse(&desc)? {
                return Ok(res);
            }
        }
        self.allocate(desc)
    }

    /// Look for a pooled resource with the same bind and format whose size
    /// `S` satisfies `R <= S < 2R` for the requested size `R`.
    ///
    /// Expired entries are destroyed first. The first compatible entry is
    /// polled; if the renderer still uses it the search stops and the caller
    /// allocates fresh.
    fn reuse(&self, desc: &ResourceDesc) -> Result<Option<Arc<Resource>>, WinsysError> {
        let (expired, found) = {
            let mut pool = self.pool.lock();
            let expired = pool.take_expired(Instant::now());
            let found = match self.find_idle(&pool, desc) {
                Ok(Some(seq)) => Ok(pool.remove_seq(seq)),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };
            (expired, found)
        };
        self.destroy_each(expired)?;

        let res = found?;
        if let Some(res) = &res {
            res.revive();
            self.live.insert(res.handle(), Arc::clone(res));
            debug!(handle = %res.handle(), size = res.size(), requested = desc.size, "reused cached resource");
        }
        Ok(res)
    }

    fn find_idle(&self, pool: &DelayedPool, desc: &ResourceDesc) -> Result<Option<u64>, WinsysError> {
        for (seq, res) in pool.iter() {
            if !is_compatible(res.desc(), desc) {
                continue;
            }
            if self.conn.busy_wait(res.handle(), BusyWaitFlags::empty())? {
                trace!(handle = %res.handle(), "cache candidate still busy");
                return Ok(None);
            }
            return Ok(Some(seq));
        }
        Ok(None)
    }

    /// Allocate a new handle and backing store and create the resource remotely.
    pub fn allocate(&self, desc: ResourceDesc) -> Result<Arc<Resource>, WinsysError> {
        let handle = self.handles.alloc().ok_or(WinsysError::HandlesExhausted)?;

        let (backing, stride) = if desc.bind.needs_display_target() {
            self.create_display_target(handle, &desc)?
        } else {
            (Backing::Host(host_memory(desc.size)?), 0)
        };

        if let Err(e) = self.conn.resource_create(&desc.create_command(handle)) {
            if let Backing::Display(dt) = backing {
                self.abandon_display_target(dt.id);
            }
            return Err(e);
        }

        let res = Arc::new(Resource::new(handle, desc, backing, stride));
        self.live.insert(handle, Arc::clone(&res));
        Ok(res)
    }

    fn create_display_target(
        &self,
        handle: ResourceHandle,
        desc: &ResourceDesc,
    ) -> Result<(Backing, u32), WinsysError> {
        let backend = self
            .display
            .as_ref()
            .ok_or(WinsysError::NoDisplayBackend(handle))?;
        let id = self
            .dt_ids
            .alloc()
            .ok_or(WinsysError::DisplayTargetsExhausted(MAX_DISPLAY_TARGETS))?;

        let created = backend
            .create_target(desc.bind, desc.format, desc.width, desc.height, DISPLAY_TARGET_ALIGNMENT)
            .and_then(|(target, stride)| {
                self.conn
                    .dt_command(&DtCommand::create(id, desc.width, desc.height))
                    .map(|()| (target, stride))
            });
        match created {
            Ok((target, stride)) => {
                debug!(%handle, id, stride, "display target created");
                Ok((Backing::Display(DisplayTarget::new(id, target)), stride))
            }
            Err(e) => {
                self.dt_ids.free(id);
                Err(e)
            }
        }
    }

    /// Tear down a display target whose resource never came to exist. The
    /// id is freed even if the renderer cannot be told.
    fn abandon_display_target(&self, id: u32) {
        if let Err(e) = self.conn.dt_command(&DtCommand::destroy(id)) {
            warn!(id, "failed to destroy orphaned display target: {}", e);
        }
        self.dt_ids.free(id);
    }

    /// Add an owner.
    pub fn retain(&self, res: &Arc<Resource>) {
        res.acquire();
    }

    /// Drop an owner. The last release parks a cacheable resource in the
    /// pool and destroys anything else.
    pub fn release(&self, res: &Arc<Resource>) -> Result<(), WinsysError> {
        match res.release() {
            None => {
                warn!(handle = %res.handle(), "release of a resource without owners");
                Ok(())
            }
            Some(0) => {
                self.live.remove(&res.handle());
                if res.is_cacheable() {
                    let expired = {
                        let mut pool = self.pool.lock();
                        let now = Instant::now();
                        let expired = pool.take_expired(now);
                        pool.push(Arc::clone(res), now, self.retention);
                        expired
                    };
                    trace!(handle = %res.handle(), "resource parked in cache");
                    self.destroy_each(expired)
                } else {
                    self.destroy(res)
                }
            }
            Some(_) => Ok(()),
        }
    }

    /// Unreference the resource remotely and free its backing store.
    /// Destroying an already destroyed resource does nothing.
    pub fn destroy(&self, res: &Resource) -> Result<(), WinsysError> {
        let backing = res.take_backing();
        if matches!(backing, Backing::Released) {
            return Ok(());
        }
        debug!(handle = %res.handle(), "destroy resource");

        let unref = self.conn.resource_unref(res.handle());
        let dt = match backing {
            Backing::Display(dt) => {
                let sent = self.conn.dt_command(&DtCommand::destroy(dt.id));
                self.dt_ids.free(dt.id);
                sent
            }
            _ => Ok(()),
        };
        unref.and(dt)
    }

    /// Destroy every pooled resource regardless of expiry.
    pub fn destroy_all_cached(&self) -> Result<usize, WinsysError> {
        let cached = self.pool.lock().drain_all();
        let count = cached.len();
        self.destroy_each(cached)?;
        if count > 0 {
            debug!(count, "resource cache flushed");
        }
        Ok(count)
    }

    /// Destroy all of `list`, reporting the first failure.
    fn destroy_each(&self, list: Vec<Arc<Resource>>) -> Result<(), WinsysError> {
        let mut first_err = None;
        for res in list {
            if let Err(e) = self.destroy(&res) {
                warn!(handle = %res.handle(), "failed to destroy resource: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Non-blocking busy query.
    pub fn is_busy(&self, res: &Resource) -> Result<bool, WinsysError> {
        self.conn.busy_wait(res.handle(), BusyWaitFlags::empty())
    }

    /// Block until the renderer is done with `res`.
    pub fn wait(&self, res: &Resource) -> Result<(), WinsysError> {
        self.conn.busy_wait(res.handle(), BusyWaitFlags::WAIT)?;
        Ok(())
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_handles(&self) -> Vec<ResourceHandle> {
        let mut handles: Vec<_> = self.live.iter().map(|e| *e.key()).collect();
        handles.sort_by_key(|h| h.raw());
        handles
    }

    pub fn cached_count(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_cached(&self, handle: ResourceHandle) -> bool {
        self.pool.lock().contains(handle)
    }

    pub fn display_targets_in_use(&self) -> u32 {
        self.dt_ids.in_use()
    }

    pub fn handles_allocated(&self) -> u32 {
        self.handles.allocated()
    }
}

fn is_compatible(pooled: &ResourceDesc, wanted: &ResourceDesc) -> bool {
    let (size, requested) = (u64::from(pooled.size), u64::from(wanted.size));
    pooled.bind == wanted.bind
        && pooled.format == wanted.format
        && size >= requested
        && size < 2 * requested
}

fn host_memory(size: u32) -> Result<Vec<u8>, WinsysError> {
    let len = size as usize;
    let mut mem = Vec::new();
    mem.try_reserve_exact(len)
        .map_err(|_| WinsysError::AllocationFailure { what: "resource backing", requested: len })?;
    mem.resize(len, 0);
    Ok(mem)
}
