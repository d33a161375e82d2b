//! Delayed-destruction pool for released buffers.
//!
//! Entries are ordered by insertion, and since every entry gets the same
//! retention window, also by expiry. Expired entries therefore always form a
//! prefix of the pool.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vtest_protocol::ResourceHandle;

use crate::resource::Resource;

struct CacheEntry {
    res: Arc<Resource>,
    expires: Instant,
}

#[derive(Default)]
pub struct DelayedPool {
    entries: BTreeMap<u64, CacheEntry>,
    index: HashMap<ResourceHandle, u64>,
    next_seq: u64,
}

impl DelayedPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `res` at the tail until `now + retention`.
    pub fn push(&mut self, res: Arc<Resource>, now: Instant, retention: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(old) = self.index.insert(res.handle(), seq) {
            self.entries.remove(&old);
        }
        self.entries.insert(
            seq,
            CacheEntry {
                res,
                expires: now + retention,
            },
        );
    }

    /// Remove and return the expired prefix of the pool.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Arc<Resource>> {
        let mut expired = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if now < entry.get().expires {
                break;
            }
            let entry = entry.remove();
            self.index.remove(&entry.res.handle());
            expired.push(entry.res);
        }
        expired
    }

    /// Pooled resources from oldest to newest, with their sequence numbers.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Arc<Resource>)> + '_ {
        self.entries.iter().map(|(&seq, entry)| (seq, &entry.res))
    }

    pub fn remove_seq(&mut self, seq: u64) -> Option<Arc<Resource>> {
        let entry = self.entries.remove(&seq)?;
        self.index.remove(&entry.res.handle());
        Some(entry.res)
    }

    pub fn remove(&mut self, handle: ResourceHandle) -> Option<Arc<Resource>> {
        let seq = self.index.get(&handle).copied()?;
        self.remove_seq(seq)
    }

    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.index.contains_key(&handle)
    }

    /// Empty the pool, oldest first.
    pub fn drain_all(&mut self) -> Vec<Arc<Resource>> {
        self.index.clear();
        std::mem::take(&mut self.entries)
            .into_values()
            .map(|entry| entry.res)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Backing, ResourceDesc};
    use vtest_protocol::BindFlags;

    fn buffer(handle: u32, size: u32) -> Arc<Resource> {
        let desc = ResourceDesc::buffer(BindFlags::VERTEX_BUFFER, size);
        Arc::new(Resource::new(
            ResourceHandle(handle),
            desc,
            Backing::Host(vec![0; size as usize]),
            0,
        ))
    }

    #[test]
    fn expired_prefix_is_taken_in_order() {
        let mut pool = DelayedPool::new();
        let t0 = Instant::now();
        let ttl = Duration::from_millis(100);
        pool.push(buffer(1, 8), t0, ttl);
        pool.push(buffer(2, 8), t0 + Duration::from_millis(10), ttl);
        pool.push(buffer(3, 8), t0 + Duration::from_millis(50), ttl);

        assert!(pool.take_expired(t0 + Duration::from_millis(99)).is_empty());

        let expired = pool.take_expired(t0 + Duration::from_millis(110));
        let handles: Vec<u32> = expired.iter().map(|r| r.handle().raw()).collect();
        assert_eq!(handles, vec![1, 2]);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(ResourceHandle(3)));
        assert!(!pool.contains(ResourceHandle(1)));
    }

    #[test]
    fn entry_expires_exactly_at_deadline() {
        let mut pool = DelayedPool::new();
        let t0 = Instant::now();
        pool.push(buffer(1, 8), t0, Duration::from_secs(1));
        assert_eq!(pool.take_expired(t0 + Duration::from_secs(1)).len(), 1);
    }

    #[test]
    fn removal_keeps_index_in_sync() {
        let mut pool = DelayedPool::new();
        let now = Instant::now();
        let ttl = Duration::from_secs(1);
        pool.push(buffer(1, 8), now, ttl);
        pool.push(buffer(2, 16), now, ttl);

        let (seq, _) = pool.iter().nth(1).unwrap();
        assert_eq!(pool.remove_seq(seq).unwrap().handle(), ResourceHandle(2));
        assert!(!pool.contains(ResourceHandle(2)));

        assert!(pool.remove(ResourceHandle(1)).is_some());
        assert!(pool.remove(ResourceHandle(1)).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn drain_returns_oldest_first() {
        let mut pool = DelayedPool::new();
        let now = Instant::now();
        for h in [5, 3, 9] {
            pool.push(buffer(h, 4), now, Duration::from_secs(1));
        }
        let drained: Vec<u32> = pool.drain_all().iter().map(|r| r.handle().raw()).collect();
        assert_eq!(drained, vec![5, 3, 9]);
        assert!(pool.is_empty());
        assert!(!pool.contains(ResourceHandle(5)));
    }
}
