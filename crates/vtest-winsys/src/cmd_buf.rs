//! Command batches and the resources they keep alive.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::WinsysError;
use crate::registry::Registry;
use crate::resource::Resource;

pub const INITIAL_WORDS: usize = 512;
pub const INITIAL_RESOURCES: usize = 512;
pub const GROW_STEP: usize = 256;

/// Direct-mapped lookaside slots, keyed by `handle mod LOOKASIDE_SLOTS`.
const LOOKASIDE_SLOTS: usize = 512;

/// An append-only batch of command words plus the deduplicated set of
/// resources it references.
///
/// Every referenced resource gets one extra owner until the batch is
/// submitted or dropped.
pub struct CommandBuffer {
    registry: Arc<Registry>,
    words: Vec<u32>,
    resources: Vec<Arc<Resource>>,
    /// Last known index into `resources` per slot. A hint only; a miss falls
    /// back to scanning `resources`.
    lookaside: Box<[Option<u32>; LOOKASIDE_SLOTS]>,
}

impl CommandBuffer {
    pub fn new(registry: Arc<Registry>) -> Result<Self, WinsysError> {
        let mut words = Vec::new();
        reserve(&mut words, INITIAL_WORDS, "command words")?;
        let mut resources = Vec::new();
        reserve(&mut resources, INITIAL_RESOURCES, "referenced resources")?;
        Ok(Self {
            registry,
            words,
            resources,
            lookaside: Box::new([None; LOOKASIDE_SLOTS]),
        })
    }

    pub fn append_word(&mut self, word: u32) -> Result<(), WinsysError> {
        if self.words.len() == self.words.capacity() {
            reserve(&mut self.words, GROW_STEP, "command words")?;
        }
        self.words.push(word);
        Ok(())
    }

    pub fn append_words(&mut self, words: &[u32]) -> Result<(), WinsysError> {
        for &w in words {
            self.append_word(w)?;
        }
        Ok(())
    }

    /// Reference `res` from this batch, optionally writing its handle into
    /// the command stream. The first reference retains the resource.
    pub fn reference(&mut self, res: &Arc<Resource>, write_handle: bool) -> Result<(), WinsysError> {
        let present = self.lookup(res);
        if write_handle {
            self.append_word(res.handle().raw())?;
        }
        if present {
            return Ok(());
        }

        if self.resources.len() == self.resources.capacity() {
            reserve(&mut self.resources, GROW_STEP, "referenced resources")?;
        }
        self.registry.retain(res);
        res.add_cs_ref();
        self.lookaside[slot(res)] = Some(self.resources.len() as u32);
        self.resources.push(Arc::clone(res));
        Ok(())
    }

    /// Whether `res` is already referenced by this batch.
    pub fn lookup(&mut self, res: &Arc<Resource>) -> bool {
        let slot = slot(res);
        // Every added resource sets its slot, so an empty slot is a sure miss.
        let Some(hint) = self.lookaside[slot] else {
            return false;
        };
        if self
            .resources
            .get(hint as usize)
            .is_some_and(|r| Arc::ptr_eq(r, res))
        {
            return true;
        }
        match self.resources.iter().position(|r| Arc::ptr_eq(r, res)) {
            Some(i) => {
                self.lookaside[slot] = Some(i as u32);
                true
            }
            None => false,
        }
    }

    /// Send the batch and drop every reference it holds.
    ///
    /// References are released even when the send fails; the send error is
    /// returned in preference to a release error.
    pub fn submit(&mut self) -> Result<(), WinsysError> {
        if self.words.is_empty() {
            return Ok(());
        }
        debug!(words = self.words.len(), resources = self.resources.len(), "submit");
        let sent = self.registry.connection().submit_cmd(&self.words);
        let released = self.release_all();
        self.words.clear();
        sent.and(released)
    }

    fn release_all(&mut self) -> Result<(), WinsysError> {
        let mut first_err = None;
        for res in self.resources.drain(..) {
            res.drop_cs_ref();
            if let Err(e) = self.registry.release(&res) {
                first_err.get_or_insert(e);
            }
        }
        self.lookaside.fill(None);
        first_err.map_or(Ok(()), Err)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            warn!("releasing command buffer references failed: {}", e);
        }
    }
}

fn slot(res: &Resource) -> usize {
    res.handle().raw() as usize % LOOKASIDE_SLOTS
}

fn reserve<T>(v: &mut Vec<T>, additional: usize, what: &'static str) -> Result<(), WinsysError> {
    let requested = v.capacity() + additional;
    v.try_reserve_exact(additional)
        .map_err(|_| WinsysError::AllocationFailure { what, requested })
}
