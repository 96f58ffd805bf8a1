//! Model cache
//!
//! Each id owns a slot guarded by its own mutex. The first caller for an id
//! holds the slot lock while loading, so concurrent requests for the same
//! unloaded id wait for that single load instead of repeating it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::training::CrashRegressor;

use super::loader::ModelLoader;

type Slot = Arc<Mutex<Option<Arc<CrashRegressor>>>>;

/// How many models the cache keeps resident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Keep every model ever loaded
    #[default]
    Unbounded,
    /// Keep at most `capacity` models, dropping the least recently used
    Lru { capacity: usize },
}

impl EvictionPolicy {
    pub fn from_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::Lru { capacity: capacity.max(1) },
            None => Self::Unbounded,
        }
    }

    fn capacity(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Lru { capacity } => Some((*capacity).max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub capacity: Option<usize>,
}

#[derive(Default)]
struct CacheIndex {
    slots: HashMap<String, Slot>,
    /// Front is least recently used
    order: VecDeque<String>,
}

impl CacheIndex {
    fn touch(&mut self, model_id: &str) {
        if let Some(pos) = self.order.iter().position(|id| id == model_id) {
            self.order.remove(pos);
        }
        self.order.push_back(model_id.to_string());
    }

    fn remove(&mut self, model_id: &str) -> Option<Slot> {
        if let Some(pos) = self.order.iter().position(|id| id == model_id) {
            self.order.remove(pos);
        }
        self.slots.remove(model_id)
    }
}

/// Process-wide model cache keyed by model id.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    policy: EvictionPolicy,
    index: Mutex<CacheIndex>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>, policy: EvictionPolicy) -> Self {
        Self {
            loader,
            policy,
            index: Mutex::new(CacheIndex::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn loader(&self) -> &Arc<dyn ModelLoader> {
        &self.loader
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Return the cached model for `model_id`, loading it on first use.
    ///
    /// Blocks while another thread loads the same id. A failed load leaves
    /// nothing behind, so the next request retries storage.
    pub fn get_or_load(&self, model_id: &str) -> Result<Arc<CrashRegressor>> {
        let slot = {
            let mut index = self.index.lock();
            let slot = Arc::clone(index.slots.entry(model_id.to_string()).or_default());
            index.touch(model_id);
            slot
        };

        let mut guard = slot.lock();
        if let Some(model) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(model));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let model = match self.loader.load(model_id) {
            Ok(model) => Arc::new(model),
            Err(err) => {
                drop(guard);
                self.discard_empty(model_id, &slot);
                return Err(err);
            }
        };
        *guard = Some(Arc::clone(&model));
        drop(guard);

        info!(model_id, n_features = model.n_features(), "Model loaded into cache");
        self.enforce_capacity(model_id);
        Ok(model)
    }

    /// Drop `model_id` from the cache. Returns whether a loaded model was removed.
    pub fn evict(&self, model_id: &str) -> bool {
        let removed = self.index.lock().remove(model_id);
        match removed {
            Some(slot) => {
                let loaded = slot.lock().is_some();
                if loaded {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    info!(model_id, "Model evicted from cache");
                }
                loaded
            }
            None => false,
        }
    }

    pub fn contains(&self, model_id: &str) -> bool {
        let slot = self.index.lock().slots.get(model_id).cloned();
        slot.map_or(false, |slot| slot.lock().is_some())
    }

    pub fn len(&self) -> usize {
        self.index.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut index = self.index.lock();
        index.slots.clear();
        index.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            capacity: self.policy.capacity(),
        }
    }

    fn discard_empty(&self, model_id: &str, slot: &Slot) {
        let mut index = self.index.lock();
        let same_slot = index.slots.get(model_id).map_or(false, |s| Arc::ptr_eq(s, slot));
        // A slot another request is currently filling must survive.
        let still_empty = slot.try_lock().map_or(false, |s| s.is_none());
        if same_slot && still_empty {
            index.remove(model_id);
        }
    }

    /// Evict least recently used models until at most `capacity` are resident.
    ///
    /// Slots that are empty or locked belong to a load in flight; they are
    /// neither counted nor evicted.
    fn enforce_capacity(&self, just_loaded: &str) {
        let Some(capacity) = self.policy.capacity() else {
            return;
        };
        let mut index = self.index.lock();
        if index.slots.contains_key(just_loaded) {
            index.touch(just_loaded);
        }

        let resident: Vec<String> = index
            .order
            .iter()
            .filter(|id| index.slots.get(id.as_str()).map_or(false, is_resident))
            .cloned()
            .collect();
        let excess = resident.len().saturating_sub(capacity);

        for oldest in resident.into_iter().take(excess) {
            if index.remove(&oldest).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                info!(model_id = %oldest, capacity, "Evicted least recently used model");
            }
        }
    }
}

fn is_resident(slot: &Slot) -> bool {
    slot.try_lock().map_or(false, |s| s.is_some())
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("policy", &self.policy)
            .field("entries", &self.len())
            .finish()
    }
}
