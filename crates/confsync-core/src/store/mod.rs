//! Normalized result store.
//!
//! Each subscription push carries a complete page snapshot. The store keeps
//! one flat entity table per [`CollectionKey`], replaces it wholesale on every
//! snapshot, and reports which ids were added, updated or removed so callers
//! can re-render only what changed.
//!
//! Snapshots for the same key are applied under that key's mutex; distinct
//! keys never contend.

mod change;
mod key;
mod stats;

pub use change::ChangeSet;
pub use key::CollectionKey;
pub use stats::StoreStats;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use confsync_proto::{Entity, Page, PageMeta};

/// Cached state of one collection key.
#[derive(Debug)]
struct Collection<T> {
    /// Ids in snapshot order.
    order: Vec<String>,
    /// Rows by id.
    entities: HashMap<String, T>,
    /// Envelope of the last snapshot.
    meta: Option<PageMeta>,
    /// Null rows in the last snapshot.
    failed_rows: usize,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entities: HashMap::new(),
            meta: None,
            failed_rows: 0,
        }
    }
}

/// Flat entity tables keyed by collection key, then by entity id.
pub struct NormalizedStore<T> {
    collections: DashMap<CollectionKey, Arc<Mutex<Collection<T>>>>,
    stats: StoreStats,
}

impl<T> NormalizedStore<T>
where
    T: Entity + Clone + PartialEq,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            stats: StoreStats::default(),
        }
    }

    /// Replace the cached snapshot for `key` with `page`.
    ///
    /// Rows present in the previous snapshot but missing from `page` are
    /// evicted. A retained row is reported as updated when it differs from
    /// the cached copy, or when the page envelope changed. Applying the same
    /// snapshot twice yields an empty change set.
    pub fn apply(&self, key: &CollectionKey, page: &Page<T>) -> ChangeSet {
        loop {
            let slot = self
                .collections
                .entry(key.clone())
                .or_default()
                .value()
                .clone();
            let mut collection = slot.lock();

            // An evict between the clone and the lock orphans `slot`.
            if self.is_live(key, &slot) {
                return self.replace(key, &mut collection, page);
            }
        }
    }

    fn replace(
        &self,
        key: &CollectionKey,
        collection: &mut Collection<T>,
        page: &Page<T>,
    ) -> ChangeSet {
        if !page.count_is_consistent() {
            tracing::warn!(
                collection = %key,
                total_count = page.total_count,
                rows = page.len(),
                "total_count is smaller than the page; trusting the snapshot"
            );
        }

        let mut order: Vec<String> = Vec::with_capacity(page.len());
        let mut entities: HashMap<String, T> = HashMap::with_capacity(page.len());
        for row in page.rows() {
            let id = row.id().to_string();
            if entities.insert(id.clone(), row.clone()).is_none() {
                order.push(id);
            }
        }

        let meta = page.meta();
        let envelope_changed = collection.meta.is_some_and(|prev| prev != meta);

        let mut changes = ChangeSet::new();
        for id in &order {
            match collection.entities.get(id) {
                None => changes.added.push(id.clone()),
                Some(previous) => {
                    if envelope_changed || entities.get(id) != Some(previous) {
                        changes.updated.push(id.clone());
                    }
                }
            }
        }
        for id in &collection.order {
            if !entities.contains_key(id) {
                changes.removed.push(id.clone());
            }
        }

        let failed_rows = page.failed_rows();
        collection.order = order;
        collection.entities = entities;
        collection.meta = Some(meta);
        collection.failed_rows = failed_rows;

        self.stats.record(&changes, failed_rows);

        tracing::debug!(
            collection = %key,
            added = changes.added.len(),
            updated = changes.updated.len(),
            removed = changes.removed.len(),
            failed_rows,
            "applied snapshot"
        );

        changes
    }

    /// Drop a collection key, returning the ids it held.
    pub fn evict(&self, key: &CollectionKey) -> Vec<String> {
        match self.collections.remove(key) {
            Some((_, slot)) => {
                let removed = std::mem::take(&mut slot.lock().order);
                self.stats.record_eviction(removed.len());
                tracing::debug!(collection = %key, removed = removed.len(), "evicted collection");
                removed
            }
            None => Vec::new(),
        }
    }

    /// Get a cached row.
    pub fn get(&self, key: &CollectionKey, id: &str) -> Option<T> {
        let slot = self.slot(key)?;
        let collection = slot.lock();
        collection.entities.get(id).cloned()
    }

    /// Check whether a row is cached.
    pub fn contains(&self, key: &CollectionKey, id: &str) -> bool {
        self.slot(key)
            .map(|slot| slot.lock().entities.contains_key(id))
            .unwrap_or(false)
    }

    /// Cached ids in snapshot order.
    pub fn ids(&self, key: &CollectionKey) -> Vec<String> {
        self.slot(key)
            .map(|slot| slot.lock().order.clone())
            .unwrap_or_default()
    }

    /// Cached rows in snapshot order.
    pub fn entities(&self, key: &CollectionKey) -> Vec<T> {
        let Some(slot) = self.slot(key) else {
            return Vec::new();
        };
        let collection = slot.lock();
        collection
            .order
            .iter()
            .filter_map(|id| collection.entities.get(id).cloned())
            .collect()
    }

    /// Envelope of the last snapshot for `key`.
    pub fn meta(&self, key: &CollectionKey) -> Option<PageMeta> {
        self.slot(key).and_then(|slot| slot.lock().meta)
    }

    /// Null rows in the last snapshot for `key`.
    pub fn failed_rows(&self, key: &CollectionKey) -> usize {
        self.slot(key)
            .map(|slot| slot.lock().failed_rows)
            .unwrap_or(0)
    }

    /// Number of cached rows under `key`.
    pub fn len(&self, key: &CollectionKey) -> usize {
        self.slot(key)
            .map(|slot| slot.lock().entities.len())
            .unwrap_or(0)
    }

    /// Check whether no collection is cached.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Cached collection keys, sorted.
    pub fn keys(&self) -> Vec<CollectionKey> {
        let mut keys: Vec<CollectionKey> =
            self.collections.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Store statistics.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn slot(&self, key: &CollectionKey) -> Option<Arc<Mutex<Collection<T>>>> {
        self.collections.get(key).map(|entry| entry.value().clone())
    }

    fn is_live(&self, key: &CollectionKey, slot: &Arc<Mutex<Collection<T>>>) -> bool {
        self.collections
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot))
    }
}

impl<T> Default for NormalizedStore<T>
where
    T: Entity + Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for NormalizedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedStore")
            .field("collections", &self.collections.len())
            .field("applies", &self.stats.applies())
            .finish()
    }
}

/// Shared store handle.
pub type SharedStore<T> = Arc<NormalizedStore<T>>;
