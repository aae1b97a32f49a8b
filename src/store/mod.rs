//! Single source of truth for all collections during process lifetime.
//!
//! CRUD operations are synchronous and atomic with respect to each other:
//! the in-memory state lives behind one `parking_lot::RwLock` and no
//! operation can observe another's half-finished mutation. Only `flush` and
//! `reload` touch the disk; those, together with backup restore, are
//! serialized by a single maintenance lock so two writers never race on the
//! same collection file.

pub mod document;

use crate::config::{DocDbConfig, DurabilityMode};
use crate::error::DocDbError;
use crate::persist;
use document::{doc_id, Document};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default)]
struct CollectionState {
    docs: Vec<Document>,
    dirty: bool,
}

#[derive(Debug)]
pub struct DocStore {
    data_dir: PathBuf,
    durability: DurabilityMode,
    pretty_json: bool,
    state: RwLock<BTreeMap<String, CollectionState>>,
    maintenance: tokio::sync::Mutex<()>,
}

/// Proof that the maintenance lock is held. Disk-mutating sequences
/// (flush, restore's copy-then-reload) take one of these for their whole
/// duration.
pub(crate) struct MaintenanceGuard<'a>(#[allow(dead_code)] tokio::sync::MutexGuard<'a, ()>);

impl DocStore {
    /// Reads every collection file from the data directory into memory.
    /// A missing data directory yields empty collections; any other I/O
    /// failure propagates.
    pub fn open(config: &DocDbConfig) -> Result<Self, DocDbError> {
        let loaded = persist::load_data_dir(&config.data_dir)?;
        let records: usize = loaded.values().map(Vec::len).sum();
        info!(
            data_dir = %config.data_dir.display(),
            collections = loaded.len(),
            records,
            "store loaded"
        );
        let state = loaded
            .into_iter()
            .map(|(name, docs)| (name, CollectionState { docs, dirty: false }))
            .collect();
        Ok(Self {
            data_dir: config.data_dir.clone(),
            durability: config.durability_mode,
            pretty_json: config.pretty_json,
            state: RwLock::new(state),
            maintenance: tokio::sync::Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ---- reads -----------------------------------------------------------

    /// Snapshot of the whole collection in insertion order. Callers must
    /// treat the returned documents as read-only copies; mutations go
    /// through `insert`/`update`/`delete`.
    pub fn get_all(&self, collection: &str) -> Vec<Document> {
        self.state
            .read()
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    pub fn get_by_id(&self, collection: &str, id: &str) -> Option<Document> {
        self.state
            .read()
            .get(collection)?
            .docs
            .iter()
            .find(|d| doc_id(d) == Some(id))
            .cloned()
    }

    pub fn find(
        &self,
        collection: &str,
        predicate: impl Fn(&Document) -> bool,
    ) -> Vec<Document> {
        self.state
            .read()
            .get(collection)
            .map(|c| c.docs.iter().filter(|d| predicate(d)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn find_one(
        &self,
        collection: &str,
        predicate: impl Fn(&Document) -> bool,
    ) -> Option<Document> {
        self.state
            .read()
            .get(collection)?
            .docs
            .iter()
            .find(|d| predicate(d))
            .cloned()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.state.read().keys().cloned().collect()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    pub fn is_dirty(&self, collection: &str) -> bool {
        self.state
            .read()
            .get(collection)
            .map(|c| c.dirty)
            .unwrap_or(false)
    }

    // ---- writes ----------------------------------------------------------

    /// Assigns a fresh id and timestamps when absent, appends, marks the
    /// collection dirty and returns the stored document. A caller-supplied
    /// id that already exists in the collection is rejected.
    pub fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, DocDbError> {
        document::stamp_new(&mut doc);
        let mut state = self.state.write();
        let coll = state.entry(collection.to_string()).or_default();
        let id = doc_id(&doc).expect("id stamped on insert");
        if coll.docs.iter().any(|d| doc_id(d) == Some(id)) {
            return Err(DocDbError::Validation(format!(
                "duplicate id '{id}' in collection '{collection}'"
            )));
        }
        coll.docs.push(doc.clone());
        coll.dirty = true;
        Ok(doc)
    }

    /// Batch insert; rejects the whole batch when any supplied id collides,
    /// so a partial append never happens.
    pub fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<Vec<Document>, DocDbError> {
        let mut stamped: Vec<Document> = docs;
        for doc in &mut stamped {
            document::stamp_new(doc);
        }
        let mut state = self.state.write();
        let coll = state.entry(collection.to_string()).or_default();
        let mut batch_ids = std::collections::HashSet::new();
        for doc in &stamped {
            let id = doc_id(doc).expect("id stamped on insert");
            if !batch_ids.insert(id.to_string())
                || coll.docs.iter().any(|d| doc_id(d) == Some(id))
            {
                return Err(DocDbError::Validation(format!(
                    "duplicate id '{id}' in collection '{collection}'"
                )));
            }
        }
        coll.docs.extend(stamped.iter().cloned());
        coll.dirty = true;
        Ok(stamped)
    }

    /// Shallow-merges `patch` into the record: patch fields replace,
    /// explicit `null` clears, omitted fields stay untouched; `updatedAt`
    /// is refreshed. Returns `None` when the id is absent.
    pub fn update(&self, collection: &str, id: &str, patch: &Document) -> Option<Document> {
        let mut state = self.state.write();
        let coll = state.get_mut(collection)?;
        let doc = coll.docs.iter_mut().find(|d| doc_id(d) == Some(id))?;
        document::apply_patch(doc, patch);
        let updated = doc.clone();
        coll.dirty = true;
        Some(updated)
    }

    /// Removes the record with the given id. `false` when absent.
    pub fn delete(&self, collection: &str, id: &str) -> bool {
        let mut state = self.state.write();
        let Some(coll) = state.get_mut(collection) else {
            return false;
        };
        let before = coll.docs.len();
        coll.docs.retain(|d| doc_id(d) != Some(id));
        if coll.docs.len() != before {
            coll.dirty = true;
            true
        } else {
            false
        }
    }

    /// Removes every matching record and returns them in insertion order.
    pub fn delete_where(
        &self,
        collection: &str,
        predicate: impl Fn(&Document) -> bool,
    ) -> Vec<Document> {
        let mut state = self.state.write();
        let Some(coll) = state.get_mut(collection) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(coll.docs.len());
        for doc in coll.docs.drain(..) {
            if predicate(&doc) {
                removed.push(doc);
            } else {
                kept.push(doc);
            }
        }
        coll.docs = kept;
        if !removed.is_empty() {
            coll.dirty = true;
        }
        removed
    }

    // ---- maintenance -----------------------------------------------------

    pub(crate) async fn lock_maintenance(&self) -> MaintenanceGuard<'_> {
        MaintenanceGuard(self.maintenance.lock().await)
    }

    /// Persists every dirty collection and clears its flag. Returns the
    /// number of collections written.
    pub async fn flush(&self) -> Result<usize, DocDbError> {
        let guard = self.lock_maintenance().await;
        self.flush_locked(&guard)
    }

    /// Discards all in-memory state and re-reads the data directory. Used
    /// after a restore to make new on-disk content live.
    pub async fn reload(&self) -> Result<(), DocDbError> {
        let guard = self.lock_maintenance().await;
        self.reload_locked(&guard)
    }

    pub(crate) fn flush_locked(
        &self,
        _guard: &MaintenanceGuard<'_>,
    ) -> Result<usize, DocDbError> {
        // Snapshot dirty collections and clear their flags in one critical
        // section. A mutation landing after this point re-dirties its
        // collection and is picked up by the next flush, never torn into
        // the current write.
        let snapshots: Vec<(String, Vec<Document>)> = {
            let mut state = self.state.write();
            state
                .iter_mut()
                .filter(|(_, c)| c.dirty)
                .map(|(name, c)| {
                    c.dirty = false;
                    (name.clone(), c.docs.clone())
                })
                .collect()
        };
        for (pos, (name, docs)) in snapshots.iter().enumerate() {
            if let Err(err) = persist::write_collection_atomic(
                &self.data_dir,
                name,
                docs,
                self.durability,
                self.pretty_json,
            ) {
                // Nothing from `pos` onward reached disk; re-mark so the
                // next flush retries them.
                let mut state = self.state.write();
                for (name, _) in &snapshots[pos..] {
                    if let Some(coll) = state.get_mut(name) {
                        coll.dirty = true;
                    }
                }
                return Err(err);
            }
        }
        if !snapshots.is_empty() {
            info!(collections = snapshots.len(), "flushed dirty collections");
        }
        Ok(snapshots.len())
    }

    pub(crate) fn reload_locked(
        &self,
        _guard: &MaintenanceGuard<'_>,
    ) -> Result<(), DocDbError> {
        let loaded = persist::load_data_dir(&self.data_dir)?;
        let fresh: BTreeMap<String, CollectionState> = loaded
            .into_iter()
            .map(|(name, docs)| (name, CollectionState { docs, dirty: false }))
            .collect();
        let mut state = self.state.write();
        *state = fresh;
        info!(collections = state.len(), "store reloaded from disk");
        Ok(())
    }
}
