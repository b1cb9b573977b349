//! In-process [`DocumentStore`] backed by hash maps.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::{Document, DocumentStore, Filter, Patch, StoreError};

/// A [`DocumentStore`] that keeps everything in memory.
///
/// Cloning is cheap and every clone sees the same data, so a test can keep
/// one handle for inspection while the world owns another.
///
/// Besides storing records it can simulate an unhealthy backend:
/// [`set_unavailable`](Self::set_unavailable) fails every call,
/// [`fail_writes_for`](Self::fail_writes_for) fails synchronous updates of
/// a single record and [`fail_reads_from`](Self::fail_reads_from) fails
/// lookups in one collection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Document>>,
    unavailable: bool,
    failing: HashSet<(String, String)>,
    failing_reads: HashSet<String>,
    writes: HashMap<(String, String), u64>,
}

/// Canonical map key for an `_id` value.
fn id_key(id: &Value) -> String {
    id.to_string()
}

fn serialize_id<I: Serialize>(id: I) -> Option<String> {
    serde_json::to_value(id).ok().map(|v| id_key(&v))
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`]
    /// (detached updates are dropped) until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    /// Makes `update_sync` fail for one record.
    pub fn fail_writes_for<I: Serialize>(&self, collection: &str, id: I) {
        if let Some(key) = serialize_id(id) {
            self.inner.lock().failing.insert((collection.to_string(), key));
        }
    }

    /// Makes `find_one` fail for every record in `collection`.
    pub fn fail_reads_from(&self, collection: &str) {
        self.inner.lock().failing_reads.insert(collection.to_string());
    }

    /// Clears every failure set by [`fail_writes_for`](Self::fail_writes_for)
    /// or [`fail_reads_from`](Self::fail_reads_from).
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.failing.clear();
        inner.failing_reads.clear();
    }

    /// Number of successful synchronous writes (insert or update) to a record.
    pub fn write_count<I: Serialize>(&self, collection: &str, id: I) -> u64 {
        let Some(key) = serialize_id(id) else {
            return 0;
        };
        self.inner
            .lock()
            .writes
            .get(&(collection.to_string(), key))
            .copied()
            .unwrap_or(0)
    }

    /// Reads a record directly, bypassing availability switches.
    pub fn get<I: Serialize>(&self, collection: &str, id: I) -> Option<Document> {
        let key = serialize_id(id)?;
        self.inner
            .lock()
            .collections
            .get(collection)
            .and_then(|c| c.get(&key))
            .cloned()
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the collection holds no records.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl Inner {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    fn record_write(&mut self, collection: &str, key: String) {
        *self.writes.entry((collection.to_string(), key)).or_insert(0) += 1;
    }
}

impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.lock();
        inner.check_available()?;
        if inner.failing_reads.contains(collection) {
            return Err(StoreError::Unavailable(format!("read from {collection} rejected")));
        }
        let Some(records) = inner.collections.get(collection) else {
            return Ok(None);
        };
        if key == "_id" {
            return Ok(records.get(&id_key(value)).cloned());
        }
        Ok(records.values().find(|doc| doc.get(key) == Some(value)).cloned())
    }

    async fn insert_sync(&self, collection: &str, record: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let key = record
            .get("_id")
            .map(id_key)
            .ok_or_else(|| StoreError::Malformed(format!("insert into {collection} without _id")))?;
        let records = inner.collections.entry(collection.to_string()).or_default();
        if records.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id: key,
            });
        }
        records.insert(key.clone(), record);
        inner.record_write(collection, key);
        Ok(())
    }

    async fn update_sync(
        &self,
        collection: &str,
        id: &Value,
        mut record: Document,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let key = id_key(id);
        if inner.failing.contains(&(collection.to_string(), key.clone())) {
            return Err(StoreError::Unavailable(format!(
                "write to {collection}/{key} rejected"
            )));
        }
        let Some(fields) = record.as_object_mut() else {
            return Err(StoreError::Malformed(format!(
                "update of {collection}/{key} is not an object"
            )));
        };
        fields.insert("_id".into(), id.clone());
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), record);
        inner.record_write(collection, key);
        Ok(())
    }

    fn update_detached(&self, collection: &str, filter: Filter, patch: Patch) {
        let mut inner = self.inner.lock();
        if inner.unavailable {
            tracing::warn!(collection, ?filter, "detached update dropped, store unavailable");
            return;
        }
        let Some(records) = inner.collections.get_mut(collection) else {
            tracing::debug!(collection, ?filter, "detached update matched nothing");
            return;
        };
        let mut matched = 0usize;
        for doc in records.values_mut().filter(|doc| filter.matches(doc)) {
            patch.apply(doc);
            matched += 1;
        }
        if matched == 0 {
            tracing::debug!(collection, ?filter, "detached update matched nothing");
        }
    }

    fn upsert_detached(&self, collection: &str, id: &Value, patch: Patch) {
        let mut inner = self.inner.lock();
        if inner.unavailable {
            tracing::warn!(collection, %id, "detached upsert dropped, store unavailable");
            return;
        }
        let doc = inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id_key(id))
            .or_insert_with(|| serde_json::json!({ "_id": id.clone() }));
        patch.apply(doc);
    }
}
