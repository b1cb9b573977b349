//! The [`DocumentStore`] trait.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{Filter, Patch, StoreError};

/// A stored record: a JSON object with an `_id` field.
pub type Document = Value;

/// A key-indexed document store.
///
/// The synchronous calls are `async` from Rust's point of view but
/// "synchronous" in the protocol sense: the caller waits for the outcome
/// and acts on it. [`update_detached`](Self::update_detached) is
/// fire-and-forget: the caller never learns whether it landed.
///
/// `Send + Sync + 'static` because one store is shared by every player
/// task in a world, and the returned futures are `Send` so they can be
/// awaited inside spawned tasks.
pub trait DocumentStore: Send + Sync + 'static {
    /// Finds the first record in `collection` whose `key` equals `value`.
    ///
    /// Returns `Ok(None)` when nothing matches.
    fn find_one(
        &self,
        collection: &str,
        key: &str,
        value: &Value,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Inserts a new record.
    ///
    /// # Errors
    /// - [`StoreError::DuplicateKey`] if the `_id` is taken
    /// - [`StoreError::Unavailable`] if the store can't be reached
    fn insert_sync(
        &self,
        collection: &str,
        record: Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replaces the record with `_id == id`, inserting it if absent.
    ///
    /// Upserting keeps module writes idempotent: calling this twice with
    /// the same record leaves the store in the same state.
    fn update_sync(
        &self,
        collection: &str,
        id: &Value,
        record: Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Applies `patch` to every record matching `filter`, without waiting.
    ///
    /// Used for low-stakes incremental updates. Failures are logged by the
    /// implementation and never reported back.
    fn update_detached(&self, collection: &str, filter: Filter, patch: Patch);

    /// Applies `patch` to the record with `_id == id`, without waiting.
    /// A missing record is created as `{"_id": id}` first.
    fn upsert_detached(&self, collection: &str, id: &Value, patch: Patch);
}

/// Serializes a typed record into a [`Document`].
pub fn to_document<T: Serialize>(record: &T) -> Result<Document, StoreError> {
    Ok(serde_json::to_value(record)?)
}

/// Deserializes a [`Document`] into a typed record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(doc)?)
}
