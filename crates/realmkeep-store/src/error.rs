//! Error types for the store layer.

/// Errors a [`DocumentStore`](crate::DocumentStore) call can produce.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the call.
    /// Synchronous paths abort on this; the periodic sweep retries.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An insert collided with an existing `_id`.
    #[error("duplicate key {id} in {collection}")]
    DuplicateKey { collection: String, id: String },

    /// A record is not shaped the way the store needs (e.g. no `_id`).
    #[error("malformed record: {0}")]
    Malformed(String),

    /// A typed record could not be converted to or from a document.
    #[error("record codec failed: {0}")]
    Codec(#[from] serde_json::Error),
}
