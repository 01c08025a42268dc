use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A document's fields, keyed by field name
pub type Document = Map<String, Value>;

/// Document database holding sessions, events and photos
///
/// Paths are slash-separated, e.g. `groups/peb/events/<event>/photos/<photo>`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns `None` when the document does not exist
    async fn get(&self, path: &str) -> Result<Option<Document>>;

    /// Deleting a missing document succeeds
    async fn delete(&self, path: &str) -> Result<()>;

    /// Atomically adds `delta` to a numeric field and sets `touched_field` to the server's
    /// current time. Fails if the document does not exist.
    async fn increment_and_touch(
        &self,
        path: &str,
        field: &str,
        delta: i64,
        touched_field: &str,
    ) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Blob storage holding the uploaded photos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError>;
}
