use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::media::store::{Document, DocumentStore, ObjectStore, ObjectStoreError};

/// In-process document store, for local runs and tests
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new(documents: BTreeMap<String, Document>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().await.get(path).cloned())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let existed = self.documents.write().await.remove(path).is_some();
        debug!("Deleted document {path} (existed: {existed})");
        Ok(())
    }

    async fn increment_and_touch(
        &self,
        path: &str,
        field: &str,
        delta: i64,
        touched_field: &str,
    ) -> Result<()> {
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(path) else {
            bail!("No document to update: {path}");
        };

        let updated = incremented(document.get(field), delta);
        document.insert(field.to_string(), updated);
        document.insert(
            touched_field.to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        Ok(())
    }
}

/// Adds `delta` to a numeric field, keeping float counters as floats
///
/// A missing or non-numeric field counts as zero.
#[allow(clippy::cast_precision_loss)]
fn incremented(current: Option<&Value>, delta: i64) -> Value {
    let Some(current) = current.filter(|v| v.is_number()) else {
        return Value::from(delta);
    };

    current
        .as_i64()
        .and_then(|n| n.checked_add(delta))
        .map_or_else(
            || Value::from(current.as_f64().unwrap_or_default() + delta as f64),
            Value::from,
        )
}

/// Object store backed by a directory; object paths are relative to `root`
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves an object path below the root, refusing anything that could escape it
    fn resolve(&self, object_path: &str) -> Result<PathBuf> {
        let relative = Path::new(object_path.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("Invalid object path: {object_path:?}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {
                debug!("Deleted object {}", file.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(anyhow!(e)
                .context(format!("Deleting object {}", file.display()))
                .into()),
        }
    }
}

/// Creates the storage root if it does not exist yet
///
/// # Errors
/// Errors if `root` cannot be created
pub async fn ensure_storage_root(root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("Creating storage root {}", root.display()))
}
