use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    callable::{CallableError, Caller},
    media::store::{DocumentStore, ObjectStore, ObjectStoreError},
};

/// Session role allowed to delete anyone's media
pub const PRIVILEGED_ROLE: &str = "DIOS";

pub const PHOTO_COUNT_FIELD: &str = "photoCount";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// A validated deletion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMediaRequest {
    pub event_id: String,
    pub photo_id: String,
    pub storage_path: String,
}

impl DeleteMediaRequest {
    /// Every field must be a non-empty string
    fn from_data(data: &Value) -> Option<Self> {
        let field = |name: &str| {
            data.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        };

        Some(Self {
            event_id: field("eventId")?,
            photo_id: field("photoId")?,
            storage_path: field("storagePath")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteAck {
    pub ok: bool,
}

/// Deletes a photo on behalf of a privileged group member
///
/// The steps run in order and are not wrapped in a transaction: storage object, photo
/// document, then the event's photo counter. The first two are idempotent, so a failed
/// call can be retried; a crash before the counter update leaves the count one too high.
pub struct MediaDeleter {
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    group_id: String,
}

impl MediaDeleter {
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            objects,
            group_id: group_id.into(),
        }
    }

    fn session_path(&self, uid: &str) -> String {
        format!("groups/{}/sessions/{uid}", self.group_id)
    }

    fn event_path(&self, event_id: &str) -> String {
        format!("groups/{}/events/{event_id}", self.group_id)
    }

    fn photo_path(&self, event_id: &str, photo_id: &str) -> String {
        format!("{}/photos/{photo_id}", self.event_path(event_id))
    }

    /// Looks up the caller's role in their session document
    async fn caller_role(&self, uid: &str) -> Result<Option<String>, CallableError> {
        let session = self
            .documents
            .get(&self.session_path(uid))
            .await
            .context("Reading caller session")?;

        Ok(session
            .and_then(|s| s.get("role").cloned())
            .and_then(|role| role.as_str().map(ToString::to_string)))
    }

    /// # Errors
    /// * `Unauthenticated` without a caller
    /// * `InvalidArgument` when `eventId`, `photoId` or `storagePath` is missing or empty
    /// * `PermissionDenied` unless the caller's session role is [`PRIVILEGED_ROLE`]
    /// * `Internal` when a store fails
    #[instrument(skip(self, caller, data), fields(uid = caller.map(|c| c.uid.as_str())))]
    pub async fn delete(
        &self,
        caller: Option<&Caller>,
        data: &Value,
    ) -> Result<DeleteAck, CallableError> {
        let Some(caller) = caller else {
            return Err(CallableError::Unauthenticated("Not logged in.".into()));
        };

        let Some(request) = DeleteMediaRequest::from_data(data) else {
            return Err(CallableError::InvalidArgument("Missing parameters.".into()));
        };

        let role = self.caller_role(&caller.uid).await?;
        if role.as_deref() != Some(PRIVILEGED_ROLE) {
            warn!("Refusing media deletion for role {role:?}");
            return Err(CallableError::PermissionDenied(format!(
                "Only {PRIVILEGED_ROLE} can do this."
            )));
        }

        match self.objects.delete(&request.storage_path).await {
            Ok(()) | Err(ObjectStoreError::NotFound(_)) => {}
            Err(ObjectStoreError::Other(e)) => {
                return Err(e.context("Deleting stored photo").into());
            }
        }

        self.documents
            .delete(&self.photo_path(&request.event_id, &request.photo_id))
            .await
            .context("Deleting photo document")?;

        self.documents
            .increment_and_touch(
                &self.event_path(&request.event_id),
                PHOTO_COUNT_FIELD,
                -1,
                UPDATED_AT_FIELD,
            )
            .await
            .context("Updating event photo count")?;

        info!(
            "Deleted photo {} from event {}",
            request.photo_id, request.event_id
        );
        Ok(DeleteAck { ok: true })
    }
}
