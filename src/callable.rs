use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

/// Error kinds a callable endpoint can report back to its caller
///
/// The message is shown to the caller as-is, so it must never carry secrets.
#[derive(Debug, Error)]
pub enum CallableError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    ResourceExhausted(String),

    #[error("{0}")]
    Internal(String),
}

impl CallableError {
    /// Status string used on the wire, e.g. `INVALID_ARGUMENT`
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for CallableError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl IntoResponse for CallableError {
    fn into_response(self) -> Response {
        if let Self::Internal(message) = &self {
            error!("Callable failed: {message}");
        }

        let body = json!({
            "error": {
                "status": self.status(),
                "message": self.to_string(),
            }
        });
        (self.http_status(), Json(body)).into_response()
    }
}

/// Incoming callable envelope: `{"data": ...}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallableRequest {
    #[serde(default)]
    pub data: Value,
}

/// Outgoing callable envelope: `{"result": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct CallableResponse<T> {
    pub result: T,
}

impl<T: Serialize> IntoResponse for CallableResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Authenticated caller of a callable, as resolved from its ID token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
}
