use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, header::AUTHORIZATION},
    routing::post,
};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    callable::{CallableError, CallableRequest, CallableResponse, Caller},
    media::{MediaDeleter, delete::DeleteAck, store::Document},
    spotify::{
        SpotifyConfig, SpotifyError, import_playlist, structs::PlaylistImport,
        utils::extract_playlist_id,
    },
};

/// Resolves a caller's ID token to their uid
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Returns `None` for unknown or expired tokens
    async fn verify(&self, id_token: &str) -> Result<Option<String>>;
}

/// Maps ID tokens to uids, for local runs
#[derive(Debug, Default)]
pub struct StaticIdentities {
    tokens: HashMap<String, String>,
}

impl StaticIdentities {
    #[must_use]
    pub const fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentities {
    async fn verify(&self, id_token: &str) -> Result<Option<String>> {
        Ok(self.tokens.get(id_token).cloned())
    }
}

/// Initial state for a local run: known ID tokens and pre-existing documents
#[derive(Debug, Default, Deserialize)]
pub struct LocalSeed {
    #[serde(default)]
    pub identities: HashMap<String, String>,
    #[serde(default)]
    pub documents: BTreeMap<String, Document>,
}

impl LocalSeed {
    /// # Errors
    /// Errors when the file cannot be read or is not a valid seed
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Reading seed file {}", path.display()))?;
        let seed: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Parsing seed file {}", path.display()))?;
        info!(
            "Loaded {} identities and {} documents from seed",
            seed.identities.len(),
            seed.documents.len()
        );
        Ok(seed)
    }
}

pub struct AppState {
    pub http: reqwest::Client,
    /// `None` when no Spotify credentials were provided; imports then fail as internal
    pub spotify: Option<SpotifyConfig>,
    pub deleter: MediaDeleter,
    pub identities: Arc<dyn IdentityVerifier>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/spotifyGetPlaylistTracks", post(spotify_get_playlist_tracks))
        .route("/deleteMediaAsGod", post(delete_media_as_god))
        .with_state(state)
}

/// Serves the callables until `ct` is cancelled
///
/// # Errors
/// Errors when the address cannot be bound or the server dies
pub async fn serve(listen: SocketAddr, state: AppState, ct: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Binding HTTP server to {listen}"))?;
    info!("Serving callables on http://{listen}");

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(ct.cancelled_owned())
        .await
        .context("Running HTTP server")?;

    info!("HTTP server stopped");
    Ok(())
}

/// Reads the optional `Authorization: Bearer <id token>` header
///
/// No header means an anonymous call; a header that doesn't verify is rejected outright.
async fn resolve_caller(
    identities: &dyn IdentityVerifier,
    headers: &HeaderMap,
) -> Result<Option<Caller>, CallableError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let invalid = || CallableError::Unauthenticated("Invalid ID token.".into());
    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(invalid)?;

    match identities
        .verify(token)
        .await
        .context("Verifying ID token")?
    {
        Some(uid) => Ok(Some(Caller { uid })),
        None => {
            warn!("Rejected call with an unknown ID token");
            Err(invalid())
        }
    }
}

fn request_data(body: Result<Json<CallableRequest>, JsonRejection>) -> Result<Value, CallableError> {
    body.map(|Json(req)| req.data).map_err(|rejection| {
        CallableError::InvalidArgument(format!("Bad request body: {}", rejection.body_text()))
    })
}

impl From<SpotifyError> for CallableError {
    fn from(err: SpotifyError) -> Self {
        let message = format!("Could not load tracks: {err}");
        match err {
            SpotifyError::RateLimited { .. } => Self::ResourceExhausted(message),
            _ => Self::Internal(message),
        }
    }
}

#[instrument(skip_all)]
async fn spotify_get_playlist_tracks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CallableRequest>, JsonRejection>,
) -> Result<CallableResponse<PlaylistImport>, CallableError> {
    resolve_caller(state.identities.as_ref(), &headers).await?;
    let data = request_data(body)?;

    let Some(playlist_id) = data
        .get("playlistUrl")
        .and_then(Value::as_str)
        .and_then(extract_playlist_id)
    else {
        return Err(CallableError::InvalidArgument(
            "Could not extract the playlist ID. Paste a link like open.spotify.com/playlist/..."
                .into(),
        ));
    };

    let Some(spotify) = &state.spotify else {
        return Err(CallableError::Internal(
            "Could not load tracks: Spotify credentials are not configured".into(),
        ));
    };

    let import = import_playlist(&state.http, spotify, &playlist_id).await?;
    Ok(CallableResponse { result: import })
}

#[instrument(skip_all)]
async fn delete_media_as_god(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CallableRequest>, JsonRejection>,
) -> Result<CallableResponse<DeleteAck>, CallableError> {
    let caller = resolve_caller(state.identities.as_ref(), &headers).await?;
    let data = request_data(body)?;

    let ack = state.deleter.delete(caller.as_ref(), &data).await?;
    Ok(CallableResponse { result: ack })
}
