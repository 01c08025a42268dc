use std::{fmt, time::Duration};

use thiserror::Error;
use tracing::{info, instrument};

use crate::spotify::{
    api::{HttpPageSource, RetryPolicy, SPOTIFY_API_BASE, fetch_all_playlist_tracks},
    auth::{SPOTIFY_TOKEN_URL, get_app_token},
    structs::PlaylistImport,
};

pub mod api;
pub mod auth;
pub mod structs;
pub mod utils;

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Token error {status}: {body}")]
    Auth { status: u16, body: String },

    #[error("Spotify API {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Spotify kept rate limiting after {retries} retries ({waited:?} spent waiting)")]
    RateLimited { retries: u32, waited: Duration },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// App credentials for the client-credentials grant
#[derive(Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Where and how the importer talks to Spotify
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub credentials: SpotifyCredentials,
    pub token_url: String,
    pub api_base: String,
    pub retry: RetryPolicy,
}

impl SpotifyConfig {
    #[must_use]
    pub fn new(credentials: SpotifyCredentials) -> Self {
        Self {
            credentials,
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            api_base: SPOTIFY_API_BASE.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Fetches every track of an already-extracted playlist ID
///
/// Gets a fresh app token, then pages through the playlist.
///
/// # Errors
/// See [`get_app_token`] and [`fetch_all_playlist_tracks`]
#[instrument(skip(client, config))]
pub async fn import_playlist(
    client: &reqwest::Client,
    config: &SpotifyConfig,
    playlist_id: &str,
) -> Result<PlaylistImport, SpotifyError> {
    let token = get_app_token(client, &config.token_url, &config.credentials).await?;

    let source = HttpPageSource::new(client.clone());
    let tracks = fetch_all_playlist_tracks(
        &source,
        &config.api_base,
        playlist_id,
        &token,
        config.retry,
    )
    .await?;

    info!("Imported playlist {playlist_id} with {} tracks", tracks.len());
    Ok(PlaylistImport::new(playlist_id.to_string(), tracks))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::{
            HeaderMap, StatusCode,
            header::{AUTHORIZATION, RETRY_AFTER},
        },
        response::{IntoResponse, Response},
        routing::{get, post},
    };
    use serde_json::{Value, json};

    use super::*;

    // base64("client:secret")
    const BASIC_CLIENT_SECRET: &str = "Basic Y2xpZW50OnNlY3JldA==";
    const ACCESS_TOKEN: &str = "app-token";

    async fn token(headers: HeaderMap, body: String) -> impl IntoResponse {
        let authorized = headers
            .get(AUTHORIZATION)
            .is_some_and(|v| v == BASIC_CLIENT_SECRET);
        if !authorized || body != "grant_type=client_credentials" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_client" })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "access_token": ACCESS_TOKEN,
                "token_type": "Bearer",
                "expires_in": 3600
            })),
        )
    }

    #[derive(Clone)]
    struct FakeSpotify {
        base: String,
        total: usize,
        /// Answers the next request past the first page with a single 429
        throttle_once: Arc<AtomicBool>,
    }

    /// Serves `total` tracks in pages of at most 100, like the real endpoint
    async fn tracks(
        State(fake): State<FakeSpotify>,
        Path(playlist_id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        let bearer = format!("Bearer {ACCESS_TOKEN}");
        if headers.get(AUTHORIZATION).is_none_or(|v| v != bearer.as_str()) {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "no token" })))
                .into_response();
        }

        let offset: usize = query.get("offset").map_or(0, |o| o.parse().unwrap());
        if offset > 0 && fake.throttle_once.swap(false, Ordering::SeqCst) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(RETRY_AFTER, "1")],
                Json(json!({
                    "error": { "status": 429, "message": "API rate limit exceeded" }
                })),
            )
                .into_response();
        }

        let total = fake.total;
        let limit: usize = query["limit"].parse().unwrap();
        let end = (offset + limit).min(total);
        let items: Vec<Value> = (offset..end)
            .map(|i| {
                json!({
                    "track": {
                        "id": format!("track{i}"),
                        "name": format!("Song {i}"),
                        "is_local": false,
                        "artists": [{ "name": "Someone" }],
                        "album": { "release_date": "1994-03-02", "images": [] },
                        "external_urls": { "spotify": format!("https://open.spotify.com/track/track{i}") }
                    }
                })
            })
            .collect();
        let next = (end < total).then(|| {
            format!(
                "{}/playlists/{playlist_id}/tracks?offset={end}&limit={limit}",
                fake.base
            )
        });

        (StatusCode::OK, Json(json!({ "items": items, "next": next }))).into_response()
    }

    async fn spawn(total: usize, throttle_once: bool) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let fake = FakeSpotify {
            base: format!("http://{addr}/v1"),
            total,
            throttle_once: Arc::new(AtomicBool::new(throttle_once)),
        };

        let app = Router::new()
            .route("/api/token", post(token))
            .route("/v1/playlists/{id}/tracks", get(tracks))
            .with_state(fake);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        addr
    }

    /// Spins up a fake Spotify on localhost serving one playlist of `total` tracks
    pub(crate) async fn spawn_fake_spotify(total: usize) -> SocketAddr {
        spawn(total, false).await
    }

    /// Same as [`spawn_fake_spotify`], but the second page is rate limited once with
    /// `Retry-After: 1`
    async fn spawn_throttled_fake_spotify(total: usize) -> SocketAddr {
        spawn(total, true).await
    }

    pub(crate) fn fake_config(addr: SocketAddr, client_secret: &str) -> SpotifyConfig {
        SpotifyConfig {
            token_url: format!("http://{addr}/api/token"),
            api_base: format!("http://{addr}/v1"),
            ..SpotifyConfig::new(SpotifyCredentials {
                client_id: "client".into(),
                client_secret: client_secret.into(),
            })
        }
    }

    #[tokio::test]
    async fn imports_a_two_page_playlist() {
        let addr = spawn_fake_spotify(150).await;
        let client = reqwest::Client::new();

        let import = import_playlist(&client, &fake_config(addr, "secret"), "pl")
            .await
            .unwrap();

        assert_eq!(import.playlist_id, "pl");
        assert_eq!(import.total, 150);
        assert_eq!(import.tracks.len(), 150);
        assert_eq!(import.tracks[0].id.as_deref(), Some("track0"));
        assert_eq!(import.tracks[149].id.as_deref(), Some("track149"));
        assert_eq!(import.tracks[100].release_year, Some(1994));
    }

    #[tokio::test]
    async fn rate_limited_page_is_retried_over_http() {
        let addr = spawn_throttled_fake_spotify(150).await;
        let client = reqwest::Client::new();

        let started = std::time::Instant::now();
        let import = import_playlist(&client, &fake_config(addr, "secret"), "pl")
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(import.total, 150);
        let ids: Vec<String> = import
            .tracks
            .iter()
            .map(|t| t.id.clone().unwrap())
            .collect();
        let expected: Vec<String> = (0..150).map(|i| format!("track{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn bad_credentials_surface_status_and_body() {
        let addr = spawn_fake_spotify(1).await;
        let client = reqwest::Client::new();

        let err = import_playlist(&client, &fake_config(addr, "wrong"), "pl")
            .await
            .unwrap_err();

        match err {
            SpotifyError::Auth { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn credentials_are_redacted_in_debug_output() {
        let creds = SpotifyCredentials {
            client_id: "id-123".into(),
            client_secret: "super-secret".into(),
        };
        let debug = format!("{:?}", SpotifyConfig::new(creds));

        assert!(!debug.contains("id-123"));
        assert!(!debug.contains("super-secret"));
    }
}
