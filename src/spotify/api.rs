use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, header::RETRY_AFTER};
use tracing::{debug, info, instrument, warn};

use crate::{
    spotify::{
        SpotifyError,
        structs::{PlaylistTracksPage, TrackRecord},
    },
    util::truncate_string,
};

pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Maximum page size accepted by the playlist tracks endpoint
pub const PAGE_SIZE: u32 = 100;

/// What a single page request came back with
#[derive(Debug, Clone)]
pub enum PageResponse {
    Page(PlaylistTracksPage),
    /// HTTP 429, with the raw `Retry-After` header if there was one
    RateLimited { retry_after: Option<String> },
    Failed { status: u16, body: String },
}

/// Fetches one page of a playlist's tracks
///
/// Production goes through [`HttpPageSource`]; tests swap in a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackPageSource: Send + Sync {
    async fn fetch_page(&self, url: &str, token: &str) -> Result<PageResponse>;
}

pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TrackPageSource for HttpPageSource {
    async fn fetch_page(&self, url: &str, token: &str) -> Result<PageResponse> {
        let res = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Fetching playlist tracks page")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = res
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            return Ok(PageResponse::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Ok(PageResponse::Failed {
                status: status.as_u16(),
                body,
            });
        }

        let page = res
            .json::<PlaylistTracksPage>()
            .await
            .context("Parsing playlist tracks page")?;
        Ok(PageResponse::Page(page))
    }
}

/// Bounds on how long an import keeps waiting out rate limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive 429s tolerated for the same page
    pub max_retries: u32,
    /// Total time an import may spend sleeping on 429s
    pub max_total_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            max_total_backoff: Duration::from_secs(240),
        }
    }
}

/// Turns a `Retry-After` header into a delay, never shorter than one second
///
/// Missing or unreadable values count as one second. Values too large for a `Duration`
/// saturate to [`Duration::MAX`].
#[must_use]
pub fn retry_after_delay(header: Option<&str>) -> Duration {
    let secs = header
        .and_then(|h| h.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite())
        .unwrap_or(1.0)
        .max(1.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Walks every page of a playlist and returns its streamable tracks in playlist order
///
/// Pages are fetched one at a time. A 429 sleeps for the advertised delay and retries the
/// same page, up to the limits in `policy`. Any other failure aborts the whole import.
///
/// # Errors
/// * [`SpotifyError::Api`] on a non-success, non-429 response
/// * [`SpotifyError::RateLimited`] once `policy` is exhausted
/// * [`SpotifyError::Other`] on network or parsing errors
#[instrument(skip(source, token, policy))]
pub async fn fetch_all_playlist_tracks(
    source: &impl TrackPageSource,
    api_base: &str,
    playlist_id: &str,
    token: &str,
    policy: RetryPolicy,
) -> Result<Vec<TrackRecord>, SpotifyError> {
    let mut tracks = Vec::new();
    let mut next = Some(format!(
        "{api_base}/playlists/{playlist_id}/tracks?limit={PAGE_SIZE}"
    ));
    let mut retries = 0;
    let mut waited = Duration::ZERO;

    while let Some(url) = next.take() {
        match source.fetch_page(&url, token).await? {
            PageResponse::RateLimited { retry_after } => {
                let delay = retry_after_delay(retry_after.as_deref());
                if retries >= policy.max_retries
                    || waited.saturating_add(delay) > policy.max_total_backoff
                {
                    warn!("Giving up on {url} after {retries} rate limited retries");
                    return Err(SpotifyError::RateLimited { retries, waited });
                }

                retries += 1;
                waited += delay;
                info!("Rate limited, retrying in {delay:?} (attempt {retries})");
                tokio::time::sleep(delay).await;
                next = Some(url);
            }
            PageResponse::Failed { status, body } => {
                warn!(
                    "Playlist page request failed ({status}): {}",
                    truncate_string(&body, 200)
                );
                return Err(SpotifyError::Api { status, body });
            }
            PageResponse::Page(page) => {
                retries = 0;
                next = page.next.clone();
                let before = tracks.len();
                tracks.extend(page.into_records());
                debug!("Got {} tracks from {url}", tracks.len() - before);
            }
        }
    }

    info!("Fetched {} tracks", tracks.len());
    Ok(tracks)
}
