use anyhow::Context;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{
    spotify::{SpotifyCredentials, SpotifyError},
    util::truncate_string,
};

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges the app's client credentials for a bearer token (client-credentials grant)
///
/// The token is meant for a single import; nothing is cached.
///
/// # Errors
/// * [`SpotifyError::Auth`] when the token endpoint answers with a non-success status
/// * [`SpotifyError::Other`] on network errors or a malformed body
#[instrument(skip(client, credentials))]
pub async fn get_app_token(
    client: &reqwest::Client,
    token_url: &str,
    credentials: &SpotifyCredentials,
) -> Result<String, SpotifyError> {
    let res = client
        .post(token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("grant_type=client_credentials")
        .send()
        .await
        .context("Sending client credentials token request")?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        warn!(
            "Token endpoint refused credentials ({status}): {}",
            truncate_string(&body, 200)
        );
        return Err(SpotifyError::Auth {
            status: status.as_u16(),
            body,
        });
    }

    let token = res
        .json::<TokenResponse>()
        .await
        .context("Parsing access token response")?;
    debug!("Got app token, expires in {:?}s", token.expires_in);

    Ok(token.access_token)
}
