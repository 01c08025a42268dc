use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Truncates a string to a maximum length, adding `...` to the end if it was truncated.
///
/// Backs off one byte at a time if the cut would land inside a UTF-8 codepoint.
/// Used to keep upstream response bodies from flooding the logs.
///
/// # Arguments
/// * `string` - The string to truncate
/// * `max_length` - The maximum length of the string, at least 4
pub fn truncate_string(string: &impl ToString, max_length: usize) -> String {
    let string = string.to_string();
    if string.len() <= max_length || max_length < 4 {
        return string;
    }

    let mut cut = max_length - 3;
    while !string.is_char_boundary(cut) {
        cut -= 1;
    }

    format!("{}...", &string[..cut])
}

/// Builds the shared HTTP client used for every upstream call
///
/// # Panics
/// Panics if the TLS backend cannot be initialized
#[must_use]
pub fn init_http_client() -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!(
            "{}/{} (+{})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_REPOSITORY")
        ))
        .expect("User-Agent built from package metadata is valid ASCII"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .expect("Unable to build HTTP client")
}

/// Spawn a task that watches for CTRL + C signal and cancels a [`CancellationToken`] when caught
pub fn spawn_ct_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Caught CTRL+C signal!");
        ct.cancel();
    });
}
