use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

pub static PLAYLIST_URI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^spotify:playlist:([a-zA-Z0-9]+)$").unwrap());

pub static BARE_PLAYLIST_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]{10,}$").unwrap());

/// Extracts a playlist ID out from a user-inputted URI, URL or raw ID
///
/// Accepts `spotify:playlist:<id>`, any URL with a `/playlist/<id>` path segment
/// (e.g. `https://open.spotify.com/playlist/<id>?si=...`), or a bare alphanumeric ID of at
/// least 10 characters. Returns `None` when nothing matches.
#[must_use]
pub fn extract_playlist_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(captures) = PLAYLIST_URI_REGEX.captures(trimmed) {
        return Some(captures[1].to_string());
    }

    if let Some(id) = playlist_id_from_url(trimmed) {
        return Some(id);
    }

    BARE_PLAYLIST_ID_REGEX
        .is_match(trimmed)
        .then(|| trimmed.to_string())
}

fn playlist_id_from_url(input: &str) -> Option<String> {
    let url = Url::parse(input).ok()?;
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    segments.find(|s| *s == "playlist")?;
    segments.next().map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_form() {
        assert_eq!(
            extract_playlist_id("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").as_deref(),
            Some("37i9dQZF1DXcBWIGoYBM5M")
        );
        // Shorter than a bare ID, still fine in URI form
        assert_eq!(
            extract_playlist_id("spotify:playlist:abc").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn url_form_ignores_query_and_trailing_segments() {
        for input in [
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M",
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=a1b2c3d4",
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M/",
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M/tracks#top",
            "https://open.spotify.com/intl-es/playlist/37i9dQZF1DXcBWIGoYBM5M",
            "  https://open.spotify.com//playlist//37i9dQZF1DXcBWIGoYBM5M  ",
        ] {
            assert_eq!(
                extract_playlist_id(input).as_deref(),
                Some("37i9dQZF1DXcBWIGoYBM5M"),
                "input: {input}"
            );
        }
    }

    #[test]
    fn url_without_id_after_playlist_segment() {
        assert_eq!(
            extract_playlist_id("https://open.spotify.com/playlist/"),
            None
        );
    }

    #[test]
    fn bare_id() {
        assert_eq!(
            extract_playlist_id("37i9dQZF1DXcBWIGoYBM5M").as_deref(),
            Some("37i9dQZF1DXcBWIGoYBM5M")
        );
        assert_eq!(
            extract_playlist_id("abcdefghij").as_deref(),
            Some("abcdefghij")
        );
    }

    #[test]
    fn rejects_garbage() {
        for input in [
            "",
            "   ",
            "abc123",
            "abcdefghi",
            "not a playlist at all",
            "37i9dQZF1D-XcBWIGoYBM5M",
            "https://open.spotify.com/album/37i9dQZF1DXcBWIGoYBM5M",
            "spotify:album:37i9dQZF1DXcBWIGoYBM5M",
            "open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M",
        ] {
            assert_eq!(extract_playlist_id(input), None, "input: {input}");
        }
    }
}
