use serde::{Deserialize, Serialize};

/// One page of `GET /playlists/{id}/tracks`
///
/// Every field is optional upstream; anything missing falls back to an empty value
/// during normalization instead of failing the whole import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistTracksPage {
    #[serde(default)]
    pub items: Option<Vec<Option<PlaylistItem>>>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub track: Option<ApiTrack>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub is_local: Option<bool>,
    #[serde(default)]
    pub artists: Option<Vec<Option<ApiArtist>>>,
    #[serde(default)]
    pub album: Option<ApiAlbum>,
    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiArtist {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiAlbum {
    #[serde(default)]
    pub images: Option<Vec<Option<ApiImage>>>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiImage {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

/// A playlist track as handed back to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub id: Option<String>,
    pub title: String,
    pub artists: Vec<String>,
    pub spotify_url: String,
    pub cover_url: String,
    pub release_year: Option<i32>,
}

/// Result of importing a whole playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistImport {
    pub playlist_id: String,
    pub total: usize,
    pub tracks: Vec<TrackRecord>,
}

impl PlaylistImport {
    #[must_use]
    pub fn new(playlist_id: String, tracks: Vec<TrackRecord>) -> Self {
        Self {
            playlist_id,
            total: tracks.len(),
            tracks,
        }
    }
}

/// How many album images are looked at when picking a cover, largest first
const COVER_CANDIDATES: usize = 3;

impl PlaylistTracksPage {
    /// Normalizes every streamable track on this page, keeping upstream order
    pub fn into_records(self) -> impl Iterator<Item = TrackRecord> {
        self.items
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|item| item.track)
            .filter_map(ApiTrack::into_record)
    }
}

impl ApiTrack {
    /// Returns `None` for local files, which cannot be streamed
    #[must_use]
    pub fn into_record(self) -> Option<TrackRecord> {
        if self.is_local.unwrap_or(false) {
            return None;
        }

        let artists = self
            .artists
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|a| a.name)
            .filter(|name| !name.is_empty())
            .collect();

        let (cover_url, release_year) = self.album.map_or((String::new(), None), |album| {
            let cover = album
                .images
                .unwrap_or_default()
                .into_iter()
                .take(COVER_CANDIDATES)
                .flatten()
                .filter_map(|i| i.url)
                .find(|url| !url.is_empty())
                .unwrap_or_default();
            let year = album.release_date.as_deref().and_then(parse_release_year);
            (cover, year)
        });

        Some(TrackRecord {
            id: self.id,
            title: self.name.unwrap_or_default(),
            artists,
            spotify_url: self
                .external_urls
                .and_then(|u| u.spotify)
                .unwrap_or_default(),
            cover_url,
            release_year,
        })
    }
}

/// Reads the year off a release date, which may be `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
#[must_use]
pub fn parse_release_year(release_date: &str) -> Option<i32> {
    let year: String = release_date.chars().take(4).collect();
    year.trim().parse().ok()
}
