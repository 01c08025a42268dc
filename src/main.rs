#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use media::{
    MediaDeleter,
    local::{FsObjectStore, MemoryDocumentStore, ensure_storage_root},
};
use server::{AppState, LocalSeed, StaticIdentities};
use spotify::{
    SpotifyConfig, SpotifyCredentials,
    api::{RetryPolicy, SPOTIFY_API_BASE},
    auth::SPOTIFY_TOKEN_URL,
    import_playlist,
    utils::extract_playlist_id,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use util::{init_http_client, spawn_ct_watcher};

pub mod callable;
pub mod media;
pub mod server;
pub mod spotify;
pub mod util;

/// Callable endpoints for a photo-sharing group: Spotify playlist import and media deletion
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serves `spotifyGetPlaylistTracks` and `deleteMediaAsGod` over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:5001")]
        listen: SocketAddr,

        /// JSON file with ID tokens and initial documents
        #[arg(long, env = "SEED_FILE")]
        seed: Option<PathBuf>,

        /// Directory holding stored objects (photos)
        #[arg(long, env = "STORAGE_DIR", default_value = "storage")]
        storage_dir: PathBuf,

        /// Group whose events and sessions are served
        #[arg(long, env = "GROUP_ID", default_value = "peb")]
        group: String,

        #[command(flatten)]
        spotify: SpotifyArgs,
    },

    /// Fetches every track of a playlist and prints the result as JSON
    Import {
        /// Spotify playlist URL, URI or ID
        playlist: String,

        #[command(flatten)]
        spotify: SpotifyArgs,
    },
}

#[derive(clap::Args, Debug)]
struct SpotifyArgs {
    /// Spotify app client ID
    #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    /// Spotify app client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Client credentials token endpoint
    #[arg(long, env = "SPOTIFY_TOKEN_URL", default_value = SPOTIFY_TOKEN_URL)]
    token_url: String,

    /// Spotify Web API base URL
    #[arg(long, env = "SPOTIFY_API_BASE", default_value = SPOTIFY_API_BASE)]
    api_base: String,

    /// Consecutive rate limited responses tolerated for a single page
    #[arg(long, default_value_t = 10)]
    max_rate_limit_retries: u32,

    /// Total seconds an import may spend waiting out rate limits
    #[arg(long, default_value_t = 240)]
    rate_limit_budget_secs: u64,
}

impl SpotifyArgs {
    /// Returns `None` unless both the client ID and secret are set
    fn into_config(self) -> Option<SpotifyConfig> {
        let credentials = SpotifyCredentials {
            client_id: self.client_id.filter(|s| !s.is_empty())?,
            client_secret: self.client_secret.filter(|s| !s.is_empty())?,
        };

        Some(SpotifyConfig {
            credentials,
            token_url: self.token_url,
            api_base: self.api_base.trim_end_matches('/').to_string(),
            retry: RetryPolicy {
                max_retries: self.max_rate_limit_retries,
                max_total_backoff: Duration::from_secs(self.rate_limit_budget_secs),
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let client = init_http_client();

    match args.command {
        Command::Serve {
            listen,
            seed,
            storage_dir,
            group,
            spotify,
        } => {
            let spotify = spotify.into_config();
            if spotify.is_none() {
                warn!("SPOTIFY_CLIENT_ID / SPOTIFY_CLIENT_SECRET not set, playlist imports will fail");
            }

            let seed = match seed {
                Some(path) => LocalSeed::load(&path).await?,
                None => LocalSeed::default(),
            };

            ensure_storage_root(&storage_dir).await?;
            info!("Storing objects under {storage_dir:?} for group {group}");

            let state = AppState {
                http: client,
                spotify,
                deleter: MediaDeleter::new(
                    Arc::new(MemoryDocumentStore::new(seed.documents)),
                    Arc::new(FsObjectStore::new(storage_dir)),
                    group,
                ),
                identities: Arc::new(StaticIdentities::new(seed.identities)),
            };

            let ct = CancellationToken::new();
            spawn_ct_watcher(ct.clone());
            server::serve(listen, state, ct).await?;
        }

        Command::Import { playlist, spotify } => {
            let playlist_id =
                extract_playlist_id(&playlist).context("Unable to parse Spotify playlist URL / ID")?;
            let config = spotify
                .into_config()
                .context("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set")?;

            info!("Importing playlist ID: {playlist_id}");
            let import = import_playlist(&client, &config, &playlist_id).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&import).context("Serializing playlist")?
            );
        }
    }

    Ok(())
}
