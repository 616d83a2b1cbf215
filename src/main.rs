mod config;
mod logging;
mod ports;
mod services;
mod spotify_rs;
#[cfg(test)]
mod test_utils;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use url::Url;

use crate::{
    config::Config,
    logging::init_tracing,
    ports::{
        credentials::{AuthError, CredentialProvider},
        spotify::PlaylistService,
    },
    services::sync::{
        index::PlaylistIndex,
        models::SourceList,
        reconciler::Reconciler,
        source_reader::{CsvSourceReader, SourceReader},
        stats::RunStats,
    },
    spotify_rs::{
        auth::{SpotifyApiCredentials, SpotifyCredentialProvider, StdinPrompt},
        client::SpotifyWebClient,
        token_store::TokenStore,
    },
    transport::Transport,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "CHART_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `chart_sync=debug`
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// OTLP collector endpoint for trace export
    #[arg(long, global = true, env = "OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

fn is_directory(s: &str) -> Result<PathBuf, String> {
    let p: PathBuf = s.into();
    if p.is_dir() {
        Ok(p)
    } else {
        Err(format!("`{}` is not an existing directory", s))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every CSV source in a directory into playlists
    Sync {
        /// The directory holding the CSV sources (default: from config)
        #[arg(short, long, value_parser = is_directory, env = "CHART_SYNC_DIRECTORY")]
        directory: Option<PathBuf>,
    },
    /// Sync a single source, given by path, file stem or playlist title
    Update {
        #[arg(short, long)]
        source: String,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

/// Authenticate, snapshot the user's playlists and reconcile every source.
async fn sync_sources<P, S>(
    provider: &P,
    service: &S,
    sources: &[SourceList],
    concurrency: usize,
) -> Result<RunStats>
where
    P: CredentialProvider,
    S: PlaylistService,
{
    let credential = provider.get_bearer_token().await?;
    tracing::debug!(expires_at = %credential.expires_at(), "Authenticated");

    let index = PlaylistIndex::build(service, &credential).await?;
    let mut reconciler = Reconciler::new(service, &credential, index, concurrency);
    reconciler.run(sources).await;
    Ok(reconciler.into_stats())
}

async fn run_sync(config: &Config, sources: Vec<SourceList>) -> Result<()> {
    let transport = Arc::new(Transport::reqwest(config.transport_config()));

    let (Some(client_id), Some(client_secret)) = (config.client_id(), config.client_secret())
    else {
        return Err(AuthError::MissingClientCredentials.into());
    };
    let accounts_base_url = Url::parse(&config.spotify.accounts_base_url)
        .wrap_err("Invalid Spotify accounts base URL")?;
    let api_base_url =
        Url::parse(&config.spotify.api_base_url).wrap_err("Invalid Spotify API base URL")?;

    let provider = SpotifyCredentialProvider::new(
        transport.clone(),
        SpotifyApiCredentials::new(
            client_id,
            client_secret,
            config.spotify.redirect_uri.clone(),
        ),
        accounts_base_url,
        config.refresh_token(),
        TokenStore::default_location(),
        Box::new(StdinPrompt),
    );
    let client = SpotifyWebClient::new(transport, api_base_url, config.spotify.public_playlists);

    let stats = sync_sources(&provider, &client, &sources, config.resolver.concurrency).await?;
    stats.print_summary();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let _tracing = init_tracing(&args.log_level, args.otlp_endpoint.as_deref())?;

    tracing::debug!("Loading configuration");
    let config = {
        if let Some(config) = args.config {
            Config::from_file(&config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load chart-sync config")?;

    match args.command {
        Commands::Sync { directory } => {
            let directory = directory.unwrap_or_else(|| config.sources_directory());
            tracing::debug!("Starting sync for directory: {}", directory.display());
            let reader = CsvSourceReader::new(directory, config.header_rows);
            let sources = reader.list_sources()?;
            run_sync(&config, sources).await?;
            tracing::info!("Sync completed");
        }
        Commands::Update { source } => {
            tracing::debug!("Starting update for source: {}", source);
            let reader = CsvSourceReader::new(config.sources_directory(), config.header_rows);
            let source = reader.find_source(&source)?;
            run_sync(&config, vec![source]).await?;
            tracing::info!("Update completed");
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                tracing::info!("Default config available at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::credentials::{Credential, MockCredentialProvider};
    use crate::test_utils::{FakePlaylistService, source};
    use chrono::Utc;

    fn provider() -> MockCredentialProvider {
        let mut provider = MockCredentialProvider::new();
        provider
            .expect_get_bearer_token()
            .times(1)
            .returning(|| Ok(Credential::new("token", Utc::now())));
        provider
    }

    #[tokio::test]
    async fn test_sync_sources_end_to_end() {
        let service = FakePlaylistService::new()
            .with_playlist("p1", "Top 50 Global (old)", &["a"])
            .with_track("A", "Artist A", "a")
            .with_track("B", "Artist B", "b");
        let sources = vec![
            source(
                "Top 50 Global-01-02-2024.csv",
                &[("A", "Artist A"), ("B", "Artist B")],
            ),
            source("Viral 50-01-02-2024.csv", &[("B", "Artist B")]),
        ];

        let stats = sync_sources(&provider(), &service, &sources, 8)
            .await
            .unwrap();

        assert_eq!(stats.playlists_renamed, 1);
        assert_eq!(stats.playlists_created, 1);
        assert_eq!(stats.tracks_already_present, 1);
        assert_eq!(stats.tracks_added, 2);
        assert_eq!(service.tracks_of("Top 50 Global").len(), 2);
        assert_eq!(service.tracks_of("Viral 50"), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_create_is_counted_and_run_continues() {
        let service = FakePlaylistService::new()
            .with_playlist("p1", "Viral 50", &[])
            .with_track("B", "Artist B", "b")
            .failing_creates();
        let sources = vec![
            source("Top 50 Global-01-02-2024.csv", &[("B", "Artist B")]),
            source("Viral 50-01-02-2024.csv", &[("B", "Artist B")]),
        ];

        let stats = sync_sources(&provider(), &service, &sources, 8)
            .await
            .unwrap();

        assert_eq!(stats.lists_failed, 1);
        assert_eq!(stats.playlists_created, 0);
        assert_eq!(stats.tracks_added, 1);
        assert_eq!(service.playlist_names(), vec!["Viral 50"]);
        assert_eq!(service.tracks_of("Viral 50"), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_run() {
        let mut provider = MockCredentialProvider::new();
        provider
            .expect_get_bearer_token()
            .returning(|| Err(AuthError::NoAccessToken));
        let service = FakePlaylistService::new();

        let result = sync_sources(&provider, &service, &[], 8).await;

        let error = result.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<AuthError>(),
            Some(AuthError::NoAccessToken)
        ));
    }
}
