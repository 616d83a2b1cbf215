use color_eyre::eyre::Result;

use crate::ports::credentials::Credential;
use crate::services::sync::models::CatalogMatch;

/// A playlist as listed by the remote service, without its tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
}

/// One page of a playlist's membership.
#[derive(Debug, Clone, Default)]
pub struct TrackPage {
    /// Track identifiers in page order; local files and removed tracks have none
    pub track_ids: Vec<Option<String>>,
    pub has_next: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaylistOperationError {
    #[error("Failed to create playlist '{name}': HTTP {status}: {body}")]
    Create {
        name: String,
        status: u16,
        body: String,
    },
    #[error("Failed to rename playlist {playlist_id} to '{name}': HTTP {status}: {body}")]
    Rename {
        playlist_id: String,
        name: String,
        status: u16,
        body: String,
    },
    #[error("Failed to add {count} tracks to playlist {playlist_id}: HTTP {status}: {body}")]
    AddTracks {
        playlist_id: String,
        count: usize,
        status: u16,
        body: String,
    },
    #[error("Unexpected HTTP {status} from {operation}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

/// Port trait wrapping the playlist and catalog capabilities used by the sync engine.
///
/// Implementations live in `spotify_rs::client` (production) or test fakes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlaylistService: Send + Sync {
    async fn current_user_id(&self, credential: &Credential) -> Result<String>;

    async fn list_playlists_page(
        &self,
        credential: &Credential,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RemotePlaylist>>;

    async fn playlist_tracks_page(
        &self,
        credential: &Credential,
        playlist_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<TrackPage>;

    async fn create_playlist(
        &self,
        credential: &Credential,
        user_id: &str,
        name: &str,
    ) -> Result<RemotePlaylist>;

    async fn rename_playlist(
        &self,
        credential: &Credential,
        playlist_id: &str,
        name: &str,
    ) -> Result<()>;

    /// Best (first) catalog hit for the track and artist, if any
    async fn search_track(
        &self,
        credential: &Credential,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<CatalogMatch>>;

    /// Add at most [`MAX_TRACKS_PER_ADD`] URIs in one call
    async fn add_tracks(
        &self,
        credential: &Credential,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()>;
}

/// Service-side limit on URIs per add-tracks call
pub const MAX_TRACKS_PER_ADD: usize = 100;
