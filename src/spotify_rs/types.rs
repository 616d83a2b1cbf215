use serde::{Deserialize, Serialize};

fn default_expires_in() -> u64 {
    3600
}

/// Spotify OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Spotify user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// Playlist entry of the user playlists listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistsPage {
    #[serde(default)]
    pub items: Vec<SpotifyPlaylist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrackItem {
    #[serde(default)]
    pub track: Option<PlaylistTrackRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTrackRef {
    #[serde(default)]
    pub id: Option<String>,
}

/// Page of `playlists/{id}/tracks`, requested with `fields=items.track.id,total,next`
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTracksPage {
    #[serde(default)]
    pub items: Vec<PlaylistTrackItem>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Spotify track as returned by search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchTracks {
    #[serde(default)]
    pub items: Vec<SpotifyTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: Option<SearchTracks>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub refresh_token: String,
}
