use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use color_eyre::eyre::{Result, eyre};

use crate::ports::credentials::Credential;
use crate::ports::spotify::{
    MAX_TRACKS_PER_ADD, PlaylistOperationError, PlaylistService, RemotePlaylist, TrackPage,
};
use crate::services::sync::models::{CatalogMatch, SourceList, SourceRow};

pub fn test_credential() -> Credential {
    Credential::new("test-token", Utc::now())
}

pub fn source(file_name: &str, rows: &[(&str, &str)]) -> SourceList {
    SourceList::new(
        file_name,
        rows.iter()
            .enumerate()
            .map(|(index, (track, artist))| SourceRow::new(*track, *artist, index + 4))
            .collect(),
    )
}

#[derive(Debug, Clone)]
struct FakePlaylist {
    id: String,
    name: String,
    tracks: Vec<Option<String>>,
}

#[derive(Default)]
struct FakeState {
    playlists: Vec<FakePlaylist>,
    catalog: HashMap<(String, String), CatalogMatch>,
    failing_searches: HashSet<String>,
    search_delays: HashMap<String, Duration>,
    fail_creates: bool,
    fail_renames: bool,
    fail_adds: bool,
    next_id: usize,
    search_calls: usize,
    searches_in_flight: usize,
    peak_searches: usize,
    add_calls: Vec<usize>,
    renames: Vec<(String, String)>,
}

/// In-memory remote playlist service holding playlists and a search catalog.
pub struct FakePlaylistService {
    user_id: String,
    state: Mutex<FakeState>,
}

impl FakePlaylistService {
    pub fn new() -> Self {
        Self {
            user_id: "test-user".to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_playlist(self, id: &str, name: &str, track_ids: &[&str]) -> Self {
        self.state.lock().unwrap().playlists.push(FakePlaylist {
            id: id.to_string(),
            name: name.to_string(),
            tracks: track_ids.iter().map(|id| Some(id.to_string())).collect(),
        });
        self
    }

    /// Playlist membership including entries without an identifier
    pub fn with_raw_playlist(self, id: &str, name: &str, tracks: Vec<Option<String>>) -> Self {
        self.state.lock().unwrap().playlists.push(FakePlaylist {
            id: id.to_string(),
            name: name.to_string(),
            tracks,
        });
        self
    }

    pub fn with_track(self, track: &str, artist: &str, id: &str) -> Self {
        self.state.lock().unwrap().catalog.insert(
            (track.to_string(), artist.to_string()),
            CatalogMatch {
                track_id: id.to_string(),
                track_uri: format!("spotify:track:{}", id),
            },
        );
        self
    }

    pub fn failing_search(self, track: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_searches
            .insert(track.to_string());
        self
    }

    pub fn search_delay(self, track: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .search_delays
            .insert(track.to_string(), delay);
        self
    }

    pub fn failing_creates(self) -> Self {
        self.state.lock().unwrap().fail_creates = true;
        self
    }

    pub fn failing_renames(self) -> Self {
        self.state.lock().unwrap().fail_renames = true;
        self
    }

    pub fn failing_adds(self) -> Self {
        self.state.lock().unwrap().fail_adds = true;
        self
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    pub fn peak_searches(&self) -> usize {
        self.state.lock().unwrap().peak_searches
    }

    pub fn add_calls(&self) -> Vec<usize> {
        self.state.lock().unwrap().add_calls.clone()
    }

    pub fn renames(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().renames.clone()
    }

    pub fn playlist_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .playlists
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Remote membership of the playlist with the given name, in insertion order
    pub fn tracks_of(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .playlists
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.tracks.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PlaylistService for FakePlaylistService {
    async fn current_user_id(&self, _credential: &Credential) -> Result<String> {
        Ok(self.user_id.clone())
    }

    async fn list_playlists_page(
        &self,
        _credential: &Credential,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RemotePlaylist>> {
        assert_eq!(user_id, self.user_id);
        let state = self.state.lock().unwrap();
        Ok(state
            .playlists
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|p| RemotePlaylist {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect())
    }

    async fn playlist_tracks_page(
        &self,
        _credential: &Credential,
        playlist_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<TrackPage> {
        let state = self.state.lock().unwrap();
        let playlist = state
            .playlists
            .iter()
            .find(|p| p.id == playlist_id)
            .ok_or_else(|| eyre!("No playlist {}", playlist_id))?;
        let end = (offset + limit) as usize;
        Ok(TrackPage {
            track_ids: playlist
                .tracks
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect(),
            has_next: end < playlist.tracks.len(),
        })
    }

    async fn create_playlist(
        &self,
        _credential: &Credential,
        user_id: &str,
        name: &str,
    ) -> Result<RemotePlaylist> {
        assert_eq!(user_id, self.user_id);
        let mut state = self.state.lock().unwrap();
        if state.fail_creates {
            return Err(PlaylistOperationError::Create {
                name: name.to_string(),
                status: 500,
                body: "boom".to_string(),
            }
            .into());
        }
        state.next_id += 1;
        let id = format!("created-{}", state.next_id);
        state.playlists.push(FakePlaylist {
            id: id.clone(),
            name: name.to_string(),
            tracks: Vec::new(),
        });
        Ok(RemotePlaylist {
            id,
            name: name.to_string(),
        })
    }

    async fn rename_playlist(
        &self,
        _credential: &Credential,
        playlist_id: &str,
        name: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_renames {
            return Err(PlaylistOperationError::Rename {
                playlist_id: playlist_id.to_string(),
                name: name.to_string(),
                status: 403,
                body: "forbidden".to_string(),
            }
            .into());
        }
        state
            .renames
            .push((playlist_id.to_string(), name.to_string()));
        let playlist = state
            .playlists
            .iter_mut()
            .find(|p| p.id == playlist_id)
            .ok_or_else(|| eyre!("No playlist {}", playlist_id))?;
        playlist.name = name.to_string();
        Ok(())
    }

    async fn search_track(
        &self,
        _credential: &Credential,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<CatalogMatch>> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.search_calls += 1;
            state.searches_in_flight += 1;
            state.peak_searches = state.peak_searches.max(state.searches_in_flight);
            state.search_delays.get(track_name).copied()
        };

        tokio::time::sleep(delay.unwrap_or(Duration::from_millis(1))).await;

        let mut state = self.state.lock().unwrap();
        state.searches_in_flight -= 1;
        if state.failing_searches.contains(track_name) {
            return Err(eyre!("search for '{}' failed", track_name));
        }
        Ok(state
            .catalog
            .get(&(track_name.to_string(), artist_name.to_string()))
            .cloned())
    }

    async fn add_tracks(
        &self,
        _credential: &Credential,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()> {
        assert!(uris.len() <= MAX_TRACKS_PER_ADD);
        let mut state = self.state.lock().unwrap();
        state.add_calls.push(uris.len());
        if state.fail_adds {
            return Err(PlaylistOperationError::AddTracks {
                playlist_id: playlist_id.to_string(),
                count: uris.len(),
                status: 502,
                body: "bad gateway".to_string(),
            }
            .into());
        }
        let playlist = state
            .playlists
            .iter_mut()
            .find(|p| p.id == playlist_id)
            .ok_or_else(|| eyre!("No playlist {}", playlist_id))?;
        playlist.tracks.extend(
            uris.iter()
                .map(|uri| uri.rsplit(':').next().map(str::to_string)),
        );
        Ok(())
    }
}
