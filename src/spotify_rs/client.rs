use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::eyre;
use reqwest::{Method, StatusCode};
use serde_json::json;
use url::Url;

use crate::ports::credentials::Credential;
use crate::ports::spotify::{
    PlaylistOperationError, PlaylistService, RemotePlaylist, TrackPage,
};
use crate::services::sync::models::CatalogMatch;
use crate::spotify_rs::types::{
    PlaylistTracksPage, PlaylistsPage, SearchResponse, SpotifyPlaylist, SpotifyUser,
};
use crate::transport::{HttpBackend, HttpRequest, HttpResponse, ReqwestBackend, Transport};

const PLAYLIST_TRACK_FIELDS: &str = "items.track.id,total,next";

/// Spotify Web API client
pub struct SpotifyWebClient<B: HttpBackend = ReqwestBackend> {
    transport: Arc<Transport<B>>,
    api_base: Url,
    public_playlists: bool,
}

impl<B: HttpBackend> SpotifyWebClient<B> {
    pub fn new(transport: Arc<Transport<B>>, api_base: Url, public_playlists: bool) -> Self {
        Self {
            transport,
            api_base,
            public_playlists,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| eyre!("API base URL {} cannot have a path", self.api_base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: HttpRequest, credential: &Credential) -> Result<HttpResponse> {
        Ok(self
            .transport
            .call(request.bearer(credential.access_token()))
            .await?)
    }
}

fn unexpected(operation: &'static str, response: &HttpResponse) -> PlaylistOperationError {
    PlaylistOperationError::UnexpectedStatus {
        operation,
        status: response.status.as_u16(),
        body: response.text(),
    }
}

#[async_trait::async_trait]
impl<B: HttpBackend> PlaylistService for SpotifyWebClient<B> {
    async fn current_user_id(&self, credential: &Credential) -> Result<String> {
        let url = self.endpoint(&["me"])?;
        let response = self
            .send(HttpRequest::new(Method::GET, url), credential)
            .await?;
        if !response.is_success() {
            return Err(unexpected("get current user", &response).into());
        }
        let user: SpotifyUser = response.json()?;
        tracing::debug!(
            user_id = %user.id,
            display_name = user.display_name.as_deref().unwrap_or(""),
            "Fetched current user"
        );
        Ok(user.id)
    }

    async fn list_playlists_page(
        &self,
        credential: &Credential,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RemotePlaylist>> {
        let mut url = self.endpoint(&["users", user_id, "playlists"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        let response = self
            .send(HttpRequest::new(Method::GET, url), credential)
            .await?;
        if !response.is_success() {
            return Err(unexpected("list playlists", &response).into());
        }
        let page: PlaylistsPage = response.json()?;
        Ok(page
            .items
            .into_iter()
            .map(|playlist| RemotePlaylist {
                id: playlist.id,
                name: playlist.name,
            })
            .collect())
    }

    async fn playlist_tracks_page(
        &self,
        credential: &Credential,
        playlist_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<TrackPage> {
        let mut url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        url.query_pairs_mut()
            .append_pair("fields", PLAYLIST_TRACK_FIELDS)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        let response = self
            .send(HttpRequest::new(Method::GET, url), credential)
            .await?;
        if !response.is_success() {
            return Err(unexpected("list playlist tracks", &response).into());
        }
        let page: PlaylistTracksPage = response.json()?;
        Ok(TrackPage {
            track_ids: page
                .items
                .into_iter()
                .map(|item| item.track.and_then(|track| track.id))
                .collect(),
            has_next: page.next.is_some(),
        })
    }

    async fn create_playlist(
        &self,
        credential: &Credential,
        user_id: &str,
        name: &str,
    ) -> Result<RemotePlaylist> {
        let url = self.endpoint(&["users", user_id, "playlists"])?;
        let request = HttpRequest::new(Method::POST, url)
            .json(json!({ "name": name, "public": self.public_playlists }));
        let response = self.send(request, credential).await?;
        if response.status != StatusCode::CREATED {
            return Err(PlaylistOperationError::Create {
                name: name.to_string(),
                status: response.status.as_u16(),
                body: response.text(),
            }
            .into());
        }
        let playlist: SpotifyPlaylist = response.json()?;
        tracing::debug!("Created playlist '{}'", playlist.name);
        Ok(RemotePlaylist {
            id: playlist.id,
            name: playlist.name,
        })
    }

    async fn rename_playlist(
        &self,
        credential: &Credential,
        playlist_id: &str,
        name: &str,
    ) -> Result<()> {
        let url = self.endpoint(&["playlists", playlist_id])?;
        let request = HttpRequest::new(Method::PUT, url).json(json!({ "name": name }));
        let response = self.send(request, credential).await?;
        if !response.is_success() {
            return Err(PlaylistOperationError::Rename {
                playlist_id: playlist_id.to_string(),
                name: name.to_string(),
                status: response.status.as_u16(),
                body: response.text(),
            }
            .into());
        }
        tracing::debug!("Renamed playlist to '{}' (id: {})", name, playlist_id);
        Ok(())
    }

    async fn search_track(
        &self,
        credential: &Credential,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<CatalogMatch>> {
        let mut url = self.endpoint(&["search"])?;
        url.query_pairs_mut()
            .append_pair("q", &format!("track:{} artist:{}", track_name, artist_name))
            .append_pair("type", "track")
            .append_pair("limit", "1");
        let response = self
            .send(HttpRequest::new(Method::GET, url), credential)
            .await?;
        if !response.is_success() {
            return Err(unexpected("search", &response).into());
        }
        let result: SearchResponse = response.json()?;
        Ok(result
            .tracks
            .and_then(|tracks| tracks.items.into_iter().next())
            .map(|track| CatalogMatch {
                track_id: track.id,
                track_uri: track.uri,
            }))
    }

    async fn add_tracks(
        &self,
        credential: &Credential,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()> {
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        let request = HttpRequest::new(Method::POST, url).json(json!({ "uris": uris }));
        let response = self.send(request, credential).await?;
        if !matches!(response.status, StatusCode::OK | StatusCode::CREATED) {
            return Err(PlaylistOperationError::AddTracks {
                playlist_id: playlist_id.to_string(),
                count: uris.len(),
                status: response.status.as_u16(),
                body: response.text(),
            }
            .into());
        }
        tracing::debug!("Added {} tracks to playlist (id: {})", uris.len(), playlist_id);
        Ok(())
    }
}
