use color_eyre::eyre::{Result, WrapErr};

use crate::ports::credentials::Credential;
use crate::ports::spotify::PlaylistService;
use crate::services::sync::models::PlaylistRecord;

const PLAYLIST_PAGE_SIZE: u32 = 50;
const TRACK_PAGE_SIZE: u32 = 100;

/// Snapshot of the user's playlists and their membership, taken once per run
/// and updated only by the reconciler's own writes.
///
/// Records keep the remote listing order so prefix matching is reproducible.
#[derive(Debug, Clone, Default)]
pub struct PlaylistIndex {
    owner_id: String,
    records: Vec<PlaylistRecord>,
}

impl PlaylistIndex {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            records: Vec::new(),
        }
    }

    pub async fn build<S: PlaylistService>(service: &S, credential: &Credential) -> Result<Self> {
        let owner_id = service
            .current_user_id(credential)
            .await
            .wrap_err("Failed to fetch current user")?;
        let mut index = Self::new(owner_id);

        let mut offset = 0;
        loop {
            let page = service
                .list_playlists_page(credential, &index.owner_id, PLAYLIST_PAGE_SIZE, offset)
                .await
                .wrap_err_with(|| format!("Failed to list playlists at offset {}", offset))?;
            if page.is_empty() {
                break;
            }
            for playlist in page {
                index.insert(PlaylistRecord::new(playlist.id, playlist.name));
            }
            offset += PLAYLIST_PAGE_SIZE;
        }

        for record in &mut index.records {
            let mut offset = 0;
            loop {
                let page = service
                    .playlist_tracks_page(credential, &record.id, TRACK_PAGE_SIZE, offset)
                    .await
                    .wrap_err_with(|| {
                        format!("Failed to list tracks of playlist '{}'", record.name)
                    })?;
                record.track_ids.extend(page.track_ids.into_iter().flatten());
                if !page.has_next {
                    break;
                }
                offset += TRACK_PAGE_SIZE;
            }
            tracing::debug!(
                "Indexed playlist '{}' with {} tracks",
                record.name,
                record.track_ids.len()
            );
        }

        tracing::info!("Indexed {} playlists", index.records.len());
        Ok(index)
    }

    /// Id of the user owning the indexed playlists
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a record, replacing the value of an existing record with the same
    /// name in place. Returns the record's position.
    pub fn insert(&mut self, record: PlaylistRecord) -> usize {
        match self.records.iter().position(|r| r.name == record.name) {
            Some(position) => {
                self.records[position] = record;
                position
            }
            None => {
                self.records.push(record);
                self.records.len() - 1
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&PlaylistRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Position of the first record, in listing order, whose name starts with `title`
    pub fn find_prefix(&self, title: &str) -> Option<usize> {
        self.records.iter().position(|r| r.name.starts_with(title))
    }

    pub fn record(&self, position: usize) -> &PlaylistRecord {
        &self.records[position]
    }

    pub fn record_mut(&mut self, position: usize) -> &mut PlaylistRecord {
        &mut self.records[position]
    }

    #[cfg(test)]
    pub fn records(&self) -> impl Iterator<Item = &PlaylistRecord> {
        self.records.iter()
    }
}
