use color_eyre::eyre::{Result, WrapErr};

use crate::ports::credentials::Credential;
use crate::ports::spotify::{MAX_TRACKS_PER_ADD, PlaylistService};
use crate::services::sync::index::PlaylistIndex;
use crate::services::sync::models::{PlaylistRecord, SourceList};
use crate::services::sync::resolver::TrackResolver;
use crate::services::sync::stats::RunStats;

/// Terminal state of one source list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    /// The playlist already held at least as many tracks as the list has rows
    Skipped,
    Synced { added: usize, not_found: usize },
}

/// Brings remote playlists up to date with source lists, one list at a time.
///
/// Owns the run's [`PlaylistIndex`] and [`RunStats`]; every membership update
/// happens here, after the resolver has fanned back in.
pub struct Reconciler<'a, S: PlaylistService> {
    service: &'a S,
    credential: &'a Credential,
    index: PlaylistIndex,
    stats: RunStats,
    concurrency: usize,
}

impl<'a, S: PlaylistService> Reconciler<'a, S> {
    pub fn new(
        service: &'a S,
        credential: &'a Credential,
        index: PlaylistIndex,
        concurrency: usize,
    ) -> Self {
        Self {
            service,
            credential,
            index,
            stats: RunStats::default(),
            concurrency,
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    #[cfg(test)]
    pub fn index(&self) -> &PlaylistIndex {
        &self.index
    }

    pub fn into_stats(self) -> RunStats {
        self.stats
    }

    /// Reconcile every source in order. A failing list is logged and counted;
    /// the remaining lists still run.
    pub async fn run(&mut self, sources: &[SourceList]) {
        let total = sources.len();
        for (position, source) in sources.iter().enumerate() {
            let processed = position + 1;
            tracing::info!(
                "({}/{} {:.2}%) > Processing file: {} | Title: {}",
                processed,
                total,
                processed as f64 / total as f64 * 100.0,
                source.file_name,
                source.title
            );

            if let Err(error) = self.reconcile(source).await {
                self.stats.lists_failed += 1;
                tracing::error!(
                    file = %source.file_name,
                    "Failed to sync playlist '{}': {:#}",
                    source.title,
                    error
                );
            }
        }
    }

    /// Find the playlist whose name starts with `title`, renaming it to exactly
    /// `title` if needed, or create one. Returns its index position.
    async fn match_or_create(&mut self, title: &str) -> Result<usize> {
        if let Some(position) = self.index.find_prefix(title) {
            let record = self.index.record(position);
            if record.name != title {
                let previous = record.name.clone();
                self.service
                    .rename_playlist(self.credential, &record.id, title)
                    .await
                    .wrap_err_with(|| format!("Failed to rename playlist '{}'", previous))?;
                let record = self.index.record_mut(position);
                record.name = title.to_string();
                self.stats.playlists_renamed += 1;
                tracing::info!(
                    "Renamed playlist '{}' to '{}' (id: {})",
                    previous,
                    title,
                    record.id
                );
            }
            return Ok(position);
        }

        let created = self
            .service
            .create_playlist(self.credential, self.index.owner_id(), title)
            .await
            .wrap_err_with(|| format!("Failed to create playlist '{}'", title))?;
        tracing::info!("Created new playlist '{}' (id: {})", title, created.id);
        self.stats.playlists_created += 1;
        Ok(self.index.insert(PlaylistRecord::new(created.id, title)))
    }

    async fn add_in_chunks(&self, playlist_id: &str, title: &str, uris: &[String]) {
        let total = uris.len();
        let mut submitted = 0;
        for chunk in uris.chunks(MAX_TRACKS_PER_ADD) {
            submitted += chunk.len();
            match self
                .service
                .add_tracks(self.credential, playlist_id, chunk)
                .await
            {
                Ok(()) => tracing::info!(
                    "({}/{} {:.2}%) > Added {} tracks to playlist '{}'",
                    submitted,
                    total,
                    submitted as f64 / total as f64 * 100.0,
                    chunk.len(),
                    title
                ),
                Err(error) => tracing::warn!(
                    playlist_id,
                    "Failed to add {} tracks to playlist '{}': {:#}",
                    chunk.len(),
                    title,
                    error
                ),
            }
        }
    }

    pub async fn reconcile(&mut self, source: &SourceList) -> Result<ListOutcome> {
        let position = self.match_or_create(&source.title).await?;

        let present = self.index.record(position).track_ids.len();
        if present >= source.rows.len() {
            tracing::info!(
                "Playlist '{}' already has {} tracks (source: {}), skipping",
                source.title,
                present,
                source.rows.len()
            );
            self.stats.lists_skipped += 1;
            return Ok(ListOutcome::Skipped);
        }

        let resolver = TrackResolver::new(self.service, self.credential, self.concurrency);
        let results = resolver.resolve_batch(&source.rows).await;

        let record = self.index.record_mut(position);
        let mut to_add = Vec::new();
        let mut not_found = 0;
        for (row, result) in source.rows.iter().zip(results) {
            match result {
                Some(found) => {
                    // Claim the id now so a repeated row later in the list is caught
                    if record.track_ids.insert(found.track_id) {
                        tracing::debug!(
                            "Track to add: {} by {}",
                            row.track_name,
                            row.artist_name
                        );
                        to_add.push(found.track_uri);
                    } else {
                        self.stats.tracks_already_present += 1;
                    }
                }
                None => {
                    not_found += 1;
                    self.stats.tracks_not_found += 1;
                    tracing::warn!(
                        line = row.line,
                        "Not found: {} by {} in file: {}",
                        row.track_name,
                        row.artist_name,
                        source.file_name
                    );
                }
            }
        }

        let playlist_id = record.id.clone();
        let added = to_add.len();
        if to_add.is_empty() {
            tracing::info!("No new tracks to add for playlist '{}'", source.title);
        } else {
            self.add_in_chunks(&playlist_id, &source.title, &to_add)
                .await;
        }
        // Counted as queued; chunks rejected by the service are only logged
        self.stats.tracks_added += added as u32;

        Ok(ListOutcome::Synced { added, not_found })
    }
}
