use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::ports::credentials::Credential;
use crate::ports::spotify::PlaylistService;
use crate::services::sync::models::{CatalogMatch, SourceRow};

/// Concurrent in-flight searches when resolving one list
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, thiserror::Error)]
#[error("Track search failed at line {line} ('{track_name}' by '{artist_name}'): {reason}")]
pub struct RowResolutionError {
    pub line: usize,
    pub track_name: String,
    pub artist_name: String,
    pub reason: String,
}

/// Maps source rows to catalog entries with a bounded number of concurrent
/// searches. Workers only produce results; nothing shared is mutated.
pub struct TrackResolver<'a, S: PlaylistService> {
    service: &'a S,
    credential: &'a Credential,
    concurrency: usize,
}

impl<'a, S: PlaylistService> TrackResolver<'a, S> {
    pub fn new(service: &'a S, credential: &'a Credential, concurrency: usize) -> Self {
        Self {
            service,
            credential,
            concurrency: concurrency.max(1),
        }
    }

    async fn resolve_row(
        &self,
        row: &SourceRow,
    ) -> Result<Option<CatalogMatch>, RowResolutionError> {
        self.service
            .search_track(self.credential, &row.track_name, &row.artist_name)
            .await
            .map_err(|error| RowResolutionError {
                line: row.line,
                track_name: row.track_name.clone(),
                artist_name: row.artist_name.clone(),
                reason: format!("{:#}", error),
            })
    }

    /// One result per row, aligned with `rows`. A failed lookup yields `None`.
    pub async fn resolve_batch(&self, rows: &[SourceRow]) -> Vec<Option<CatalogMatch>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let tasks: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let semaphore = semaphore.clone();
                async move {
                    let outcome = match semaphore.acquire().await {
                        Ok(_permit) => self.resolve_row(row).await,
                        Err(error) => Err(RowResolutionError {
                            line: row.line,
                            track_name: row.track_name.clone(),
                            artist_name: row.artist_name.clone(),
                            reason: error.to_string(),
                        }),
                    };
                    (index, outcome)
                }
            })
            .collect();

        let mut results = vec![None; rows.len()];
        for (index, outcome) in join_all(tasks).await {
            match outcome {
                Ok(found) => results[index] = found,
                Err(error) => tracing::warn!(row = index, "{}", error),
            }
        }

        let found = results.iter().filter(|result| result.is_some()).count();
        tracing::debug!("Resolved {}/{} rows", found, rows.len());
        results
    }
}
