use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr, eyre};
use walkdir::WalkDir;

use crate::services::sync::models::{SourceList, SourceRow, derive_title, source_date};

pub trait SourceReader {
    /// Every source in the directory, ordered by file name
    fn list_sources(&self) -> Result<Vec<SourceList>>;

    fn read_source(&self, path: &Path) -> Result<SourceList>;
}

/// Reads `*.csv` files whose first `header_rows` lines are metadata, followed by
/// `track,artist,...` rows, one per line.
pub struct CsvSourceReader {
    directory: PathBuf,
    header_rows: usize,
}

impl CsvSourceReader {
    pub fn new(directory: PathBuf, header_rows: usize) -> Self {
        Self {
            directory,
            header_rows,
        }
    }

    fn source_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.wrap_err_with(|| {
                format!("Failed to list sources in {}", self.directory.display())
            })?;
            if entry.file_type().is_file() && is_csv(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }

    /// Resolve a single source given either a path or a name matching a file
    /// stem or derived title in the sources directory. Several dated sources
    /// sharing a title resolve to the latest date.
    pub fn find_source(&self, name_or_path: &str) -> Result<SourceList> {
        let path = Path::new(name_or_path);
        if path.is_file() {
            return self.read_source(path);
        }

        let paths = self.source_paths()?;
        let by_stem = paths.iter().find(|candidate| {
            candidate.file_stem().and_then(|stem| stem.to_str()) == Some(name_or_path)
        });
        if let Some(path) = by_stem {
            return self.read_source(path);
        }

        let latest = paths
            .iter()
            .filter_map(|candidate| {
                let file_name = candidate.file_name()?.to_str()?;
                (derive_title(file_name) == name_or_path)
                    .then(|| (source_date(file_name), candidate))
            })
            .max_by(|(a, _), (b, _)| a.cmp(b));

        match latest {
            Some((_, path)) => self.read_source(path),
            None => Err(eyre!(
                "No source named '{}' in {}",
                name_or_path,
                self.directory.display()
            )),
        }
    }
}

fn parse_line(line: &str) -> Result<Option<csv::StringRecord>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .transpose()
        .map_err(Into::into)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

impl SourceReader for CsvSourceReader {
    fn list_sources(&self) -> Result<Vec<SourceList>> {
        let mut sources = Vec::new();
        for path in self.source_paths()? {
            match self.read_source(&path) {
                Ok(source) => sources.push(source),
                Err(error) => {
                    tracing::error!(path = %path.display(), "Skipping unreadable source: {:#}", error)
                }
            }
        }
        tracing::info!(
            "Found {} sources in {}",
            sources.len(),
            self.directory.display()
        );
        Ok(sources)
    }

    fn read_source(&self, path: &Path) -> Result<SourceList> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| eyre!("Invalid source file name: {}", path.display()))?
            .to_string();

        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to open source {}", path.display()))?;

        let mut rows = Vec::new();
        for (index, text) in contents.lines().enumerate().skip(self.header_rows) {
            let line = index + 1;
            let record = parse_line(text).wrap_err_with(|| {
                format!("Failed to parse line {} of {}", line, path.display())
            })?;
            match record.as_ref().map(|record| (record.get(0), record.get(1))) {
                Some((Some(track_name), Some(artist_name))) => {
                    rows.push(SourceRow::new(track_name, artist_name, line))
                }
                None => tracing::debug!(file = %file_name, line, "Skipping blank line"),
                Some(_) => tracing::warn!(
                    file = %file_name,
                    line,
                    "Skipping row without track and artist columns"
                ),
            }
        }

        tracing::debug!("Read {} rows from {}", rows.len(), file_name);
        Ok(SourceList::new(file_name, rows))
    }
}
