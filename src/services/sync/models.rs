use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static DATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d{2})-(\d{2})-(\d{4})$").unwrap());

fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
}

/// Playlist title for a source file: the file stem with a trailing
/// `-DD-MM-YYYY` removed.
pub fn derive_title(file_name: &str) -> String {
    DATE_SUFFIX.replace(file_stem(file_name), "").into_owned()
}

/// Date of the trailing `-DD-MM-YYYY` suffix, if present and valid
pub fn source_date(file_name: &str) -> Option<NaiveDate> {
    let captures = DATE_SUFFIX.captures(file_stem(file_name))?;
    NaiveDate::from_ymd_opt(
        captures[3].parse().ok()?,
        captures[2].parse().ok()?,
        captures[1].parse().ok()?,
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRow {
    pub track_name: String,
    pub artist_name: String,
    /// 1-based physical line in the source file
    pub line: usize,
}

impl SourceRow {
    pub fn new(
        track_name: impl Into<String>,
        artist_name: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            track_name: track_name.into(),
            artist_name: artist_name.into(),
            line,
        }
    }
}

/// One dated track listing, e.g. a weekly chart export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceList {
    pub title: String,
    pub file_name: String,
    /// Data rows only, in file order
    pub rows: Vec<SourceRow>,
}

impl SourceList {
    pub fn new(file_name: impl Into<String>, rows: Vec<SourceRow>) -> Self {
        let file_name = file_name.into();
        Self {
            title: derive_title(&file_name),
            file_name,
            rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub track_id: String,
    pub track_uri: String,
}

/// Local mirror of one remote playlist's identity and membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRecord {
    pub id: String,
    pub name: String,
    pub track_ids: HashSet<String>,
}

impl PlaylistRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            track_ids: HashSet::new(),
        }
    }
}
