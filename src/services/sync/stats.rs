use std::fmt;

/// Counters aggregated over one run, read at the end for the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub playlists_created: u32,
    pub playlists_renamed: u32,
    pub tracks_added: u32,
    pub tracks_already_present: u32,
    pub tracks_not_found: u32,
    pub lists_skipped: u32,
    pub lists_failed: u32,
}

impl RunStats {
    pub fn print_summary(&self) {
        println!("\n{}", self);
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Playlist sync summary ---")?;
        writeln!(f, "Playlists created:        {}", self.playlists_created)?;
        writeln!(f, "Playlists renamed:        {}", self.playlists_renamed)?;
        writeln!(f, "Tracks added:             {}", self.tracks_added)?;
        writeln!(f, "Tracks already present:   {}", self.tracks_already_present)?;
        writeln!(f, "Tracks not found:         {}", self.tracks_not_found)?;
        writeln!(f, "Lists skipped (complete): {}", self.lists_skipped)?;
        writeln!(f, "Lists failed:             {}", self.lists_failed)?;
        write!(f, "-----------------------------")
    }
}
