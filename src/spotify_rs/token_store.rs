use std::path::PathBuf;

use color_eyre::Result;
use color_eyre::eyre::Context;

use crate::spotify_rs::types::StoredToken;

/// Persists the latest refresh token between runs.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: Option<PathBuf>,
}

impl TokenStore {
    #[cfg(test)]
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Store under the user's data directory, or nowhere if there is none
    pub fn default_location() -> Self {
        Self {
            path: dirs::data_dir().map(|dir| dir.join("chart-sync").join("token.toml")),
        }
    }

    pub fn load(&self) -> Option<String> {
        let path = self.path.as_ref()?;
        let contents = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<StoredToken>(&contents) {
            Ok(stored) if !stored.refresh_token.is_empty() => Some(stored.refresh_token),
            Ok(_) => None,
            Err(error) => {
                tracing::warn!(path = %path.display(), "Ignoring unreadable token store: {}", error);
                None
            }
        }
    }

    pub fn save(&self, refresh_token: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string(&StoredToken {
            refresh_token: refresh_token.to_string(),
        })
        .wrap_err("Failed to serialize refresh token")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Refresh token updated in {}", path.display());
        Ok(())
    }
}
