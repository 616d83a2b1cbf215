use chrono::{DateTime, Utc};

use crate::transport::TransportError;

/// Bearer credential for one run. Acquired before the run starts and never
/// refreshed while it is in progress.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Spotify client id and secret are required (config or SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET)")]
    MissingClientCredentials,
    #[error("Refresh token was rejected: {reason}")]
    RefreshRejected { reason: String },
    #[error("Authorization code was rejected: {reason}")]
    CodeExchangeRejected { reason: String },
    #[error("Token response did not contain an access token")]
    NoAccessToken,
    #[error("Token request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Failed to read authorization code: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_bearer_token(&self) -> Result<Credential, AuthError>;
}
