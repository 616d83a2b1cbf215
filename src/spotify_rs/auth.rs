use std::io::{BufRead, Write};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration, Utc};
use reqwest::Method;
use url::Url;

use crate::ports::credentials::{AuthError, Credential, CredentialProvider};
use crate::spotify_rs::token_store::TokenStore;
use crate::spotify_rs::types::SpotifyTokenResponse;
use crate::transport::{HttpBackend, HttpRequest, ReqwestBackend, Transport};

const SPOTIFY_SCOPES: [&str; 3] = [
    "playlist-modify-public",
    "playlist-modify-private",
    "playlist-read-private",
];

#[derive(Debug, Clone)]
pub struct SpotifyApiCredentials {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SpotifyApiCredentials {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    fn basic_auth_header(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
        )
    }
}

/// Source of the authorization code for the interactive flow
#[cfg_attr(test, mockall::automock)]
pub trait AuthorizationPrompt: Send + Sync {
    fn request_code(&self, auth_url: &Url) -> std::io::Result<String>;
}

/// Prints the authorization URL and reads the code pasted on stdin
pub struct StdinPrompt;

impl AuthorizationPrompt for StdinPrompt {
    fn request_code(&self, auth_url: &Url) -> std::io::Result<String> {
        println!("Go to this URL and authorize access:\n{}", auth_url);
        print!("Enter the authorization code from the redirect URI: ");
        std::io::stdout().flush()?;
        let mut code = String::new();
        std::io::stdin().lock().read_line(&mut code)?;
        Ok(code.trim().to_string())
    }
}

/// Build the authorization-code URL the user has to open
pub fn authorization_url(
    accounts_base_url: &Url,
    credentials: &SpotifyApiCredentials,
    state: &str,
) -> Result<Url, url::ParseError> {
    let authorize = accounts_base_url.join("authorize")?;
    Url::parse(&format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&state={}&scope={}",
        authorize,
        urlencoding::encode(&credentials.client_id),
        urlencoding::encode(&credentials.redirect_uri),
        urlencoding::encode(state),
        urlencoding::encode(&SPOTIFY_SCOPES.join(" "))
    ))
}

/// Obtains a bearer credential: refresh-token grant first, then the
/// interactive authorization-code flow. Rotated refresh tokens are persisted.
pub struct SpotifyCredentialProvider<B: HttpBackend = ReqwestBackend> {
    transport: Arc<Transport<B>>,
    credentials: SpotifyApiCredentials,
    accounts_base_url: Url,
    configured_refresh_token: Option<String>,
    token_store: TokenStore,
    prompt: Box<dyn AuthorizationPrompt>,
}

impl<B: HttpBackend> SpotifyCredentialProvider<B> {
    pub fn new(
        transport: Arc<Transport<B>>,
        credentials: SpotifyApiCredentials,
        accounts_base_url: Url,
        configured_refresh_token: Option<String>,
        token_store: TokenStore,
        prompt: Box<dyn AuthorizationPrompt>,
    ) -> Self {
        Self {
            transport,
            credentials,
            accounts_base_url,
            configured_refresh_token,
            token_store,
            prompt,
        }
    }

    /// Post a grant to the token endpoint. The inner error carries the body
    /// of a non-success response.
    async fn request_token(
        &self,
        form: &[(&str, &str)],
    ) -> Result<Result<SpotifyTokenResponse, String>, AuthError> {
        let url = self
            .accounts_base_url
            .join("api/token")
            .map_err(|error| AuthError::RefreshRejected {
                reason: error.to_string(),
            })?;
        let request = HttpRequest::new(Method::POST, url)
            .header("Authorization", self.credentials.basic_auth_header())
            .form(form);

        let response = self.transport.call(request).await?;
        if !response.is_success() {
            return Ok(Err(response.text()));
        }
        Ok(Ok(response.json::<SpotifyTokenResponse>()?))
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<SpotifyTokenResponse, AuthError> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.credentials.client_id),
        ])
        .await?
        .map_err(|reason| AuthError::RefreshRejected { reason })
    }

    /// Exchange an authorization code for tokens
    /// https://developer.spotify.com/documentation/web-api/tutorials/code-flow
    pub async fn exchange_code_for_token(
        &self,
        code: &str,
    ) -> Result<SpotifyTokenResponse, AuthError> {
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.credentials.redirect_uri),
        ])
        .await?
        .map_err(|reason| AuthError::CodeExchangeRejected { reason })
    }

    fn accept(
        &self,
        token: SpotifyTokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let access_token = token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::NoAccessToken)?;

        if let Some(refresh_token) = token.refresh_token.as_deref() {
            if Some(refresh_token) != previous_refresh_token {
                if let Err(error) = self.token_store.save(refresh_token) {
                    tracing::warn!("Failed to persist refresh token: {:#}", error);
                }
            }
        }

        let expires_in = i64::try_from(token.expires_in).unwrap_or(i64::MAX);
        Ok(Credential::new(
            access_token,
            Utc::now() + Duration::seconds(expires_in),
        ))
    }

    async fn authorize_interactively(&self) -> Result<Credential, AuthError> {
        let state = format!("{:x}", Utc::now().timestamp_millis());
        let auth_url = authorization_url(&self.accounts_base_url, &self.credentials, &state)
            .map_err(|error| AuthError::CodeExchangeRejected {
                reason: error.to_string(),
            })?;
        let code = self.prompt.request_code(&auth_url)?;
        let token = self.exchange_code_for_token(&code).await?;
        self.accept(token, None)
    }
}

#[async_trait::async_trait]
impl<B: HttpBackend> CredentialProvider for SpotifyCredentialProvider<B> {
    async fn get_bearer_token(&self) -> Result<Credential, AuthError> {
        let refresh_token = self
            .token_store
            .load()
            .or_else(|| self.configured_refresh_token.clone());

        if let Some(refresh_token) = refresh_token {
            match self.refresh_access_token(&refresh_token).await {
                Ok(token) => {
                    tracing::info!("Obtained access token via refresh token");
                    return self.accept(token, Some(&refresh_token));
                }
                Err(error) => tracing::warn!(
                    "Refresh token failed: {}. Falling back to manual authorization.",
                    error
                ),
            }
        }

        self.authorize_interactively().await
    }
}
