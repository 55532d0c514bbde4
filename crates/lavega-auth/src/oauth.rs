//! OAuth 2.0 Authorization Code + PKCE primitives and the token endpoint client.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::distr::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};

/// Google's authorization endpoint.
pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Default loopback redirect for installed applications.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/oauth2redirect";

/// Scopes needed for an ID token carrying `name` and `email`.
pub const DEFAULT_SCOPE: &str = "openid email profile";

/// Length of the generated PKCE code verifier.
pub const VERIFIER_LENGTH: usize = 64;

/// Static configuration of the identity provider and this client.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Installed-app clients at some providers (Google) still expect a secret.
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scope: String,
    /// Ask the provider to issue a refresh token.
    pub offline_access: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::google(String::new())
    }
}

impl OAuthConfig {
    /// Create a config targeting Google as the identity provider.
    pub fn google(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            authorize_url: GOOGLE_AUTHORIZE_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            offline_access: true,
        }
    }

    /// Check that the fields needed to start a login are present.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config(
                "oauth.client_id is not set. Add it to your lavega config".to_string(),
            ));
        }
        for (field, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("redirect_uri", &self.redirect_uri),
        ] {
            url::Url::parse(value).map_err(|e| {
                AuthError::Config(format!("oauth.{} is not a valid URL: {}", field, e))
            })?;
        }
        Ok(())
    }
}

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier/challenge pair for one login attempt.
    pub fn generate() -> Self {
        let verifier: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(VERIFIER_LENGTH)
            .map(char::from)
            .collect();
        let challenge = Self::challenge_for(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    /// S256 challenge for a verifier.
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Build the authorization URL for the OAuth flow.
pub fn build_authorization_url(config: &OAuthConfig, challenge: &str, state: &str) -> String {
    let mut params = vec![
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", config.scope.as_str()),
        ("code_challenge", challenge),
        ("code_challenge_method", "S256"),
        ("state", state),
    ];
    if config.offline_access {
        params.push(("access_type", "offline"));
        params.push(("prompt", "consent"));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if config.authorize_url.contains('?') {
        '&'
    } else {
        '?'
    };
    format!("{}{}{}", config.authorize_url, separator, query)
}

/// Successful authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: String,
}

/// Parse the authorization redirect.
///
/// Accepts a full redirect URL (`http://127.0.0.1:8765/cb?code=..&state=..`)
/// or just its query string.
pub fn parse_redirect(input: &str) -> Result<AuthorizationResponse> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidRequest("Empty redirect".to_string()));
    }

    let query = match url::Url::parse(trimmed) {
        Ok(url) => url.query().unwrap_or_default().to_string(),
        Err(_) => trimmed.trim_start_matches('?').to_string(),
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        let message = match error_description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        };
        return Err(AuthError::Authorization(message));
    }

    match (code, state) {
        (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => {
            Ok(AuthorizationResponse { code, state })
        }
        _ => Err(AuthError::InvalidRequest(
            "Missing code or state in redirect".to_string(),
        )),
    }
}

/// Tokens returned from the token endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Error body defined by RFC 6749 section 5.2.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// The external operations the session layer needs from an OAuth client.
#[async_trait]
pub trait TokenClient: Send + Sync + std::fmt::Debug {
    /// Exchange an authorization code (plus its PKCE verifier) for tokens.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse>;

    /// Obtain fresh tokens with a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// Shared token client for use across async contexts.
pub type SharedTokenClient = Arc<dyn TokenClient>;

/// Token client talking to a real token endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl HttpTokenClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    async fn post_token_request<'a>(
        &'a self,
        mut form: Vec<(&'a str, &'a str)>,
        operation: &str,
    ) -> Result<TokenResponse> {
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let detail = match serde_json::from_str::<TokenErrorBody>(&error_text) {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{} ({})", body.error, description),
                    None => body.error,
                },
                Err(_) => error_text,
            };
            return Err(AuthError::Backend(format!(
                "{} failed with {}: {}",
                operation, status, detail
            )));
        }

        response.json().await.map_err(|e| {
            AuthError::Backend(format!("Failed to parse {} response: {}", operation, e))
        })
    }
}

#[async_trait]
impl TokenClient for HttpTokenClient {
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse> {
        let form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        let tokens = self.post_token_request(form, "Token exchange").await?;
        tracing::debug!(
            has_refresh = tokens.refresh_token.is_some(),
            has_id_token = tokens.id_token.is_some(),
            "Token exchange completed"
        );
        Ok(tokens)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.post_token_request(form, "Token refresh").await
    }
}
