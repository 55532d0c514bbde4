//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [oauth]      # provider endpoints and client registration
//! [session]    # refresh bound, expiry checks, redirect wait
//! [storage]    # where tokens live
//! [logging]    # console level and rolling log file
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., a project-local
/// `lavega.toml`) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LavegaConfig {
    /// OAuth client settings.
    pub oauth: Option<OAuthSection>,

    /// Session resolution settings.
    pub session: Option<SessionSection>,

    /// Token storage settings.
    pub storage: Option<StorageSection>,

    /// Logging settings.
    pub logging: Option<LoggingSection>,
}

impl LavegaConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// `[oauth]` merges field by field so a project file can override a single
    /// endpoint; the other sections are replaced whole.
    pub fn merge(&mut self, other: LavegaConfig) {
        if let Some(layer) = other.oauth {
            match self.oauth.as_mut() {
                Some(base) => base.merge(layer),
                None => self.oauth = Some(layer),
            }
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.storage.is_some() {
            self.storage = other.storage;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// OAuth section, or an empty one.
    pub fn oauth(&self) -> OAuthSection {
        self.oauth.clone().unwrap_or_default()
    }

    /// Session section, or defaults.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// Storage section, or defaults.
    pub fn storage(&self) -> StorageSection {
        self.storage.clone().unwrap_or_default()
    }

    /// Logging section, or defaults.
    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OAuth Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// OAuth client registration and endpoints.
///
/// Unset fields fall back to the Google preset.
///
/// ```toml
/// [oauth]
/// client_id = "1234.apps.googleusercontent.com"
/// redirect_uri = "http://127.0.0.1:8765/oauth2redirect"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSection {
    /// Client ID issued by the provider.
    pub client_id: Option<String>,
    /// Client secret (prefer keyring or env var; warns if set here).
    pub client_secret: Option<String>,
    /// Authorization endpoint.
    pub authorize_url: Option<String>,
    /// Token endpoint.
    pub token_url: Option<String>,
    /// Redirect URI registered with the provider.
    pub redirect_uri: Option<String>,
    /// Space-separated scopes.
    pub scope: Option<String>,
    /// Ask for offline access so a refresh token is issued.
    pub offline_access: Option<bool>,
}

impl OAuthSection {
    /// Returns true if a client secret is stored directly in the config file.
    pub fn has_plaintext_client_secret(&self) -> bool {
        self.client_secret.is_some()
    }

    /// Get the client ID, returning an error if not configured.
    pub fn require_client_id(&self) -> crate::Result<&str> {
        self.client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| crate::ConfigError::MissingField {
                field: "client_id".to_string(),
                context: "[oauth]".to_string(),
            })
    }

    fn merge(&mut self, other: OAuthSection) {
        fn take(base: &mut Option<String>, layer: Option<String>) {
            if layer.is_some() {
                *base = layer;
            }
        }
        take(&mut self.client_id, other.client_id);
        take(&mut self.client_secret, other.client_secret);
        take(&mut self.authorize_url, other.authorize_url);
        take(&mut self.token_url, other.token_url);
        take(&mut self.redirect_uri, other.redirect_uri);
        take(&mut self.scope, other.scope);
        if other.offline_access.is_some() {
            self.offline_access = other.offline_access;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session resolution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Refresh attempts per resolution before logging out.
    pub max_refresh_attempts: u32,
    /// Treat ID tokens with a past `exp` as invalid.
    pub validate_expiry: bool,
    /// Clock skew tolerated on `exp`, in seconds.
    pub expiry_leeway_secs: u64,
    /// How long to wait for the browser redirect, in seconds.
    pub callback_timeout_secs: u64,
    /// Open the consent page in the system browser.
    pub open_browser: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_refresh_attempts: 1,
            validate_expiry: true,
            expiry_leeway_secs: 60,
            callback_timeout_secs: 300,
            open_browser: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Token storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Storage backend.
    pub backend: StorageBackend,
    /// Directory for `tokens.age` (and `master.key` without keyring support).
    /// Defaults to the config dir.
    pub data_dir: Option<PathBuf>,
}

/// Where tokens are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Age-encrypted file on disk.
    #[default]
    Encrypted,
    /// Process memory only; every launch starts signed out.
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Encrypted => f.write_str("encrypted"),
            StorageBackend::Memory => f.write_str("memory"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Console filter directive when `RUST_LOG` is not set.
    pub level: String,
    /// Write a daily-rolling JSON log file.
    pub file: bool,
    /// Directory for log files. Defaults to `<config dir>/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
            dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = LavegaConfig::new();
        assert!(config.oauth.is_none());
        assert!(config.session.is_none());
        assert_eq!(config.session().max_refresh_attempts, 1);
        assert_eq!(config.storage().backend, StorageBackend::Encrypted);
        assert_eq!(config.logging().level, "info");
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
[oauth]
client_id = "abc.apps.googleusercontent.com"
redirect_uri = "http://127.0.0.1:9000/cb"
offline_access = false

[session]
max_refresh_attempts = 2
validate_expiry = false

[storage]
backend = "memory"
data_dir = "/tmp/lavega"

[logging]
level = "debug"
file = false
"#;
        let config = LavegaConfig::from_toml(toml).unwrap();
        let oauth = config.oauth.as_ref().unwrap();
        assert_eq!(oauth.client_id.as_deref(), Some("abc.apps.googleusercontent.com"));
        assert_eq!(oauth.offline_access, Some(false));
        assert!(oauth.token_url.is_none());

        let session = config.session();
        assert_eq!(session.max_refresh_attempts, 2);
        assert!(!session.validate_expiry);
        // Unset fields keep their defaults.
        assert_eq!(session.callback_timeout_secs, 300);

        assert_eq!(config.storage().backend, StorageBackend::Memory);
        assert_eq!(config.storage().data_dir, Some(PathBuf::from("/tmp/lavega")));
        assert!(!config.logging().file);
    }

    #[test]
    fn test_negative_leeway_is_rejected() {
        let err = LavegaConfig::from_toml("[session]\nexpiry_leeway_secs = -30\n").unwrap_err();
        assert!(matches!(err, crate::ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_storage_backend_is_rejected() {
        let err = LavegaConfig::from_toml("[storage]\nbackend = \"sqlite\"\n").unwrap_err();
        assert!(matches!(err, crate::ConfigError::Parse(_)));
    }

    #[test]
    fn test_merge_oauth_field_by_field() {
        let mut base = LavegaConfig::from_toml(
            r#"
[oauth]
client_id = "base-id"
scope = "openid email"

[session]
max_refresh_attempts = 3
"#,
        )
        .unwrap();
        let layer = LavegaConfig::from_toml(
            r#"
[oauth]
redirect_uri = "http://localhost:7000/cb"

[session]
open_browser = false
"#,
        )
        .unwrap();

        base.merge(layer);
        let oauth = base.oauth();
        assert_eq!(oauth.client_id.as_deref(), Some("base-id"));
        assert_eq!(oauth.scope.as_deref(), Some("openid email"));
        assert_eq!(oauth.redirect_uri.as_deref(), Some("http://localhost:7000/cb"));

        // Non-oauth sections are replaced whole.
        let session = base.session();
        assert!(!session.open_browser);
        assert_eq!(session.max_refresh_attempts, 1);
    }

    #[test]
    fn test_merge_keeps_base_when_layer_empty() {
        let mut base = LavegaConfig::from_toml("[oauth]\nclient_id = \"x\"\n").unwrap();
        base.merge(LavegaConfig::new());
        assert_eq!(base.oauth().client_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_require_client_id() {
        assert!(OAuthSection::default().require_client_id().is_err());
        let empty = OAuthSection {
            client_id: Some(String::new()),
            ..Default::default()
        };
        assert!(empty.require_client_id().is_err());
        let set = OAuthSection {
            client_id: Some("id".to_string()),
            ..Default::default()
        };
        assert_eq!(set.require_client_id().unwrap(), "id");
    }

    #[test]
    fn test_toml_round_trip_preserves_values() {
        let mut config = LavegaConfig::new();
        config.oauth = Some(OAuthSection {
            client_id: Some("id".to_string()),
            ..Default::default()
        });
        config.storage = Some(StorageSection {
            backend: StorageBackend::Memory,
            data_dir: None,
        });

        let text = config.to_toml().unwrap();
        assert!(text.contains("[oauth]"));
        assert!(text.contains("backend = \"memory\""));
        assert_eq!(LavegaConfig::from_toml(&text).unwrap(), config);
    }
}
