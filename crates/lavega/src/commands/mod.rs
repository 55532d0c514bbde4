//! CLI command handlers.

pub mod app;
pub mod config;
pub mod login;
pub mod logout;
pub mod refresh;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};

use lavega_auth::store::KEY_FILE;
use lavega_auth::{
    AuthError, ClaimsValidator, FileKeySource, HttpTokenClient, LoginInitiator, LoopbackAgent,
    MasterKey, MasterKeySource, OAuthConfig, SessionResolver, SharedAuthorizationAgent,
    SharedKeySource, SharedTokenClient, SharedTokenStore,
};
use lavega_config::{LavegaConfig, StorageBackend};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Merged configuration.
    pub config: LavegaConfig,
    /// User config directory (also the default data directory).
    pub config_dir: PathBuf,
}

impl Context {
    /// Directory holding `tokens.age` (and `master.key` without keyring support).
    pub fn data_dir(&self) -> PathBuf {
        self.config
            .storage()
            .data_dir
            .unwrap_or_else(|| self.config_dir.clone())
    }

    /// OAuth client settings: the Google preset overlaid with `[oauth]`.
    pub fn oauth_config(&self) -> Result<OAuthConfig> {
        let section = self.config.oauth();
        let client_id = section.require_client_id()?.to_string();

        let mut config = OAuthConfig::google(client_id.clone());
        if let Some(url) = section.authorize_url {
            config.authorize_url = url;
        }
        if let Some(url) = section.token_url {
            config.token_url = url;
        }
        if let Some(uri) = section.redirect_uri {
            config.redirect_uri = uri;
        }
        if let Some(scope) = section.scope {
            config.scope = scope;
        }
        if let Some(offline) = section.offline_access {
            config.offline_access = offline;
        }

        if let Some(secret) =
            lavega_config::resolve_client_secret(&client_id, section.client_secret.as_deref())
        {
            tracing::debug!(source = %secret.source, "Resolved client secret");
            config.client_secret = Some(secret.value);
        }

        config.validate()?;
        Ok(config)
    }

    /// Token store selected by `[storage]`.
    pub fn token_store(&self) -> SharedTokenStore {
        match self.config.storage().backend {
            StorageBackend::Encrypted => {
                let data_dir = self.data_dir();
                let keys = key_source(&data_dir);
                lavega_auth::store::create_token_store(&data_dir, keys)
            }
            StorageBackend::Memory => lavega_auth::store::create_memory_token_store(),
        }
    }

    pub fn token_client(&self) -> Result<SharedTokenClient> {
        Ok(Arc::new(HttpTokenClient::new(self.oauth_config()?)))
    }

    /// Claims validator configured by `[session]`.
    pub fn validator(&self) -> Result<ClaimsValidator> {
        let session = self.config.session();
        let leeway = i64::try_from(session.expiry_leeway_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .ok_or_else(|| {
                anyhow!(
                    "[session] expiry_leeway_secs = {} is out of range",
                    session.expiry_leeway_secs
                )
            })?;
        Ok(ClaimsValidator {
            validate_expiry: session.validate_expiry,
            leeway,
        })
    }

    pub fn resolver(&self, store: SharedTokenStore) -> Result<SessionResolver> {
        Ok(SessionResolver::new(store, self.token_client()?)
            .with_validator(self.validator()?)
            .with_max_refresh_attempts(self.config.session().max_refresh_attempts))
    }

    pub fn login_initiator(&self, store: SharedTokenStore) -> Result<LoginInitiator> {
        Ok(LoginInitiator::new(
            self.oauth_config()?,
            self.token_client()?,
            store,
        ))
    }

    /// Browser agent: loopback receiver, or manual paste when `manual` is set.
    pub fn authorization_agent(&self, manual: bool) -> Result<SharedAuthorizationAgent> {
        if manual {
            return Ok(Arc::new(login::ManualAgent));
        }
        let session = self.config.session();
        let oauth = self.oauth_config()?;
        let agent = LoopbackAgent::new(&oauth.redirect_uri)
            .context("Redirect URI cannot be served locally; use --manual")?
            .with_open_browser(session.open_browser)
            .with_timeout(Duration::from_secs(session.callback_timeout_secs));
        Ok(Arc::new(agent))
    }
}

/// Master key source for the encrypted store in `data_dir`.
fn key_source(data_dir: &Path) -> SharedKeySource {
    let file = FileKeySource::new(data_dir.join(KEY_FILE));
    if lavega_config::secrets::keyring_enabled() {
        Arc::new(KeyringKeySource {
            data_dir: data_dir.to_path_buf(),
            legacy: file,
        })
    } else {
        Arc::new(file)
    }
}

/// Master key held in the system keyring.
///
/// A `master.key` file written by a build without keyring support is moved
/// into the keyring on first use so existing sessions stay readable.
#[derive(Debug)]
struct KeyringKeySource {
    data_dir: PathBuf,
    legacy: FileKeySource,
}

impl MasterKeySource for KeyringKeySource {
    fn master_key(&self) -> lavega_auth::Result<MasterKey> {
        if let Some(encoded) =
            lavega_config::secrets::load_master_key(&self.data_dir).map_err(keyring_error)?
        {
            return MasterKey::parse(&encoded);
        }

        let migrating = self.legacy.exists();
        let key = if migrating {
            self.legacy.master_key()?
        } else {
            MasterKey::generate()
        };
        lavega_config::secrets::store_master_key(&self.data_dir, &key.to_encoded())
            .map_err(keyring_error)?;

        if migrating {
            std::fs::remove_file(self.legacy.path())?;
            tracing::info!("Moved master key into the system keyring");
        } else {
            tracing::info!("Created master key in the system keyring");
        }
        Ok(key)
    }
}

fn keyring_error(e: lavega_config::ConfigError) -> AuthError {
    AuthError::Storage(e.to_string())
}

/// Spinner shown while background work runs. Hidden in JSON mode.
pub fn spinner(ctx: &Context, message: &str) -> ProgressBar {
    if ctx.json_output {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
