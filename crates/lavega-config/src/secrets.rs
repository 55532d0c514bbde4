//! Client secret and token master key storage.
//!
//! Client secret resolution order:
//! 1. System keyring (if `keyring` feature enabled)
//! 2. `LAVEGA_CLIENT_SECRET` environment variable
//! 3. Config file (with warning)
//!
//! Keyring entries are stored as service="lavega", user="<client_id>". The
//! token master key uses user="master-key:<data dir>".

use std::path::Path;

/// Keyring service name.
const SERVICE_NAME: &str = "lavega";

/// Environment variable holding the client secret.
pub const CLIENT_SECRET_ENV: &str = "LAVEGA_CLIENT_SECRET";

/// Result of secret resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// OS keyring (macOS Keychain, Linux secret-service, Windows Credential Manager).
    Keyring,
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Keyring => write!(f, "system keyring"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the client secret for `client_id`.
///
/// Desktop clients registered as "installed apps" may have no secret at all,
/// in which case this returns `None`.
pub fn resolve_client_secret(client_id: &str, config_value: Option<&str>) -> Option<ResolvedSecret> {
    if let Some(secret) = get_from_keyring(client_id) {
        return Some(secret);
    }

    if let Ok(value) = std::env::var(CLIENT_SECRET_ENV)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(CLIENT_SECRET_ENV.to_string()),
        });
    }

    config_value.filter(|v| !v.is_empty()).map(|v| ResolvedSecret {
        value: v.to_string(),
        source: SecretSource::ConfigFile,
    })
}

/// Whether this build can reach the system keyring.
pub fn keyring_enabled() -> bool {
    cfg!(feature = "keyring")
}

/// Keyring user name for the master key protecting tokens in `data_dir`.
pub fn master_key_account(data_dir: &Path) -> String {
    format!("master-key:{}", data_dir.display())
}

/// Fetch the token master key for `data_dir`. `Ok(None)` when none is stored.
pub fn load_master_key(data_dir: &Path) -> crate::Result<Option<String>> {
    get_keyring_entry(SERVICE_NAME, &master_key_account(data_dir))
        .map_err(crate::ConfigError::Keyring)
}

/// Store the token master key for `data_dir`.
pub fn store_master_key(data_dir: &Path, encoded: &str) -> crate::Result<()> {
    store_keyring_entry(SERVICE_NAME, &master_key_account(data_dir), encoded)
        .map_err(crate::ConfigError::Keyring)
}

/// Store the client secret in the system keyring.
pub fn store_in_keyring(client_id: &str, secret: &str) -> crate::Result<()> {
    store_keyring_entry(SERVICE_NAME, client_id, secret).map_err(crate::ConfigError::Keyring)
}

/// Delete the client secret from the system keyring.
pub fn delete_from_keyring(client_id: &str) -> crate::Result<()> {
    delete_keyring_entry(SERVICE_NAME, client_id).map_err(crate::ConfigError::Keyring)
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyring implementation (feature-gated)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "keyring")]
fn get_from_keyring(client_id: &str) -> Option<ResolvedSecret> {
    // Keep tests isolated from the local keychain.
    if cfg!(test) {
        return None;
    }

    let entry = keyring::Entry::new(SERVICE_NAME, client_id).ok()?;
    let value = entry.get_password().ok()?;
    if value.is_empty() {
        return None;
    }
    Some(ResolvedSecret {
        value,
        source: SecretSource::Keyring,
    })
}

#[cfg(feature = "keyring")]
fn get_keyring_entry(service: &str, user: &str) -> std::result::Result<Option<String>, String> {
    if cfg!(test) {
        return Err("keyring access disabled in tests".to_string());
    }
    let entry = keyring::Entry::new(service, user).map_err(|e| format!("keyring error: {}", e))?;
    match entry.get_password() {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(format!("failed to read from keyring: {}", e)),
    }
}

#[cfg(feature = "keyring")]
fn store_keyring_entry(service: &str, user: &str, secret: &str) -> std::result::Result<(), String> {
    if cfg!(test) {
        return Err("keyring access disabled in tests".to_string());
    }
    let entry = keyring::Entry::new(service, user).map_err(|e| format!("keyring error: {}", e))?;
    entry
        .set_password(secret)
        .map_err(|e| format!("failed to store in keyring: {}", e))
}

#[cfg(feature = "keyring")]
fn delete_keyring_entry(service: &str, user: &str) -> std::result::Result<(), String> {
    if cfg!(test) {
        return Err("keyring access disabled in tests".to_string());
    }
    let entry = keyring::Entry::new(service, user).map_err(|e| format!("keyring error: {}", e))?;
    entry
        .delete_credential()
        .map_err(|e| format!("failed to delete from keyring: {}", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// No-op stubs when keyring feature is disabled
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(not(feature = "keyring"))]
fn get_from_keyring(_client_id: &str) -> Option<ResolvedSecret> {
    None
}

#[cfg(not(feature = "keyring"))]
fn get_keyring_entry(_service: &str, _user: &str) -> std::result::Result<Option<String>, String> {
    Err("keyring support not compiled in (enable the 'keyring' feature)".to_string())
}

#[cfg(not(feature = "keyring"))]
fn store_keyring_entry(
    _service: &str,
    _user: &str,
    _secret: &str,
) -> std::result::Result<(), String> {
    Err("keyring support not compiled in (enable the 'keyring' feature)".to_string())
}

#[cfg(not(feature = "keyring"))]
fn delete_keyring_entry(_service: &str, _user: &str) -> std::result::Result<(), String> {
    Err("keyring support not compiled in (enable the 'keyring' feature)".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
