//! Token persistence.
//!
//! Tokens are kept as three string entries (`accessToken`, `refreshToken`,
//! `idToken`) and written encrypted with age to the lavega data directory.
//! The age identity comes from a [`MasterKeySource`] supplied by the caller;
//! [`FileKeySource`] keeps it in an owner-only file and is the fallback when no
//! OS credential store is available.
//! All public operations are best-effort: failures are logged and treated as
//! "no tokens present".

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use age::secrecy::ExposeSecret;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AuthError, Result};
use crate::tokens::TokenSet;

/// Encrypted token file name within the data directory.
pub const TOKEN_FILE: &str = "tokens.age";

/// Master key file name within the data directory.
pub const KEY_FILE: &str = "master.key";

// ============================================================================
// TokenStore Trait
// ============================================================================

/// Storage for the single session's token triple.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Persist tokens, replacing any previous triple.
    async fn try_save(&self, tokens: &TokenSet) -> Result<()>;

    /// Load the stored tokens.
    async fn try_load(&self) -> Result<Option<TokenSet>>;

    /// Remove all stored tokens.
    async fn try_clear(&self) -> Result<()>;

    /// Save, logging failures. Returns whether the tokens were written.
    async fn save(&self, tokens: &TokenSet) -> bool {
        match self.try_save(tokens).await {
            Ok(()) => {
                tracing::debug!("Tokens saved");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to save tokens");
                false
            }
        }
    }

    /// Load, treating any failure as absent tokens.
    async fn load(&self) -> Option<TokenSet> {
        match self.try_load().await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load tokens, treating as signed out");
                None
            }
        }
    }

    /// Whether a session is stored, without decrypting it.
    async fn exists(&self) -> bool {
        self.try_load().await.ok().flatten().is_some()
    }

    /// Clear, logging failures.
    async fn clear(&self) {
        match self.try_clear().await {
            Ok(()) => tracing::debug!("Tokens cleared"),
            Err(e) => tracing::error!(error = %e, "Failed to clear tokens"),
        }
    }
}

/// Shared token store for use across async contexts.
pub type SharedTokenStore = Arc<dyn TokenStore>;

// ============================================================================
// MasterKey
// ============================================================================

/// age x25519 identity protecting the token file.
pub struct MasterKey {
    identity: age::x25519::Identity,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("recipient", &self.identity.to_public().to_string())
            .finish()
    }
}

impl MasterKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        Self {
            identity: age::x25519::Identity::generate(),
        }
    }

    /// The `AGE-SECRET-KEY-1...` encoding, for handing to a credential store.
    pub fn to_encoded(&self) -> String {
        self.identity.to_string().expose_secret().to_string()
    }

    /// Parse a key from its `AGE-SECRET-KEY-1...` encoding.
    pub fn parse(encoded: &str) -> Result<Self> {
        let identity = encoded
            .trim()
            .parse::<age::x25519::Identity>()
            .map_err(|e| AuthError::Storage(format!("Invalid master key: {}", e)))?;
        Ok(Self { identity })
    }

    /// Load the key at `path`, creating it if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let encoded = std::fs::read_to_string(path).map_err(|e| {
                AuthError::Storage(format!("Failed to read master key: {}", e))
            })?;
            return Self::parse(&encoded);
        }

        let key = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::Storage(format!("Failed to create key directory: {}", e))
            })?;
        }
        write_private(path, key.to_encoded().as_bytes())?;
        tracing::info!("Created master key at {}", path.display());
        Ok(key)
    }

    /// Encrypt to this key, producing ASCII-armored output.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let recipient = self.identity.to_public();
        let encryptor =
            age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
                .map_err(|e| AuthError::Storage(format!("Encryption setup failed: {}", e)))?;

        let mut output = Vec::new();
        let armor =
            age::armor::ArmoredWriter::wrap_output(&mut output, age::armor::Format::AsciiArmor)?;
        let mut writer = encryptor.wrap_output(armor)?;
        writer.write_all(plaintext)?;
        writer.finish()?.finish()?;
        Ok(output)
    }

    /// Decrypt data produced by [`MasterKey::encrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let decryptor = age::Decryptor::new(age::armor::ArmoredReader::new(ciphertext))
            .map_err(|e| AuthError::Storage(format!("Failed to read encrypted tokens: {}", e)))?;
        let mut reader = decryptor
            .decrypt(std::iter::once(&self.identity as &dyn age::Identity))
            .map_err(|e| AuthError::Storage(format!("Failed to decrypt tokens: {}", e)))?;

        let mut plaintext = Vec::new();
        reader.read_to_end(&mut plaintext)?;
        Ok(plaintext)
    }
}

// ============================================================================
// MasterKeySource
// ============================================================================

/// Where the store's master key lives.
pub trait MasterKeySource: Send + Sync + std::fmt::Debug {
    /// Fetch the key, creating and persisting one on first use.
    fn master_key(&self) -> Result<MasterKey>;
}

/// Shared master key source.
pub type SharedKeySource = Arc<dyn MasterKeySource>;

/// Master key kept in an owner-only file.
#[derive(Debug, Clone)]
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl MasterKeySource for FileKeySource {
    fn master_key(&self) -> Result<MasterKey> {
        MasterKey::load_or_create(&self.path)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}

// ============================================================================
// EncryptedFileStore
// ============================================================================

/// age-encrypted file store for production use.
#[derive(Debug)]
pub struct EncryptedFileStore {
    token_path: PathBuf,
    keys: SharedKeySource,
    cached_tokens: RwLock<Option<TokenSet>>,
}

impl EncryptedFileStore {
    /// Create a store keeping both the token file and `master.key` in `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self::with_key_source(
            data_dir,
            Arc::new(FileKeySource::new(data_dir.join(KEY_FILE))),
        )
    }

    /// Create a store in `data_dir` whose master key comes from `keys`.
    pub fn with_key_source(data_dir: &Path, keys: SharedKeySource) -> Self {
        Self {
            token_path: data_dir.join(TOKEN_FILE),
            keys,
            cached_tokens: RwLock::new(None),
        }
    }

    /// Get the token file path.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Check if a token file exists.
    pub fn has_tokens(&self) -> bool {
        self.token_path.exists()
    }

    fn master_key(&self) -> Result<MasterKey> {
        self.keys.master_key()
    }
}

#[async_trait]
impl TokenStore for EncryptedFileStore {
    async fn try_save(&self, tokens: &TokenSet) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::Storage(format!("Failed to create token directory: {}", e))
            })?;
        }

        let json = serde_json::to_vec(&tokens.to_entries())
            .map_err(|e| AuthError::Serialization(format!("Failed to serialize tokens: {}", e)))?;
        let encrypted = self.master_key()?.encrypt(&json)?;

        write_private(&self.token_path, &encrypted)?;

        let mut cache = self.cached_tokens.write().await;
        *cache = Some(tokens.clone());

        tracing::info!("Tokens saved to {}", self.token_path.display());
        Ok(())
    }

    async fn try_load(&self) -> Result<Option<TokenSet>> {
        {
            let cache = self.cached_tokens.read().await;
            if cache.is_some() {
                return Ok(cache.clone());
            }
        }

        if !self.token_path.exists() {
            return Ok(None);
        }

        let encrypted = std::fs::read(&self.token_path)
            .map_err(|e| AuthError::Storage(format!("Failed to read token file: {}", e)))?;
        let json = self.master_key()?.decrypt(&encrypted)?;
        let entries = serde_json::from_slice(&json)
            .map_err(|e| AuthError::Serialization(format!("Failed to parse token file: {}", e)))?;

        let tokens = TokenSet::from_entries(entries);
        let mut cache = self.cached_tokens.write().await;
        *cache = tokens.clone();

        Ok(tokens)
    }

    async fn exists(&self) -> bool {
        self.has_tokens()
    }

    async fn try_clear(&self) -> Result<()> {
        {
            let mut cache = self.cached_tokens.write().await;
            *cache = None;
        }
        if self.token_path.exists() {
            std::fs::remove_file(&self.token_path)
                .map_err(|e| AuthError::Storage(format!("Failed to delete token file: {}", e)))?;
            tracing::info!("Tokens cleared from {}", self.token_path.display());
        }
        Ok(())
    }
}

// ============================================================================
// MemoryTokenStore
// ============================================================================

/// In-memory token store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenSet>>,
    save_count: AtomicU32,
    clear_count: AtomicU32,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
            ..Self::default()
        }
    }

    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> u32 {
        self.clear_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn try_save(&self, tokens: &TokenSet) -> Result<()> {
        let mut guard = self.tokens.write().await;
        *guard = Some(tokens.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn try_load(&self) -> Result<Option<TokenSet>> {
        Ok(self.tokens.read().await.clone())
    }

    async fn try_clear(&self) -> Result<()> {
        let mut guard = self.tokens.write().await;
        *guard = None;
        self.clear_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Create a shared encrypted file store with the given key source.
pub fn create_token_store(data_dir: &Path, keys: SharedKeySource) -> SharedTokenStore {
    Arc::new(EncryptedFileStore::with_key_source(data_dir, keys))
}

/// Create a shared in-memory token store.
pub fn create_memory_token_store() -> SharedTokenStore {
    Arc::new(MemoryTokenStore::new())
}
