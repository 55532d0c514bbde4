//! Error types for the auth crate.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while logging in, storing tokens or refreshing a session.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Token endpoint returned an error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The authorization server redirected back with an error.
    #[error("Authorization denied: {0}")]
    Authorization(String),

    /// Invalid request or redirect input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Returned state does not match the one we sent.
    #[error("State mismatch: the authorization response does not belong to this login attempt")]
    StateMismatch,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Token storage could not be read, written or decrypted.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Waiting for the authorization redirect took too long.
    #[error("Timed out waiting for the authorization redirect")]
    Timeout,
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(e: std::io::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}
