//! Identity claims read from the ID token payload.
//!
//! The signature is not verified here: the token came straight from the token
//! endpoint over TLS and is only used to greet the user.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Shown when the payload has no `name` claim.
pub const NAME_NOT_FOUND: &str = "Name Not Found";

/// Shown when the payload has no `email` claim.
pub const EMAIL_NOT_FOUND: &str = "Email Not Found";

/// Shown for both fields when the payload is not a JSON object.
pub const CLAIMS_ERROR: &str = "Error";

/// Identity facts displayed on the home screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IdentityClaims {
    /// Build claims from a decoded payload, falling back to placeholders.
    pub fn from_payload(payload: &str) -> Self {
        let object = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(object)) => object,
            _ => return Self::placeholder(),
        };

        let text = |key: &str| -> Option<String> {
            match object.get(key)? {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }
        };

        Self {
            name: text("name").unwrap_or_else(|| NAME_NOT_FOUND.to_string()),
            email: text("email").unwrap_or_else(|| EMAIL_NOT_FOUND.to_string()),
            subject: text("sub"),
            expires_at: object
                .get("exp")
                .and_then(Value::as_i64)
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }

    /// Claims used when the payload cannot be interpreted.
    pub fn placeholder() -> Self {
        Self {
            name: CLAIMS_ERROR.to_string(),
            email: CLAIMS_ERROR.to_string(),
            subject: None,
            expires_at: None,
        }
    }
}

/// Extract and base64url-decode the middle segment of a JWT.
///
/// Returns `None` when the token has no payload segment or it is not valid
/// base64; padded and unpadded encodings are both accepted.
pub fn decode_payload(id_token: &str) -> Option<String> {
    let segment = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| URL_SAFE.decode(segment))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Why a stored ID token cannot back an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidToken {
    /// The payload segment is missing or not base64url.
    Undecodable,
    /// The `exp` claim is in the past.
    Expired(DateTime<Utc>),
}

impl std::fmt::Display for InvalidToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidToken::Undecodable => write!(f, "ID token payload could not be decoded"),
            InvalidToken::Expired(at) => write!(f, "ID token expired at {}", at.to_rfc3339()),
        }
    }
}

/// Decides whether an ID token yields usable claims.
#[derive(Debug, Clone)]
pub struct ClaimsValidator {
    /// Reject tokens whose `exp` has passed.
    pub validate_expiry: bool,
    /// Clock skew tolerated on `exp`.
    pub leeway: Duration,
}

impl Default for ClaimsValidator {
    fn default() -> Self {
        Self {
            validate_expiry: true,
            leeway: Duration::seconds(60),
        }
    }
}

impl ClaimsValidator {
    /// Validator that only requires a decodable payload.
    pub fn lenient() -> Self {
        Self {
            validate_expiry: false,
            ..Self::default()
        }
    }

    pub fn validate(&self, id_token: &str) -> Result<IdentityClaims, InvalidToken> {
        self.validate_at(id_token, Utc::now())
    }

    pub fn validate_at(
        &self,
        id_token: &str,
        now: DateTime<Utc>,
    ) -> Result<IdentityClaims, InvalidToken> {
        let payload = decode_payload(id_token).ok_or(InvalidToken::Undecodable)?;
        let claims = IdentityClaims::from_payload(&payload);

        // A deadline outside chrono's range is unbounded in the leeway's direction.
        if self.validate_expiry
            && let Some(expires_at) = claims.expires_at
            && expires_at
                .checked_add_signed(self.leeway)
                .map_or(self.leeway < Duration::zero(), |deadline| deadline <= now)
        {
            return Err(InvalidToken::Expired(expires_at));
        }

        Ok(claims)
    }
}
