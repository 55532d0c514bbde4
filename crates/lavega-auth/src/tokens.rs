//! The access/refresh/ID token triple and its persisted key-value shape.

use std::collections::BTreeMap;

use crate::oauth::TokenResponse;

/// Persisted key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Persisted key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Persisted key for the ID token.
pub const ID_TOKEN_KEY: &str = "idToken";

/// Tokens of the single active session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask))
            .field("id_token", &self.id_token.as_deref().map(mask))
            .finish()
    }
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        id_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            id_token,
        }
    }

    /// Tokens from a code exchange.
    pub fn from_response(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
        }
    }

    /// Tokens from a refresh, keeping the previous refresh token when the
    /// provider does not rotate it.
    pub fn refreshed(response: TokenResponse, previous: &TokenSet) -> Self {
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous.refresh_token.clone());
        Self {
            access_token: response.access_token,
            refresh_token,
            id_token: response.id_token,
        }
    }

    /// Flatten into the persisted key-value form. Absent tokens have no key.
    pub fn to_entries(&self) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        entries.insert(ACCESS_TOKEN_KEY.to_string(), self.access_token.clone());
        if let Some(refresh) = &self.refresh_token {
            entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh.clone());
        }
        if let Some(id) = &self.id_token {
            entries.insert(ID_TOKEN_KEY.to_string(), id.clone());
        }
        entries
    }

    /// Rebuild from persisted entries.
    ///
    /// A partially written triple is returned as-is; only an empty map means
    /// there are no tokens.
    pub fn from_entries(mut entries: BTreeMap<String, String>) -> Option<Self> {
        let access_token = entries.remove(ACCESS_TOKEN_KEY);
        let refresh_token = entries.remove(REFRESH_TOKEN_KEY);
        let id_token = entries.remove(ID_TOKEN_KEY);

        if access_token.is_none() && refresh_token.is_none() && id_token.is_none() {
            return None;
        }
        if access_token.is_none() {
            tracing::debug!("Stored tokens have no access token");
        }

        Some(Self {
            access_token: access_token.unwrap_or_default(),
            refresh_token,
            id_token,
        })
    }
}

/// Mask a token for display and logs.
pub fn mask(token: &str) -> String {
    if token.len() > 12 && token.is_char_boundary(4) && token.is_char_boundary(token.len() - 4) {
        format!("{}...{}", &token[..4], &token[token.len() - 4..])
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let previous = TokenSet::new("old", Some("keep-me".to_string()), Some("old.id".to_string()));
        let response = TokenResponse {
            access_token: "new".to_string(),
            id_token: Some("new.id".to_string()),
            ..Default::default()
        };

        let next = TokenSet::refreshed(response, &previous);
        assert_eq!(next.access_token, "new");
        assert_eq!(next.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(next.id_token.as_deref(), Some("new.id"));
    }

    #[test]
    fn test_refresh_uses_rotated_refresh_token() {
        let previous = TokenSet::new("old", Some("r1".to_string()), None);
        let response = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: Some("r2".to_string()),
            ..Default::default()
        };
        assert_eq!(
            TokenSet::refreshed(response, &previous).refresh_token.as_deref(),
            Some("r2")
        );
    }

    #[test]
    fn test_entries_omit_absent_tokens() {
        let entries = TokenSet::new("a", None, Some("i".to_string())).to_entries();
        assert_eq!(entries.len(), 2);
        assert!(!entries.contains_key(REFRESH_TOKEN_KEY));
    }

    #[test]
    fn test_from_entries_partial_triple() {
        let mut entries = BTreeMap::new();
        entries.insert(REFRESH_TOKEN_KEY.to_string(), "r".to_string());
        let tokens = TokenSet::from_entries(entries).unwrap();
        assert_eq!(tokens.access_token, "");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
        assert!(tokens.id_token.is_none());

        assert!(TokenSet::from_entries(BTreeMap::new()).is_none());
    }

    #[test]
    fn test_debug_masks_tokens() {
        let tokens = TokenSet::new("ya29.averylongaccesstoken", None, None);
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("averylongaccesstoken"));
        assert!(rendered.contains("ya29"));
    }

    #[test]
    fn test_mask_short_token() {
        assert_eq!(mask("short"), "****");
    }
}
