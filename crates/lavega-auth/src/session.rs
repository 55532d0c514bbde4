//! Session resolution.
//!
//! Decides from the stored tokens whether the user is signed in. An ID token
//! that cannot back a session is refreshed at most `max_refresh_attempts`
//! times per resolution before the session is logged out.

use tokio_util::sync::CancellationToken;

use crate::claims::{ClaimsValidator, IdentityClaims};
use crate::error::{AuthError, Result};
use crate::oauth::SharedTokenClient;
use crate::store::SharedTokenStore;
use crate::tokens::TokenSet;

/// Refresh attempts allowed per resolution.
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 1;

/// Derived sign-in state; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unknown,
    Authenticated(IdentityClaims),
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn claims(&self) -> Option<&IdentityClaims> {
        match self {
            SessionState::Authenticated(claims) => Some(claims),
            _ => None,
        }
    }
}

/// Steps the resolver passes through, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPhase {
    NoToken,
    TokenPresentValid,
    TokenPresentInvalid,
    RefreshInProgress,
    RefreshSucceeded,
    RefreshFailed,
}

/// Why a resolution ended signed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// No ID token was stored.
    NoToken,
    /// The ID token was unusable and there was no refresh token.
    NoRefreshToken,
    /// The token endpoint rejected the refresh or could not be reached.
    RefreshFailed,
    /// Refreshing succeeded but did not yield a usable ID token.
    RefreshExhausted,
    /// The user asked to sign out.
    UserRequested,
}

impl std::fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LogoutReason::NoToken => "no stored session",
            LogoutReason::NoRefreshToken => "session invalid and no refresh token",
            LogoutReason::RefreshFailed => "token refresh failed",
            LogoutReason::RefreshExhausted => "refresh did not yield a usable ID token",
            LogoutReason::UserRequested => "signed out",
        };
        f.write_str(text)
    }
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub state: SessionState,
    pub trace: Vec<ResolutionPhase>,
    pub refresh_attempts: u32,
    pub logout: Option<LogoutReason>,
}

impl Resolution {
    /// True when the pass was abandoned before reaching a decision.
    pub fn is_cancelled(&self) -> bool {
        self.state == SessionState::Unknown
    }
}

/// Resolves the session from the token store, refreshing through the token client.
#[derive(Debug, Clone)]
pub struct SessionResolver {
    store: SharedTokenStore,
    client: SharedTokenClient,
    validator: ClaimsValidator,
    max_refresh_attempts: u32,
}

impl SessionResolver {
    pub fn new(store: SharedTokenStore, client: SharedTokenClient) -> Self {
        Self {
            store,
            client,
            validator: ClaimsValidator::default(),
            max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
        }
    }

    pub fn with_validator(mut self, validator: ClaimsValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_max_refresh_attempts(mut self, attempts: u32) -> Self {
        self.max_refresh_attempts = attempts;
        self
    }

    pub fn store(&self) -> &SharedTokenStore {
        &self.store
    }

    /// Run one resolution pass.
    ///
    /// The store is read once; after a refresh the new tokens are checked as
    /// returned, whether or not saving them succeeded. Every signed-out
    /// outcome clears the store. If `cancel` fires while a
    /// refresh is in flight the refresh is abandoned, nothing is written and
    /// the state is reported as [`SessionState::Unknown`].
    pub async fn resolve(&self, cancel: &CancellationToken) -> Resolution {
        let mut trace = Vec::new();
        let mut attempts = 0;
        let mut current = self.store.load().await;

        loop {
            let Some((tokens, id_token)) =
                current.take().and_then(|t| t.id_token.clone().map(|id| (t, id)))
            else {
                trace.push(ResolutionPhase::NoToken);
                let reason = if attempts > 0 {
                    LogoutReason::RefreshExhausted
                } else {
                    LogoutReason::NoToken
                };
                return self.sign_out(trace, attempts, reason).await;
            };

            match self.validator.validate(&id_token) {
                Ok(claims) => {
                    trace.push(ResolutionPhase::TokenPresentValid);
                    tracing::debug!(name = %claims.name, "Session is authenticated");
                    return Resolution {
                        state: SessionState::Authenticated(claims),
                        trace,
                        refresh_attempts: attempts,
                        logout: None,
                    };
                }
                Err(reason) => {
                    trace.push(ResolutionPhase::TokenPresentInvalid);
                    tracing::info!(%reason, "Stored ID token is not usable");
                }
            }

            let Some(refresh_token) = tokens.refresh_token.clone() else {
                return self
                    .sign_out(trace, attempts, LogoutReason::NoRefreshToken)
                    .await;
            };

            if attempts >= self.max_refresh_attempts {
                tracing::warn!(attempts, "Refresh limit reached, logging out");
                trace.push(ResolutionPhase::RefreshFailed);
                return self
                    .sign_out(trace, attempts, LogoutReason::RefreshExhausted)
                    .await;
            }

            attempts += 1;
            trace.push(ResolutionPhase::RefreshInProgress);
            tracing::info!(attempt = attempts, "Attempting to refresh token");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.client.refresh(&refresh_token) => Some(result),
            };

            match outcome {
                None => {
                    tracing::info!("Token refresh cancelled");
                    return Resolution {
                        state: SessionState::Unknown,
                        trace,
                        refresh_attempts: attempts,
                        logout: None,
                    };
                }
                Some(Ok(response)) => {
                    trace.push(ResolutionPhase::RefreshSucceeded);
                    let refreshed = TokenSet::refreshed(response, &tokens);
                    if !self.store.save(&refreshed).await {
                        tracing::warn!("Refreshed tokens were not saved");
                    }
                    current = Some(refreshed);
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Token refresh failed");
                    trace.push(ResolutionPhase::RefreshFailed);
                    return self
                        .sign_out(trace, attempts, LogoutReason::RefreshFailed)
                        .await;
                }
            }
        }
    }

    /// Refresh unconditionally, whatever the state of the stored ID token.
    pub async fn force_refresh(&self, cancel: &CancellationToken) -> Result<TokenSet> {
        let tokens = self.store.load().await.ok_or_else(|| {
            AuthError::Config("No stored session. Run 'lavega login' first.".to_string())
        })?;
        let refresh_token = tokens.refresh_token.clone().ok_or_else(|| {
            AuthError::Config("Stored session has no refresh token".to_string())
        })?;

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            result = self.client.refresh(&refresh_token) => result?,
        };

        let refreshed = TokenSet::refreshed(response, &tokens);
        self.store.try_save(&refreshed).await?;
        tracing::info!("Token refreshed successfully");
        Ok(refreshed)
    }

    /// Sign out at the user's request.
    pub async fn logout(&self) -> Resolution {
        self.sign_out(Vec::new(), 0, LogoutReason::UserRequested).await
    }

    async fn sign_out(
        &self,
        trace: Vec<ResolutionPhase>,
        attempts: u32,
        reason: LogoutReason,
    ) -> Resolution {
        tracing::info!(%reason, "Session signed out");
        self.store.clear().await;
        Resolution {
            state: SessionState::Unauthenticated,
            trace,
            refresh_attempts: attempts,
            logout: Some(reason),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_support::ScriptedClient;
    use super::*;
    use crate::claims::test_support::make_jwt;
    use crate::oauth::TokenResponse;
    use crate::store::{MemoryTokenStore, TokenStore};

    fn ann_jwt() -> String {
        make_jwt(&serde_json::json!({"name": "Ann", "email": "a@x.com"}))
    }

    fn resolver(store: &Arc<MemoryTokenStore>, client: &Arc<ScriptedClient>) -> SessionResolver {
        SessionResolver::new(store.clone(), client.clone())
    }

    /// Store that reads and clears normally but cannot write.
    #[derive(Debug)]
    struct UnwritableStore(MemoryTokenStore);

    #[async_trait::async_trait]
    impl TokenStore for UnwritableStore {
        async fn try_save(&self, _tokens: &TokenSet) -> Result<()> {
            Err(AuthError::Storage("disk full".to_string()))
        }

        async fn try_load(&self) -> Result<Option<TokenSet>> {
            self.0.try_load().await
        }

        async fn try_clear(&self) -> Result<()> {
            self.0.try_clear().await
        }
    }

    #[tokio::test]
    async fn test_valid_id_token_is_authenticated() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            None,
            Some(ann_jwt()),
        )));
        let client = Arc::new(ScriptedClient::new());

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        let claims = resolution.state.claims().unwrap();
        assert_eq!(claims.name, "Ann");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(resolution.trace, vec![ResolutionPhase::TokenPresentValid]);
        assert_eq!(client.refresh_calls(), 0);
        assert_eq!(store.clear_count(), 0);
    }

    #[tokio::test]
    async fn test_no_tokens_is_unauthenticated() {
        let store = Arc::new(MemoryTokenStore::new());
        let client = Arc::new(ScriptedClient::new());

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(resolution.logout, Some(LogoutReason::NoToken));
        assert_eq!(resolution.trace, vec![ResolutionPhase::NoToken]);
    }

    #[tokio::test]
    async fn test_missing_id_token_does_not_refresh() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            None,
        )));
        let client = Arc::new(ScriptedClient::new());

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(client.refresh_calls(), 0);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_without_refresh_token_logs_out() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            None,
            Some("malformed".to_string()),
        )));
        let client = Arc::new(ScriptedClient::new());

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(resolution.logout, Some(LogoutReason::NoRefreshToken));
        assert_eq!(
            resolution.trace,
            vec![ResolutionPhase::TokenPresentInvalid]
        );
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_then_authenticated() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some("malformed".to_string()),
        )));
        let client = Arc::new(ScriptedClient::new().push_refresh(Ok(TokenResponse {
            access_token: "at2".to_string(),
            id_token: Some(ann_jwt()),
            ..Default::default()
        })));

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert!(resolution.state.is_authenticated());
        assert_eq!(resolution.refresh_attempts, 1);
        assert_eq!(
            resolution.trace,
            vec![
                ResolutionPhase::TokenPresentInvalid,
                ResolutionPhase::RefreshInProgress,
                ResolutionPhase::RefreshSucceeded,
                ResolutionPhase::TokenPresentValid,
            ]
        );

        let saved = store.load().await.unwrap();
        assert_eq!(saved.access_token, "at2");
        assert_eq!(saved.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn test_refresh_failure_logs_out_after_one_attempt() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some("malformed".to_string()),
        )));
        let client = Arc::new(
            ScriptedClient::new()
                .push_refresh(Err(AuthError::Backend("invalid_grant".to_string()))),
        );

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(resolution.logout, Some(LogoutReason::RefreshFailed));
        assert_eq!(client.refresh_calls(), 1);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_refreshed_token_does_not_loop() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some("malformed".to_string()),
        )));
        let still_bad = || {
            Ok(TokenResponse {
                access_token: "again".to_string(),
                id_token: Some("still-malformed".to_string()),
                ..Default::default()
            })
        };
        let client = Arc::new(
            ScriptedClient::new()
                .push_refresh(still_bad())
                .push_refresh(still_bad()),
        );

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(resolution.logout, Some(LogoutReason::RefreshExhausted));
        assert_eq!(client.refresh_calls(), 1);
        assert_eq!(
            resolution.trace,
            vec![
                ResolutionPhase::TokenPresentInvalid,
                ResolutionPhase::RefreshInProgress,
                ResolutionPhase::RefreshSucceeded,
                ResolutionPhase::TokenPresentInvalid,
                ResolutionPhase::RefreshFailed,
            ]
        );
    }

    #[tokio::test]
    async fn test_unsaved_refresh_still_authenticates() {
        let original = TokenSet::new("at", Some("rt".to_string()), Some("malformed".to_string()));
        let store = Arc::new(UnwritableStore(MemoryTokenStore::with_tokens(
            original.clone(),
        )));
        let client = Arc::new(ScriptedClient::new().push_refresh(Ok(TokenResponse {
            access_token: "at2".to_string(),
            id_token: Some(ann_jwt()),
            ..Default::default()
        })));

        let resolution = SessionResolver::new(store.clone(), client.clone())
            .with_max_refresh_attempts(2)
            .resolve(&CancellationToken::new())
            .await;

        assert_eq!(resolution.state.claims().unwrap().name, "Ann");
        assert_eq!(resolution.logout, None);
        assert_eq!(client.refresh_calls(), 1);
        assert_eq!(store.load().await, Some(original));
    }

    #[tokio::test]
    async fn test_refresh_without_id_token_logs_out() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some("malformed".to_string()),
        )));
        let client = Arc::new(ScriptedClient::new().push_refresh(Ok(TokenResponse {
            access_token: "at2".to_string(),
            id_token: None,
            ..Default::default()
        })));

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert_eq!(resolution.state, SessionState::Unauthenticated);
        assert_eq!(resolution.logout, Some(LogoutReason::RefreshExhausted));
        assert_eq!(client.refresh_calls(), 1);
        assert_eq!(
            resolution.trace,
            vec![
                ResolutionPhase::TokenPresentInvalid,
                ResolutionPhase::RefreshInProgress,
                ResolutionPhase::RefreshSucceeded,
                ResolutionPhase::NoToken,
            ]
        );
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_far_future_expiry_is_authenticated() {
        let token = make_jwt(&serde_json::json!({
            "name": "Ann",
            "email": "a@x.com",
            "exp": chrono::DateTime::<chrono::Utc>::MAX_UTC.timestamp()
        }));
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some(token),
        )));
        let client = Arc::new(ScriptedClient::new());

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert!(resolution.state.is_authenticated());
        assert_eq!(client.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_limit_is_configurable() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some("malformed".to_string()),
        )));
        let client = Arc::new(
            ScriptedClient::new()
                .push_refresh(Ok(TokenResponse {
                    access_token: "a".to_string(),
                    id_token: Some("bad".to_string()),
                    ..Default::default()
                }))
                .push_refresh(Ok(TokenResponse {
                    access_token: "b".to_string(),
                    id_token: Some(ann_jwt()),
                    ..Default::default()
                })),
        );

        let resolution = resolver(&store, &client)
            .with_max_refresh_attempts(2)
            .resolve(&CancellationToken::new())
            .await;

        assert!(resolution.state.is_authenticated());
        assert_eq!(client.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_id_token_triggers_refresh() {
        let expired = make_jwt(&serde_json::json!({
            "name": "Ann",
            "exp": (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp()
        }));
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some(expired),
        )));
        let client = Arc::new(ScriptedClient::new().push_refresh(Ok(TokenResponse {
            access_token: "fresh".to_string(),
            id_token: Some(ann_jwt()),
            ..Default::default()
        })));

        let resolution = resolver(&store, &client).resolve(&CancellationToken::new()).await;

        assert!(resolution.state.is_authenticated());
        assert_eq!(client.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_leaves_tokens_untouched() {
        let original = TokenSet::new("at", Some("rt".to_string()), Some("malformed".to_string()));
        let store = Arc::new(MemoryTokenStore::with_tokens(original.clone()));
        let client = Arc::new(ScriptedClient::hanging());
        let cancel = CancellationToken::new();

        let session = resolver(&store, &client);
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { session.resolve(&cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        let resolution = task.await.unwrap();
        assert!(resolution.is_cancelled());
        assert_eq!(resolution.logout, None);
        assert_eq!(store.load().await, Some(original));
        assert_eq!(store.clear_count(), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_persists() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            Some("rt".to_string()),
            Some(ann_jwt()),
        )));
        let client = Arc::new(ScriptedClient::new().push_refresh(Ok(TokenResponse {
            access_token: "forced".to_string(),
            id_token: Some(ann_jwt()),
            ..Default::default()
        })));

        let tokens = resolver(&store, &client)
            .force_refresh(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "forced");
        assert_eq!(store.load().await.unwrap().access_token, "forced");
    }

    #[tokio::test]
    async fn test_force_refresh_without_session_errors() {
        let store = Arc::new(MemoryTokenStore::new());
        let client = Arc::new(ScriptedClient::new());
        let result = resolver(&store, &client)
            .force_refresh(&CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(client.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_store() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenSet::new(
            "at",
            None,
            Some(ann_jwt()),
        )));
        let client = Arc::new(ScriptedClient::new());

        let resolution = resolver(&store, &client).logout().await;
        assert_eq!(resolution.logout, Some(LogoutReason::UserRequested));
        assert!(store.load().await.is_none());
    }
}
