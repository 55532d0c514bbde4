//! Login initiation: build the authorization request, obtain the redirect,
//! exchange the code and persist the resulting tokens.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, Result};
use crate::oauth::{
    AuthorizationResponse, OAuthConfig, PkceChallenge, SharedTokenClient,
    build_authorization_url, generate_state,
};
use crate::store::SharedTokenStore;
use crate::tokens::TokenSet;

/// Something that can take the user through the provider's consent page and
/// hand back the redirect.
#[async_trait]
pub trait AuthorizationAgent: Send + Sync {
    async fn authorize(
        &self,
        authorization_url: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationResponse>;
}

/// Shared authorization agent.
pub type SharedAuthorizationAgent = Arc<dyn AuthorizationAgent>;

/// One in-flight login attempt.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub url: String,
    pub state: String,
    pub pkce: PkceChallenge,
}

/// Drives the Authorization Code + PKCE login.
#[derive(Debug, Clone)]
pub struct LoginInitiator {
    config: OAuthConfig,
    client: SharedTokenClient,
    store: SharedTokenStore,
}

impl LoginInitiator {
    pub fn new(config: OAuthConfig, client: SharedTokenClient, store: SharedTokenStore) -> Self {
        Self {
            config,
            client,
            store,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Start an attempt with a fresh verifier and state.
    pub fn prepare(&self) -> PendingAuthorization {
        let pkce = PkceChallenge::generate();
        let state = generate_state();
        let url = build_authorization_url(&self.config, &pkce.challenge, &state);
        PendingAuthorization { url, state, pkce }
    }

    /// Exchange the redirect for tokens and persist them.
    ///
    /// On any failure the store is left untouched.
    pub async fn complete(
        &self,
        pending: &PendingAuthorization,
        response: AuthorizationResponse,
    ) -> Result<TokenSet> {
        if response.state != pending.state {
            tracing::warn!("Authorization response state does not match");
            return Err(AuthError::StateMismatch);
        }

        let tokens = self
            .client
            .exchange_code(&response.code, &pending.pkce.verifier)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Token exchange failed"))?;

        if tokens.id_token.is_none() {
            tracing::warn!("Token response has no ID token; is the 'openid' scope configured?");
        }

        let tokens = TokenSet::from_response(tokens);
        self.store.try_save(&tokens).await?;
        tracing::info!("Token exchange successful");
        Ok(tokens)
    }

    /// Run the whole login through `agent`.
    pub async fn login(
        &self,
        agent: &dyn AuthorizationAgent,
        cancel: &CancellationToken,
    ) -> Result<TokenSet> {
        self.config.validate()?;
        let pending = self.prepare();
        let response = agent.authorize(&pending.url, cancel).await?;
        self.complete(&pending, response).await
    }
}
