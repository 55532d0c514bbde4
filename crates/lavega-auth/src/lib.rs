//! Google sign-in for Lavega.
//!
//! Logs the user in with the OAuth 2.0 Authorization Code flow and PKCE,
//! keeps the tokens encrypted at rest and decides on every launch whether the
//! stored session is still usable.
//!
//! # Components
//!
//! - [`oauth`]: PKCE, authorization URL, redirect parsing, token endpoint client
//! - [`store`]: encrypted token persistence
//! - [`claims`]: ID token payload decoding and validation
//! - [`session`]: session resolution with bounded refresh
//! - [`login`]: login initiation and code exchange
//! - [`callback`]: loopback redirect receiver
//! - [`navigation`] and [`driver`]: screen reducer and its effect runner

pub mod callback;
pub mod claims;
pub mod driver;
pub mod error;
pub mod login;
pub mod navigation;
pub mod oauth;
pub mod session;
pub mod store;
pub mod tokens;

pub use callback::LoopbackAgent;
pub use claims::{ClaimsValidator, IdentityClaims};
pub use driver::SessionDriver;
pub use error::{AuthError, Result};
pub use login::{AuthorizationAgent, LoginInitiator, SharedAuthorizationAgent};
pub use navigation::{Action, AppState, AppStore, Effect, Screen};
pub use oauth::{HttpTokenClient, OAuthConfig, SharedTokenClient, TokenClient, TokenResponse};
pub use session::{Resolution, SessionResolver, SessionState};
pub use store::{
    EncryptedFileStore, FileKeySource, MasterKey, MasterKeySource, MemoryTokenStore,
    SharedKeySource, SharedTokenStore, TokenStore,
};
pub use tokens::TokenSet;
