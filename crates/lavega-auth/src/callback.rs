//! Loopback redirect receiver.
//!
//! Binds the host and port of the configured redirect URI, opens the consent
//! page in the browser and waits for the provider to redirect back.

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{AuthError, Result};
use crate::login::AuthorizationAgent;
use crate::oauth::{AuthorizationResponse, parse_redirect};

/// How long to wait for the user to finish in the browser.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str = "<!doctype html><html><body><h1>Signed in</h1>\
    <p>You can close this window and return to Lavega.</p></body></html>";

const FAILURE_PAGE: &str = "<!doctype html><html><body><h1>Sign-in failed</h1>\
    <p>Return to Lavega for details.</p></body></html>";

type RedirectSender = oneshot::Sender<Result<AuthorizationResponse>>;

/// Shared state for the callback route.
struct CallbackState {
    sender: Mutex<Option<RedirectSender>>,
}

/// Receives the authorization redirect on a loopback address.
#[derive(Debug, Clone)]
pub struct LoopbackAgent {
    redirect_uri: url::Url,
    open_browser: bool,
    timeout: Duration,
}

impl LoopbackAgent {
    /// Create an agent for a `http://127.0.0.1:<port>/<path>` style redirect URI.
    pub fn new(redirect_uri: &str) -> Result<Self> {
        let redirect_uri = url::Url::parse(redirect_uri)
            .map_err(|e| AuthError::Config(format!("Invalid redirect URI: {}", e)))?;

        if redirect_uri.scheme() != "http" {
            return Err(AuthError::Config(format!(
                "Redirect URI must use http on a loopback address, got {}",
                redirect_uri
            )));
        }
        match redirect_uri.host() {
            Some(url::Host::Ipv4(ip)) if ip.is_loopback() => {}
            Some(url::Host::Ipv6(ip)) if ip.is_loopback() => {}
            Some(url::Host::Domain("localhost")) => {}
            _ => {
                return Err(AuthError::Config(format!(
                    "Redirect URI host must be a loopback address, got {}",
                    redirect_uri
                )));
            }
        }

        Ok(Self {
            redirect_uri,
            open_browser: true,
            timeout: DEFAULT_CALLBACK_TIMEOUT,
        })
    }

    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Socket address the receiver listens on.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let port = self.redirect_uri.port_or_known_default().unwrap_or(80);
        let addr = match self.redirect_uri.host() {
            Some(url::Host::Ipv4(ip)) => SocketAddr::from((ip, port)),
            Some(url::Host::Ipv6(ip)) => SocketAddr::from((ip, port)),
            _ => SocketAddr::from(([127, 0, 0, 1], port)),
        };
        Ok(addr)
    }

    /// Path the provider redirects to.
    pub fn callback_path(&self) -> &str {
        self.redirect_uri.path()
    }

    fn router(&self, sender: RedirectSender) -> Router {
        let state = Arc::new(CallbackState {
            sender: Mutex::new(Some(sender)),
        });
        Router::new()
            .route(self.callback_path(), get(handle_redirect))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait]
impl AuthorizationAgent for LoopbackAgent {
    async fn authorize(
        &self,
        authorization_url: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationResponse> {
        let addr = self.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::Network(format!("Failed to listen on {}: {}", addr, e)))?;
        tracing::info!(addr = %addr, "Waiting for authorization redirect");

        let (sender, receiver) = oneshot::channel();
        let router = self.router(sender);
        let shutdown = cancel.child_token();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .ok();
        });

        if self.open_browser
            && let Err(e) = open_url(authorization_url)
        {
            tracing::warn!(error = %e, "Could not open browser automatically");
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            _ = tokio::time::sleep(self.timeout) => Err(AuthError::Timeout),
            received = receiver => received.unwrap_or(Err(AuthError::Cancelled)),
        };

        shutdown.cancel();
        result
    }
}

/// Handle GET on the redirect path.
async fn handle_redirect(
    State(state): State<Arc<CallbackState>>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let parsed = parse_redirect(query.as_deref().unwrap_or_default());
    let succeeded = parsed.is_ok();
    if let Err(e) = &parsed {
        tracing::warn!(error = %e, "Authorization redirect carried an error");
    }

    match state.sender.lock().await.take() {
        Some(sender) => {
            sender.send(parsed).ok();
        }
        None => {
            tracing::debug!("Ignoring repeated authorization redirect");
        }
    }

    if succeeded {
        (StatusCode::OK, Html(SUCCESS_PAGE))
    } else {
        (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
    }
}

/// Try to open a URL in the default browser.
///
/// Returns once the opener has started; it is never waited on, since some
/// openers stay alive for as long as the browser does.
pub fn open_url(url: &str) -> std::io::Result<()> {
    let (program, args) = browser_command(url);
    launch_detached(program, &args)
}

#[cfg(target_os = "macos")]
fn browser_command(url: &str) -> (&'static str, Vec<String>) {
    ("open", vec![url.to_string()])
}

#[cfg(target_os = "windows")]
fn browser_command(url: &str) -> (&'static str, Vec<String>) {
    (
        "cmd",
        vec!["/C".into(), "start".into(), String::new(), url.to_string()],
    )
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn browser_command(url: &str) -> (&'static str, Vec<String>) {
    ("xdg-open", vec![url.to_string()])
}

fn launch_detached(program: &str, args: &[String]) -> std::io::Result<()> {
    std::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}
