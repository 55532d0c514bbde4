//! Login command - Google sign-in with PKCE.

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use lavega_auth::oauth::{AuthorizationResponse, parse_redirect};
use lavega_auth::{AuthError, AuthorizationAgent};

use super::{Context, spinner};

/// Arguments for the login command.
#[derive(Args, Debug, Default)]
pub struct LoginArgs {
    /// Paste the redirect URL instead of listening on the loopback address
    #[arg(long)]
    pub manual: bool,

    /// Log in again even if a session is stored
    #[arg(long)]
    pub force: bool,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let store = ctx.token_store();
    let resolver = ctx.resolver(store.clone())?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    if !args.force {
        let resolution = resolver.resolve(&cancel).await;
        if let Some(claims) = resolution.state.claims() {
            println!("Already signed in as {} <{}>", claims.name, claims.email);
            println!("Run 'lavega logout' first, or pass --force.");
            return Ok(());
        }
    }

    let initiator = ctx.login_initiator(store)?;
    let agent = ctx.authorization_agent(args.manual)?;

    let progress = if args.manual {
        indicatif::ProgressBar::hidden()
    } else {
        spinner(ctx, "Waiting for Google sign-in in your browser...")
    };
    let result = initiator.login(agent.as_ref(), &cancel).await;
    progress.finish_and_clear();
    result?;

    let resolution = resolver.resolve(&cancel).await;
    match resolution.state.claims() {
        Some(claims) => {
            println!(
                "{} Signed in as {} <{}>",
                style("✓").green(),
                style(&claims.name).bold(),
                claims.email
            );
            Ok(())
        }
        None => Err(anyhow::anyhow!(
            "Login completed but the session could not be established"
        )),
    }
}

/// Cancel `token` when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            token.cancel();
        }
    });
}

/// Prints the consent URL and reads the redirect URL back from stdin.
///
/// For redirect URIs that cannot be served on this machine; the browser will
/// show an error page whose address bar holds the code and state.
pub struct ManualAgent;

#[async_trait]
impl AuthorizationAgent for ManualAgent {
    async fn authorize(
        &self,
        authorization_url: &str,
        cancel: &CancellationToken,
    ) -> lavega_auth::Result<AuthorizationResponse> {
        println!("Open this URL in your browser:");
        println!();
        println!("  {}", authorization_url);
        println!();
        println!("After signing in, copy the full address you were redirected to");
        println!("and paste it here.");
        println!();

        if let Err(e) = lavega_auth::callback::open_url(authorization_url) {
            tracing::debug!(error = %e, "Could not open browser automatically");
        }

        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"redirect> ").await?;
        stdout.flush().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let line = tokio::select! {
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            line = lines.next_line() => line?,
        };

        match line {
            Some(input) => parse_redirect(&input),
            None => Err(AuthError::Cancelled),
        }
    }
}
