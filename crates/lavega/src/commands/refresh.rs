//! Refresh command - exchange the stored refresh token now.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use lavega_auth::ClaimsValidator;

use super::login::cancel_on_ctrl_c;
use super::{Context, spinner};

/// Run the refresh command.
pub async fn run(ctx: &Context) -> Result<()> {
    let resolver = ctx.resolver(ctx.token_store())?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let progress = spinner(ctx, "Refreshing tokens...");
    let result = resolver.force_refresh(&cancel).await;
    progress.finish_and_clear();
    let tokens = result?;

    let claims = tokens
        .id_token
        .as_deref()
        .and_then(|id| ClaimsValidator::lenient().validate(id).ok());

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({
                "refreshed": true,
                "has_id_token": tokens.id_token.is_some(),
                "expires_at": claims.as_ref().and_then(|c| c.expires_at).map(|at| at.to_rfc3339()),
            })
        );
    } else {
        println!("Tokens refreshed.");
        if let Some(at) = claims.and_then(|c| c.expires_at) {
            println!("ID token valid until {}", at.to_rfc3339());
        }
    }
    Ok(())
}
