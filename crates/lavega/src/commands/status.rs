//! Status command - show the stored session without refreshing it.

use anyhow::Result;
use console::{Style, style};
use serde::Serialize;

use lavega_auth::claims::InvalidToken;
use lavega_auth::tokens::mask;

use super::Context;

/// Status for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    signed_in: bool,
    name: Option<String>,
    email: Option<String>,
    expires_at: Option<String>,
    has_refresh_token: bool,
    problem: Option<String>,
    storage: String,
}

/// Run the status command.
///
/// Read-only: an unusable token is reported, not refreshed or cleared.
pub async fn run(ctx: &Context) -> Result<()> {
    let validator = ctx.validator()?;
    let store = ctx.token_store();
    let tokens = store.load().await;

    let mut output = StatusOutput {
        signed_in: false,
        name: None,
        email: None,
        expires_at: None,
        has_refresh_token: false,
        problem: None,
        storage: ctx.config.storage().backend.to_string(),
    };

    if let Some(tokens) = &tokens {
        output.has_refresh_token = tokens.refresh_token.is_some();
        match tokens.id_token.as_deref() {
            None => output.problem = Some("no ID token stored".to_string()),
            Some(id_token) => match validator.validate(id_token) {
                Ok(claims) => {
                    output.signed_in = true;
                    output.expires_at = claims.expires_at.map(|at| at.to_rfc3339());
                    output.name = Some(claims.name);
                    output.email = Some(claims.email);
                }
                Err(InvalidToken::Expired(at)) => {
                    output.expires_at = Some(at.to_rfc3339());
                    output.problem = Some("ID token expired; it will be refreshed on next launch".to_string());
                }
                Err(e) => output.problem = Some(e.to_string()),
            },
        }
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Lavega Session").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();

    match (&tokens, output.signed_in) {
        (None, _) => {
            println!("  {} {}", dim.apply_to("Status:"), style("● signed out").red());
            println!("  Run 'lavega login' to sign in with Google");
        }
        (Some(tokens), true) => {
            println!("  {} {}", dim.apply_to("Status:"), style("● signed in").green());
            println!("  {} {}", dim.apply_to("Name:"), output.name.unwrap_or_default());
            println!("  {} {}", dim.apply_to("Email:"), output.email.unwrap_or_default());
            if let Some(at) = &output.expires_at {
                println!("  {} {}", dim.apply_to("Expires:"), at);
            }
            if ctx.verbose {
                println!("  {} {}", dim.apply_to("Access:"), mask(&tokens.access_token));
            }
        }
        (Some(_), false) => {
            println!("  {} {}", dim.apply_to("Status:"), style("● needs attention").yellow());
            if let Some(problem) = &output.problem {
                println!("  {} {}", dim.apply_to("Problem:"), problem);
            }
        }
    }
    if tokens.is_some() {
        println!(
            "  {} {}",
            dim.apply_to("Refresh:"),
            if output.has_refresh_token { "available" } else { "none" }
        );
    }
    println!("  {} {}", dim.apply_to("Storage:"), output.storage);
    println!();

    Ok(())
}
