//! Logout command - clear the stored session.

use anyhow::Result;

use super::Context;

/// Run the logout command.
///
/// Works without an `[oauth]` section so a broken config never traps tokens
/// on disk. Tokens that can no longer be decrypted are still removed.
pub async fn run(ctx: &Context) -> Result<()> {
    let store = ctx.token_store();
    let had_tokens = store.exists().await;
    store.try_clear().await?;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "signed_out": had_tokens }));
    } else if had_tokens {
        println!("Signed out. Stored tokens removed.");
    } else {
        println!("No stored session found.");
    }
    Ok(())
}
