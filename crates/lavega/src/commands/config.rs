//! Config command - configuration management.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::{Style, style};

use lavega_config::{LavegaConfig, OAuthSection};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Show the user config directory
    Path,

    /// Initialize a config file
    Init {
        /// OAuth client ID issued by Google
        #[arg(long)]
        client_id: String,

        /// Create project-local config (./lavega.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Store the OAuth client secret in the system keyring
    SetSecret,

    /// Remove the OAuth client secret from the system keyring
    DeleteSecret,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init {
            client_id,
            local,
            force,
        } => cmd_init(ctx, &client_id, local, force),
        ConfigCommand::SetSecret => cmd_set_secret(ctx),
        ConfigCommand::DeleteSecret => cmd_delete_secret(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = lavega_config::load_config(None)?;
    let config = &loaded.config;

    if ctx.json_output {
        let mut shown = config.clone();
        if let Some(oauth) = shown.oauth.as_mut()
            && oauth.client_secret.is_some()
        {
            oauth.client_secret = Some("****".to_string());
        }
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Lavega Configuration").bold());
    println!();

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
    }
    println!();

    let oauth = config.oauth();
    println!("OAuth:");
    println!(
        "  {} {}",
        dim.apply_to("client_id:"),
        oauth.client_id.as_deref().unwrap_or("(not set)")
    );
    println!("  {} {}", dim.apply_to("client_secret:"), secret_status(&oauth));
    match ctx.oauth_config() {
        Ok(resolved) => {
            println!("  {} {}", dim.apply_to("authorize_url:"), resolved.authorize_url);
            println!("  {} {}", dim.apply_to("token_url:"), resolved.token_url);
            println!("  {} {}", dim.apply_to("redirect_uri:"), resolved.redirect_uri);
            println!("  {} {}", dim.apply_to("scope:"), resolved.scope);
        }
        Err(e) => println!("  {}", style(format!("incomplete: {}", e)).yellow()),
    }
    println!();

    let session = config.session();
    println!("Session:");
    println!(
        "  {} {}",
        dim.apply_to("max_refresh_attempts:"),
        session.max_refresh_attempts
    );
    println!("  {} {}", dim.apply_to("validate_expiry:"), session.validate_expiry);
    println!();

    println!("Storage:");
    println!("  {} {}", dim.apply_to("backend:"), config.storage().backend);
    println!("  {} {}", dim.apply_to("data_dir:"), ctx.data_dir().display());

    for warning in &loaded.warnings {
        println!();
        println!("{}", style(warning).yellow());
    }

    Ok(())
}

fn secret_status(oauth: &OAuthSection) -> String {
    let Some(client_id) = oauth.client_id.as_deref() else {
        return "(not set)".to_string();
    };
    match lavega_config::resolve_client_secret(client_id, oauth.client_secret.as_deref()) {
        Some(secret) => format!("set ({})", secret.source),
        None => "(not set)".to_string(),
    }
}

fn cmd_path(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({
                "config_dir": ctx.config_dir,
                "data_dir": ctx.data_dir(),
            })
        );
    } else {
        println!("{}", ctx.config_dir.display());
    }
    Ok(())
}

fn cmd_init(ctx: &Context, client_id: &str, local: bool, force: bool) -> Result<()> {
    let path = if local {
        std::env::current_dir()?.join("lavega.toml")
    } else {
        ctx.config_dir.join("config.toml")
    };

    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (pass --force to overwrite)",
            path.display()
        );
    }

    let config = LavegaConfig {
        oauth: Some(OAuthSection {
            client_id: Some(client_id.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    lavega_config::save_config(&config, &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_set_secret(ctx: &Context) -> Result<()> {
    let oauth = ctx.config.oauth();
    let client_id = oauth.require_client_id()?;

    let secret = rpassword::prompt_password(format!("Client secret for {}: ", client_id))?;
    let secret = secret.trim();
    if secret.is_empty() {
        bail!("No secret provided");
    }

    lavega_config::secrets::store_in_keyring(client_id, secret)?;
    println!("Client secret stored in the system keyring.");
    Ok(())
}

fn cmd_delete_secret(ctx: &Context) -> Result<()> {
    let oauth = ctx.config.oauth();
    let client_id = oauth.require_client_id()?;
    lavega_config::secrets::delete_from_keyring(client_id)?;
    println!("Client secret removed from the system keyring.");
    Ok(())
}
