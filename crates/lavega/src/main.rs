//! Lavega - Google sign-in from the terminal
//!
//! Main entry point for the Lavega CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{app, config, login, logout, refresh, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Lavega - Google sign-in from the terminal
#[derive(Parser)]
#[command(name = "lavega")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the interactive app (splash, login, home)
    App(app::AppArgs),

    /// Log in with Google
    Login(login::LoginArgs),

    /// Clear the stored session
    Logout,

    /// Show who is signed in
    Status,

    /// Refresh the stored tokens now
    Refresh,

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = lavega_config::load_config(None)?;
    let config_dir = lavega_config::require_config_dir()?;
    let logging = loaded.config.logging();

    // Initialize tracing: console (human-readable) + rotating JSON file
    let console_filter = if cli.verbose {
        "lavega=debug,lavega_auth=debug,lavega_config=debug,info".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| {
            format!(
                "lavega={0},lavega_auth={0},lavega_config={0},warn",
                logging.level
            )
        })
    };

    let (file_writer, _guard) = if logging.file {
        let log_dir = logging.dir.clone().unwrap_or_else(|| config_dir.join("logs"));
        let file_appender = tracing_appender::rolling::daily(&log_dir, "lavega.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (Some(non_blocking), Some(guard))
    } else {
        (None, None)
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(console_filter)),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "lavega=trace,lavega_auth=trace,lavega_config=trace,info",
                ))
        }))
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config: loaded.config,
        config_dir,
    };

    match cli.command.unwrap_or(Commands::App(app::AppArgs::default())) {
        Commands::App(args) => app::run(args, &ctx).await,
        Commands::Login(args) => login::run(args, &ctx).await,
        Commands::Logout => logout::run(&ctx).await,
        Commands::Status => status::run(&ctx).await,
        Commands::Refresh => refresh::run(&ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
