//! App command - the interactive splash / login / home flow.

use anyhow::Result;
use clap::Args;
use console::{Style, Term, style};
use tokio::io::{AsyncBufReadExt, BufReader};

use lavega_auth::navigation::{Action, AppState, AppStore, Screen};
use lavega_auth::SessionDriver;

use super::login::cancel_on_ctrl_c;
use super::{Context, spinner};

/// Arguments for the app command.
#[derive(Args, Debug, Default)]
pub struct AppArgs {
    /// Paste the redirect URL instead of listening on the loopback address
    #[arg(long)]
    pub manual: bool,
}

/// Run the interactive app.
pub async fn run(args: AppArgs, ctx: &Context) -> Result<()> {
    let store = ctx.token_store();
    let driver = SessionDriver::new(
        ctx.resolver(store.clone())?,
        ctx.login_initiator(store)?,
        ctx.authorization_agent(args.manual)?,
    );
    cancel_on_ctrl_c(driver.cancel_token());

    let mut app = AppStore::new();
    let progress = spinner(ctx, "Checking your session...");
    driver.settle(&mut app, Action::Launched).await;
    progress.finish_and_clear();

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if driver.cancel_token().is_cancelled() {
            break;
        }
        render(app.state());

        let line = tokio::select! {
            _ = driver.cancel_token().cancelled() => break,
            line = input.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        let action = match (app.state().screen, line.trim()) {
            (_, "q") => break,
            (Screen::Login, "l") => Action::LoginRequested,
            (Screen::Home, "o") => Action::LogoutRequested,
            (_, "") => continue,
            (_, other) => {
                println!("{}", style(format!("Unknown choice '{}'", other)).yellow());
                continue;
            }
        };

        let message = match action {
            Action::LoginRequested if !args.manual => "Waiting for Google sign-in in your browser...",
            Action::LogoutRequested => "Signing out...",
            _ => "",
        };
        let progress = if message.is_empty() {
            indicatif::ProgressBar::hidden()
        } else {
            spinner(ctx, message)
        };
        driver.settle(&mut app, action).await;
        progress.finish_and_clear();
    }

    driver.shutdown();
    Ok(())
}

fn render(state: &AppState) {
    let dim = Style::new().dim();
    let term = Term::stdout();
    if term.is_term() {
        term.clear_screen().ok();
    }

    println!();
    println!("{}", style("Lavega").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();

    match state.screen {
        Screen::Splash => {
            println!("  Loading...");
        }
        Screen::Login => {
            println!("  {}", style("Welcome to Lavega").bold());
            println!();
            if let Some(notice) = &state.notice {
                println!("  {}", style(notice).red());
                println!();
            }
            println!("  [l] Login with Google    [q] Quit");
        }
        Screen::Home => match state.session.claims() {
            Some(claims) => {
                println!("  {}", style("Welcome!").bold());
                println!();
                println!("  {} {}", dim.apply_to("Name:"), claims.name);
                println!("  {} {}", dim.apply_to("Email:"), claims.email);
                println!();
                println!("  [o] Logout    [q] Quit");
            }
            None => {
                println!("  Loading...");
                println!();
                println!("  [q] Quit");
            }
        },
    }
    println!();
}
