//! CLI entry point for Homebase.
//!
//! This binary provides the `homebase` command: sign in, pick an address,
//! sync features into the local cache and inspect what is cached.

mod app;
mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use homebase_auth::Account;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::{App, FeatureAction};
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(email) = cli.email {
        config.api.email = Some(email);
    }
    init_tracing(&config.log.level, config.log.json);

    let app = App::open(config).await?;

    match cli.command {
        Commands::Login { code, state, token } => cmd_login(&app, code, state, token).await,
        Commands::Logout => {
            app.logout().await?;
            println!("  Logged out. Local caches cleared.");
            Ok(())
        }
        Commands::Status => {
            println!();
            println!("  Homebase Status");
            println!("  ===============");
            println!();
            print!("{}", app.status().await?);
            println!();
            Ok(())
        }
        Commands::Address { name } => {
            app.select_address(&name).await?;
            println!("  Selected address: {name}");
            Ok(())
        }
        Commands::Sync { feature } => print_lines(app.feature(&feature, FeatureAction::Sync).await?),
        Commands::List { feature, sort } => {
            print_lines(app.feature(&feature, FeatureAction::List(sort.into())).await?)
        }
        Commands::Delete { feature, id } => {
            print_lines(app.feature(&feature, FeatureAction::Delete(id)).await?)
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: login
// ---------------------------------------------------------------------------

async fn cmd_login(
    app: &App,
    code: Option<String>,
    state: Option<String>,
    token: Option<String>,
) -> Result<()> {
    match (token, code) {
        (Some(token), _) => app.login_with_token(token).await?,
        (None, Some(code)) => app.login_with_code(&code, state.as_deref()).await?,
        (None, None) => {
            let url = app.begin_login()?;
            println!();
            println!("  Open this URL to authorize Homebase:");
            println!();
            println!("    {url}");
            println!();
            println!("  Then run `homebase login --code <code> --state <state>`.");
            println!();
            return Ok(());
        }
    }

    info!("login complete");
    match app.account() {
        Account::Present(account) => {
            println!("  Logged in as {} <{}>", account.name(), account.email());
            println!("  Selected address: {}", app.address());
        }
        Account::NotSynchronized => {
            println!("  Logged in. Set api.email or pass --email to sync the account.");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_lines(lines: Vec<String>) -> Result<()> {
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Initialize the tracing subscriber.  `RUST_LOG` wins over `default_level`.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
