//! gram-token - Check and renew the Instagram access token
//!
//! `gram-token auto` is the cron entry point: it checks the token and
//! exchanges it for a fresh long-lived one when expiry is near.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use libgramcast::config::Config;
use libgramcast::graph::client::GraphClient;
use libgramcast::logging::{LogFormat, LoggingConfig};
use libgramcast::secrets::{open_store, AccountSecrets, SecretStore};
use libgramcast::token::{RefreshOutcome, TokenHealth, TokenManager, TokenStatusSnapshot};
use libgramcast::GramcastError;
use secrecy::SecretString;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Exit code for a token that is invalid or could not be checked
const EXIT_TOKEN_INVALID: i32 = 2;

#[derive(Parser)]
#[command(name = "gram-token")]
#[command(version)]
#[command(about = "Check and renew the Instagram access token", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: $GRAMCAST_CONFIG or ~/.config/gramcast/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Log output format (text, json or pretty)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the platform whether the token is valid and when it expires
    Check,

    /// Exchange the current token for a new long-lived one
    Refresh,

    /// Refresh only when expiry is within the configured threshold
    Auto,

    /// Print the last recorded token status
    Show,

    /// Exchange a short-lived token for a long-lived one and store it
    Exchange {
        /// Short-lived user token
        #[arg(long, env = "SHORT_LIVED_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

/// Exit code of the library error behind `e`, or 1
fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<GramcastError>()
        .map(|e| e.exit_code())
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    let json_output = cli.format == "json";

    match cli.command {
        Commands::Check => {
            let manager = open_manager(&config, None)?;
            let health = manager.check_status().await;
            print_health(&health, json_output);
            Ok(if health.valid() { 0 } else { EXIT_TOKEN_INVALID })
        }
        Commands::Refresh => {
            let mut manager = open_manager(&config, None)?;
            let outcome = manager.refresh().await?;
            print_outcome(&outcome, json_output);
            Ok(0)
        }
        Commands::Auto => {
            let mut manager = open_manager(&config, None)?;
            let outcome = manager.auto_refresh_if_needed().await?;
            print_outcome(&outcome, json_output);
            Ok(0)
        }
        Commands::Show => {
            let path = config.token.expand_status_file();
            let snapshot = TokenStatusSnapshot::load(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            print_snapshot(snapshot.as_ref(), json_output)?;
            Ok(0)
        }
        Commands::Exchange { token } => {
            let short_lived = SecretString::from(token);
            let mut manager = open_manager(&config, Some(short_lived.clone()))?;
            let outcome = manager.exchange_short_lived(&short_lived).await?;
            print_outcome(&outcome, json_output);
            Ok(0)
        }
    }
}

/// Build a token manager on the configured secret store
///
/// `access_token` overrides the stored token, for a first exchange when
/// nothing has been stored yet.
fn open_manager(config: &Config, access_token: Option<SecretString>) -> Result<TokenManager> {
    let store: Arc<dyn SecretStore> = Arc::from(open_store(&config.credentials));
    debug!("Using {} secret store", store.backend_name());
    let secrets = match access_token {
        Some(token) => AccountSecrets::load_with_access_token(store.as_ref(), token)?,
        None => AccountSecrets::load(store.as_ref())?,
    };

    let graph = GraphClient::new(
        &config.graph_root(),
        &secrets.account_id,
        secrets.access_token.clone(),
    )?;

    Ok(TokenManager::new(
        Arc::new(graph),
        store,
        &secrets,
        &config.token,
    )?)
}

fn print_health(health: &TokenHealth, json_output: bool) {
    if json_output {
        let (status, reason) = match health {
            TokenHealth::Valid { .. } => ("valid", None),
            TokenHealth::Invalid { reason } => ("invalid", Some(reason)),
            TokenHealth::Unknown { reason } => ("unknown", Some(reason)),
        };
        let expires_at = match health {
            TokenHealth::Valid { expires_at, .. } => expires_at.map(|at| at.to_rfc3339()),
            _ => None,
        };
        println!(
            "{}",
            json!({
                "status": status,
                "valid": health.valid(),
                "expires_at": expires_at,
                "days_remaining": health.days_remaining().as_days(),
                "reason": reason,
            })
        );
    } else {
        println!("Token {}", health);
    }
}

fn print_outcome(outcome: &RefreshOutcome, json_output: bool) {
    match outcome {
        RefreshOutcome::Healthy(days) => {
            if json_output {
                println!(
                    "{}",
                    json!({ "refreshed": false, "days_remaining": days.as_days() })
                );
            } else {
                println!("Token healthy ({} days remaining), no refresh needed", days);
            }
        }
        RefreshOutcome::Refreshed { days } => {
            if json_output {
                println!("{}", json!({ "refreshed": true, "days_remaining": days }));
            } else {
                match days {
                    Some(days) => println!("Token refreshed, valid for {} days", days),
                    None => println!("Token refreshed (expiry not reported)"),
                }
            }
        }
    }
}

fn print_snapshot(snapshot: Option<&TokenStatusSnapshot>, json_output: bool) -> Result<()> {
    let Some(snapshot) = snapshot else {
        if json_output {
            println!("null");
        } else {
            println!("No token status recorded yet (run `gram-token check`)");
        }
        return Ok(());
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let age = Utc::now().signed_duration_since(snapshot.last_checked);
    println!("Account:        {}", snapshot.account_id);
    println!(
        "Last checked:   {} ({} hours ago)",
        snapshot.last_checked.to_rfc3339(),
        age.num_hours()
    );
    match (snapshot.expires_at, snapshot.days_remaining) {
        (Some(at), Some(days)) => {
            println!("Expires:        {}", at.to_rfc3339());
            println!("Days remaining: {}", days);
        }
        _ => println!("Expires:        never (or not reported)"),
    }
    Ok(())
}
