//! keypool CLI
//!
//! Administers the credential pool and runs generations through it.
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keypool::{
    config::{Environment, LogFormat, Settings},
    db::CredentialView,
    logging::init_tracing,
    services::{AddCredentialRequest, GenerateOptions, Generation, PoolStats, Requester},
    App, PoolError,
};
use serde::Serialize;
use std::io::BufRead;
use std::process::ExitCode;

/// keypool
///
/// Credential pool and failover execution engine for generative-AI API keys.
#[derive(Parser, Debug)]
#[command(name = "keypool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Requester identity the command runs as
    #[arg(long = "as", global = true, default_value = "local")]
    requester: String,

    /// Run with administrative privileges
    #[arg(long, global = true)]
    privileged: bool,

    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (overrides LOG_FORMAT env var)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Environment: dev, staging, prod (overrides ENVIRONMENT env var)
    #[arg(short, long, global = true)]
    env: Option<Environment>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a secret against the provider and add it to the pool
    Add {
        /// Human-readable name
        #[arg(long)]
        label: String,

        /// Provider secret; read from stdin when omitted
        #[arg(long)]
        secret: Option<String>,

        #[arg(long, default_value = "gemini")]
        provider: String,

        /// Share with every requester (privileged only)
        #[arg(long)]
        global: bool,
    },

    /// List visible credentials
    List,

    /// Delete a credential
    Remove { id: String },

    /// Return a credential to active and clear its error count
    Reset { id: String },

    /// Summarize the visible pool
    Stats,

    /// Generate text through the pool
    Generate {
        prompt: String,

        /// Model to use; only the first is exercised
        #[arg(long = "model")]
        models: Vec<String>,
    },

    /// Probe a secret without storing it
    Validate {
        /// Provider secret; read from stdin when omitted
        #[arg(long)]
        secret: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum Output {
    Credential(CredentialView),
    Credentials(Vec<CredentialView>),
    Stats(PoolStats),
    Generation(Generation),
    Removed { removed: String },
    Valid { valid: bool },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(log_level) = cli.log_level.clone() {
        settings.log_level = log_level;
    }
    if let Some(log_format) = cli.log_format {
        settings.log_format = log_format;
    }
    if let Some(env) = cli.env {
        settings.environment = env;
    }

    init_tracing(&settings.log_level, settings.log_format)?;

    tracing::debug!(
        app_name = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        "Starting keypool"
    );

    let app = App::new(settings).await?;
    let requester = Requester {
        id: cli.requester,
        is_privileged: cli.privileged,
    };

    match run(&app, cli.command, &requester).await? {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let body = serde_json::json!({ "error": e.kind(), "message": e.to_string() });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(if e.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Outer error: CLI plumbing failures. Inner: engine outcomes reported as JSON.
async fn run(app: &App, command: Command, requester: &Requester) -> Result<Result<Output, PoolError>> {
    let outcome = match command {
        Command::Add {
            label,
            secret,
            provider,
            global,
        } => {
            let secret = secret_or_stdin(secret)?;
            let request = AddCredentialRequest::new(secret, label)
                .with_provider(provider)
                .global(global);
            app.lifecycle().add(request, requester).await.map(Output::Credential)
        }
        Command::List => app.lifecycle().list(requester).await.map(Output::Credentials),
        Command::Remove { id } => app
            .lifecycle()
            .remove(&id, requester)
            .await
            .map(|()| Output::Removed { removed: id }),
        Command::Reset { id } => app.lifecycle().reset(&id, requester).await.map(Output::Credential),
        Command::Stats => app.lifecycle().stats(requester).await.map(Output::Stats),
        Command::Generate { prompt, models } => app
            .generate(&prompt, &GenerateOptions { models }, &requester.id)
            .await
            .map(Output::Generation),
        Command::Validate { secret } => {
            let secret = secret_or_stdin(secret)?;
            app.lifecycle()
                .validate(&secret)
                .await
                .map(|()| Output::Valid { valid: true })
        }
    };

    Ok(outcome)
}

fn secret_or_stdin(secret: Option<String>) -> Result<String> {
    if let Some(secret) = secret {
        return Ok(secret);
    }

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read secret from stdin")?;
    Ok(line.trim().to_string())
}
