//! Scout command-line launcher.
//!
//! Thin shell around the scanner: loads configuration, wires the collaborators,
//! runs one mode and prints a summary. Ctrl+C interrupts every running item;
//! each one still finalizes and persists its partial result before export.

mod plan;
mod state;
mod summary;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scout_core::{AppConfig, Company, WorkItem};
use scout_scanner::ScanError;
use state::AppState;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Blocking-aware scraper for wealth management advisor directories.
#[derive(Debug, Parser)]
#[command(name = "scout", version, about)]
struct Cli {
    /// Configuration file (defaults to the platform config path)
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory receiving exports and the default database
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Command,
}

/// Launcher modes.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Scrape UBS advisors in New York only
    Test,
    /// Like `test`, with a visible browser so CAPTCHAs can be solved by hand
    Captcha,
    /// Rediscover and store directory entry URLs without scraping
    Discover,
    /// Scrape every configured company and state
    Full,
    /// Scrape selected companies and states
    Specific {
        /// Company to scrape (ubs, morgan-stanley, merrill-lynch); repeatable
        #[arg(long = "company", value_name = "COMPANY")]
        companies: Vec<Company>,

        /// State to scrape; repeatable
        #[arg(long = "state", value_name = "STATE")]
        states: Vec<String>,
    },
}

impl Command {
    /// Name recorded with the run.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Captcha => "captcha",
            Self::Discover => "discover",
            Self::Full => "full",
            Self::Specific { .. } => "specific",
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,scout=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config =
        AppConfig::load_with_env(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.output_dir {
        config.output.directory = dir;
    }
    if cli.headless {
        config.browser.headless = true;
    }
    if cli.command == Command::Captcha {
        config.browser.headless = false;
    }
    config.validate().context("invalid configuration")?;

    let items = plan::work_items(&cli.command, &config.targets);
    if items.is_empty() {
        bail!("nothing to do: no companies or states selected");
    }
    tracing::info!(mode = cli.command.name(), items = items.len(), "Planned work items");

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; saving partial results");
            watcher.cancel();
        }
    });

    let app = AppState::init(config, cli.command.name()).await?;

    let outcome = match cli.command {
        Command::Discover => {
            discover(&app, &items, &cancel).await;
            Ok(())
        }
        _ => scrape(&app, items, &cancel).await,
    };

    let report = app.close().await?;
    println!("{report}");

    match outcome {
        Ok(()) if cancel.is_cancelled() => Ok(ExitCode::from(130)),
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn scrape(app: &AppState, items: Vec<WorkItem>, cancel: &CancellationToken) -> Result<(), ScanError> {
    let report = app.runner().run(items, cancel).await?;
    tracing::info!(
        items = report.results.len(),
        records = report.record_count(),
        skipped = report.skipped.len(),
        "Scraping finished"
    );
    Ok(())
}

/// Force a fresh discovery for every item; results land in the URL cache.
async fn discover(app: &AppState, items: &[WorkItem], cancel: &CancellationToken) {
    let resolver = app.resolver();
    for item in items {
        if cancel.is_cancelled() {
            break;
        }
        let key = item.key();
        resolver.invalidate(&key);
        match resolver.rediscover(&key).await {
            Ok(entry) => println!("{key}: {}", entry.url),
            Err(e) => println!("{key}: {e}"),
        }
    }
}
