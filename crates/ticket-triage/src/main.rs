//! Post-build triage step: file tracker tickets for failed tests.
//!
//! Reads one build's results document (JSON) and a reporter configuration
//! (TOML), runs a single triage pass, and logs the outcome summary.
//! Per-ticket failures leave the exit code untouched; only a tracker session
//! that cannot be established aborts the step.

use anyhow::{Context, Result};
use clap::Parser;
use ticket_triage::{BuildResults, ReporterConfig, RestTracker, TriageEngine, Verbosity};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "ticket-triage",
    about = "File tracker tickets for a build's failed tests"
)]
struct Args {
    /// Reporter configuration (TOML)
    #[arg(long)]
    config: std::path::PathBuf,

    /// Build results document (JSON) handed over by the CI host
    #[arg(long)]
    results: std::path::PathBuf,

    /// Ticket every failure regardless of age
    #[arg(long, default_value_t = false)]
    create_all: bool,

    /// Dump each failure record before triage
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Implies --debug; additionally dumps full serialized records
    #[arg(long, default_value_t = false)]
    verbose_debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ReporterConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    if args.create_all {
        config.policy.create_all = true;
    }
    if args.debug || args.verbose_debug {
        config.policy.verbosity = Verbosity::from_flags(args.debug, args.verbose_debug);
    }

    let default_filter = match config.policy.verbosity {
        Verbosity::Silent => "info",
        Verbosity::Debug => "debug",
        Verbosity::VerboseDebug => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let results = BuildResults::load(&args.results)
        .with_context(|| format!("loading results from {}", args.results.display()))?;

    let tracker = RestTracker::new(
        &config.server_address,
        config.credentials.clone(),
        &config.issue_type_id,
    )
    .context("configuring tracker client")?;
    let engine = TriageEngine::new(config.policy.clone());

    let report = engine
        .run(&tracker, &results.build, &results.failed_tests)
        .await
        .context("tracker session could not be established")?;

    if report.failed_count() > 0 {
        warn!(
            failed = report.failed_count(),
            "Some tickets could not be created"
        );
    }
    info!("{}", report.summary());
    info!("Done.");

    Ok(())
}
