//! Warden Daemon entry point.
//!
//! `run` executes one remediation pass per invocation; scheduling is
//! external (systemd timer or cron). There is no background driver thread.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use warden_common::paths::DEFAULT_STATE_DIR;
use warden_common::{FileAlertDirectory, StateDir, WardenConfig};
use wardend::runners::{HookActionRunner, ProcessCheckRunner};
use wardend::{Engine, SafetyValve};

#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "Warden - closed-loop autonomic remediation daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// State directory holding every persisted store
    #[arg(long, default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// Hook program remediation actions are delegated to
    #[arg(long, default_value = "/usr/lib/warden/apply-action")]
    action_hook: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one remediation pass (the default)
    Run,

    /// Clear an open circuit breaker
    ResetBreaker,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let state = StateDir::new(&cli.state_dir);
    state.ensure()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_pass(&state, &cli.action_hook).await,
        Commands::ResetBreaker => {
            let valve = SafetyValve::load(&state)?;
            valve.reset_breaker()?;
            Ok(())
        }
    }
}

async fn run_pass(state: &StateDir, action_hook: &Path) -> Result<()> {
    info!("wardend v{} starting", env!("CARGO_PKG_VERSION"));
    let config = WardenConfig::load(state)?;

    let alerts = Arc::new(FileAlertDirectory::new(state));
    let runner = Arc::new(HookActionRunner::new(action_hook));
    let checks = Arc::new(ProcessCheckRunner);

    let mut engine = Engine::new(state, config, alerts, runner, checks)?;
    engine.bus().subscribe("*", "trace", |event| {
        debug!(
            "event {} from {}: {}",
            event.topic,
            event.source,
            serde_json::to_string(&event.payload).unwrap_or_default()
        );
        Ok(())
    });

    let summary = engine.run_cycle().await?;
    info!(
        "Pass finished: {} executed, {} denied, {} rejected, {} resolved, score {:.3}",
        summary.executed, summary.denied, summary.rejected, summary.resolved, summary.score
    );
    Ok(())
}
