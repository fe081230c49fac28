//! Warden Control - inspection CLI for the remediation loop.
//!
//! Every subcommand is a read-only view over the persisted stores; nothing
//! here executes an action or mutates loop state.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warden_common::paths::DEFAULT_STATE_DIR;
use warden_common::StateDir;

#[derive(Parser)]
#[command(name = "wardenctl")]
#[command(about = "Warden - remediation loop inspection", long_about = None)]
#[command(version)]
struct Cli {
    /// State directory holding every persisted store
    #[arg(long, default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the merged playbook catalog
    Playbooks,

    /// Replay a synthetic alert through matching and gating (dry, no execution)
    Replay {
        /// Detection rule id
        rule_id: String,

        /// Alert severity (INFO, WARN, CRITICAL)
        #[arg(long, default_value = "WARN")]
        severity: String,

        /// Repeat hit count
        #[arg(long, default_value_t = 1)]
        hits: u32,

        /// Alert message
        #[arg(long, default_value = "synthetic replay alert")]
        message: String,
    },

    /// Show the verification audit trail
    Verifications {
        /// Print aggregate stats instead of history
        #[arg(long)]
        stats: bool,
    },

    /// Show the current evolution score
    Score {
        /// Show the recent score trend
        #[arg(long)]
        trend: bool,
    },

    /// Tail the durable event log
    Events {
        /// Number of events to show
        #[arg(long, default_value_t = 20)]
        tail: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let state = StateDir::new(&cli.state_dir);

    match cli.command {
        Commands::Playbooks => commands::playbooks(&state),
        Commands::Replay {
            rule_id,
            severity,
            hits,
            message,
        } => commands::replay(&state, &rule_id, &severity, hits, &message),
        Commands::Verifications { stats } => commands::verifications(&state, stats),
        Commands::Score { trend } => commands::score(&state, trend),
        Commands::Events { tail } => commands::events(&state, tail),
    }
}
