//! State directory layout.
//!
//! Every persisted store lives under one state dir, passed explicitly to
//! each component at construction. Default: /var/lib/warden

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default state directory
pub const DEFAULT_STATE_DIR: &str = "/var/lib/warden";

/// Resolved store paths under one state directory
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn default_root() -> Self {
        Self::new(DEFAULT_STATE_DIR)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the state dir and the event spool dir
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create state dir {}", self.root.display()))?;
        fs::create_dir_all(self.queue_dir())
            .with_context(|| format!("Failed to create queue dir {}", self.queue_dir().display()))?;
        Ok(())
    }

    /// Durable event log (append-only)
    pub fn events_log(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    /// Safety valve mutation journal (append-only)
    pub fn safety_journal(&self) -> PathBuf {
        self.root.join("safety_journal.jsonl")
    }

    /// Playbook execution journal for catalog cooldowns (append-only)
    pub fn playbook_executions(&self) -> PathBuf {
        self.root.join("playbook_executions.jsonl")
    }

    /// Reaction history (append-only)
    pub fn reactions_log(&self) -> PathBuf {
        self.root.join("reactions.jsonl")
    }

    /// Verification audit trail (append-only)
    pub fn verifications_log(&self) -> PathBuf {
        self.root.join("verifications.jsonl")
    }

    /// Evolution score time series (append-only)
    pub fn scores_log(&self) -> PathBuf {
        self.root.join("scores.jsonl")
    }

    /// Alert records (append-only, last record per id wins)
    pub fn alerts_file(&self) -> PathBuf {
        self.root.join("alerts.jsonl")
    }

    /// Cross-process event spool (one JSON file per queued event)
    pub fn queue_dir(&self) -> PathBuf {
        self.root.join("queue")
    }

    /// Operator playbook overlay
    pub fn playbook_overlay(&self) -> PathBuf {
        self.root.join("playbooks.toml")
    }

    /// Engine configuration
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}
