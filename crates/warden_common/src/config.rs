//! Engine configuration.
//!
//! Operators edit config.toml under the state dir; a missing file reads as
//! the defaults. The daemon only writes the file through `save`.

use crate::paths::StateDir;
use crate::playbook::RiskTier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::info;

/// Loop-wide tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Execute approved actions without operator confirmation
    pub autonomous_mode: bool,
    /// Highest risk tier the safety valve may approve automatically
    pub allow_risk_level: RiskTier,
    /// Historical executions the shadow validator replays per target
    pub replay_count: usize,
    /// Long-run baseline health folded into the composite score
    pub base_score: f64,
    /// Queued events drained per cycle
    pub drain_limit: usize,
    /// Trailing window over reactions and verifications when scoring
    pub score_window: usize,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            autonomous_mode: true,
            allow_risk_level: RiskTier::Low,
            replay_count: 20,
            base_score: 0.5,
            drain_limit: 64,
            score_window: 200,
        }
    }
}

impl WardenConfig {
    /// Load from the state dir, defaulting when no file exists
    pub fn load(state: &StateDir) -> Result<Self> {
        let path = state.config_file();
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        info!(
            "Loaded configuration (autonomous_mode={}, allow_risk_level={})",
            config.autonomous_mode, config.allow_risk_level
        );
        Ok(config)
    }

    pub fn save(&self, state: &StateDir) -> Result<()> {
        fs::create_dir_all(state.root())
            .with_context(|| format!("Failed to create state dir {}", state.root().display()))?;
        let path = state.config_file();
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, raw)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path());
        let config = WardenConfig::load(&state).unwrap();
        assert!(config.autonomous_mode);
        assert_eq!(config.allow_risk_level, RiskTier::Low);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path());

        let mut config = WardenConfig::default();
        config.autonomous_mode = false;
        config.allow_risk_level = RiskTier::Medium;
        config.replay_count = 5;
        config.save(&state).unwrap();

        let loaded = WardenConfig::load(&state).unwrap();
        assert!(!loaded.autonomous_mode);
        assert_eq!(loaded.allow_risk_level, RiskTier::Medium);
        assert_eq!(loaded.replay_count, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path());
        fs::write(state.config_file(), "autonomous_mode = false\n").unwrap();

        let config = WardenConfig::load(&state).unwrap();
        assert!(!config.autonomous_mode);
        assert_eq!(config.drain_limit, WardenConfig::default().drain_limit);
    }
}
