//! Shadow validator: pre-execution, read-only impact prediction.
//!
//! Two ordered phases run strictly between valve approval and reactor
//! execution. The smoke test checks per-kind ranges and shapes; the replay
//! check predicts the change's effect on the target's recent execution
//! baseline with deterministic heuristics and rejects likely regressions.
//! Phase one failure short-circuits phase two.

use tracing::{debug, warn};
use warden_common::{
    Improvement, ImprovementChange, JsonlStore, ReactionOutcome, ReactionRecord, StateDir,
};

/// Smoke bounds for timeout adjustments, seconds
pub const TIMEOUT_FLOOR_SECS: f64 = 10.0;
pub const TIMEOUT_CEIL_SECS: f64 = 300.0;
/// Minimum meaningful prompt patch length
pub const MIN_PATCH_LEN: usize = 8;
/// Maximum tolerated absolute success-rate drop
pub const MAX_SUCCESS_DROP: f64 = 0.10;
/// Maximum tolerated relative duration rise
pub const MAX_DURATION_RISE: f64 = 0.20;

/// Validation verdict with a structured reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub passed: bool,
    pub reason: String,
}

impl Validation {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// Historical performance of one target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub success_rate: f64,
    pub mean_duration_ms: f64,
    pub samples: usize,
}

/// Reads the reaction history back as the replay baseline
pub struct ShadowValidator {
    reactions: JsonlStore,
}

impl ShadowValidator {
    pub fn new(state: &StateDir) -> Self {
        Self {
            reactions: JsonlStore::new(state.reactions_log()),
        }
    }

    /// Smoke test, then replay check over the most recent `replay_count`
    /// executions for the target. No history is a trivial pass.
    pub fn validate_before_apply(
        &self,
        improvement: &Improvement,
        replay_count: usize,
    ) -> Validation {
        let smoke = smoke_test(&improvement.change);
        if !smoke.passed {
            debug!(
                "Smoke test rejected {} on {}: {}",
                improvement.change.kind_tag(),
                improvement.target,
                smoke.reason
            );
            return smoke;
        }

        match self.baseline(&improvement.target, replay_count) {
            Some(baseline) => replay_check(baseline, &improvement.change),
            None => Validation::pass("no_history"),
        }
    }

    fn baseline(&self, target: &str, replay_count: usize) -> Option<Baseline> {
        let records: Vec<ReactionRecord> = match self.reactions.load() {
            Ok(records) => records,
            Err(e) => {
                warn!("Reaction history unreadable, treating as empty: {}", e);
                return None;
            }
        };

        let mut executions: Vec<&ReactionRecord> = records
            .iter()
            .filter(|r| r.outcome != ReactionOutcome::NoMatch)
            .filter(|r| r.target.as_deref() == Some(target))
            .collect();
        if executions.is_empty() {
            return None;
        }
        if executions.len() > replay_count {
            executions.drain(..executions.len() - replay_count);
        }

        let successes = executions
            .iter()
            .filter(|r| r.outcome == ReactionOutcome::Success)
            .count();
        let durations: Vec<u64> = executions.iter().filter_map(|r| r.duration_ms).collect();
        let mean_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        Some(Baseline {
            success_rate: successes as f64 / executions.len() as f64,
            mean_duration_ms,
            samples: executions.len(),
        })
    }
}

/// Phase one: per-kind range and shape checks. Unknown kinds deny by default.
pub fn smoke_test(change: &ImprovementChange) -> Validation {
    match change {
        ImprovementChange::Timeout { to_secs, .. } => {
            if !(TIMEOUT_FLOOR_SECS..=TIMEOUT_CEIL_SECS).contains(to_secs) {
                Validation::reject(format!("timeout_out_of_range:{}", to_secs))
            } else {
                Validation::pass("smoke_ok")
            }
        }
        ImprovementChange::Probability { to, .. } | ImprovementChange::Priority { to, .. } => {
            if !(0.0..=1.0).contains(to) {
                Validation::reject(format!("ratio_out_of_range:{}", to))
            } else {
                Validation::pass("smoke_ok")
            }
        }
        ImprovementChange::PromptPatch { patch } => {
            if patch.trim().len() < MIN_PATCH_LEN {
                Validation::reject("patch_too_short")
            } else {
                Validation::pass("smoke_ok")
            }
        }
        ImprovementChange::ConfigChange { key, value } => {
            if key.is_empty() || value.is_empty() {
                Validation::reject("config_change_incomplete")
            } else {
                Validation::pass("smoke_ok")
            }
        }
        // Operational actions carry no tunable to range-check
        ImprovementChange::ServiceOp { .. } => Validation::pass("smoke_ok"),
        ImprovementChange::Unknown { tag } => {
            Validation::reject(format!("unknown_improvement:{}", tag))
        }
    }
}

/// Phase two heuristics: pure and deterministic, no I/O
pub fn predict(baseline: Baseline, change: &ImprovementChange) -> Baseline {
    let (success_shift, duration_factor) = match change {
        ImprovementChange::Timeout { from_secs, to_secs } => {
            if to_secs > from_secs {
                (0.05, 1.10)
            } else if to_secs < from_secs {
                (-0.05, 0.90)
            } else {
                (0.0, 1.0)
            }
        }
        ImprovementChange::PromptPatch { .. } => (0.02, 1.0),
        _ => (0.0, 1.0),
    };

    Baseline {
        success_rate: (baseline.success_rate + success_shift).clamp(0.0, 1.0),
        mean_duration_ms: baseline.mean_duration_ms * duration_factor,
        samples: baseline.samples,
    }
}

/// Compare predicted against baseline performance
pub fn replay_check(baseline: Baseline, change: &ImprovementChange) -> Validation {
    judge(baseline, predict(baseline, change))
}

fn judge(baseline: Baseline, predicted: Baseline) -> Validation {
    if baseline.success_rate - predicted.success_rate > MAX_SUCCESS_DROP {
        return Validation::reject(format!(
            "predicted_success_drop:{:.2}->{:.2}",
            baseline.success_rate, predicted.success_rate
        ));
    }
    if baseline.mean_duration_ms <= 0.0 {
        // Zero baseline duration: the duration axis cannot be compared
        return Validation::pass("replay_ok_duration_not_comparable");
    }
    let rise = (predicted.mean_duration_ms - baseline.mean_duration_ms) / baseline.mean_duration_ms;
    if rise > MAX_DURATION_RISE {
        return Validation::reject(format!("predicted_duration_rise:{:.0}%", rise * 100.0));
    }
    Validation::pass("replay_ok")
}
