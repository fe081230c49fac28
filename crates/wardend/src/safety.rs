//! Safety valve: risk classification, cooldowns, and the circuit breaker.
//!
//! The valve owns the only concurrency-sensitive shared state in the loop.
//! Every mutation runs under one lock and appends a journal record before it
//! becomes visible; reload replays the journal, so a restart between an
//! application and the next check loses nothing. A journal append failure is
//! a hard error here because durability affects correctness.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use warden_common::{ActionKind, JsonlStore, RiskTier, StateDir, WardenError};

/// Consecutive failures that open the breaker
pub const BREAKER_THRESHOLD: u32 = 2;
/// Hours an open breaker suspends all automatic remediation
pub const BREAKER_OPEN_HOURS: i64 = 24;
/// Hours between applications of the same (type, target)
pub const COOLDOWN_HOURS: i64 = 24;

/// Action types never applied automatically, at any allowed risk level
const HIGH_RISK_DENY: &[ActionKind] = &[ActionKind::RotateCredentials, ActionKind::Unknown];

/// Action types approved when only low risk is allowed
const LOW_RISK_ALLOW: &[ActionKind] = &[
    ActionKind::IncreaseTimeout,
    ActionKind::RunBackup,
    ActionKind::PruneLogs,
    ActionKind::AdjustPriority,
    ActionKind::PatchPrompt,
];

/// One journaled mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalRecord {
    Application {
        action_type: ActionKind,
        target: String,
        success: bool,
        at: DateTime<Utc>,
    },
    BreakerReset {
        at: DateTime<Utc>,
    },
}

/// Last application of one (type, target)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownEntry {
    pub last_applied: DateTime<Utc>,
    pub last_success: bool,
}

/// Process-wide fault isolation state.
///
/// Invariant: broken implies consecutive_failures reached the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakerState {
    pub broken: bool,
    pub broken_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl BreakerState {
    /// Open right now, accounting for the lazy 24h expiry. There is no
    /// background timer; an expired breaker simply reads as closed.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        match (self.broken, self.broken_at) {
            (true, Some(at)) => {
                now.signed_duration_since(at) <= Duration::hours(BREAKER_OPEN_HOURS)
            }
            _ => false,
        }
    }
}

/// Gate verdict. Denials are structured results, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "allowed".to_string(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

struct ValveState {
    cooldowns: HashMap<String, CooldownEntry>,
    breaker: BreakerState,
}

impl ValveState {
    fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::Application {
                action_type,
                target,
                success,
                at,
            } => {
                self.cooldowns.insert(
                    cooldown_key(*action_type, target),
                    CooldownEntry {
                        last_applied: *at,
                        last_success: *success,
                    },
                );
                if *success {
                    // Does not early-close an already open breaker
                    self.breaker.consecutive_failures = 0;
                } else {
                    self.breaker.consecutive_failures += 1;
                    if self.breaker.consecutive_failures >= BREAKER_THRESHOLD
                        && !self.breaker.is_open(*at)
                    {
                        self.breaker.broken = true;
                        self.breaker.broken_at = Some(*at);
                    }
                }
            }
            JournalRecord::BreakerReset { .. } => {
                self.breaker = BreakerState::default();
            }
        }
    }
}

fn cooldown_key(action_type: ActionKind, target: &str) -> String {
    format!("{}:{}", action_type.as_str(), target)
}

/// First-match-wins gate in front of the reactor
pub struct SafetyValve {
    state: Mutex<ValveState>,
    journal: JsonlStore,
}

impl SafetyValve {
    /// Rebuild cooldowns and the breaker by replaying the journal
    pub fn load(state_dir: &StateDir) -> Result<Self, WardenError> {
        let journal = JsonlStore::new(state_dir.safety_journal());
        let mut state = ValveState {
            cooldowns: HashMap::new(),
            breaker: BreakerState::default(),
        };
        let records = journal.load::<JournalRecord>()?;
        let replayed = records.len();
        for record in &records {
            state.apply(record);
        }
        debug!(
            "Safety valve loaded: {} journal record(s), breaker broken={}",
            replayed, state.breaker.broken
        );
        Ok(Self {
            state: Mutex::new(state),
            journal,
        })
    }

    /// First-match-wins: breaker, high-risk deny list, allowed risk level,
    /// then the per-(type,target) cooldown. Read-only and idempotent.
    pub fn is_allowed(
        &self,
        action_type: ActionKind,
        target: &str,
        allow_risk_level: RiskTier,
    ) -> GateDecision {
        let now = Utc::now();
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.breaker.is_open(now) {
            return GateDecision::deny("circuit_broken");
        }
        if HIGH_RISK_DENY.contains(&action_type) {
            return GateDecision::deny(format!("high_risk_denied:{}", action_type));
        }
        if allow_risk_level == RiskTier::Low && !LOW_RISK_ALLOW.contains(&action_type) {
            return GateDecision::deny(format!("risk_above_allowed_level:{}", action_type));
        }
        if let Some(entry) = state.cooldowns.get(&cooldown_key(action_type, target)) {
            if now.signed_duration_since(entry.last_applied) <= Duration::hours(COOLDOWN_HOURS) {
                return GateDecision::deny(format!(
                    "cooldown_active:{}",
                    cooldown_key(action_type, target)
                ));
            }
        }
        GateDecision::allow()
    }

    /// Record an application attempt. Always updates the cooldown entry; a
    /// failure advances the breaker, a success resets its failure counter.
    pub fn record_application(
        &self,
        action_type: ActionKind,
        target: &str,
        success: bool,
    ) -> Result<(), WardenError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let record = JournalRecord::Application {
            action_type,
            target: target.to_string(),
            success,
            at: Utc::now(),
        };
        // The journal append must land before the mutation becomes visible
        self.journal.append(&record)?;

        let was_open = state.breaker.is_open(Utc::now());
        state.apply(&record);
        if !was_open && state.breaker.is_open(Utc::now()) {
            warn!(
                "Circuit breaker opened after {} consecutive failures",
                state.breaker.consecutive_failures
            );
        }
        Ok(())
    }

    /// Explicit operator reset of the breaker
    pub fn reset_breaker(&self) -> Result<(), WardenError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let record = JournalRecord::BreakerReset { at: Utc::now() };
        self.journal.append(&record)?;
        state.apply(&record);
        info!("Circuit breaker reset");
        Ok(())
    }

    /// Snapshot of the breaker, for inspection
    pub fn breaker(&self) -> BreakerState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).breaker
    }

    /// Snapshot of one cooldown entry, for inspection
    pub fn cooldown(&self, action_type: ActionKind, target: &str) -> Option<CooldownEntry> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cooldowns
            .get(&cooldown_key(action_type, target))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valve() -> (tempfile::TempDir, SafetyValve) {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::new(tmp.path());
        let valve = SafetyValve::load(&state).unwrap();
        (tmp, valve)
    }

    #[test]
    fn test_fresh_valve_allows_low_risk_action() {
        let (_tmp, valve) = valve();
        let decision = valve.is_allowed(ActionKind::RunBackup, "backup", RiskTier::Low);
        assert!(decision.allowed);
    }

    #[test]
    fn test_is_allowed_is_idempotent() {
        let (_tmp, valve) = valve();
        let first = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
        let second = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
        assert_eq!(first, second);
    }

    #[test]
    fn test_high_risk_types_denied_unconditionally() {
        let (_tmp, valve) = valve();
        let decision = valve.is_allowed(ActionKind::RotateCredentials, "vault", RiskTier::High);
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("high_risk_denied"));

        let decision = valve.is_allowed(ActionKind::Unknown, "anything", RiskTier::High);
        assert!(!decision.allowed);
    }

    #[test]
    fn test_low_risk_level_rejects_medium_actions() {
        let (_tmp, valve) = valve();
        let decision = valve.is_allowed(ActionKind::RestartComponent, "scheduler", RiskTier::Low);
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("risk_above_allowed_level"));

        // The same action passes once medium risk is allowed
        let decision =
            valve.is_allowed(ActionKind::RestartComponent, "scheduler", RiskTier::Medium);
        assert!(decision.allowed);
    }

    #[test]
    fn test_cooldown_after_successful_application() {
        let (_tmp, valve) = valve();
        valve
            .record_application(ActionKind::IncreaseTimeout, "agent-1", true)
            .unwrap();

        let decision = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("cooldown_active"));

        // Another target is unaffected
        let decision = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-2", RiskTier::Low);
        assert!(decision.allowed);
    }

    #[test]
    fn test_breaker_opens_after_two_consecutive_failures() {
        let (_tmp, valve) = valve();
        valve
            .record_application(ActionKind::RunBackup, "backup", false)
            .unwrap();
        assert!(valve
            .is_allowed(ActionKind::PruneLogs, "journal", RiskTier::Low)
            .allowed);

        valve
            .record_application(ActionKind::PruneLogs, "journal", false)
            .unwrap();
        let decision = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "circuit_broken");
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let (_tmp, valve) = valve();
        valve
            .record_application(ActionKind::RunBackup, "backup", false)
            .unwrap();
        valve
            .record_application(ActionKind::RunBackup, "other", true)
            .unwrap();
        valve
            .record_application(ActionKind::PruneLogs, "journal", false)
            .unwrap();

        // One failure after the reset: still closed
        assert!(!valve.breaker().broken);
    }

    #[test]
    fn test_success_does_not_early_close_open_breaker() {
        let (_tmp, valve) = valve();
        valve
            .record_application(ActionKind::RunBackup, "a", false)
            .unwrap();
        valve
            .record_application(ActionKind::RunBackup, "b", false)
            .unwrap();
        valve
            .record_application(ActionKind::PruneLogs, "c", true)
            .unwrap();

        let decision = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
        assert_eq!(decision.reason, "circuit_broken");
    }

    #[test]
    fn test_reset_breaker_clears_it() {
        let (_tmp, valve) = valve();
        valve
            .record_application(ActionKind::RunBackup, "a", false)
            .unwrap();
        valve
            .record_application(ActionKind::RunBackup, "b", false)
            .unwrap();
        valve.reset_breaker().unwrap();

        assert!(valve
            .is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low)
            .allowed);
        assert_eq!(valve.breaker(), BreakerState::default());
    }

    #[test]
    fn test_breaker_expires_lazily_after_window() {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::new(tmp.path());
        let journal = JsonlStore::new(state.safety_journal());

        // Two failures well past the breaker window
        let stale = Utc::now() - Duration::hours(BREAKER_OPEN_HOURS + 1);
        for target in ["a", "b"] {
            journal
                .append(&JournalRecord::Application {
                    action_type: ActionKind::RunBackup,
                    target: target.to_string(),
                    success: false,
                    at: stale,
                })
                .unwrap();
        }

        let valve = SafetyValve::load(&state).unwrap();
        assert!(valve.breaker().broken);
        // The stamp is stale, so the breaker reads as closed
        let decision = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
        assert!(decision.allowed);
    }

    #[test]
    fn test_stale_cooldown_no_longer_denies() {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::new(tmp.path());
        let journal = JsonlStore::new(state.safety_journal());
        journal
            .append(&JournalRecord::Application {
                action_type: ActionKind::IncreaseTimeout,
                target: "agent-1".to_string(),
                success: true,
                at: Utc::now() - Duration::hours(COOLDOWN_HOURS + 1),
            })
            .unwrap();

        let valve = SafetyValve::load(&state).unwrap();
        assert!(valve
            .is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low)
            .allowed);
    }

    #[test]
    fn test_state_survives_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::new(tmp.path());
        {
            let valve = SafetyValve::load(&state).unwrap();
            valve
                .record_application(ActionKind::IncreaseTimeout, "agent-1", true)
                .unwrap();
            valve
                .record_application(ActionKind::RunBackup, "a", false)
                .unwrap();
            valve
                .record_application(ActionKind::RunBackup, "b", false)
                .unwrap();
        }

        let valve = SafetyValve::load(&state).unwrap();
        assert!(valve.breaker().broken);
        let entry = valve
            .cooldown(ActionKind::IncreaseTimeout, "agent-1")
            .unwrap();
        assert!(entry.last_success);
    }
}
