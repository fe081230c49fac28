//! Safety Durability Tests
//!
//! Restart behaviour of the safety valve: cooldown and breaker state must
//! survive a process boundary between a recorded application and the next
//! gate check. Each "restart" is a fresh load over the same state dir.

use warden_common::{ActionKind, RiskTier, StateDir};
use wardend::SafetyValve;

#[test]
fn test_cooldown_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let state = StateDir::new(tmp.path());

    {
        let valve = SafetyValve::load(&state).unwrap();
        valve
            .record_application(ActionKind::IncreaseTimeout, "agent-1", true)
            .unwrap();
        // Process dies here, before any further check
    }

    let valve = SafetyValve::load(&state).unwrap();
    let decision = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
    assert!(!decision.allowed);
    assert!(decision.reason.starts_with("cooldown_active"));

    // Unrelated targets are untouched by the reload
    assert!(valve
        .is_allowed(ActionKind::IncreaseTimeout, "agent-2", RiskTier::Low)
        .allowed);
}

#[test]
fn test_open_breaker_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let state = StateDir::new(tmp.path());

    {
        let valve = SafetyValve::load(&state).unwrap();
        valve
            .record_application(ActionKind::RunBackup, "backup", false)
            .unwrap();
        valve
            .record_application(ActionKind::PruneLogs, "journal", false)
            .unwrap();
    }

    let valve = SafetyValve::load(&state).unwrap();
    assert!(valve.breaker().broken);
    let decision = valve.is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low);
    assert_eq!(decision.reason, "circuit_broken");
}

#[test]
fn test_breaker_reset_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let state = StateDir::new(tmp.path());

    {
        let valve = SafetyValve::load(&state).unwrap();
        valve
            .record_application(ActionKind::RunBackup, "a", false)
            .unwrap();
        valve
            .record_application(ActionKind::RunBackup, "b", false)
            .unwrap();
        valve.reset_breaker().unwrap();
    }

    let valve = SafetyValve::load(&state).unwrap();
    assert!(!valve.breaker().broken);
    assert!(valve
        .is_allowed(ActionKind::IncreaseTimeout, "agent-1", RiskTier::Low)
        .allowed);
}

#[test]
fn test_corrupt_journal_line_does_not_abort_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let state = StateDir::new(tmp.path());

    {
        let valve = SafetyValve::load(&state).unwrap();
        valve
            .record_application(ActionKind::IncreaseTimeout, "agent-1", true)
            .unwrap();
    }

    // A torn write lands mid-journal; the record after it must still replay
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(state.safety_journal())
        .unwrap();
    writeln!(file, "{{\"kind\":\"appl").unwrap();
    drop(file);
    {
        let valve = SafetyValve::load(&state).unwrap();
        valve
            .record_application(ActionKind::RunBackup, "backup", true)
            .unwrap();
    }

    let valve = SafetyValve::load(&state).unwrap();
    assert!(valve
        .cooldown(ActionKind::IncreaseTimeout, "agent-1")
        .is_some());
    assert!(valve.cooldown(ActionKind::RunBackup, "backup").is_some());
}
