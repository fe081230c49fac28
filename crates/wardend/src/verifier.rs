//! Verifier: post-execution condition re-check.
//!
//! Dispatches on the playbook's declared verify method after a settle delay.
//! On pass it requests alert resolution with a detail-bearing reason; on fail
//! it only records the failure. Retry and escalation live elsewhere.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use warden_common::{
    Alert, AlertDirectory, JsonlStore, Playbook, ReactionRecord, StateDir, VerificationRecord,
    VerifyMethod, VerifySpec,
};

/// Read-only check command boundary
pub trait CheckRunner: Send + Sync {
    /// Run a verification command, returning captured stdout
    fn run_check(&self, command: &[String]) -> anyhow::Result<String>;
}

/// Re-checks whether the remediated condition is actually gone
pub struct Verifier {
    alerts: Arc<dyn AlertDirectory>,
    checks: Arc<dyn CheckRunner>,
    verifications: JsonlStore,
}

impl Verifier {
    pub fn new(
        state: &StateDir,
        alerts: Arc<dyn AlertDirectory>,
        checks: Arc<dyn CheckRunner>,
    ) -> Self {
        Self {
            alerts,
            checks,
            verifications: JsonlStore::new(state.verifications_log()),
        }
    }

    /// Verify one executed reaction and append the audit record.
    ///
    /// No declared rule is an automatic pass. A pass resolves the alert;
    /// a failure leaves it open and only records the outcome.
    pub async fn verify(
        &self,
        reaction: &ReactionRecord,
        alert: &Alert,
        playbook: &Playbook,
    ) -> anyhow::Result<VerificationRecord> {
        let (method, passed, detail) = match &playbook.verify {
            None => (None, true, "no_verify_rule".to_string()),
            Some(spec) => {
                // Settle delay so the action's effect can propagate
                if spec.delay_secs > 0 {
                    tokio::time::sleep(Duration::from_secs(spec.delay_secs)).await;
                }
                let (passed, detail) = match spec.method {
                    VerifyMethod::CommandCheck => self.command_check(spec),
                    VerifyMethod::AlertGone => self.alert_gone(alert)?,
                    VerifyMethod::MetricCheck => (true, "metric_check_stub".to_string()),
                };
                (Some(spec.method), passed, detail)
            }
        };

        let record = VerificationRecord::new(
            &reaction.id,
            &alert.id,
            &playbook.id,
            method,
            passed,
            detail,
        );
        self.verifications.append(&record)?;

        if record.passed {
            self.alerts
                .resolve(&alert.id, &format!("auto_fix: {}", record.detail))?;
            info!(
                "Verification passed for alert {} via {:?}: {}",
                alert.id, method, record.detail
            );
        } else {
            warn!(
                "Verification failed for alert {}, leaving it open: {}",
                alert.id, record.detail
            );
        }

        Ok(record)
    }

    fn command_check(&self, spec: &VerifySpec) -> (bool, String) {
        let Some(command) = &spec.command else {
            return (false, "command_check with no command declared".to_string());
        };
        match self.checks.run_check(command) {
            Ok(output) => {
                let output = output.trim().to_string();
                match &spec.expect_contains {
                    Some(expected) if output.contains(expected.as_str()) => {
                        (true, format!("output contains '{}'", expected))
                    }
                    Some(expected) => (
                        false,
                        format!("expected '{}' missing from check output", expected),
                    ),
                    None => (true, "check command succeeded".to_string()),
                }
            }
            Err(e) => (false, format!("check command failed: {}", e)),
        }
    }

    /// The alert under verification is excluded; it is resolved on pass.
    /// Any other open alert for the same rule means the condition persists.
    fn alert_gone(&self, alert: &Alert) -> anyhow::Result<(bool, String)> {
        let remaining: Vec<_> = self
            .alerts
            .open_for_rule(&alert.rule_id)?
            .into_iter()
            .filter(|a| a.id != alert.id)
            .collect();
        if remaining.is_empty() {
            Ok((
                true,
                format!("no open alert remains for rule '{}'", alert.rule_id),
            ))
        } else {
            Ok((
                false,
                format!(
                    "{} open alert(s) remain for rule '{}'",
                    remaining.len(),
                    alert.rule_id
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::{
        builtin_playbooks, FileAlertDirectory, ReactionOutcome, Severity,
    };

    struct StaticCheck {
        output: &'static str,
        fail: bool,
    }

    impl CheckRunner for StaticCheck {
        fn run_check(&self, _command: &[String]) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("check refused to run")
            }
            Ok(self.output.to_string())
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        alerts: Arc<FileAlertDirectory>,
        verifier: Verifier,
    }

    fn fixture(check: StaticCheck) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::new(tmp.path());
        let alerts = Arc::new(FileAlertDirectory::new(&state));
        let verifier = Verifier::new(
            &state,
            Arc::clone(&alerts) as Arc<dyn AlertDirectory>,
            Arc::new(check),
        );
        Fixture {
            _tmp: tmp,
            alerts,
            verifier,
        }
    }

    fn playbook(id: &str) -> Playbook {
        let mut playbook = builtin_playbooks()
            .into_iter()
            .find(|p| p.id == id)
            .unwrap();
        if let Some(verify) = playbook.verify.as_mut() {
            verify.delay_secs = 0;
        }
        playbook
    }

    fn reaction() -> ReactionRecord {
        ReactionRecord::new(ReactionOutcome::Success)
    }

    #[tokio::test]
    async fn test_command_check_pass_resolves_alert() {
        let fx = fixture(StaticCheck {
            output: "backup: fresh as of today",
            fail: false,
        });
        let alert = Alert::new("backup", Severity::Warn, "backup expired");
        fx.alerts.record(&alert).unwrap();

        let record = fx
            .verifier
            .verify(&reaction(), &alert, &playbook("backup_expired"))
            .await
            .unwrap();
        assert!(record.passed);
        assert_eq!(record.method, Some(VerifyMethod::CommandCheck));

        assert!(fx.alerts.open_alerts().unwrap().is_empty());
        let resolved = fx.alerts.resolved_alerts().unwrap();
        assert!(resolved[0]
            .resolve_reason
            .as_deref()
            .unwrap()
            .starts_with("auto_fix"));
    }

    #[tokio::test]
    async fn test_command_check_mismatch_leaves_alert_open() {
        let fx = fixture(StaticCheck {
            output: "backup: stale",
            fail: false,
        });
        let alert = Alert::new("backup", Severity::Warn, "backup expired");
        fx.alerts.record(&alert).unwrap();

        let record = fx
            .verifier
            .verify(&reaction(), &alert, &playbook("backup_expired"))
            .await
            .unwrap();
        assert!(!record.passed);
        assert_eq!(fx.alerts.open_alerts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_check_command_is_a_verification_failure() {
        let fx = fixture(StaticCheck {
            output: "",
            fail: true,
        });
        let alert = Alert::new("backup", Severity::Warn, "backup expired");
        fx.alerts.record(&alert).unwrap();

        let record = fx
            .verifier
            .verify(&reaction(), &alert, &playbook("backup_expired"))
            .await
            .unwrap();
        assert!(!record.passed);
        assert!(record.detail.contains("check command failed"));
    }

    #[tokio::test]
    async fn test_alert_gone_passes_when_rule_is_clear() {
        let fx = fixture(StaticCheck {
            output: "",
            fail: false,
        });
        let alert = Alert::new("component_down", Severity::Critical, "scheduler crashed");
        fx.alerts.record(&alert).unwrap();

        let record = fx
            .verifier
            .verify(&reaction(), &alert, &playbook("scheduler_down"))
            .await
            .unwrap();
        assert!(record.passed);
        assert!(fx.alerts.open_alerts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alert_gone_fails_when_rule_still_firing() {
        let fx = fixture(StaticCheck {
            output: "",
            fail: false,
        });
        let alert = Alert::new("component_down", Severity::Critical, "scheduler crashed");
        fx.alerts.record(&alert).unwrap();
        // A second alert for the same rule: the condition is still present
        fx.alerts
            .record(&Alert::new(
                "component_down",
                Severity::Critical,
                "scheduler crashed again",
            ))
            .unwrap();

        let record = fx
            .verifier
            .verify(&reaction(), &alert, &playbook("scheduler_down"))
            .await
            .unwrap();
        assert!(!record.passed);
        assert_eq!(fx.alerts.open_alerts().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_metric_check_always_passes() {
        let fx = fixture(StaticCheck {
            output: "",
            fail: false,
        });
        let alert = Alert::new("prompt_quality", Severity::Warn, "drifting answers");
        fx.alerts.record(&alert).unwrap();

        let record = fx
            .verifier
            .verify(&reaction(), &alert, &playbook("prompt_regression"))
            .await
            .unwrap();
        assert!(record.passed);
        assert_eq!(record.detail, "metric_check_stub");
    }

    #[tokio::test]
    async fn test_no_verify_rule_is_an_automatic_pass() {
        let fx = fixture(StaticCheck {
            output: "",
            fail: false,
        });
        let alert = Alert::new("backup", Severity::Warn, "backup expired");
        fx.alerts.record(&alert).unwrap();

        let mut playbook = playbook("backup_expired");
        playbook.verify = None;

        let record = fx
            .verifier
            .verify(&reaction(), &alert, &playbook)
            .await
            .unwrap();
        assert!(record.passed);
        assert_eq!(record.detail, "no_verify_rule");
        assert_eq!(record.method, None);
    }
}
