//! Improvement decisions.
//!
//! An `Improvement` is the transient per-cycle description of what an
//! approved action will change, consumed by the shadow validator. Only log
//! records survive the cycle. Tags outside the closed set resolve to
//! `Unknown`, which downstream consumers deny.

use crate::playbook::{ActionKind, PlaybookAction};
use serde::{Deserialize, Serialize};

/// What a remediation changes, as a closed tagged variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImprovementChange {
    /// Timeout tuning, seconds
    #[serde(rename = "timeout_adjustment")]
    Timeout { from_secs: f64, to_secs: f64 },
    /// Probability knob tuning, [0,1]
    #[serde(rename = "probability_adjustment")]
    Probability { from: f64, to: f64 },
    /// Priority knob tuning, [0,1]
    #[serde(rename = "priority_adjustment")]
    Priority { from: f64, to: f64 },
    /// Text patch applied to a prompt/template
    #[serde(rename = "prompt_patch")]
    PromptPatch { patch: String },
    /// Single key/value configuration change
    #[serde(rename = "config_change")]
    ConfigChange { key: String, value: String },
    /// Operational action with no tunable shift (restart, backup, prune...)
    #[serde(rename = "service_operation")]
    ServiceOp { op: String },
    /// Unrecognized or malformed decision
    #[serde(rename = "unknown")]
    Unknown { tag: String },
}

impl ImprovementChange {
    /// Stable tag for logs and reasons
    pub fn kind_tag(&self) -> &'static str {
        match self {
            ImprovementChange::Timeout { .. } => "timeout_adjustment",
            ImprovementChange::Probability { .. } => "probability_adjustment",
            ImprovementChange::Priority { .. } => "priority_adjustment",
            ImprovementChange::PromptPatch { .. } => "prompt_patch",
            ImprovementChange::ConfigChange { .. } => "config_change",
            ImprovementChange::ServiceOp { .. } => "service_operation",
            ImprovementChange::Unknown { .. } => "unknown",
        }
    }
}

/// A proposed remediation decision for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub target: String,
    #[serde(flatten)]
    pub change: ImprovementChange,
}

impl Improvement {
    pub fn new(target: impl Into<String>, change: ImprovementChange) -> Self {
        Self {
            target: target.into(),
            change,
        }
    }

    /// Derive the improvement a playbook action proposes. Missing or
    /// malformed parameters resolve to `Unknown`, never to a guess.
    pub fn from_action(action: &PlaybookAction) -> Self {
        let target = action.target.clone();
        let change = match action.action_type {
            ActionKind::IncreaseTimeout => {
                match (num_param(action, "from_secs"), num_param(action, "to_secs")) {
                    (Some(from_secs), Some(to_secs)) => ImprovementChange::Timeout {
                        from_secs,
                        to_secs,
                    },
                    _ => malformed(action),
                }
            }
            ActionKind::AdjustPriority => {
                match (num_param(action, "from"), num_param(action, "to")) {
                    (Some(from), Some(to)) => ImprovementChange::Priority { from, to },
                    _ => malformed(action),
                }
            }
            ActionKind::PatchPrompt => match str_param(action, "patch") {
                Some(patch) => ImprovementChange::PromptPatch { patch },
                None => malformed(action),
            },
            ActionKind::ReloadConfig => {
                match (str_param(action, "key"), str_param(action, "value")) {
                    (Some(key), Some(value)) => ImprovementChange::ConfigChange { key, value },
                    _ => malformed(action),
                }
            }
            ActionKind::RestartComponent
            | ActionKind::RunBackup
            | ActionKind::PruneLogs
            | ActionKind::RotateCredentials => ImprovementChange::ServiceOp {
                op: action.action_type.as_str().to_string(),
            },
            ActionKind::Unknown => ImprovementChange::Unknown {
                tag: "unknown_action".to_string(),
            },
        };
        Self { target, change }
    }
}

fn num_param(action: &PlaybookAction, key: &str) -> Option<f64> {
    action.params.get(key).and_then(|v| v.as_f64())
}

fn str_param(action: &PlaybookAction, key: &str) -> Option<String> {
    action
        .params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn malformed(action: &PlaybookAction) -> ImprovementChange {
    ImprovementChange::Unknown {
        tag: format!("{}_malformed", action.action_type.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::RiskTier;
    use serde_json::{json, Map};

    fn action(kind: ActionKind, params: &[(&str, serde_json::Value)]) -> PlaybookAction {
        PlaybookAction {
            action_type: kind,
            target: "task-runner".to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Map<_, _>>(),
            risk: RiskTier::Low,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_timeout_action_derives_timeout_change() {
        let imp = Improvement::from_action(&action(
            ActionKind::IncreaseTimeout,
            &[("from_secs", json!(60)), ("to_secs", json!(120))],
        ));
        assert_eq!(
            imp.change,
            ImprovementChange::Timeout {
                from_secs: 60.0,
                to_secs: 120.0
            }
        );
    }

    #[test]
    fn test_missing_params_resolve_to_unknown() {
        let imp = Improvement::from_action(&action(ActionKind::IncreaseTimeout, &[]));
        assert_eq!(imp.change.kind_tag(), "unknown");
    }

    #[test]
    fn test_operational_actions_are_service_ops() {
        let imp = Improvement::from_action(&action(ActionKind::RunBackup, &[]));
        assert_eq!(
            imp.change,
            ImprovementChange::ServiceOp {
                op: "run_backup".to_string()
            }
        );
    }

    #[test]
    fn test_tag_roundtrip() {
        let imp = Improvement::new(
            "agent-1",
            ImprovementChange::Timeout {
                from_secs: 100.0,
                to_secs: 120.0,
            },
        );
        let json = serde_json::to_value(&imp).unwrap();
        assert_eq!(json["type"], "timeout_adjustment");
        let back: Improvement = serde_json::from_value(json).unwrap();
        assert_eq!(back, imp);
    }
}
