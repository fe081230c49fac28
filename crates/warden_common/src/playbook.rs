//! Playbook model: declarative match -> action rules.
//!
//! Built-in playbooks ship in code; operators may overlay them from
//! playbooks.toml. An overlay entry with a built-in id replaces the
//! built-in wholly, field by field merging is deliberately not done.

use crate::alert::Alert;
use crate::error::WardenError;
use crate::event::Severity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Remediation risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// Closed set of remediation action types. Tags the loop does not know
/// deserialize to `Unknown`, which every consumer treats conservatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ActionKind {
    RestartComponent,
    IncreaseTimeout,
    RunBackup,
    PruneLogs,
    ReloadConfig,
    AdjustPriority,
    PatchPrompt,
    RotateCredentials,
    /// Forward compatibility: any unrecognized tag lands here
    Unknown,
}

impl From<String> for ActionKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "restart_component" => ActionKind::RestartComponent,
            "increase_timeout" => ActionKind::IncreaseTimeout,
            "run_backup" => ActionKind::RunBackup,
            "prune_logs" => ActionKind::PruneLogs,
            "reload_config" => ActionKind::ReloadConfig,
            "adjust_priority" => ActionKind::AdjustPriority,
            "patch_prompt" => ActionKind::PatchPrompt,
            "rotate_credentials" => ActionKind::RotateCredentials,
            _ => ActionKind::Unknown,
        }
    }
}

impl ActionKind {
    /// Stable tag used in cooldown keys and journals
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RestartComponent => "restart_component",
            ActionKind::IncreaseTimeout => "increase_timeout",
            ActionKind::RunBackup => "run_backup",
            ActionKind::PruneLogs => "prune_logs",
            ActionKind::ReloadConfig => "reload_config",
            ActionKind::AdjustPriority => "adjust_priority",
            ActionKind::PatchPrompt => "patch_prompt",
            ActionKind::RotateCredentials => "rotate_credentials",
            ActionKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert predicate. Absent fields are wildcards; declared fields must all
/// match (AND).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookPredicate {
    /// Exact rule id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Severity membership
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severities: Option<Vec<Severity>>,
    /// Minimum hit count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_hit_count: Option<u32>,
    /// Message substring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_contains: Option<String>,
}

impl PlaybookPredicate {
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(rule_id) = &self.rule_id {
            if alert.rule_id != *rule_id {
                return false;
            }
        }
        if let Some(severities) = &self.severities {
            if !severities.contains(&alert.severity) {
                return false;
            }
        }
        if let Some(min_hits) = self.min_hit_count {
            if alert.hit_count < min_hits {
                return false;
            }
        }
        if let Some(needle) = &self.message_contains {
            if !alert.message.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }

    /// Fraction of predicate fields that are declared, used as match
    /// confidence (a fully wildcarded predicate is the least specific)
    pub fn specificity(&self) -> f64 {
        let declared = [
            self.rule_id.is_some(),
            self.severities.is_some(),
            self.min_hit_count.is_some(),
            self.message_contains.is_some(),
        ]
        .iter()
        .filter(|d| **d)
        .count();
        declared as f64 / 4.0
    }
}

/// One bound remediation action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookAction {
    pub action_type: ActionKind,
    /// Component or unit the action applies to
    pub target: String,
    /// Action parameters, passed through to the action runner
    #[serde(default)]
    pub params: Map<String, Value>,
    pub risk: RiskTier,
    /// Execution timeout in seconds
    #[serde(default = "default_action_timeout")]
    pub timeout_secs: u64,
}

fn default_action_timeout() -> u64 {
    60
}

/// Post-execution verification method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMethod {
    /// Run a read-only command and compare its output
    CommandCheck,
    /// Pass iff no open/ack alert remains for the rule
    AlertGone,
    /// Reserved placeholder, always passes
    MetricCheck,
}

impl fmt::Display for VerifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyMethod::CommandCheck => write!(f, "command_check"),
            VerifyMethod::AlertGone => write!(f, "alert_gone"),
            VerifyMethod::MetricCheck => write!(f, "metric_check"),
        }
    }
}

/// Per-playbook verification rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySpec {
    pub method: VerifyMethod,
    /// Command for command_check, argv form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Expected literal/substring in command output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_contains: Option<String>,
    /// Settle delay before every check
    #[serde(default = "default_verify_delay")]
    pub delay_secs: u64,
}

fn default_verify_delay() -> u64 {
    5
}

/// A declarative remediation rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    #[serde(rename = "match", default)]
    pub predicate: PlaybookPredicate,
    pub actions: Vec<PlaybookAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifySpec>,
    /// Minutes between execution attempts of this playbook
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub require_confirm: bool,
}

fn default_cooldown_minutes() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

/// Built-in playbook set, in priority order
pub fn builtin_playbooks() -> Vec<Playbook> {
    vec![
        Playbook {
            id: "backup_expired".to_string(),
            name: "Re-run expired backup".to_string(),
            predicate: PlaybookPredicate {
                rule_id: Some("backup".to_string()),
                severities: Some(vec![Severity::Warn, Severity::Critical]),
                min_hit_count: Some(1),
                message_contains: None,
            },
            actions: vec![PlaybookAction {
                action_type: ActionKind::RunBackup,
                target: "backup".to_string(),
                params: Map::new(),
                risk: RiskTier::Low,
                timeout_secs: 300,
            }],
            verify: Some(VerifySpec {
                method: VerifyMethod::CommandCheck,
                command: Some(vec!["backup-agent".to_string(), "status".to_string()]),
                expect_contains: Some("fresh".to_string()),
                delay_secs: 10,
            }),
            cooldown_minutes: 120,
            enabled: true,
            require_confirm: false,
        },
        Playbook {
            id: "scheduler_down".to_string(),
            name: "Restart failed scheduler".to_string(),
            predicate: PlaybookPredicate {
                rule_id: Some("component_down".to_string()),
                severities: Some(vec![Severity::Critical]),
                min_hit_count: None,
                message_contains: Some("scheduler".to_string()),
            },
            actions: vec![PlaybookAction {
                action_type: ActionKind::RestartComponent,
                target: "scheduler".to_string(),
                params: Map::new(),
                risk: RiskTier::Medium,
                timeout_secs: 90,
            }],
            verify: Some(VerifySpec {
                method: VerifyMethod::AlertGone,
                command: None,
                expect_contains: None,
                delay_secs: 15,
            }),
            cooldown_minutes: 30,
            enabled: true,
            require_confirm: false,
        },
        Playbook {
            id: "agent_slow".to_string(),
            name: "Raise task runner timeout".to_string(),
            predicate: PlaybookPredicate {
                rule_id: Some("agent_slow".to_string()),
                severities: Some(vec![Severity::Warn]),
                min_hit_count: Some(3),
                message_contains: None,
            },
            actions: vec![PlaybookAction {
                action_type: ActionKind::IncreaseTimeout,
                target: "task-runner".to_string(),
                params: params(&[("from_secs", json!(60)), ("to_secs", json!(120))]),
                risk: RiskTier::Low,
                timeout_secs: 30,
            }],
            verify: Some(VerifySpec {
                method: VerifyMethod::AlertGone,
                command: None,
                expect_contains: None,
                delay_secs: 30,
            }),
            cooldown_minutes: 240,
            enabled: true,
            require_confirm: false,
        },
        Playbook {
            id: "disk_pressure".to_string(),
            name: "Prune journal logs".to_string(),
            predicate: PlaybookPredicate {
                rule_id: Some("disk".to_string()),
                severities: Some(vec![Severity::Warn, Severity::Critical]),
                min_hit_count: None,
                message_contains: None,
            },
            actions: vec![PlaybookAction {
                action_type: ActionKind::PruneLogs,
                target: "journal".to_string(),
                params: params(&[("keep_days", json!(14))]),
                risk: RiskTier::Low,
                timeout_secs: 120,
            }],
            verify: Some(VerifySpec {
                method: VerifyMethod::CommandCheck,
                command: Some(vec![
                    "df".to_string(),
                    "--output=pcent".to_string(),
                    "/var".to_string(),
                ]),
                expect_contains: None,
                delay_secs: 5,
            }),
            cooldown_minutes: 60,
            enabled: true,
            require_confirm: false,
        },
        Playbook {
            id: "config_drift".to_string(),
            name: "Reload drifted configuration".to_string(),
            predicate: PlaybookPredicate {
                rule_id: Some("config_drift".to_string()),
                severities: None,
                min_hit_count: None,
                message_contains: None,
            },
            actions: vec![PlaybookAction {
                action_type: ActionKind::ReloadConfig,
                target: "app-config".to_string(),
                params: params(&[
                    ("key", json!("profile")),
                    ("value", json!("baseline")),
                ]),
                risk: RiskTier::Medium,
                timeout_secs: 60,
            }],
            verify: Some(VerifySpec {
                method: VerifyMethod::AlertGone,
                command: None,
                expect_contains: None,
                delay_secs: 10,
            }),
            cooldown_minutes: 60,
            enabled: true,
            require_confirm: true,
        },
        Playbook {
            id: "prompt_regression".to_string(),
            name: "Patch summarizer prompt".to_string(),
            predicate: PlaybookPredicate {
                rule_id: Some("prompt_quality".to_string()),
                severities: Some(vec![Severity::Warn]),
                min_hit_count: Some(2),
                message_contains: None,
            },
            actions: vec![PlaybookAction {
                action_type: ActionKind::PatchPrompt,
                target: "summarizer".to_string(),
                params: params(&[(
                    "patch",
                    json!("Answer only from the provided context."),
                )]),
                risk: RiskTier::Low,
                timeout_secs: 30,
            }],
            verify: Some(VerifySpec {
                method: VerifyMethod::MetricCheck,
                command: None,
                expect_contains: None,
                delay_secs: 5,
            }),
            cooldown_minutes: 720,
            enabled: true,
            require_confirm: false,
        },
    ]
}

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct OverlayFile {
    #[serde(default)]
    playbook: Vec<Playbook>,
}

/// Load the operator overlay. Missing file reads as empty.
pub fn load_overlay(path: &Path) -> Result<Vec<Playbook>, WardenError> {
    if !path.exists() {
        debug!("No playbook overlay at {}", path.display());
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    let overlay: OverlayFile = toml::from_str(&raw)
        .map_err(|e| WardenError::Overlay(format!("{}: {}", path.display(), e)))?;
    info!(
        "Loaded {} overlay playbook(s) from {}",
        overlay.playbook.len(),
        path.display()
    );
    Ok(overlay.playbook)
}

/// Built-ins merged with the overlay. A same-id overlay entry replaces the
/// built-in in place; new ids are appended after the built-ins.
pub fn load_catalog(overlay_path: &Path) -> Result<Vec<Playbook>, WardenError> {
    let mut catalog = builtin_playbooks();
    for overlay in load_overlay(overlay_path)? {
        if let Some(slot) = catalog.iter_mut().find(|p| p.id == overlay.id) {
            *slot = overlay;
        } else {
            catalog.push(overlay);
        }
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(rule: &str, severity: Severity, hits: u32, message: &str) -> Alert {
        Alert::new(rule, severity, message).with_hit_count(hits)
    }

    #[test]
    fn test_predicate_and_semantics() {
        let predicate = PlaybookPredicate {
            rule_id: Some("backup".to_string()),
            severities: Some(vec![Severity::Warn]),
            min_hit_count: Some(2),
            message_contains: Some("expired".to_string()),
        };

        assert!(predicate.matches(&alert("backup", Severity::Warn, 2, "backup expired")));
        // Each declared field failing alone breaks the match
        assert!(!predicate.matches(&alert("disk", Severity::Warn, 2, "backup expired")));
        assert!(!predicate.matches(&alert("backup", Severity::Critical, 2, "backup expired")));
        assert!(!predicate.matches(&alert("backup", Severity::Warn, 1, "backup expired")));
        assert!(!predicate.matches(&alert("backup", Severity::Warn, 2, "backup fine")));
    }

    #[test]
    fn test_absent_fields_are_wildcards() {
        let predicate = PlaybookPredicate::default();
        assert!(predicate.matches(&alert("anything", Severity::Info, 1, "whatever")));
        assert_eq!(predicate.specificity(), 0.0);
    }

    #[test]
    fn test_unknown_action_kind_deserializes_conservatively() {
        let kind: ActionKind = serde_json::from_str("\"detonate_cluster\"").unwrap();
        assert_eq!(kind, ActionKind::Unknown);
    }

    #[test]
    fn test_builtin_backup_expired_matches_backup_warn_alert() {
        let catalog = builtin_playbooks();
        let backup = catalog.iter().find(|p| p.id == "backup_expired").unwrap();
        assert!(backup
            .predicate
            .matches(&alert("backup", Severity::Warn, 2, "backup expired")));
    }

    #[test]
    fn test_overlay_replaces_builtin_wholly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playbooks.toml");
        std::fs::write(
            &path,
            r#"
[[playbook]]
id = "backup_expired"
name = "Operator backup override"
cooldown_minutes = 5
enabled = false

[playbook.match]
rule_id = "backup"

[[playbook.actions]]
action_type = "run_backup"
target = "backup"
risk = "low"
timeout_secs = 30

[[playbook]]
id = "custom_rule"
name = "Operator extra"

[[playbook.actions]]
action_type = "prune_logs"
target = "tmp"
risk = "low"
"#,
        )
        .unwrap();

        let catalog = load_catalog(&path).unwrap();
        let backup = catalog.iter().find(|p| p.id == "backup_expired").unwrap();
        // Replaced wholly: overlay defaults apply, no field merge with the built-in
        assert_eq!(backup.name, "Operator backup override");
        assert_eq!(backup.cooldown_minutes, 5);
        assert!(!backup.enabled);
        assert!(backup.verify.is_none());
        // New ids are appended
        assert!(catalog.iter().any(|p| p.id == "custom_rule"));
        // Built-in order is preserved
        assert_eq!(catalog[0].id, "backup_expired");
    }

    #[test]
    fn test_missing_overlay_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = load_catalog(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(catalog.len(), builtin_playbooks().len());
    }
}
