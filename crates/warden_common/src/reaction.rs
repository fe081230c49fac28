//! Reaction records: the append-only execution history.
//!
//! Every terminal reactor outcome is one record. The shadow validator reads
//! this history back as its replay baseline, the scorer as its fix-rate
//! window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal outcome of one reaction cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionOutcome {
    Success,
    Failed,
    /// No playbook matched. A normal outcome, not a fault.
    NoMatch,
}

/// One executed (or declined-to-execute) reaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub outcome: ReactionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReactionRecord {
    pub fn new(outcome: ReactionOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            alert_id: None,
            playbook_id: None,
            action_type: None,
            target: None,
            outcome,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_alert(mut self, alert_id: &str) -> Self {
        self.alert_id = Some(alert_id.to_string());
        self
    }

    pub fn with_playbook(mut self, playbook_id: &str) -> Self {
        self.playbook_id = Some(playbook_id.to_string());
        self
    }

    pub fn with_action(mut self, action_type: &str, target: &str) -> Self {
        self.action_type = Some(action_type.to_string());
        self.target = Some(target.to_string());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
