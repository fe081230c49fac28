//! Verification records: the append-only post-execution audit trail.

use crate::playbook::VerifyMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one post-execution verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub reaction_id: String,
    pub alert_id: String,
    pub playbook_id: String,
    /// None when the playbook declares no verify rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<VerifyMethod>,
    pub passed: bool,
    pub detail: String,
}

impl VerificationRecord {
    pub fn new(
        reaction_id: &str,
        alert_id: &str,
        playbook_id: &str,
        method: Option<VerifyMethod>,
        passed: bool,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            reaction_id: reaction_id.to_string(),
            alert_id: alert_id.to_string(),
            playbook_id: playbook_id.to_string(),
            method,
            passed,
            detail: detail.into(),
        }
    }
}
