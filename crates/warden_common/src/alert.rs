//! Alert model and the alert-lifecycle port.
//!
//! Alerts are owned by an external detection/lifecycle collaborator. The
//! remediation loop only reads open alerts and requests resolution, so the
//! boundary is a trait; the file-backed implementation doubles as the
//! sensor-side writer for tests and the CLI.

use crate::error::WardenError;
use crate::event::Severity;
use crate::log_store::JsonlStore;
use crate::paths::StateDir;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Alert lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Ack,
    Resolved,
}

/// A standing notification of a detected condition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id
    pub id: String,
    /// Detection rule that raised it
    pub rule_id: String,
    /// Severity at last hit
    pub severity: Severity,
    /// Human-readable condition summary
    pub message: String,
    /// Repeat hits within the dedup window
    pub hit_count: u32,
    /// Lifecycle status
    pub status: AlertStatus,
    /// First raised
    pub opened_at: DateTime<Utc>,
    /// Resolution time, if resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Resolution reason, if resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_reason: Option<String>,
}

impl Alert {
    pub fn new(rule_id: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            hit_count: 1,
            status: AlertStatus::Open,
            opened_at: Utc::now(),
            resolved_at: None,
            resolve_reason: None,
        }
    }

    pub fn with_hit_count(mut self, hits: u32) -> Self {
        self.hit_count = hits;
        self
    }

    /// Open and acknowledged alerts still count as unresolved
    pub fn is_open(&self) -> bool {
        matches!(self.status, AlertStatus::Open | AlertStatus::Ack)
    }
}

/// Read/resolve port over the external alert lifecycle
pub trait AlertDirectory: Send + Sync {
    /// All alerts currently OPEN or ACK
    fn open_alerts(&self) -> Result<Vec<Alert>>;

    /// Open/ack alerts for one detection rule
    fn open_for_rule(&self, rule_id: &str) -> Result<Vec<Alert>>;

    /// All resolved alerts
    fn resolved_alerts(&self) -> Result<Vec<Alert>>;

    /// Request resolution of one alert
    fn resolve(&self, alert_id: &str, reason: &str) -> Result<()>;
}

/// Line-delimited alert store. Each state change appends a full record;
/// the latest record per id wins on read.
pub struct FileAlertDirectory {
    store: JsonlStore,
}

impl FileAlertDirectory {
    pub fn new(state: &StateDir) -> Self {
        Self {
            store: JsonlStore::new(state.alerts_file()),
        }
    }

    /// Record a new or updated alert (sensor-side write)
    pub fn record(&self, alert: &Alert) -> Result<(), WardenError> {
        self.store.append(alert)
    }

    /// Latest state per alert id, in id order
    fn current(&self) -> Result<Vec<Alert>, WardenError> {
        let records: Vec<Alert> = self.store.load()?;
        let mut latest: BTreeMap<String, Alert> = BTreeMap::new();
        for alert in records {
            latest.insert(alert.id.clone(), alert);
        }
        Ok(latest.into_values().collect())
    }
}

impl AlertDirectory for FileAlertDirectory {
    fn open_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.current()?.into_iter().filter(Alert::is_open).collect())
    }

    fn open_for_rule(&self, rule_id: &str) -> Result<Vec<Alert>> {
        Ok(self
            .current()?
            .into_iter()
            .filter(|a| a.is_open() && a.rule_id == rule_id)
            .collect())
    }

    fn resolved_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self
            .current()?
            .into_iter()
            .filter(|a| a.status == AlertStatus::Resolved)
            .collect())
    }

    fn resolve(&self, alert_id: &str, reason: &str) -> Result<()> {
        let mut alert = self
            .current()?
            .into_iter()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| WardenError::UnknownAlert(alert_id.to_string()))?;

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(Utc::now());
        alert.resolve_reason = Some(reason.to_string());
        self.store.append(&alert)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> (tempfile::TempDir, FileAlertDirectory) {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::new(tmp.path());
        let alerts = FileAlertDirectory::new(&state);
        (tmp, alerts)
    }

    #[test]
    fn test_latest_record_wins() {
        let (_tmp, alerts) = dir();
        let mut alert = Alert::new("backup", Severity::Warn, "backup expired");
        alerts.record(&alert).unwrap();

        alert.hit_count = 3;
        alerts.record(&alert).unwrap();

        let open = alerts.open_alerts().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].hit_count, 3);
    }

    #[test]
    fn test_resolve_moves_alert_out_of_open() {
        let (_tmp, alerts) = dir();
        let alert = Alert::new("backup", Severity::Warn, "backup expired");
        alerts.record(&alert).unwrap();

        alerts.resolve(&alert.id, "auto_fix: backup fresh").unwrap();

        assert!(alerts.open_alerts().unwrap().is_empty());
        let resolved = alerts.resolved_alerts().unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved[0].resolve_reason.as_deref(),
            Some("auto_fix: backup fresh")
        );
    }

    #[test]
    fn test_open_for_rule_filters() {
        let (_tmp, alerts) = dir();
        alerts
            .record(&Alert::new("backup", Severity::Warn, "backup expired"))
            .unwrap();
        alerts
            .record(&Alert::new("disk", Severity::Critical, "disk pressure"))
            .unwrap();

        assert_eq!(alerts.open_for_rule("backup").unwrap().len(), 1);
        assert_eq!(alerts.open_for_rule("dns").unwrap().len(), 0);
    }

    #[test]
    fn test_resolve_unknown_alert_errors() {
        let (_tmp, alerts) = dir();
        assert!(alerts.resolve("nope", "why").is_err());
    }
}
