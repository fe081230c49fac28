//! Playbook catalog: merged rules with execution cooldowns.
//!
//! Built-ins merge with the operator overlay at load. Matching filters on the
//! predicate AND an elapsed playbook cooldown, in stable catalog order
//! (built-in declaration order, overlays appended). Cooldowns are recorded
//! only on execution attempts, never on mere matches.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use warden_common::{load_catalog, Alert, JsonlStore, Playbook, StateDir, WardenError};

/// One recorded execution attempt, replayed at load to rebuild cooldowns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub playbook_id: String,
    pub executed_at: DateTime<Utc>,
}

/// The merged playbook set plus per-playbook execution cooldowns
pub struct PlaybookCatalog {
    playbooks: Vec<Playbook>,
    last_executed: HashMap<String, DateTime<Utc>>,
    journal: JsonlStore,
}

impl PlaybookCatalog {
    pub fn load(state: &StateDir) -> Result<Self, WardenError> {
        let playbooks = load_catalog(&state.playbook_overlay())?;
        let journal = JsonlStore::new(state.playbook_executions());

        let mut last_executed = HashMap::new();
        for record in journal.load::<ExecutionRecord>()? {
            last_executed.insert(record.playbook_id, record.executed_at);
        }

        debug!(
            "Catalog loaded: {} playbook(s), {} with recorded executions",
            playbooks.len(),
            last_executed.len()
        );
        Ok(Self {
            playbooks,
            last_executed,
            journal,
        })
    }

    pub fn playbooks(&self) -> &[Playbook] {
        &self.playbooks
    }

    pub fn get(&self, id: &str) -> Option<&Playbook> {
        self.playbooks.iter().find(|p| p.id == id)
    }

    /// When the playbook was last executed, if ever
    pub fn last_executed(&self, id: &str) -> Option<DateTime<Utc>> {
        self.last_executed.get(id).copied()
    }

    /// Enabled playbooks whose predicate matches and whose cooldown elapsed,
    /// in catalog order. No match is an empty vec, not an error.
    pub fn match_alert(&self, alert: &Alert) -> Vec<&Playbook> {
        let now = Utc::now();
        self.playbooks
            .iter()
            .filter(|p| p.enabled)
            .filter(|p| p.predicate.matches(alert))
            .filter(|p| self.cooldown_elapsed(p, now))
            .collect()
    }

    fn cooldown_elapsed(&self, playbook: &Playbook, now: DateTime<Utc>) -> bool {
        match self.last_executed.get(&playbook.id) {
            Some(last) => {
                now.signed_duration_since(*last)
                    >= Duration::minutes(playbook.cooldown_minutes as i64)
            }
            None => true,
        }
    }

    /// Record an execution attempt. Matching alone never lands here.
    pub fn record_execution(&mut self, playbook_id: &str) -> Result<(), WardenError> {
        let record = ExecutionRecord {
            playbook_id: playbook_id.to_string(),
            executed_at: Utc::now(),
        };
        self.journal.append(&record)?;
        self.last_executed
            .insert(record.playbook_id, record.executed_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::Severity;

    fn state() -> (tempfile::TempDir, StateDir) {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::new(tmp.path());
        (tmp, state)
    }

    fn backup_alert() -> Alert {
        Alert::new("backup", Severity::Warn, "backup expired").with_hit_count(2)
    }

    #[test]
    fn test_builtin_backup_alert_matches() {
        let (_tmp, state) = state();
        let catalog = PlaybookCatalog::load(&state).unwrap();
        let matched = catalog.match_alert(&backup_alert());
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "backup_expired");
    }

    #[test]
    fn test_disabled_playbook_never_matches() {
        let (_tmp, state) = state();
        std::fs::write(
            state.playbook_overlay(),
            r#"
[[playbook]]
id = "backup_expired"
name = "Disabled override"
enabled = false

[playbook.match]
rule_id = "backup"

[[playbook.actions]]
action_type = "run_backup"
target = "backup"
risk = "low"
"#,
        )
        .unwrap();

        let catalog = PlaybookCatalog::load(&state).unwrap();
        assert!(catalog.match_alert(&backup_alert()).is_empty());
    }

    #[test]
    fn test_cooldown_gates_matching_but_matching_records_nothing() {
        let (_tmp, state) = state();
        let mut catalog = PlaybookCatalog::load(&state).unwrap();
        let alert = backup_alert();

        // Repeated matches leave no cooldown behind
        assert_eq!(catalog.match_alert(&alert).len(), 1);
        assert_eq!(catalog.match_alert(&alert).len(), 1);
        assert!(catalog.last_executed("backup_expired").is_none());

        catalog.record_execution("backup_expired").unwrap();
        assert!(catalog.match_alert(&alert).is_empty());
    }

    #[test]
    fn test_cooldown_survives_reload() {
        let (_tmp, state) = state();
        {
            let mut catalog = PlaybookCatalog::load(&state).unwrap();
            catalog.record_execution("backup_expired").unwrap();
        }
        let catalog = PlaybookCatalog::load(&state).unwrap();
        assert!(catalog.last_executed("backup_expired").is_some());
        assert!(catalog.match_alert(&backup_alert()).is_empty());
    }

    #[test]
    fn test_match_order_is_catalog_order() {
        let (_tmp, state) = state();
        std::fs::write(
            state.playbook_overlay(),
            r#"
[[playbook]]
id = "zz_catch_all"
name = "Catch-all appended after built-ins"

[[playbook.actions]]
action_type = "prune_logs"
target = "tmp"
risk = "low"
"#,
        )
        .unwrap();

        let catalog = PlaybookCatalog::load(&state).unwrap();
        let matched = catalog.match_alert(&backup_alert());
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].id, "backup_expired");
        assert_eq!(matched[1].id, "zz_catch_all");
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let (_tmp, state) = state();
        let catalog = PlaybookCatalog::load(&state).unwrap();
        let alert = Alert::new("unheard_of", Severity::Info, "nothing to see");
        assert!(catalog.match_alert(&alert).is_empty());
    }
}
