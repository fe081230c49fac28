//! Reactor: executes an approved, validated decision.
//!
//! Per-cycle state machine Idle -> Matched -> Executing -> {Success, Failed}.
//! Failures of every shape (runner errors, panics, exceeded timeouts) are
//! mapped to an ordinary Failed outcome at this boundary and never escape it.
//! Every terminal state appends a reaction record.

use crate::bus::EventBus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use warden_common::{
    Alert, Event, JsonlStore, Playbook, PlaybookAction, ReactionOutcome, ReactionRecord, StateDir,
    WardenError,
};

/// Invoke-with-timeout boundary around an external action unit
pub trait ActionRunner: Send + Sync {
    /// Run the action to completion, returning its output
    fn run(&self, action: &PlaybookAction) -> anyhow::Result<String>;
}

/// Reaction lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Idle,
    Matched,
    Executing,
    Success,
    Failed,
}

/// Executes one approved action per cycle
pub struct Reactor {
    bus: Arc<EventBus>,
    runner: Arc<dyn ActionRunner>,
    reactions: JsonlStore,
}

impl Reactor {
    pub fn new(state: &StateDir, bus: Arc<EventBus>, runner: Arc<dyn ActionRunner>) -> Self {
        Self {
            bus,
            runner,
            reactions: JsonlStore::new(state.reactions_log()),
        }
    }

    /// Record that no playbook matched. A normal outcome, not a fault.
    pub fn record_no_match(&self, alert: &Alert) -> Result<ReactionRecord, WardenError> {
        let record = ReactionRecord::new(ReactionOutcome::NoMatch)
            .with_alert(&alert.id)
            .with_error("no matching playbook");
        self.reactions.append(&record)?;
        debug!("No matching playbook for alert {} ({})", alert.id, alert.rule_id);
        Ok(record)
    }

    /// Walk the state machine for one bound action
    pub async fn execute(
        &self,
        alert: &Alert,
        playbook: &Playbook,
        action: &PlaybookAction,
    ) -> Result<ReactionRecord, WardenError> {
        let mut state = ReactorState::Idle;

        state = self.transition(state, ReactorState::Matched);
        self.emit(
            Event::new("warden.reaction.matched", "reactor")
                .with_payload("alert_id", alert.id.clone())
                .with_payload("playbook_id", playbook.id.clone())
                .with_payload("confidence", playbook.predicate.specificity()),
        );

        state = self.transition(state, ReactorState::Executing);
        let started = Instant::now();
        let outcome = self.invoke(action).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let record = match outcome {
            Ok(output) => {
                self.transition(state, ReactorState::Success);
                info!(
                    "Action {} on {} succeeded in {}ms",
                    action.action_type, action.target, duration_ms
                );
                self.emit(
                    Event::new("warden.reaction.success", "reactor")
                        .with_payload("playbook_id", playbook.id.clone())
                        .with_payload("target", action.target.clone())
                        .with_payload("duration_ms", duration_ms)
                        .with_payload("output", output.trim().to_string()),
                );
                ReactionRecord::new(ReactionOutcome::Success)
                    .with_alert(&alert.id)
                    .with_playbook(&playbook.id)
                    .with_action(action.action_type.as_str(), &action.target)
                    .with_duration(duration_ms)
            }
            Err(error) => {
                self.transition(state, ReactorState::Failed);
                warn!(
                    "Action {} on {} failed after {}ms: {}",
                    action.action_type, action.target, duration_ms, error
                );
                self.emit(
                    Event::new("warden.reaction.failed", "reactor")
                        .with_payload("playbook_id", playbook.id.clone())
                        .with_payload("target", action.target.clone())
                        .with_payload("error", error.to_string()),
                );
                ReactionRecord::new(ReactionOutcome::Failed)
                    .with_alert(&alert.id)
                    .with_playbook(&playbook.id)
                    .with_action(action.action_type.as_str(), &action.target)
                    .with_duration(duration_ms)
                    .with_error(error.to_string())
            }
        };

        self.reactions.append(&record)?;
        Ok(record)
    }

    /// Runner invocation under the declared timeout. Panics and exceeded
    /// timeouts surface as ordinary errors, not as escaping faults.
    async fn invoke(&self, action: &PlaybookAction) -> anyhow::Result<String> {
        let runner = Arc::clone(&self.runner);
        let action = action.clone();
        let limit = Duration::from_secs(action.timeout_secs);

        let handle = tokio::task::spawn_blocking(move || runner.run(&action));
        match timeout(limit, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(anyhow::anyhow!("action panicked: {}", join_error)),
            Err(_) => Err(anyhow::anyhow!(
                "exceeded timeout after {}s",
                limit.as_secs()
            )),
        }
    }

    fn transition(&self, from: ReactorState, to: ReactorState) -> ReactorState {
        debug!("Reactor {:?} -> {:?}", from, to);
        to
    }

    fn emit(&self, event: Event) {
        if let Err(e) = self.bus.publish(&event) {
            warn!("Failed to publish {}: {}", event.topic, e);
        }
    }
}
