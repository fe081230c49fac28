//! The cycle driver: one externally triggered pass of the loop.
//!
//! Drain queued events, read open alerts, match, gate, shadow-validate,
//! execute, verify, and recompute the score. Gating denials and shadow
//! rejections are structured events, never errors; a failing alert never
//! aborts the rest of the batch.

use crate::bus::EventBus;
use crate::catalog::PlaybookCatalog;
use crate::reactor::{ActionRunner, Reactor};
use crate::safety::SafetyValve;
use crate::scorer::EvolutionScorer;
use crate::shadow::ShadowValidator;
use crate::verifier::{CheckRunner, Verifier};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use warden_common::{
    Alert, AlertDirectory, Event, Improvement, ReactionOutcome, StateDir, WardenConfig,
};

/// Counters from one pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub drained: usize,
    pub open_alerts: usize,
    pub no_match: usize,
    pub skipped: usize,
    pub denied: usize,
    pub rejected: usize,
    pub executed: usize,
    pub succeeded: usize,
    pub verified: usize,
    pub resolved: usize,
    pub score: f64,
}

/// Owns the loop components for one daemon process
pub struct Engine {
    config: WardenConfig,
    bus: Arc<EventBus>,
    catalog: PlaybookCatalog,
    valve: SafetyValve,
    shadow: ShadowValidator,
    reactor: Reactor,
    verifier: Verifier,
    scorer: EvolutionScorer,
    alerts: Arc<dyn AlertDirectory>,
}

impl Engine {
    /// Construct every component explicitly against one state dir. Ports for
    /// alerts, action execution, and checks are injected by the caller.
    pub fn new(
        state: &StateDir,
        config: WardenConfig,
        alerts: Arc<dyn AlertDirectory>,
        runner: Arc<dyn ActionRunner>,
        checks: Arc<dyn CheckRunner>,
    ) -> anyhow::Result<Self> {
        state.ensure()?;
        let bus = Arc::new(EventBus::new(state));
        let catalog = PlaybookCatalog::load(state)?;
        let valve = SafetyValve::load(state)?;
        let shadow = ShadowValidator::new(state);
        let reactor = Reactor::new(state, Arc::clone(&bus), runner);
        let verifier = Verifier::new(state, Arc::clone(&alerts), checks);
        let scorer = EvolutionScorer::new(state, Arc::clone(&alerts), config.score_window);

        Ok(Self {
            config,
            bus,
            catalog,
            valve,
            shadow,
            reactor,
            verifier,
            scorer,
            alerts,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn valve(&self) -> &SafetyValve {
        &self.valve
    }

    /// One logical pass. Idempotent: a concurrent duplicate pass is stopped
    /// at the valve's cooldown once the first records its application.
    pub async fn run_cycle(&mut self) -> anyhow::Result<CycleSummary> {
        let mut summary = CycleSummary::default();
        summary.drained = self.bus.drain_queue(self.config.drain_limit);

        let open = self.alerts.open_alerts()?;
        summary.open_alerts = open.len();
        info!(
            "Cycle start: {} queued event(s) drained, {} open alert(s)",
            summary.drained, summary.open_alerts
        );

        for alert in &open {
            if let Err(e) = self.handle_alert(alert, &mut summary).await {
                warn!("Alert {} left for the next pass: {}", alert.id, e);
            }
        }

        let sample = self.scorer.compute(self.config.base_score)?;
        summary.score = sample.score;
        info!(
            "Cycle done: {} executed, {} denied, {} rejected, {} resolved, score {:.3} ({})",
            summary.executed, summary.denied, summary.rejected, summary.resolved, sample.score,
            sample.grade
        );
        Ok(summary)
    }

    async fn handle_alert(
        &mut self,
        alert: &Alert,
        summary: &mut CycleSummary,
    ) -> anyhow::Result<()> {
        let matched_ids: Vec<String> = self
            .catalog
            .match_alert(alert)
            .iter()
            .map(|p| p.id.clone())
            .collect();

        let Some(playbook_id) = matched_ids.first() else {
            self.reactor.record_no_match(alert)?;
            summary.no_match += 1;
            return Ok(());
        };
        let Some(playbook) = self.catalog.get(playbook_id).cloned() else {
            return Ok(());
        };

        if playbook.require_confirm {
            // An autonomous pass cannot confirm; surface it and move on
            self.emit(
                Event::new("warden.playbook.confirm_required", "engine")
                    .with_payload("alert_id", alert.id.clone())
                    .with_payload("playbook_id", playbook.id.clone()),
            );
            info!(
                "Playbook '{}' requires confirmation, skipping alert {}",
                playbook.id, alert.id
            );
            summary.skipped += 1;
            return Ok(());
        }
        if !self.config.autonomous_mode {
            info!(
                "Autonomous mode off: would run playbook '{}' for alert {}",
                playbook.id, alert.id
            );
            summary.skipped += 1;
            return Ok(());
        }

        for action in &playbook.actions {
            let decision =
                self.valve
                    .is_allowed(action.action_type, &action.target, self.config.allow_risk_level);
            if !decision.allowed {
                info!(
                    "Safety valve denied {} on {}: {}",
                    action.action_type, action.target, decision.reason
                );
                self.emit(
                    Event::new("warden.safety.denied", "engine")
                        .with_payload("action_type", action.action_type.as_str())
                        .with_payload("target", action.target.clone())
                        .with_payload("reason", decision.reason),
                );
                summary.denied += 1;
                continue;
            }

            let improvement = Improvement::from_action(action);
            let validation = self
                .shadow
                .validate_before_apply(&improvement, self.config.replay_count);
            if !validation.passed {
                info!(
                    "Shadow validator rejected {} on {}: {}",
                    improvement.change.kind_tag(),
                    improvement.target,
                    validation.reason
                );
                self.emit(
                    Event::new("warden.shadow.rejected", "engine")
                        .with_payload("target", improvement.target.clone())
                        .with_payload("reason", validation.reason),
                );
                summary.rejected += 1;
                continue;
            }

            let reaction = self.reactor.execute(alert, &playbook, action).await?;
            summary.executed += 1;
            let success = reaction.outcome == ReactionOutcome::Success;
            if success {
                summary.succeeded += 1;
            }

            // Outcome feedback: valve cooldown/breaker, catalog cooldown
            self.valve
                .record_application(action.action_type, &action.target, success)?;
            self.catalog.record_execution(&playbook.id)?;

            if success {
                let verification = self.verifier.verify(&reaction, alert, &playbook).await?;
                summary.verified += 1;
                if verification.passed {
                    summary.resolved += 1;
                }
            }
        }

        Ok(())
    }

    fn emit(&self, event: Event) {
        if let Err(e) = self.bus.publish(&event) {
            warn!("Failed to publish {}: {}", event.topic, e);
        }
    }
}
