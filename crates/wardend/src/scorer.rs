//! Evolution scorer: bounded composite health over verified outcomes.
//!
//! Recomputed on demand, never timer-driven. Every input is a bounded
//! trailing window and every computation appends one sample to the durable
//! time series.

use std::sync::Arc;
use chrono::Utc;
use tracing::info;
use warden_common::{
    grade_for, AlertDirectory, JsonlStore, ReactionOutcome, ReactionRecord, ScoreSample, StateDir,
    VerificationRecord,
};

const AUTO_FIX_WEIGHT: f64 = 0.5;
const FALSE_POSITIVE_WEIGHT: f64 = 0.3;
const AUTO_CLOSE_WEIGHT: f64 = 0.2;
const BASE_WEIGHT: f64 = 0.6;
const REACTOR_WEIGHT: f64 = 0.4;

/// Aggregates verified outcomes into the evolution score
pub struct EvolutionScorer {
    reactions: JsonlStore,
    verifications: JsonlStore,
    scores: JsonlStore,
    alerts: Arc<dyn AlertDirectory>,
    window: usize,
}

impl EvolutionScorer {
    pub fn new(state: &StateDir, alerts: Arc<dyn AlertDirectory>, window: usize) -> Self {
        Self {
            reactions: JsonlStore::new(state.reactions_log()),
            verifications: JsonlStore::new(state.verifications_log()),
            scores: JsonlStore::new(state.scores_log()),
            alerts,
            window,
        }
    }

    /// Recompute over the trailing windows and append one sample
    pub fn compute(&self, base_score: f64) -> anyhow::Result<ScoreSample> {
        let reactions: Vec<ReactionRecord> = self.reactions.tail(self.window)?;
        let verifications: Vec<VerificationRecord> = self.verifications.tail(self.window)?;
        let mut resolved = self.alerts.resolved_alerts()?;
        if resolved.len() > self.window {
            resolved.drain(..resolved.len() - self.window);
        }

        let attempted = reactions
            .iter()
            .filter(|r| r.outcome != ReactionOutcome::NoMatch)
            .count();
        let fixed = reactions
            .iter()
            .filter(|r| r.outcome == ReactionOutcome::Success)
            .count();
        let failed_verifications = verifications.iter().filter(|v| !v.passed).count();
        let auto_closed = resolved
            .iter()
            .filter(|a| {
                a.resolve_reason
                    .as_deref()
                    .is_some_and(|reason| reason.starts_with("auto_fix"))
            })
            .count();

        let auto_fix_rate = ratio(fixed, attempted);
        let false_positive_rate = ratio(failed_verifications, verifications.len());
        let auto_close_rate = ratio(auto_closed, resolved.len());

        let reactor = reactor_score(auto_fix_rate, false_positive_rate, auto_close_rate);
        let score = composite_score(base_score, reactor);

        let sample = ScoreSample {
            timestamp: Utc::now(),
            score,
            grade: grade_for(score),
            base_score,
            reactor_score: reactor,
            auto_fix_rate,
            false_positive_rate,
            auto_close_rate,
        };
        self.scores.append(&sample)?;
        info!(
            "Evolution score {:.3} ({}) [fix {:.2}, fp {:.2}, close {:.2}]",
            score, sample.grade, auto_fix_rate, false_positive_rate, auto_close_rate
        );
        Ok(sample)
    }
}

/// reactor_score = clamp(fix*0.5 - fp*0.3 + close*0.2) into [0, 1]
pub fn reactor_score(auto_fix_rate: f64, false_positive_rate: f64, auto_close_rate: f64) -> f64 {
    (auto_fix_rate * AUTO_FIX_WEIGHT - false_positive_rate * FALSE_POSITIVE_WEIGHT
        + auto_close_rate * AUTO_CLOSE_WEIGHT)
        .clamp(0.0, 1.0)
}

/// composite = clamp(base*0.6 + reactor*0.4) into [0, 1]
pub fn composite_score(base_score: f64, reactor_score: f64) -> f64 {
    (base_score * BASE_WEIGHT + reactor_score * REACTOR_WEIGHT).clamp(0.0, 1.0)
}

/// A zero denominator reads as a zero rate, not an error
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
