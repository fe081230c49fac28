//! Command handlers for wardenctl.

use anyhow::Result;
use console::style;
use owo_colors::OwoColorize;
use std::collections::BTreeMap;
use warden_common::{
    Alert, Event, HealthGrade, Improvement, JsonlStore, ScoreSample, Severity, StateDir,
    VerificationRecord, WardenConfig,
};
use wardend::{PlaybookCatalog, SafetyValve, ShadowValidator};

/// List the merged playbook catalog
pub fn playbooks(state: &StateDir) -> Result<()> {
    let catalog = PlaybookCatalog::load(state)?;

    println!();
    println!("{}", style("Playbook catalog").bold());
    for playbook in catalog.playbooks() {
        let status = if playbook.enabled {
            "enabled".green().to_string()
        } else {
            "disabled".red().to_string()
        };
        println!();
        println!("  {}  [{}]", style(&playbook.id).bold(), status);
        println!("    {}", playbook.name);
        for action in &playbook.actions {
            println!(
                "    action  {} on {} (risk {}, timeout {}s)",
                action.action_type, action.target, action.risk, action.timeout_secs
            );
        }
        match &playbook.verify {
            Some(verify) => println!("    verify  {} after {}s", verify.method, verify.delay_secs),
            None => println!("    verify  none"),
        }
        let last = match catalog.last_executed(&playbook.id) {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "never".to_string(),
        };
        println!(
            "    cooldown {}m, last executed {}{}",
            playbook.cooldown_minutes,
            last,
            if playbook.require_confirm {
                ", requires confirmation"
            } else {
                ""
            }
        );
    }
    println!();
    Ok(())
}

/// Run a synthetic alert through matching and gating without executing
pub fn replay(
    state: &StateDir,
    rule_id: &str,
    severity: &str,
    hits: u32,
    message: &str,
) -> Result<()> {
    let severity: Severity = severity.parse()?;
    let alert = Alert::new(rule_id, severity, message).with_hit_count(hits);

    let catalog = PlaybookCatalog::load(state)?;
    let valve = SafetyValve::load(state)?;
    let shadow = ShadowValidator::new(state);
    let config = WardenConfig::load(state)?;

    println!();
    println!(
        "{}  rule_id={} severity={} hits={}",
        style("Synthetic alert").bold(),
        rule_id,
        severity,
        hits
    );

    let matches = catalog.match_alert(&alert);
    if matches.is_empty() {
        println!("  {}", "no playbook matched".yellow());
        println!();
        return Ok(());
    }

    for playbook in matches {
        println!();
        println!("  matched {}", style(&playbook.id).bold());
        if playbook.require_confirm {
            println!("    {}", "requires confirmation".yellow());
        }
        for action in &playbook.actions {
            let decision =
                valve.is_allowed(action.action_type, &action.target, config.allow_risk_level);
            if !decision.allowed {
                println!(
                    "    {}  {} on {}: {}",
                    "DENY".red(),
                    action.action_type,
                    action.target,
                    decision.reason
                );
                continue;
            }
            let improvement = Improvement::from_action(action);
            let validation = shadow.validate_before_apply(&improvement, config.replay_count);
            if validation.passed {
                println!(
                    "    {}  {} on {} (shadow: {})",
                    "ALLOW".green(),
                    action.action_type,
                    action.target,
                    validation.reason
                );
            } else {
                println!(
                    "    {}  {} on {}: {}",
                    "REJECT".red(),
                    action.action_type,
                    action.target,
                    validation.reason
                );
            }
        }
    }
    println!();
    Ok(())
}

/// Show the verification audit trail or its aggregate stats
pub fn verifications(state: &StateDir, stats: bool) -> Result<()> {
    let records: Vec<VerificationRecord> = JsonlStore::new(state.verifications_log()).load()?;
    if records.is_empty() {
        println!("No verifications recorded yet");
        return Ok(());
    }

    if stats {
        let total = records.len();
        let passed = records.iter().filter(|r| r.passed).count();
        let mut by_method: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for record in &records {
            let key = record
                .method
                .map(|m| m.to_string())
                .unwrap_or_else(|| "no_verify_rule".to_string());
            let entry = by_method.entry(key).or_default();
            entry.0 += 1;
            if record.passed {
                entry.1 += 1;
            }
        }

        println!();
        println!("{}", style("Verification stats").bold());
        println!(
            "  total {}, passed {}, failed {}, pass rate {:.0}%",
            total,
            passed,
            total - passed,
            passed as f64 / total as f64 * 100.0
        );
        for (method, (count, count_passed)) in by_method {
            println!("  {:15} {} ({} passed)", method, count, count_passed);
        }
        println!();
        return Ok(());
    }

    println!();
    println!("{}", style("Recent verifications").bold());
    for record in records.iter().skip(records.len().saturating_sub(20)) {
        let verdict = if record.passed {
            "PASS".green().to_string()
        } else {
            "FAIL".red().to_string()
        };
        let method = record
            .method
            .map(|m| m.to_string())
            .unwrap_or_else(|| "no_verify_rule".to_string());
        println!(
            "  {}  {}  {:15} {}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            verdict,
            method,
            record.playbook_id,
            record.detail
        );
    }
    println!();
    Ok(())
}

/// Show the latest evolution score, optionally with the recent trend
pub fn score(state: &StateDir, trend: bool) -> Result<()> {
    let samples: Vec<ScoreSample> = JsonlStore::new(state.scores_log()).load()?;
    let Some(latest) = samples.last() else {
        println!("No score samples yet");
        return Ok(());
    };

    println!();
    println!(
        "{}  {:.3} ({})",
        style("Evolution score").bold(),
        latest.score,
        grade_label(latest.grade)
    );
    println!(
        "  base {:.2}, reactor {:.2}  [fix {:.2}, false-positive {:.2}, auto-close {:.2}]",
        latest.base_score,
        latest.reactor_score,
        latest.auto_fix_rate,
        latest.false_positive_rate,
        latest.auto_close_rate
    );

    if trend {
        println!();
        println!("{}", style("Trend").bold());
        for sample in samples.iter().skip(samples.len().saturating_sub(12)) {
            println!(
                "  {}  {:.3} ({})",
                sample.timestamp.format("%Y-%m-%d %H:%M:%S"),
                sample.score,
                grade_label(sample.grade)
            );
        }
    }
    println!();
    Ok(())
}

/// Tail the durable event log
pub fn events(state: &StateDir, tail: usize) -> Result<()> {
    let events: Vec<Event> = JsonlStore::new(state.events_log()).tail(tail)?;
    if events.is_empty() {
        println!("No events logged yet");
        return Ok(());
    }

    println!();
    println!("{}", style("Recent events").bold());
    for event in &events {
        let payload = if event.payload.is_empty() {
            String::new()
        } else {
            format!("  {}", serde_json::to_string(&event.payload)?)
        };
        println!(
            "  {}  {:35} {}{}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.topic,
            event.source,
            payload
        );
    }
    println!();
    Ok(())
}

fn grade_label(grade: HealthGrade) -> String {
    match grade {
        HealthGrade::Healthy => "healthy".green().to_string(),
        HealthGrade::Degraded => "degraded".yellow().to_string(),
        HealthGrade::Critical => "critical".red().to_string(),
    }
}
