//! Evolution score samples.
//!
//! The composite score is a bounded health metric combining the long-run
//! baseline with remediation-loop effectiveness. Samples append to a durable
//! time series and are never overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorical grade derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for HealthGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthGrade::Healthy => write!(f, "healthy"),
            HealthGrade::Degraded => write!(f, "degraded"),
            HealthGrade::Critical => write!(f, "critical"),
        }
    }
}

/// Grade boundaries are exact: >= 0.35 healthy, >= 0.20 degraded
pub fn grade_for(score: f64) -> HealthGrade {
    if score >= 0.35 {
        HealthGrade::Healthy
    } else if score >= 0.20 {
        HealthGrade::Degraded
    } else {
        HealthGrade::Critical
    }
}

/// One scored point in the evolution time series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSample {
    pub timestamp: DateTime<Utc>,
    /// Composite score in [0, 1]
    pub score: f64,
    pub grade: HealthGrade,
    pub base_score: f64,
    /// Remediation-loop sub-score in [0, 1]
    pub reactor_score: f64,
    pub auto_fix_rate: f64,
    pub false_positive_rate: f64,
    pub auto_close_rate: f64,
}
