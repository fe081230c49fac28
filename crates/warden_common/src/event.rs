//! Event model for the bus.
//!
//! Events are immutable, append-only signals flowing from sensors and loop
//! components. An `Alert` is the stateful counterpart; events never mutate.

use crate::error::WardenError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Event / alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for Severity {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "CRITICAL" | "CRIT" => Ok(Severity::Critical),
            other => Err(WardenError::Internal(format!(
                "unknown severity: {other}"
            ))),
        }
    }
}

/// A single bus event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Dotted topic, e.g. "warden.reaction.success"
    pub topic: String,
    /// Emission time
    pub timestamp: DateTime<Utc>,
    /// Emitting component
    pub source: String,
    /// Structured payload
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Optional severity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Event {
    /// Create a new event with an empty payload
    pub fn new(topic: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            timestamp: Utc::now(),
            source: source.into(),
            payload: Map::new(),
            severity: None,
        }
    }

    /// Attach a payload field
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Attach a severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Fail fast on structurally invalid events
    pub fn validate(&self) -> Result<(), WardenError> {
        if self.topic.trim().is_empty() {
            return Err(WardenError::MalformedEvent("missing topic".to_string()));
        }
        Ok(())
    }
}

/// Match a subscription pattern against a topic.
///
/// Patterns are exact topics, or a prefix terminated by `*` ("warden.*"
/// matches every topic under "warden.", bare "*" matches everything).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        topic.starts_with(prefix)
    } else {
        pattern == topic
    }
}
