//! Warden Common - Shared types and store plumbing for the warden loop
//!
//! Data model for the remediation engine: events, alerts, playbooks,
//! decisions, and the append-only record types every component writes.
//! Persistence is line-delimited JSON under a single injected state dir.

pub mod alert;
pub mod config;
pub mod decision;
pub mod error;
pub mod event;
pub mod log_store;
pub mod paths;
pub mod playbook;
pub mod reaction;
pub mod score;
pub mod verification;

pub use alert::{Alert, AlertDirectory, AlertStatus, FileAlertDirectory};
pub use config::WardenConfig;
pub use decision::{Improvement, ImprovementChange};
pub use error::WardenError;
pub use event::{topic_matches, Event, Severity};
pub use log_store::JsonlStore;
pub use paths::StateDir;
pub use playbook::{
    builtin_playbooks, load_catalog, ActionKind, Playbook, PlaybookAction, PlaybookPredicate,
    RiskTier, VerifyMethod, VerifySpec,
};
pub use reaction::{ReactionOutcome, ReactionRecord};
pub use score::{grade_for, HealthGrade, ScoreSample};
pub use verification::VerificationRecord;
