//! Error types for warden.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Store error at {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Playbook overlay error: {0}")]
    Overlay(String),

    #[error("Unknown alert: {0}")]
    UnknownAlert(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
