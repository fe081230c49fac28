//! Warden Daemon - the remediation control loop.
//!
//! One externally triggered pass per cycle: drain queued events, match open
//! alerts against the playbook catalog, gate through the safety valve,
//! shadow-validate, execute, verify, and fold the verified outcome back into
//! the safety valve and the evolution score.

pub mod bus;
pub mod catalog;
pub mod engine;
pub mod reactor;
pub mod runners;
pub mod safety;
pub mod scorer;
pub mod shadow;
pub mod verifier;

pub use bus::{EventBus, SubscriberId};
pub use catalog::PlaybookCatalog;
pub use engine::{CycleSummary, Engine};
pub use reactor::{ActionRunner, Reactor};
pub use safety::{GateDecision, SafetyValve};
pub use scorer::EvolutionScorer;
pub use shadow::{ShadowValidator, Validation};
pub use verifier::{CheckRunner, Verifier};
