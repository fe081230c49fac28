//! Topic-addressed synchronous pub/sub.
//!
//! Delivery happens inside `publish`: every subscriber whose pattern matches
//! the topic runs in turn, and a failing or panicking handler is isolated and
//! logged so the rest still receive the event. Each publish also appends to
//! the durable event log (failures there are logged and swallowed) and to a
//! bounded in-memory ring for inspection. `drain_queue` pops events parked in
//! the cross-process spool directory and republishes them locally.

use std::collections::VecDeque;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use warden_common::{topic_matches, Event, JsonlStore, StateDir, WardenError};

/// In-memory history capacity; oldest events are evicted first
pub const DEFAULT_HISTORY_CAP: usize = 256;

pub type SubscriberId = u64;

type Handler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

struct Subscriber {
    id: SubscriberId,
    pattern: String,
    name: String,
    handler: Handler,
}

/// Synchronous event bus with durable append and a bounded ring history
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    history: Mutex<VecDeque<Event>>,
    capacity: usize,
    log: JsonlStore,
    queue_dir: PathBuf,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(state: &StateDir) -> Self {
        Self::with_capacity(state, DEFAULT_HISTORY_CAP)
    }

    pub fn with_capacity(state: &StateDir, capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            log: JsonlStore::new(state.events_log()),
            queue_dir: state.queue_dir(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for every topic matching `pattern`
    pub fn subscribe(
        &self,
        pattern: &str,
        name: &str,
        handler: impl Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.push(Subscriber {
            id,
            pattern: pattern.to_string(),
            name: name.to_string(),
            handler: Arc::new(handler),
        });
        debug!("Subscribed '{}' to {}", name, pattern);
        id
    }

    /// Remove a subscriber; false when the id is unknown
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() < before
    }

    /// Deliver an event synchronously to every matching subscriber.
    ///
    /// A malformed event (missing topic) fails fast; everything downstream
    /// of validation is best-effort and never raises.
    pub fn publish(&self, event: &Event) -> Result<(), WardenError> {
        event.validate()?;

        if let Err(e) = self.log.append(event) {
            warn!("Event log append failed, continuing in memory: {}", e);
        }

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Handlers run outside the registry lock so one may subscribe/unsubscribe
        let matching: Vec<(String, Handler)> = {
            let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subscribers
                .iter()
                .filter(|s| topic_matches(&s.pattern, &event.topic))
                .map(|s| (s.name.clone(), Arc::clone(&s.handler)))
                .collect()
        };

        for (name, handler) in matching {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Subscriber '{}' failed on {}: {}", name, event.topic, e);
                }
                Err(_) => {
                    warn!("Subscriber '{}' panicked on {}", name, event.topic);
                }
            }
        }

        Ok(())
    }

    /// Pop up to `limit` spooled events, oldest first, and republish each.
    ///
    /// Malformed spool files are logged, removed, and skipped. Returns the
    /// number of events republished.
    pub fn drain_queue(&self, limit: usize) -> usize {
        let entries = match fs::read_dir(&self.queue_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No event queue at {}: {}", self.queue_dir.display(), e);
                return 0;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        let mut drained = 0;
        for path in files.into_iter().take(limit) {
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Unreadable spool file {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<Event>(&raw) {
                Ok(event) => {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("Failed to remove spool file {}: {}", path.display(), e);
                    }
                    match self.publish(&event) {
                        Ok(()) => drained += 1,
                        Err(e) => warn!("Dropping malformed spooled event: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Dropping corrupt spool file {}: {}", path.display(), e);
                    let _ = fs::remove_file(&path);
                }
            }
        }
        drained
    }

    /// Snapshot of the in-memory history, oldest first
    pub fn history(&self) -> Vec<Event> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().cloned().collect()
    }
}
