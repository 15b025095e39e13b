//! Subscriber registry and fault-isolated dispatch.
//!
//! Listeners are kept per [`EventKind`] in registration order. Dispatch runs
//! every listener for the event's kind even if earlier ones return an error
//! or panic; the failures are collected for the caller to report.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use kiosk_core::protocol::{ClientEvent, EventKind};
use tracing::warn;

/// What a listener returns.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A registered callback.
pub type Listener = Arc<dyn Fn(&ClientEvent) -> ListenerResult + Send + Sync>;

/// Handle identifying one registration, used to remove it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A listener that returned an error or panicked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Which registration failed.
    pub id: ListenerId,
    /// Error message or panic payload.
    pub message: String,
}

/// Listeners grouped by event kind.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> =
            self.listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("SubscriberRegistry").field("listeners", &counts).finish()
    }
}

impl SubscriberRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`, after any existing ones.
    pub fn add(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    /// Register by wire tag. Unknown tags are rejected with a warning.
    pub fn add_by_tag(&mut self, tag: &str, listener: Listener) -> Option<ListenerId> {
        match tag.parse::<EventKind>() {
            Ok(kind) => Some(self.add(kind, listener)),
            Err(e) => {
                warn!(tag, error = %e, "rejecting listener for unknown event kind");
                None
            }
        }
    }

    /// Remove a registration. Returns whether it was present.
    pub fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    /// Number of listeners for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Whether no listener is registered for any kind.
    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }

    /// Copy of the listeners for `kind`, so dispatch can run without the lock.
    pub fn snapshot(&self, kind: EventKind) -> Vec<(ListenerId, Listener)> {
        self.listeners.get(&kind).cloned().unwrap_or_default()
    }
}

/// Invoke each listener in order, isolating failures.
pub fn invoke(listeners: &[(ListenerId, Listener)], event: &ClientEvent) -> Vec<ListenerFailure> {
    let mut failures = Vec::new();
    for (id, listener) in listeners {
        let message = match catch_unwind(AssertUnwindSafe(|| listener(event))) {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(kind = %event.kind(), listener = id.0, error = %message, "listener failed");
        failures.push(ListenerFailure { id: *id, message });
    }
    failures
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Listener {
        let log = Arc::clone(log);
        Arc::new(move |_: &ClientEvent| -> ListenerResult {
            log.lock().push(name);
            Ok(())
        })
    }

    fn text(content: &str) -> ClientEvent {
        ClientEvent::TextResponse { content: content.into() }
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        let _ = registry.add(EventKind::TextResponse, recorder(&log, "a"));
        let _ = registry.add(EventKind::TextResponse, recorder(&log, "b"));
        let _ = registry.add(EventKind::Error, recorder(&log, "err"));
        let _ = registry.add(EventKind::TextResponse, recorder(&log, "c"));

        let failures = invoke(&registry.snapshot(EventKind::TextResponse), &text("x"));
        assert!(failures.is_empty());
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn failing_listeners_do_not_stop_later_ones() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        let failing = registry.add(EventKind::TextResponse, Arc::new(|_: &ClientEvent| -> ListenerResult { Err("render failed".into()) }));
        let panicking = registry.add(EventKind::TextResponse, Arc::new(|_: &ClientEvent| -> ListenerResult { panic!("boom") }));
        let _ = registry.add(EventKind::TextResponse, recorder(&log, "after"));

        let failures = invoke(&registry.snapshot(EventKind::TextResponse), &text("x"));
        assert_eq!(*log.lock(), vec!["after"]);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0], ListenerFailure { id: failing, message: "render failed".into() });
        assert_eq!(failures[1].id, panicking);
        assert_eq!(failures[1].message, "panicked: boom");
    }

    #[test]
    fn remove_by_handle() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        let a = registry.add(EventKind::Connect, recorder(&log, "a"));
        let _ = registry.add(EventKind::Connect, recorder(&log, "b"));

        assert!(registry.remove(EventKind::Connect, a));
        assert!(!registry.remove(EventKind::Connect, a));
        assert!(!registry.remove(EventKind::Disconnect, a));
        assert_eq!(registry.len(EventKind::Connect), 1);

        let _ = invoke(
            &registry.snapshot(EventKind::Connect),
            &ClientEvent::Connect { session_id: None },
        );
        assert_eq!(*log.lock(), vec!["b"]);
    }

    #[test]
    fn unknown_tag_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        assert!(registry.add_by_tag("chat_message", recorder(&log, "x")).is_none());
        assert!(registry.is_empty());
        assert!(registry.add_by_tag("table_response", recorder(&log, "t")).is_some());
        assert_eq!(registry.len(EventKind::TableResponse), 1);
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        let a = registry.add(EventKind::Connect, recorder(&log, "a"));
        let b = registry.add(EventKind::Disconnect, recorder(&log, "b"));
        assert_ne!(a, b);
    }

    #[test]
    fn debug_shows_counts_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        let _ = registry.add(EventKind::Error, recorder(&log, "a"));
        assert!(format!("{registry:?}").contains("Error"));
    }
}
