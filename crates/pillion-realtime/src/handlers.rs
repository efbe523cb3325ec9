//! Event handler registration and dispatch.
//!
//! Handlers are keyed by the literal wire tag (`"ride_status_update"`,
//! `"emergency_alert"`, …) so consumers can also listen for tags this
//! client does not recognize yet. Multiple handlers per tag are invoked in
//! registration order; a failing handler is logged and skipped without
//! affecting its siblings or the connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use pillion_core::InboundEvent;
use tracing::{debug, warn};

/// Error surface for consumer handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A consumer callback for one event tag.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Identity of one registration; removing it leaves other handlers for the
/// same tag untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    handler: EventHandler,
}

/// Tag → ordered handler list.
///
/// Registration and removal may happen from any task; dispatch happens on
/// the connection actor. Handlers are snapshotted before invocation, so a
/// handler may register or remove handlers itself; the change takes
/// effect from the next event.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event tag.
    ///
    /// No deduplication: registering the same closure twice yields two
    /// invocations per event.
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&InboundEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event_type = event_type.into();
        let mut entries = self.entries.write();
        entries.entry(event_type).or_default().push(Registration {
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write();
        for registrations in entries.values_mut() {
            if let Some(index) = registrations.iter().position(|r| r.id == id) {
                let _ = registrations.remove(index);
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for a tag.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.entries
            .read()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the event's tag, in
    /// registration order. Handler failures are isolated: logged, skipped,
    /// and invisible to the connection.
    pub fn dispatch(&self, event: &InboundEvent) {
        let event_type = event.event_type();
        let handlers: Vec<EventHandler> = {
            let entries = self.entries.read();
            match entries.get(event_type) {
                Some(registrations) => {
                    registrations.iter().map(|r| r.handler.clone()).collect()
                }
                None => {
                    debug!(event_type, "no handlers registered for event");
                    return;
                }
            }
        };
        for handler in handlers {
            if let Err(error) = handler(event) {
                warn!(event_type, %error, "event handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pillion_core::ServerEvent;
    use std::sync::Mutex;

    fn error_event(message: &str) -> InboundEvent {
        InboundEvent::Event(ServerEvent::Error {
            message: message.into(),
        })
    }

    #[test]
    fn dispatch_invokes_registered_handler() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _ = registry.on("error", move |event| {
            seen2.lock().unwrap().push(event.event_type().to_owned());
            Ok(())
        });

        registry.dispatch(&error_event("boom"));
        assert_eq!(seen.lock().unwrap().as_slice(), ["error"]);
    }

    #[test]
    fn dispatch_is_in_registration_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = order.clone();
            let _ = registry.on("error", move |_| {
                order.lock().unwrap().push(label);
                Ok(())
            });
        }

        registry.dispatch(&error_event("x"));
        assert_eq!(order.lock().unwrap().as_slice(), ["first", "second", "third"]);
    }

    #[test]
    fn failing_handler_does_not_block_siblings() {
        let registry = HandlerRegistry::new();
        let reached = Arc::new(Mutex::new(false));
        let reached2 = reached.clone();
        let _ = registry.on("error", |_| Err("handler exploded".into()));
        let _ = registry.on("error", move |_| {
            *reached2.lock().unwrap() = true;
            Ok(())
        });

        registry.dispatch(&error_event("x"));
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn off_removes_only_the_given_handler() {
        let registry = HandlerRegistry::new();
        let count = Arc::new(Mutex::new(0u32));
        let count_a = count.clone();
        let count_b = count.clone();
        let a = registry.on("error", move |_| {
            *count_a.lock().unwrap() += 10;
            Ok(())
        });
        let _b = registry.on("error", move |_| {
            *count_b.lock().unwrap() += 1;
            Ok(())
        });

        assert!(registry.off(a));
        registry.dispatch(&error_event("x"));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn off_unknown_id_returns_false() {
        let registry = HandlerRegistry::new();
        let id = registry.on("error", |_| Ok(()));
        assert!(registry.off(id));
        assert!(!registry.off(id));
    }

    #[test]
    fn same_handler_registered_twice_runs_twice() {
        let registry = HandlerRegistry::new();
        let count = Arc::new(Mutex::new(0u32));
        for _ in 0..2 {
            let count = count.clone();
            let _ = registry.on("error", move |_| {
                *count.lock().unwrap() += 1;
                Ok(())
            });
        }

        registry.dispatch(&error_event("x"));
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn dispatch_without_handlers_is_a_noop() {
        let registry = HandlerRegistry::new();
        registry.dispatch(&error_event("nobody listening"));
    }

    #[test]
    fn unrecognized_tags_are_dispatchable() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(0u32));
        let seen2 = seen.clone();
        let _ = registry.on("server_maintenance", move |_| {
            *seen2.lock().unwrap() += 1;
            Ok(())
        });

        registry.dispatch(&InboundEvent::Unrecognized {
            event_type: "server_maintenance".into(),
            payload: serde_json::json!({"type": "server_maintenance"}),
        });
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn handler_count_tracks_registrations() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.handler_count("error"), 0);
        let id = registry.on("error", |_| Ok(()));
        let _ = registry.on("error", |_| Ok(()));
        assert_eq!(registry.handler_count("error"), 2);
        let _ = registry.off(id);
        assert_eq!(registry.handler_count("error"), 1);
    }

    #[test]
    fn handler_may_remove_itself_during_dispatch() {
        let registry = Arc::new(HandlerRegistry::new());
        let registry2 = registry.clone();
        let slot: Arc<Mutex<Option<HandlerId>>> = Arc::new(Mutex::new(None));
        let slot2 = slot.clone();
        let id = registry.on("error", move |_| {
            if let Some(id) = *slot2.lock().unwrap() {
                let _ = registry2.off(id);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(id);

        registry.dispatch(&error_event("x"));
        assert_eq!(registry.handler_count("error"), 0);
    }
}
