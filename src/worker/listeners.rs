//! Event listener registration and fan-out.
//!
//! Delivery is fire-and-forget per listener: an error or a panic in one
//! listener is logged and the remaining listeners still get the event.

use std::error::Error;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::events::EventContext;

/// What a listener returns. Errors are logged, never propagated.
pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Consumer of classified events.
pub trait GerritEventListener: Send + Sync {
    fn gerrit_event(&self, ctx: &EventContext) -> ListenerResult;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Ordered set of listeners receiving every event.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn GerritEventListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn GerritEventListener>) {
        debug!(listener = listener.name(), "Adding event listener");
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Returns true if the listener was registered.
    pub fn remove(&self, listener: &Arc<dyn GerritEventListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn GerritEventListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hands `ctx` to every listener in registration order.
    ///
    /// If the event carries a lifecycle, `trigger_scan_starting` fires before
    /// the first listener and `trigger_scan_done` after the last.
    pub fn notify_listeners(&self, ctx: &EventContext) {
        if let Some(lifecycle) = &ctx.lifecycle {
            lifecycle.fire_trigger_scan_starting(&ctx.event);
        }

        for listener in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| listener.gerrit_event(ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    listener = listener.name(),
                    event = %ctx.event,
                    error = %e,
                    "Listener failed to handle event"
                ),
                Err(_) => error!(
                    listener = listener.name(),
                    event = %ctx.event,
                    "Listener panicked while handling event"
                ),
            }
        }

        if let Some(lifecycle) = &ctx.lifecycle {
            lifecycle.fire_trigger_scan_done(&ctx.event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{GerritEvent, LifecycleListener, TriggerLifecycle};
    use crate::test_utils::{change_event, patchset_context};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Named {
        name: &'static str,
        log: Log,
    }

    impl GerritEventListener for Named {
        fn gerrit_event(&self, ctx: &EventContext) -> ListenerResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} {}", self.name, ctx.key().unwrap()));
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct Failing;

    impl GerritEventListener for Failing {
        fn gerrit_event(&self, _ctx: &EventContext) -> ListenerResult {
            Err("listener is broken".into())
        }
    }

    struct Panicking;

    impl GerritEventListener for Panicking {
        fn gerrit_event(&self, _ctx: &EventContext) -> ListenerResult {
            panic!("listener exploded");
        }
    }

    struct ScanRecorder {
        log: Log,
    }

    impl LifecycleListener for ScanRecorder {
        fn trigger_scan_starting(&self, _event: &GerritEvent) {
            self.log.lock().unwrap().push("scan starting".into());
        }

        fn trigger_scan_done(&self, _event: &GerritEvent) {
            self.log.lock().unwrap().push("scan done".into());
        }
    }

    fn named(name: &'static str, log: &Log) -> Arc<dyn GerritEventListener> {
        Arc::new(Named {
            name,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn notifies_in_registration_order() {
        let log = Log::default();
        let registry = ListenerRegistry::new();
        registry.add(named("first", &log));
        registry.add(named("second", &log));

        registry.notify_listeners(&patchset_context(100, 2));

        assert_eq!(*log.lock().unwrap(), vec!["first 100,2", "second 100,2"]);
    }

    #[test]
    fn failing_and_panicking_listeners_are_contained() {
        let log = Log::default();
        let registry = ListenerRegistry::new();
        registry.add(Arc::new(Failing));
        registry.add(Arc::new(Panicking));
        registry.add(named("survivor", &log));

        registry.notify_listeners(&patchset_context(1, 1));

        assert_eq!(*log.lock().unwrap(), vec!["survivor 1,1"]);
    }

    #[test]
    fn removed_listener_is_not_notified() {
        let log = Log::default();
        let registry = ListenerRegistry::new();
        let listener = named("gone", &log);
        registry.add(Arc::clone(&listener));

        assert!(registry.remove(&listener));
        assert!(!registry.remove(&listener));
        assert!(registry.is_empty());

        registry.notify_listeners(&patchset_context(1, 1));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn lifecycle_scan_brackets_the_fan_out() {
        let log = Log::default();
        let registry = ListenerRegistry::new();
        registry.add(named("listener", &log));

        let lifecycle = TriggerLifecycle::new();
        lifecycle.add_listener(Arc::new(ScanRecorder {
            log: Arc::clone(&log),
        }));
        let ctx = EventContext::with_lifecycle(
            GerritEvent::PatchsetCreated(change_event("proj", 5, 1)),
            lifecycle,
        );

        registry.notify_listeners(&ctx);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["scan starting", "listener 5,1", "scan done"]
        );
    }

    #[test]
    fn default_name_is_the_type_name() {
        assert!(Failing.name().ends_with("Failing"));
    }
}
