//! Trigger lifecycle for events whose downstream progress someone is watching.
//!
//! Events stay plain immutable data. Progress callbacks live in a companion
//! [`TriggerLifecycle`] that travels next to the event in an [`EventContext`].
//! Manually triggered events get one; stream events normally don't.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{BuildRef, JobName, PatchSetKey};

use super::model::GerritEvent;

/// Receives progress callbacks for one event.
///
/// Every method has an empty default so listeners only implement what they
/// care about.
pub trait LifecycleListener: Send + Sync {
    /// Listeners are about to be asked whether they want to trigger.
    fn trigger_scan_starting(&self, _event: &GerritEvent) {}

    /// All listeners have been asked.
    fn trigger_scan_done(&self, _event: &GerritEvent) {}

    fn project_triggered(&self, _event: &GerritEvent, _job: &JobName) {}

    fn build_started(&self, _event: &GerritEvent, _build: &BuildRef) {}

    fn build_completed(&self, _event: &GerritEvent, _build: &BuildRef) {}

    fn all_builds_completed(&self, _event: &GerritEvent) {}
}

/// Shared, cloneable listener list for one event.
///
/// Callbacks run against a snapshot of the list, so a listener may remove
/// itself from inside a callback.
#[derive(Clone, Default)]
pub struct TriggerLifecycle {
    listeners: Arc<RwLock<Vec<Arc<dyn LifecycleListener>>>>,
}

impl TriggerLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Removes a previously added listener. Returns true if it was present.
    pub fn remove_listener(&self, listener: &Arc<dyn LifecycleListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fire_trigger_scan_starting(&self, event: &GerritEvent) {
        for l in self.snapshot() {
            l.trigger_scan_starting(event);
        }
    }

    pub fn fire_trigger_scan_done(&self, event: &GerritEvent) {
        for l in self.snapshot() {
            l.trigger_scan_done(event);
        }
    }

    pub fn fire_project_triggered(&self, event: &GerritEvent, job: &JobName) {
        for l in self.snapshot() {
            l.project_triggered(event, job);
        }
    }

    pub fn fire_build_started(&self, event: &GerritEvent, build: &BuildRef) {
        for l in self.snapshot() {
            l.build_started(event, build);
        }
    }

    pub fn fire_build_completed(&self, event: &GerritEvent, build: &BuildRef) {
        for l in self.snapshot() {
            l.build_completed(event, build);
        }
    }

    pub fn fire_all_builds_completed(&self, event: &GerritEvent) {
        for l in self.snapshot() {
            l.all_builds_completed(event);
        }
    }
}

impl fmt::Debug for TriggerLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerLifecycle")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// An event as handed to listeners, with its optional lifecycle companion.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event: Arc<GerritEvent>,
    pub lifecycle: Option<TriggerLifecycle>,
}

impl EventContext {
    /// Context for an event read from the stream.
    pub fn new(event: GerritEvent) -> Self {
        EventContext {
            event: Arc::new(event),
            lifecycle: None,
        }
    }

    /// Context for a manually triggered event that carries a lifecycle.
    pub fn with_lifecycle(event: GerritEvent, lifecycle: TriggerLifecycle) -> Self {
        EventContext {
            event: Arc::new(event),
            lifecycle: Some(lifecycle),
        }
    }

    pub fn key(&self) -> Option<PatchSetKey> {
        self.event.patch_set_key()
    }
}

impl From<GerritEvent> for EventContext {
    fn from(event: GerritEvent) -> Self {
        EventContext::new(event)
    }
}
