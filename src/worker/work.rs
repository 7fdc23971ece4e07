//! Units of inbound work.

use std::future::Future;

use tracing::trace;

use crate::events::{EventContext, Provider, classify};

use super::listeners::ListenerRegistry;
use super::pool::Perform;

/// One item on the receiving queue.
#[derive(Debug)]
pub enum Work {
    /// A raw line from the event stream, still to be classified.
    StreamLine { line: String, provider: Provider },

    /// An already classified event, e.g. one triggered by hand.
    Event(EventContext),
}

impl Work {
    /// Classifies the line if needed and notifies every listener.
    ///
    /// Uninteresting and malformed lines are dropped here.
    pub fn perform(self, listeners: &ListenerRegistry) {
        let ctx = match self {
            Work::StreamLine { line, provider } => match classify(&line, Some(&provider)) {
                Some(event) => EventContext::new(event),
                None => return,
            },
            Work::Event(ctx) => ctx,
        };
        trace!(event = %ctx.event, "Dispatching event");
        listeners.notify_listeners(&ctx);
    }
}

impl Perform<Work> for ListenerRegistry {
    fn perform(&self, item: Work) -> impl Future<Output = ()> + Send {
        item.perform(self);
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GerritEventType;
    use crate::test_utils::{patchset_context, patchset_created_json};
    use crate::worker::{GerritEventListener, ListenerResult};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<(GerritEventType, Option<Provider>)>>,
    }

    impl GerritEventListener for Collect {
        fn gerrit_event(&self, ctx: &EventContext) -> ListenerResult {
            self.seen
                .lock()
                .unwrap()
                .push((ctx.event.event_type(), ctx.event.provider().cloned()));
            Ok(())
        }
    }

    fn registry() -> (ListenerRegistry, Arc<Collect>) {
        let registry = ListenerRegistry::new();
        let collect = Arc::new(Collect::default());
        registry.add(collect.clone());
        (registry, collect)
    }

    #[test]
    fn stream_line_is_classified_with_its_provider() {
        let (registry, collect) = registry();
        let provider = Provider::new("gerrit", "review.example.com", 29418);

        Work::StreamLine {
            line: patchset_created_json("proj", "main", 100, 2),
            provider: provider.clone(),
        }
        .perform(&registry);

        assert_eq!(
            *collect.seen.lock().unwrap(),
            vec![(GerritEventType::PatchsetCreated, Some(provider))]
        );
    }

    #[test]
    fn malformed_line_notifies_nobody() {
        let (registry, collect) = registry();
        Work::StreamLine {
            line: "{\"type\": \"patchset-cre".into(),
            provider: Provider::new("gerrit", "localhost", 29418),
        }
        .perform(&registry);
        assert!(collect.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn pre_classified_event_is_passed_through() {
        let (registry, collect) = registry();
        Work::Event(patchset_context(1, 1)).perform(&registry);
        assert_eq!(collect.seen.lock().unwrap().len(), 1);
    }
}
