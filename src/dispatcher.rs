//! Single-subscriber event table.
//!
//! VPAID allows one callback per event name. Registering again replaces the
//! previous binding without notice, matching what players expect.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use vpaid_types::{AdEvent, AdEventKind};

/// Host callback bound to one event name.
pub type AdEventCallback = Rc<dyn Fn(&AdEvent)>;

#[derive(Default)]
pub struct EventDispatcher {
    table: RefCell<HashMap<AdEventKind, AdEventCallback>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` to `kind`, replacing any previous binding.
    pub fn on(&self, kind: AdEventKind, callback: AdEventCallback) {
        if self.table.borrow_mut().insert(kind, callback).is_some() {
            tracing::debug!(event = %kind, "replaced existing subscription");
        }
    }

    /// Clear the binding for `kind`. Returns whether there was one.
    pub fn off(&self, kind: AdEventKind) -> bool {
        self.table.borrow_mut().remove(&kind).is_some()
    }

    /// Deliver `event` to its subscriber, if any.
    ///
    /// The table borrow is released before the callback runs, so the
    /// callback may subscribe, unsubscribe or emit.
    pub fn emit(&self, event: &AdEvent) -> bool {
        let callback = self.table.borrow().get(&event.kind()).cloned();
        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => {
                tracing::trace!(event = %event.kind(), "no subscriber");
                false
            }
        }
    }

    pub fn is_subscribed(&self, kind: AdEventKind) -> bool {
        self.table.borrow().contains_key(&kind)
    }

    /// Subscribed event names, in vocabulary order.
    pub fn subscribed(&self) -> Vec<AdEventKind> {
        let table = self.table.borrow();
        AdEventKind::ALL
            .into_iter()
            .filter(|kind| table.contains_key(kind))
            .collect()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribed", &self.subscribed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, AdEventCallback) {
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        let callback: AdEventCallback = Rc::new(move |_: &AdEvent| seen.set(seen.get() + 1));
        (hits, callback)
    }

    #[test]
    fn emit_without_subscriber_is_dropped() {
        let dispatcher = EventDispatcher::new();
        assert!(!dispatcher.emit(&AdEvent::AdLoaded));
    }

    #[test]
    fn later_subscription_replaces_earlier() {
        let dispatcher = EventDispatcher::new();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();

        dispatcher.on(AdEventKind::AdStarted, first_cb);
        dispatcher.on(AdEventKind::AdStarted, second_cb);
        assert!(dispatcher.emit(&AdEvent::AdStarted));

        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn off_clears_slot() {
        let dispatcher = EventDispatcher::new();
        let (hits, cb) = counter();
        dispatcher.on(AdEventKind::AdStopped, cb);

        assert!(dispatcher.off(AdEventKind::AdStopped));
        assert!(!dispatcher.off(AdEventKind::AdStopped));
        dispatcher.emit(&AdEvent::AdStopped);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn only_matching_kind_fires() {
        let dispatcher = EventDispatcher::new();
        let (hits, cb) = counter();
        dispatcher.on(AdEventKind::AdError, cb);

        dispatcher.emit(&AdEvent::AdStopped);
        dispatcher.emit(&AdEvent::error("boom"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let dispatcher = Rc::new(EventDispatcher::new());
        let hits = Rc::new(Cell::new(0));

        let weak = Rc::downgrade(&dispatcher);
        let seen = hits.clone();
        dispatcher.on(
            AdEventKind::AdImpression,
            Rc::new(move |_: &AdEvent| {
                seen.set(seen.get() + 1);
                if let Some(d) = weak.upgrade() {
                    d.off(AdEventKind::AdImpression);
                }
            }),
        );

        dispatcher.emit(&AdEvent::AdImpression);
        dispatcher.emit(&AdEvent::AdImpression);
        assert_eq!(hits.get(), 1);
        assert!(!dispatcher.is_subscribed(AdEventKind::AdImpression));
    }

    #[test]
    fn subscribed_lists_in_vocabulary_order() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on(AdEventKind::AdInteraction, counter().1);
        dispatcher.on(AdEventKind::AdLoaded, counter().1);

        assert_eq!(
            dispatcher.subscribed(),
            vec![AdEventKind::AdLoaded, AdEventKind::AdInteraction]
        );
    }
}
