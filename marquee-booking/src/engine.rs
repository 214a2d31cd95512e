use marquee_core::{BookingEvent, BookingRules, BookingStore, Clock, EventBus, SystemClock};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Entry point for every booking operation.
///
/// The engine holds no booking state of its own. Each operation opens at most
/// one store transaction and commits it once, so the store stays the single
/// arbiter of seat contention across any number of engine instances.
#[derive(Clone)]
pub struct BookingEngine {
    pub(crate) store: Arc<dyn BookingStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rules: BookingRules,
    pub(crate) events: EventBus,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn BookingStore>, rules: BookingRules) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), rules)
    }

    pub fn with_clock(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, rules: BookingRules) -> Self {
        Self {
            store,
            clock,
            rules,
            events: EventBus::default(),
        }
    }

    /// Share an existing bus, e.g. one already wired to a push channel
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }
}
