use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::booking::BookingStatus;

/// Published after a booking change has been committed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    SeatsHeld {
        booking_id: Uuid,
        showtime_id: Uuid,
        seat_ids: Vec<Uuid>,
        expires_at: DateTime<Utc>,
    },
    StatusChanged {
        booking_id: Uuid,
        showtime_id: Uuid,
        status: BookingStatus,
        at: DateTime<Utc>,
    },
    HoldsSwept {
        count: u64,
        at: DateTime<Utc>,
    },
}

/// Fan-out of booking events to in-process subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BookingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.tx.subscribe()
    }

    /// Best effort: having no subscribers is not an error.
    pub fn publish(&self, event: BookingEvent) {
        if self.tx.send(event).is_err() {
            debug!("No booking event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
