//! Booking lifecycle state machine.
//!
//! ```text
//!            PaymentSucceeded
//!   Pending ─────────────────▶ Confirmed
//!      │  PaymentFailed / HoldLapsed │
//!      ├──────────────▶ Expired      │
//!      │                             │ Cancelled
//!      └──────── Cancelled ◀─────────┘
//! ```
//!
//! Cancelled and Expired are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::booking::{Booking, BookingStatus};

/// Something that happened to a booking and may move it to a new status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    PaymentSucceeded,
    PaymentFailed,
    HoldLapsed,
    Cancelled,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::PaymentSucceeded => "payment succeeded",
            LifecycleEvent::PaymentFailed => "payment failed",
            LifecycleEvent::HoldLapsed => "hold lapsed",
            LifecycleEvent::Cancelled => "cancellation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event} to booking in status {from}")]
pub struct TransitionError {
    pub from: BookingStatus,
    pub event: LifecycleEvent,
}

impl BookingStatus {
    /// Next status after `event`, or an error if the move is illegal.
    pub fn apply(self, event: LifecycleEvent) -> Result<BookingStatus, TransitionError> {
        let rejected = Err(TransitionError { from: self, event });

        match self {
            BookingStatus::Pending => match event {
                LifecycleEvent::PaymentSucceeded => Ok(BookingStatus::Confirmed),
                LifecycleEvent::PaymentFailed | LifecycleEvent::HoldLapsed => Ok(BookingStatus::Expired),
                LifecycleEvent::Cancelled => Ok(BookingStatus::Cancelled),
            },
            BookingStatus::Confirmed => match event {
                LifecycleEvent::Cancelled => Ok(BookingStatus::Cancelled),
                LifecycleEvent::PaymentSucceeded
                | LifecycleEvent::PaymentFailed
                | LifecycleEvent::HoldLapsed => rejected,
            },
            BookingStatus::Cancelled | BookingStatus::Expired => rejected,
        }
    }
}

impl Booking {
    /// Apply a lifecycle event in place.
    ///
    /// Keeps the expiry invariant: the deadline survives only into Expired,
    /// where it records the hold that lapsed. Confirmation also refuses a hold
    /// whose deadline has already passed; callers turn that into `HoldLapsed`.
    pub fn transition(&mut self, event: LifecycleEvent, now: DateTime<Utc>) -> Result<BookingStatus, TransitionError> {
        if event == LifecycleEvent::PaymentSucceeded && self.hold_lapsed(now) {
            return Err(TransitionError { from: self.status, event });
        }

        let next = self.status.apply(event)?;
        match next {
            BookingStatus::Confirmed | BookingStatus::Cancelled => self.expires_at = None,
            BookingStatus::Expired | BookingStatus::Pending => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    const ALL_EVENTS: [LifecycleEvent; 4] = [
        LifecycleEvent::PaymentSucceeded,
        LifecycleEvent::PaymentFailed,
        LifecycleEvent::HoldLapsed,
        LifecycleEvent::Cancelled,
    ];

    fn pending(now: DateTime<Utc>) -> Booking {
        Booking::new_hold(
            "BK20260101000001".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(2160, 2),
            1,
            now,
            Duration::minutes(10),
        )
    }

    #[test]
    fn test_booking_lifecycle() {
        let now = Utc::now();
        let mut booking = pending(now);

        // Pending → Confirmed
        booking.transition(LifecycleEvent::PaymentSucceeded, now).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.expires_at, None);

        // Confirmed → Cancelled
        booking.transition(LifecycleEvent::Cancelled, now).unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.expires_at, None);
    }

    #[test]
    fn test_pending_to_expired_keeps_deadline() {
        let now = Utc::now();
        for event in [LifecycleEvent::PaymentFailed, LifecycleEvent::HoldLapsed] {
            let mut booking = pending(now);
            let deadline = booking.expires_at;

            booking.transition(event, now).unwrap();
            assert_eq!(booking.status, BookingStatus::Expired);
            assert_eq!(booking.expires_at, deadline);
        }
    }

    #[test]
    fn test_pending_cancel_clears_deadline() {
        let now = Utc::now();
        let mut booking = pending(now);

        booking.transition(LifecycleEvent::Cancelled, now).unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert!(booking.expires_at.is_none());
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for status in [BookingStatus::Cancelled, BookingStatus::Expired] {
            for event in ALL_EVENTS {
                let err = status.apply(event).unwrap_err();
                assert_eq!(err, TransitionError { from: status, event });
            }
        }
    }

    #[test]
    fn test_confirmed_only_allows_cancel() {
        assert_eq!(
            BookingStatus::Confirmed.apply(LifecycleEvent::Cancelled),
            Ok(BookingStatus::Cancelled)
        );
        assert!(BookingStatus::Confirmed.apply(LifecycleEvent::PaymentSucceeded).is_err());
        assert!(BookingStatus::Confirmed.apply(LifecycleEvent::PaymentFailed).is_err());
        assert!(BookingStatus::Confirmed.apply(LifecycleEvent::HoldLapsed).is_err());
    }

    #[test]
    fn test_lapsed_hold_cannot_be_confirmed() {
        let now = Utc::now();
        let mut booking = pending(now);
        let later = now + Duration::minutes(11);

        let err = booking.transition(LifecycleEvent::PaymentSucceeded, later).unwrap_err();
        assert_eq!(err.from, BookingStatus::Pending);
        assert_eq!(booking.status, BookingStatus::Pending);

        booking.transition(LifecycleEvent::HoldLapsed, later).unwrap();
        assert_eq!(booking.status, BookingStatus::Expired);
        assert_eq!(booking.updated_at, later);
    }

    #[test]
    fn test_transition_error_message() {
        let err = BookingStatus::Expired.apply(LifecycleEvent::Cancelled).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply cancellation to booking in status expired");
    }
}
