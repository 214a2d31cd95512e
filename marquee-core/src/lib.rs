pub mod booking;
pub mod catalog;
pub mod clock;
pub mod events;
pub mod lifecycle;
pub mod payment;
pub mod pricing;
pub mod reference;
pub mod repository;
pub mod rules;

pub use booking::{BookedSeat, Booking, BookingDetail, BookingPage, BookingSeat, BookingStatus};
pub use catalog::{Seat, SeatType, Showtime};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{BookingEvent, EventBus};
pub use lifecycle::{LifecycleEvent, TransitionError};
pub use payment::{Payment, PaymentOutcome, PaymentStatus, Refund, RefundStatus};
pub use repository::{BookingStore, StoreError, StoreResult, StoreTx};
pub use rules::BookingRules;

/// Failure taxonomy returned by every engine operation.
///
/// Everything except `Fatal` is a business-rule outcome the request layer is
/// expected to handle. `Fatal` means the store could not complete the
/// operation and nothing was committed.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Seats no longer available: {0}")]
    Conflict(String),
    #[error("Invalid booking state: {0}")]
    InvalidState(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Storage failure: {0}")]
    Fatal(String),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeatConflict(msg) => BookingError::Conflict(msg),
            other => BookingError::Fatal(other.to_string()),
        }
    }
}

impl From<TransitionError> for BookingError {
    fn from(err: TransitionError) -> Self {
        BookingError::InvalidState(err.to_string())
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
