use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::booking::{Booking, BookingSeat, BookingStatus};
use crate::catalog::{Seat, Showtime};
use crate::payment::{Payment, PaymentStatus};

/// Failures surfaced by a storage backend.
///
/// Backends translate their native constraint errors here, so the engine
/// never has to inspect a raw database error to learn it lost a seat race.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("seat already reserved for this showtime: {0}")]
    SeatConflict(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read access plus the entry point for transactional writes.
///
/// Reads here run outside any transaction and see committed data only.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Open a transaction. Dropping it without `commit` rolls everything back.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn find_showtime(&self, id: Uuid) -> StoreResult<Option<Showtime>>;

    /// All seats of a screen, ordered by row then number
    async fn screen_seats(&self, screen_id: Uuid) -> StoreResult<Vec<Seat>>;

    async fn find_seats(&self, seat_ids: &[Uuid]) -> StoreResult<Vec<Seat>>;

    /// Seats of a showtime held by a confirmed booking or a pending hold
    /// whose deadline has not passed at `now`
    async fn occupied_seat_ids(&self, showtime_id: Uuid, now: DateTime<Utc>) -> StoreResult<HashSet<Uuid>>;

    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn find_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>>;

    /// A page of a user's bookings, newest first, plus the user's total count
    async fn list_user_bookings(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<(Vec<Booking>, i64)>;

    async fn booking_seats(&self, booking_id: Uuid) -> StoreResult<Vec<BookingSeat>>;

    async fn find_payment(&self, booking_id: Uuid) -> StoreResult<Option<Payment>>;
}

/// One unit of work against the store.
///
/// Everything written through a `StoreTx` becomes visible together on
/// `commit`, or not at all.
#[async_trait]
pub trait StoreTx: Send {
    async fn find_showtime(&mut self, id: Uuid) -> StoreResult<Option<Showtime>>;

    /// Read a booking and lock it against concurrent writers until commit
    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    /// Insert seat rows. Fails with `SeatConflict` if any (seat, showtime)
    /// pair already has an active row.
    async fn insert_booking_seats(&mut self, seats: &[BookingSeat]) -> StoreResult<()>;

    async fn update_booking_status(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Stamp `released_at` on a booking's active seat rows
    async fn release_seats(&mut self, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Expire lapsed pending holds that still occupy any of `seat_ids` for the
    /// showtime, releasing their seats. Returns the ids of the bookings expired.
    async fn expire_lapsed_holds_on(
        &mut self,
        showtime_id: Uuid,
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>>;

    /// Expire every lapsed pending hold, releasing their seats. Returns the
    /// number of bookings expired.
    async fn expire_lapsed_holds(&mut self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn find_payment(&mut self, booking_id: Uuid) -> StoreResult<Option<Payment>>;

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
