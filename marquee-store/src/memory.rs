use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{
    Booking, BookingSeat, BookingStatus, BookingStore, Payment, PaymentStatus, Seat, Showtime,
    StoreError, StoreResult, StoreTx,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct Tables {
    showtimes: HashMap<Uuid, Showtime>,
    seats: HashMap<Uuid, Seat>,
    bookings: HashMap<Uuid, Booking>,
    booking_seats: Vec<BookingSeat>,
    // keyed by booking id, one payment per booking
    payments: HashMap<Uuid, Payment>,
}

impl Tables {
    fn lapsed_hold_ids(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.bookings
            .values()
            .filter(|b| b.hold_lapsed(now))
            .map(|b| b.id)
            .collect()
    }

    fn expire(&mut self, booking_ids: &[Uuid], now: DateTime<Utc>) -> u64 {
        for id in booking_ids {
            if let Some(booking) = self.bookings.get_mut(id) {
                booking.status = BookingStatus::Expired;
                booking.updated_at = now;
            }
            self.release(*id, now);
        }
        booking_ids.len() as u64
    }

    fn release(&mut self, booking_id: Uuid, now: DateTime<Utc>) -> u64 {
        let mut released = 0;
        for row in self.booking_seats.iter_mut() {
            if row.booking_id == booking_id && row.released_at.is_none() {
                row.released_at = Some(now);
                released += 1;
            }
        }
        released
    }
}

/// In-memory booking store with the same transactional contract as the
/// Postgres store: all-or-nothing commits and a unique active row per
/// (seat, showtime).
///
/// Transactions are fully serialized: `begin` takes the table lock and holds
/// it until the transaction is committed or dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed catalog data. The engine never writes these.
    pub async fn insert_showtime(&self, showtime: Showtime) {
        self.tables.lock().await.showtimes.insert(showtime.id, showtime);
    }

    pub async fn insert_seat(&self, seat: Seat) {
        self.tables.lock().await.seats.insert(seat.id, seat);
    }

    /// Every seat row ever written, released ones included
    pub async fn all_booking_seats(&self) -> Vec<BookingSeat> {
        self.tables.lock().await.booking_seats.clone()
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn find_showtime(&self, id: Uuid) -> StoreResult<Option<Showtime>> {
        Ok(self.tables.lock().await.showtimes.get(&id).cloned())
    }

    async fn screen_seats(&self, screen_id: Uuid) -> StoreResult<Vec<Seat>> {
        let tables = self.tables.lock().await;
        let mut seats: Vec<Seat> = tables
            .seats
            .values()
            .filter(|s| s.screen_id == screen_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| (a.row.as_str(), a.number).cmp(&(b.row.as_str(), b.number)));
        Ok(seats)
    }

    async fn find_seats(&self, seat_ids: &[Uuid]) -> StoreResult<Vec<Seat>> {
        let tables = self.tables.lock().await;
        let wanted: HashSet<&Uuid> = seat_ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| tables.seats.get(id).cloned())
            .collect())
    }

    async fn occupied_seat_ids(&self, showtime_id: Uuid, now: DateTime<Utc>) -> StoreResult<HashSet<Uuid>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .booking_seats
            .iter()
            .filter(|row| row.showtime_id == showtime_id)
            .filter(|row| {
                tables
                    .bookings
                    .get(&row.booking_id)
                    .is_some_and(|b| b.occupies_seats(now))
            })
            .map(|row| row.seat_id)
            .collect())
    }

    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn find_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        Ok(self
            .tables
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.reference == reference)
            .cloned())
    }

    async fn list_user_bookings(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<(Vec<Booking>, i64)> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = bookings.len() as i64;
        let page = bookings
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn booking_seats(&self, booking_id: Uuid) -> StoreResult<Vec<BookingSeat>> {
        Ok(self
            .tables
            .lock()
            .await
            .booking_seats
            .iter()
            .filter(|row| row.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn find_payment(&self, booking_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.lock().await.payments.get(&booking_id).cloned())
    }
}

/// Writes go to a private copy of the tables that replaces the shared ones
/// on commit.
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_showtime(&mut self, id: Uuid) -> StoreResult<Option<Showtime>> {
        Ok(self.working.showtimes.get(&id).cloned())
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        if self.working.bookings.contains_key(&booking.id) {
            return Err(StoreError::UniqueViolation("bookings_pkey".to_string()));
        }
        if self.working.bookings.values().any(|b| b.reference == booking.reference) {
            return Err(StoreError::UniqueViolation("bookings_reference_key".to_string()));
        }
        self.working.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn insert_booking_seats(&mut self, seats: &[BookingSeat]) -> StoreResult<()> {
        for seat in seats {
            let taken = self.working.booking_seats.iter().any(|row| {
                row.is_active() && row.seat_id == seat.seat_id && row.showtime_id == seat.showtime_id
            });
            if taken && seat.is_active() {
                return Err(StoreError::SeatConflict(format!(
                    "seat {} already reserved for showtime {}",
                    seat.seat_id, seat.showtime_id
                )));
            }
            self.working.booking_seats.push(seat.clone());
        }
        Ok(())
    }

    async fn update_booking_status(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(booking) = self.working.bookings.get_mut(&booking_id) {
            booking.status = status;
            booking.expires_at = expires_at;
            booking.updated_at = now;
        }
        Ok(())
    }

    async fn release_seats(&mut self, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self.working.release(booking_id, now))
    }

    async fn expire_lapsed_holds_on(
        &mut self,
        showtime_id: Uuid,
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>> {
        let holding: HashSet<Uuid> = self
            .working
            .booking_seats
            .iter()
            .filter(|row| row.is_active() && row.showtime_id == showtime_id && seat_ids.contains(&row.seat_id))
            .map(|row| row.booking_id)
            .collect();

        let lapsed: Vec<Uuid> = self
            .working
            .lapsed_hold_ids(now)
            .into_iter()
            .filter(|id| holding.contains(id))
            .collect();

        self.working.expire(&lapsed, now);
        Ok(lapsed)
    }

    async fn expire_lapsed_holds(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let lapsed = self.working.lapsed_hold_ids(now);
        Ok(self.working.expire(&lapsed, now))
    }

    async fn find_payment(&mut self, booking_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.working.payments.get(&booking_id).cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        if self.working.payments.contains_key(&payment.booking_id) {
            return Err(StoreError::UniqueViolation("payments_booking_key".to_string()));
        }
        if self
            .working
            .payments
            .values()
            .any(|p| p.transaction_id == payment.transaction_id)
        {
            return Err(StoreError::UniqueViolation("payments_transaction_key".to_string()));
        }
        self.working.payments.insert(payment.booking_id, payment.clone());
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(payment) = self.working.payments.values_mut().find(|p| p.id == payment_id) {
            payment.status = status;
            payment.updated_at = now;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use marquee_core::{reference, SeatType};
    use rust_decimal::Decimal;

    async fn seeded() -> (MemoryStore, Showtime, Seat) {
        let store = MemoryStore::new();
        let screen_id = Uuid::new_v4();
        let seat = Seat {
            id: Uuid::new_v4(),
            screen_id,
            row: "A".to_string(),
            number: 1,
            seat_type: SeatType::Regular,
            base_price: Decimal::new(1400, 2),
        };
        let start = Utc::now() + Duration::days(1);
        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id: Uuid::new_v4(),
            screen_id,
            start_time: start,
            end_time: start + Duration::hours(2),
            price_multiplier: Decimal::ONE,
        };
        store.insert_seat(seat.clone()).await;
        store.insert_showtime(showtime.clone()).await;
        (store, showtime, seat)
    }

    fn hold(showtime: &Showtime, now: DateTime<Utc>) -> Booking {
        Booking::new_hold(
            reference::booking_reference(now),
            Uuid::new_v4(),
            showtime.id,
            Decimal::new(1400, 2),
            1,
            now,
            Duration::minutes(10),
        )
    }

    async fn reserve(store: &MemoryStore, booking: &Booking, seat: &Seat) -> StoreResult<()> {
        let mut tx = store.begin().await?;
        tx.insert_booking(booking).await?;
        tx.insert_booking_seats(&[BookingSeat::new(booking.id, seat.id, booking.showtime_id, booking.total_amount)])
            .await?;
        tx.commit().await
    }

    #[tokio::test]
    async fn test_second_active_row_conflicts() {
        let (store, showtime, seat) = seeded().await;
        let now = Utc::now();

        reserve(&store, &hold(&showtime, now), &seat).await.unwrap();
        let err = reserve(&store, &hold(&showtime, now), &seat).await.unwrap_err();

        assert!(matches!(err, StoreError::SeatConflict(_)));
        // Losing transaction left nothing behind
        assert_eq!(store.booking_count().await, 1);
        assert_eq!(store.all_booking_seats().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (store, showtime, _seat) = seeded().await;
        let booking = hold(&showtime, Utc::now());

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_booking(&booking).await.unwrap();
        }

        assert!(store.find_booking(booking.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_released_rows_free_the_seat() {
        let (store, showtime, seat) = seeded().await;
        let now = Utc::now();
        let first = hold(&showtime, now);
        reserve(&store, &first, &seat).await.unwrap();

        let later = now + Duration::minutes(11);
        let mut tx = store.begin().await.unwrap();
        let expired = tx.expire_lapsed_holds_on(showtime.id, &[seat.id], later).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(expired, vec![first.id]);

        reserve(&store, &hold(&showtime, later), &seat).await.unwrap();

        let rows = store.all_booking_seats().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.is_active()).count(), 1);
        let first_row = rows.iter().find(|r| r.booking_id == first.id).unwrap();
        assert_eq!(first_row.released_at, Some(later));
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (store, showtime, seat) = seeded().await;
        let now = Utc::now();
        reserve(&store, &hold(&showtime, now), &seat).await.unwrap();

        // Still live at the exact deadline
        let deadline = now + Duration::minutes(10);
        let later = deadline + Duration::seconds(1);
        for (at, expected) in [(deadline, 0), (later, 1), (later, 0)] {
            let mut tx = store.begin().await.unwrap();
            assert_eq!(tx.expire_lapsed_holds(at).await.unwrap(), expected);
            tx.commit().await.unwrap();
        }
        assert!(store.occupied_seat_ids(showtime.id, later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_payment_per_booking() {
        let (store, showtime, seat) = seeded().await;
        let now = Utc::now();
        let booking = hold(&showtime, now);
        reserve(&store, &booking, &seat).await.unwrap();

        let payment = |txn: &str| {
            Payment::new(
                booking.id,
                booking.total_amount,
                marquee_core::PaymentOutcome::Success,
                txn.to_string(),
                "card".to_string(),
                now,
            )
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_payment(&payment("TXN1")).await.unwrap();
        let err = tx.insert_payment(&payment("TXN2")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }
}
