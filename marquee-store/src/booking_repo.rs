use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_core::{
    Booking, BookingSeat, BookingStatus, BookingStore, Payment, PaymentStatus, Seat, Showtime,
    StoreError, StoreResult, StoreTx,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::error;
use uuid::Uuid;

/// Partial unique index over active (seat_id, showtime_id) rows
const SEAT_CONSTRAINT: &str = "booking_seats_active_seat_showtime_key";

const SHOWTIME_COLUMNS: &str =
    "id, movie_id, screen_id, start_time, end_time, price_multiplier";
const SEAT_COLUMNS: &str = "id, screen_id, row_label, number, seat_type, base_price";
const BOOKING_COLUMNS: &str =
    "id, reference, user_id, showtime_id, status, total_amount, seat_count, created_at, updated_at, expires_at";
const PAYMENT_COLUMNS: &str =
    "id, booking_id, amount, status, transaction_id, payment_method, created_at, updated_at";

/// Translate a sqlx error into the store taxonomy. This is the only place
/// that looks at database error codes.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            if constraint == SEAT_CONSTRAINT {
                return StoreError::SeatConflict("one or more seats already reserved".to_string());
            }
            return StoreError::UniqueViolation(constraint);
        }
    }
    error!("Database error: {}", err);
    StoreError::Unavailable(err.to_string())
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: Uuid,
    movie_id: Uuid,
    screen_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    price_multiplier: Decimal,
}

impl From<ShowtimeRow> for Showtime {
    fn from(row: ShowtimeRow) -> Self {
        Showtime {
            id: row.id,
            movie_id: row.movie_id,
            screen_id: row.screen_id,
            start_time: row.start_time,
            end_time: row.end_time,
            price_multiplier: row.price_multiplier,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    screen_id: Uuid,
    row_label: String,
    number: i32,
    seat_type: String,
    base_price: Decimal,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            screen_id: row.screen_id,
            row: row.row_label,
            number: row.number,
            seat_type: row.seat_type.parse().map_err(StoreError::Corrupt)?,
            base_price: row.base_price,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    user_id: Uuid,
    showtime_id: Uuid,
    status: String,
    total_amount: Decimal,
    seat_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            reference: row.reference,
            user_id: row.user_id,
            showtime_id: row.showtime_id,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            total_amount: row.total_amount,
            seat_count: row.seat_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingSeatRow {
    id: Uuid,
    booking_id: Uuid,
    seat_id: Uuid,
    showtime_id: Uuid,
    price: Decimal,
    released_at: Option<DateTime<Utc>>,
}

impl From<BookingSeatRow> for BookingSeat {
    fn from(row: BookingSeatRow) -> Self {
        BookingSeat {
            id: row.id,
            booking_id: row.booking_id,
            seat_id: row.seat_id,
            showtime_id: row.showtime_id,
            price: row.price,
            released_at: row.released_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    amount: Decimal,
    status: String,
    transaction_id: String,
    payment_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            amount: row.amount,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            transaction_id: row.transaction_id,
            payment_method: row.payment_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Postgres-backed booking store
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn find_showtime(&self, id: Uuid) -> StoreResult<Option<Showtime>> {
        let row = sqlx::query_as::<_, ShowtimeRow>(&format!(
            "SELECT {} FROM showtimes WHERE id = $1",
            SHOWTIME_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Showtime::from))
    }

    async fn screen_seats(&self, screen_id: Uuid) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE screen_id = $1 ORDER BY row_label, number",
            SEAT_COLUMNS
        ))
        .bind(screen_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        collect(rows)
    }

    async fn find_seats(&self, seat_ids: &[Uuid]) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM seats WHERE id = ANY($1)",
            SEAT_COLUMNS
        ))
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        collect(rows)
    }

    async fn occupied_seat_ids(&self, showtime_id: Uuid, now: DateTime<Utc>) -> StoreResult<HashSet<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT bs.seat_id
            FROM booking_seats bs
            JOIN bookings b ON b.id = bs.booking_id
            WHERE bs.showtime_id = $1
              AND (b.status = 'confirmed' OR (b.status = 'pending' AND b.expires_at >= $2))
            "#,
        )
        .bind(showtime_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids.into_iter().collect())
    }

    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE reference = $1",
            BOOKING_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_user_bookings(&self, user_id: Uuid, offset: i64, limit: i64) -> StoreResult<(Vec<Booking>, i64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bookings WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC, id OFFSET $2 LIMIT $3",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok((collect(rows)?, total))
    }

    async fn booking_seats(&self, booking_id: Uuid) -> StoreResult<Vec<BookingSeat>> {
        let rows = sqlx::query_as::<_, BookingSeatRow>(
            "SELECT id, booking_id, seat_id, showtime_id, price, released_at FROM booking_seats WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BookingSeat::from).collect())
    }

    async fn find_payment(&self, booking_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Payment::try_from).transpose()
    }
}

/// An open Postgres transaction. Dropped without commit, sqlx rolls it back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn find_showtime(&mut self, id: Uuid) -> StoreResult<Option<Showtime>> {
        let row = sqlx::query_as::<_, ShowtimeRow>(&format!(
            "SELECT {} FROM showtimes WHERE id = $1",
            SHOWTIME_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Showtime::from))
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, reference, user_id, showtime_id, status, total_amount, seat_count, created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.user_id)
        .bind(booking.showtime_id)
        .bind(booking.status.as_str())
        .bind(booking.total_amount)
        .bind(booking.seat_count)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn insert_booking_seats(&mut self, seats: &[BookingSeat]) -> StoreResult<()> {
        for seat in seats {
            sqlx::query(
                r#"
                INSERT INTO booking_seats (id, booking_id, seat_id, showtime_id, price, released_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(seat.id)
            .bind(seat.booking_id)
            .bind(seat.seat_id)
            .bind(seat.showtime_id)
            .bind(seat.price)
            .bind(seat.released_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
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
        sqlx::query("UPDATE bookings SET status = $1, expires_at = $2, updated_at = $3 WHERE id = $4")
            .bind(status.as_str())
            .bind(expires_at)
            .bind(now)
            .bind(booking_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn release_seats(&mut self, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE booking_seats SET released_at = $1 WHERE booking_id = $2 AND released_at IS NULL",
        )
        .bind(now)
        .bind(booking_id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn expire_lapsed_holds_on(
        &mut self,
        showtime_id: Uuid,
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>> {
        // Data-modifying CTEs always run to completion, referenced or not
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            WITH lapsed AS (
                UPDATE bookings SET status = 'expired', updated_at = $3
                WHERE status = 'pending'
                  AND expires_at < $3
                  AND id IN (
                      SELECT booking_id FROM booking_seats
                      WHERE showtime_id = $1 AND seat_id = ANY($2) AND released_at IS NULL
                  )
                RETURNING id
            ), released AS (
                UPDATE booking_seats SET released_at = $3
                WHERE released_at IS NULL AND booking_id IN (SELECT id FROM lapsed)
                RETURNING id
            )
            SELECT id FROM lapsed
            "#,
        )
        .bind(showtime_id)
        .bind(seat_ids)
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids)
    }

    async fn expire_lapsed_holds(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            WITH lapsed AS (
                UPDATE bookings SET status = 'expired', updated_at = $1
                WHERE status = 'pending' AND expires_at < $1
                RETURNING id
            ), released AS (
                UPDATE booking_seats SET released_at = $1
                WHERE released_at IS NULL AND booking_id IN (SELECT id FROM lapsed)
                RETURNING id
            )
            SELECT COUNT(*) FROM lapsed
            "#,
        )
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn find_payment(&mut self, booking_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(Payment::try_from).transpose()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, amount, status, transaction_id, payment_method, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.payment_method)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE payments SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(now)
            .bind(payment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::{reference, SeatType};
    use rust_decimal::Decimal;

    async fn connect() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn seed(pool: &PgPool) -> (Showtime, Seat) {
        let screen_id = Uuid::new_v4();
        sqlx::query("INSERT INTO screens (id, theater_id, name) VALUES ($1, $2, $3)")
            .bind(screen_id)
            .bind(Uuid::new_v4())
            .bind(format!("Screen {}", screen_id.simple()))
            .execute(pool)
            .await
            .unwrap();

        let seat = Seat {
            id: Uuid::new_v4(),
            screen_id,
            row: "A".to_string(),
            number: 1,
            seat_type: SeatType::Regular,
            base_price: Decimal::new(1400, 2),
        };
        sqlx::query("INSERT INTO seats (id, screen_id, row_label, number, seat_type, base_price) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(seat.id)
            .bind(seat.screen_id)
            .bind(&seat.row)
            .bind(seat.number)
            .bind(seat.seat_type.as_str())
            .bind(seat.base_price)
            .execute(pool)
            .await
            .unwrap();

        let start = Utc::now() + chrono::Duration::days(1);
        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id: Uuid::new_v4(),
            screen_id,
            start_time: start,
            end_time: start + chrono::Duration::hours(2),
            price_multiplier: Decimal::new(120, 2),
        };
        sqlx::query("INSERT INTO showtimes (id, movie_id, screen_id, start_time, end_time, price_multiplier) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(showtime.id)
            .bind(showtime.movie_id)
            .bind(showtime.screen_id)
            .bind(showtime.start_time)
            .bind(showtime.end_time)
            .bind(showtime.price_multiplier)
            .execute(pool)
            .await
            .unwrap();

        (showtime, seat)
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
    async fn test_active_seat_rows_are_unique() {
        let pool = connect().await;
        let (showtime, seat) = seed(&pool).await;
        let store = PgBookingStore::new(pool);
        let now = Utc::now();

        let hold = |user| {
            Booking::new_hold(
                reference::booking_reference(now),
                user,
                showtime.id,
                seat.price_for(&showtime),
                1,
                now,
                chrono::Duration::minutes(10),
            )
        };

        let first = hold(Uuid::new_v4());
        let mut tx = store.begin().await.unwrap();
        tx.insert_booking(&first).await.unwrap();
        tx.insert_booking_seats(&[BookingSeat::new(first.id, seat.id, showtime.id, first.total_amount)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let second = hold(Uuid::new_v4());
        let mut tx = store.begin().await.unwrap();
        tx.insert_booking(&second).await.unwrap();
        let err = tx
            .insert_booking_seats(&[BookingSeat::new(second.id, seat.id, showtime.id, second.total_amount)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SeatConflict(_)));
        drop(tx);

        // Rolled back with the failed seat insert
        assert!(store.find_booking(second.id).await.unwrap().is_none());
        let occupied = store.occupied_seat_ids(showtime.id, now).await.unwrap();
        assert!(occupied.contains(&seat.id));
    }
}
