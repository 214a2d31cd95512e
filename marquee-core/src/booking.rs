use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::catalog::SeatType;
use crate::payment::Payment;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        match self {
            BookingStatus::Pending | BookingStatus::Confirmed => false,
            BookingStatus::Cancelled | BookingStatus::Expired => true,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "expired" => Ok(BookingStatus::Expired),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// A reservation of one or more seats for a single showtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub showtime_id: Uuid,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub seat_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// A fresh hold that lapses `hold` after `now`.
    pub fn new_hold(
        reference: String,
        user_id: Uuid,
        showtime_id: Uuid,
        total_amount: Decimal,
        seat_count: i32,
        now: DateTime<Utc>,
        hold: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference,
            user_id,
            showtime_id,
            status: BookingStatus::Pending,
            total_amount,
            seat_count,
            created_at: now,
            updated_at: now,
            expires_at: Some(now + hold),
        }
    }

    /// True once a pending hold has run past its deadline.
    ///
    /// A hold is live while `now <= expires_at`. Every reader (availability,
    /// confirmation, sweeper, seat release) uses this same boundary.
    pub fn hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending
            && self.expires_at.is_some_and(|deadline| deadline < now)
    }

    /// Whether this booking still occupies its seats at `now`
    pub fn occupies_seats(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            BookingStatus::Confirmed => true,
            BookingStatus::Pending => !self.hold_lapsed(now),
            BookingStatus::Cancelled | BookingStatus::Expired => false,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

/// A seat locked into a booking at the price current when it was reserved.
///
/// Rows are never deleted. `released_at` is stamped when the owning booking
/// becomes cancelled or expired, which frees the (seat, showtime) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingSeat {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub seat_id: Uuid,
    pub showtime_id: Uuid,
    pub price: Decimal,
    pub released_at: Option<DateTime<Utc>>,
}

impl BookingSeat {
    pub fn new(booking_id: Uuid, seat_id: Uuid, showtime_id: Uuid, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            seat_id,
            showtime_id,
            price,
            released_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}

/// Seat line of a booking detail view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedSeat {
    pub seat_id: Uuid,
    pub row: String,
    pub number: i32,
    pub seat_type: SeatType,
    pub price: Decimal,
}

/// A booking together with its seats and payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDetail {
    pub booking: Booking,
    pub seats: Vec<BookedSeat>,
    pub payment: Option<Payment>,
}

/// One page of a user's booking history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold_at(now: DateTime<Utc>) -> Booking {
        Booking::new_hold(
            "BK20260101ABCDEF".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(1680, 2),
            1,
            now,
            Duration::minutes(10),
        )
    }

    #[test]
    fn test_new_hold_is_pending_with_deadline() {
        let now = Utc::now();
        let booking = hold_at(now);

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.expires_at, Some(now + Duration::minutes(10)));
        assert!(booking.occupies_seats(now));
    }

    #[test]
    fn test_hold_lapses_after_deadline() {
        let now = Utc::now();
        let booking = hold_at(now);

        assert!(!booking.hold_lapsed(now + Duration::minutes(9)));
        assert!(!booking.hold_lapsed(now + Duration::minutes(10)));
        assert!(booking.occupies_seats(now + Duration::minutes(10)));
        assert!(booking.hold_lapsed(now + Duration::minutes(10) + Duration::milliseconds(1)));
        assert!(!booking.occupies_seats(now + Duration::minutes(11)));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>(), Ok(status));
        }
        assert!("refunded".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&BookingStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
