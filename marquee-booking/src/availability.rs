use chrono::{DateTime, Utc};
use marquee_core::{BookingError, BookingResult, SeatType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::BookingEngine;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatAvailability {
    pub seat_id: Uuid,
    pub row: String,
    pub number: i32,
    pub seat_type: SeatType,
    pub price: Decimal,
    pub available: bool,
}

/// Seat map of one showtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowtimeSeats {
    pub showtime_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub seats: Vec<SeatAvailability>,
    pub total_seats: usize,
    pub available_seats: usize,
}

impl BookingEngine {
    /// Every seat of the showtime's screen with its price and whether it can
    /// be booked right now. Lapsed holds count as free whether or not the
    /// sweeper has visited them yet.
    pub async fn get_availability(&self, showtime_id: Uuid) -> BookingResult<ShowtimeSeats> {
        let showtime = self
            .store
            .find_showtime(showtime_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("showtime {}", showtime_id)))?;

        let now = self.clock.now();
        let seats = self.store.screen_seats(showtime.screen_id).await?;
        let occupied = self.store.occupied_seat_ids(showtime_id, now).await?;

        let mut seats: Vec<SeatAvailability> = seats
            .into_iter()
            .map(|seat| SeatAvailability {
                available: !occupied.contains(&seat.id),
                price: seat.price_for(&showtime),
                seat_id: seat.id,
                row: seat.row,
                number: seat.number,
                seat_type: seat.seat_type,
            })
            .collect();
        seats.sort_by(|a, b| a.row.cmp(&b.row).then(a.number.cmp(&b.number)));

        let available_seats = seats.iter().filter(|s| s.available).count();
        debug!(
            "Showtime {}: {}/{} seats available",
            showtime_id,
            available_seats,
            seats.len()
        );

        Ok(ShowtimeSeats {
            showtime_id,
            start_time: showtime.start_time,
            total_seats: seats.len(),
            available_seats,
            seats,
        })
    }
}
