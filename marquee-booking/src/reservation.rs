use marquee_core::{
    pricing, reference, Booking, BookingError, BookingEvent, BookingResult, BookingSeat,
    BookingStatus, Seat, StoreError,
};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::BookingEngine;

impl BookingEngine {
    /// Hold seats for a user as a Pending booking.
    ///
    /// Validation runs without any lock. The seat race is settled by the
    /// store's uniqueness constraint when the seat rows are inserted, and a
    /// loss rolls back the booking row with it.
    pub async fn create_booking(&self, user_id: Uuid, showtime_id: Uuid, seat_ids: &[Uuid]) -> BookingResult<Booking> {
        // 1. Shape of the request
        self.validate_seat_list(seat_ids)?;

        // 2. Showtime must exist and still be ahead of us
        let now = self.clock.now();
        let showtime = self
            .store
            .find_showtime(showtime_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("showtime {}", showtime_id)))?;
        if showtime.has_started(now) {
            return Err(BookingError::ValidationError(format!(
                "showtime {} has already started",
                showtime_id
            )));
        }

        // 3. Every seat exists and sits on this showtime's screen
        let found: HashMap<Uuid, Seat> = self
            .store
            .find_seats(seat_ids)
            .await?
            .into_iter()
            .map(|seat| (seat.id, seat))
            .collect();

        let mut seats = Vec::with_capacity(seat_ids.len());
        for id in seat_ids {
            let seat = found
                .get(id)
                .ok_or_else(|| BookingError::NotFound(format!("seat {}", id)))?;
            if seat.screen_id != showtime.screen_id {
                return Err(BookingError::ValidationError(format!(
                    "seat {} is not on the screen of showtime {}",
                    seat.label(),
                    showtime_id
                )));
            }
            seats.push(seat);
        }

        // 4. Lock prices per seat; the total is the sum of rounded prices
        let prices: Vec<_> = seats.iter().map(|seat| seat.price_for(&showtime)).collect();
        let total = pricing::booking_total(prices.iter().copied());

        let booking = Booking::new_hold(
            reference::booking_reference(now),
            user_id,
            showtime_id,
            total,
            seat_ids.len() as i32,
            now,
            self.rules.hold_duration(),
        );
        let rows: Vec<BookingSeat> = seats
            .iter()
            .zip(prices)
            .map(|(seat, price)| BookingSeat::new(booking.id, seat.id, showtime_id, price))
            .collect();

        // 5. One transaction: clear lapsed holds on these seats, then claim them
        let mut tx = self.store.begin().await?;
        let lapsed = tx.expire_lapsed_holds_on(showtime_id, seat_ids, now).await?;
        tx.insert_booking(&booking).await?;
        match tx.insert_booking_seats(&rows).await {
            Ok(()) => {}
            Err(StoreError::SeatConflict(msg)) => {
                warn!("Seat conflict for user {} on showtime {}: {}", user_id, showtime_id, msg);
                return Err(BookingError::Conflict(msg));
            }
            Err(err) => return Err(err.into()),
        }
        tx.commit().await?;

        if !lapsed.is_empty() {
            info!(
                "Expired {} lapsed hold(s) while reserving on showtime {}",
                lapsed.len(),
                showtime_id
            );
        }
        for booking_id in lapsed {
            self.events.publish(BookingEvent::StatusChanged {
                booking_id,
                showtime_id,
                status: BookingStatus::Expired,
                at: now,
            });
        }
        info!(
            "Booking {} held {} seat(s) on showtime {} until {:?}",
            booking.reference, booking.seat_count, showtime_id, booking.expires_at
        );

        if let Some(expires_at) = booking.expires_at {
            self.events.publish(BookingEvent::SeatsHeld {
                booking_id: booking.id,
                showtime_id,
                seat_ids: seat_ids.to_vec(),
                expires_at,
            });
        }

        Ok(booking)
    }

    fn validate_seat_list(&self, seat_ids: &[Uuid]) -> BookingResult<()> {
        if seat_ids.is_empty() {
            return Err(BookingError::ValidationError("at least one seat is required".to_string()));
        }
        if seat_ids.len() > self.rules.max_seats_per_booking {
            return Err(BookingError::ValidationError(format!(
                "at most {} seats per booking, got {}",
                self.rules.max_seats_per_booking,
                seat_ids.len()
            )));
        }

        let mut seen = HashSet::with_capacity(seat_ids.len());
        if let Some(dup) = seat_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(BookingError::ValidationError(format!("seat {} requested twice", dup)));
        }
        Ok(())
    }
}
