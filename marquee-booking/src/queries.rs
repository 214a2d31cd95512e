use marquee_core::{BookedSeat, Booking, BookingDetail, BookingError, BookingPage, BookingResult};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::engine::BookingEngine;

impl BookingEngine {
    /// A user's booking with its seats and payment.
    pub async fn get_booking(&self, booking_id: Uuid, user_id: Uuid) -> BookingResult<BookingDetail> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;
        self.detail_for(booking, user_id).await
    }

    pub async fn get_booking_by_reference(&self, reference: &str, user_id: Uuid) -> BookingResult<BookingDetail> {
        let booking = self
            .store
            .find_booking_by_reference(reference)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", reference)))?;
        self.detail_for(booking, user_id).await
    }

    /// Newest-first page of a user's bookings. `page` starts at 1;
    /// `per_page` defaults to the configured page size.
    pub async fn list_user_bookings(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: Option<u32>,
    ) -> BookingResult<BookingPage> {
        let per_page = per_page.unwrap_or(self.rules.default_page_size);
        if page < 1 {
            return Err(BookingError::ValidationError("page starts at 1".to_string()));
        }
        if per_page < 1 || per_page > self.rules.max_page_size {
            return Err(BookingError::ValidationError(format!(
                "per_page must be between 1 and {}",
                self.rules.max_page_size
            )));
        }

        let offset = i64::from(page - 1) * i64::from(per_page);
        let (bookings, total) = self
            .store
            .list_user_bookings(user_id, offset, i64::from(per_page))
            .await?;
        debug!(
            "User {} page {}: {} of {} bookings",
            user_id,
            page,
            bookings.len(),
            total
        );

        Ok(BookingPage {
            bookings,
            total,
            page,
            per_page,
        })
    }

    async fn detail_for(&self, booking: Booking, user_id: Uuid) -> BookingResult<BookingDetail> {
        if !booking.is_owned_by(user_id) {
            return Err(BookingError::Unauthorized(format!(
                "booking {} belongs to another user",
                booking.reference
            )));
        }

        let rows = self.store.booking_seats(booking.id).await?;
        let seat_ids: Vec<Uuid> = rows.iter().map(|row| row.seat_id).collect();
        let catalog: HashMap<Uuid, _> = self
            .store
            .find_seats(&seat_ids)
            .await?
            .into_iter()
            .map(|seat| (seat.id, seat))
            .collect();

        // Price comes from the row, never from the current catalog
        let mut seats: Vec<BookedSeat> = rows
            .into_iter()
            .filter_map(|row| {
                catalog.get(&row.seat_id).map(|seat| BookedSeat {
                    seat_id: row.seat_id,
                    row: seat.row.clone(),
                    number: seat.number,
                    seat_type: seat.seat_type,
                    price: row.price,
                })
            })
            .collect();
        seats.sort_by(|a, b| a.row.cmp(&b.row).then(a.number.cmp(&b.number)));

        let payment = self.store.find_payment(booking.id).await?;

        Ok(BookingDetail {
            booking,
            seats,
            payment,
        })
    }
}
