use marquee_core::{
    reference, Booking, BookingError, BookingResult, LifecycleEvent, PaymentStatus, Refund,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::BookingEngine;

/// Result of a successful cancellation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub refund: Option<Refund>,
    pub message: String,
}

impl BookingEngine {
    /// Cancel a pending or confirmed booking before its showtime starts,
    /// refunding a successful payment.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        reason: Option<&str>,
    ) -> BookingResult<CancellationOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        if !booking.is_owned_by(user_id) {
            return Err(BookingError::Unauthorized(format!(
                "booking {} belongs to another user",
                booking.reference
            )));
        }
        if booking.status.is_terminal() {
            return Err(BookingError::InvalidState(format!(
                "booking {} is already {}",
                booking.reference, booking.status
            )));
        }

        let showtime = tx
            .find_showtime(booking.showtime_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("showtime {}", booking.showtime_id)))?;
        if showtime.has_started(now) {
            return Err(BookingError::InvalidState(format!(
                "showtime for booking {} has already started",
                booking.reference
            )));
        }

        booking.transition(LifecycleEvent::Cancelled, now)?;
        tx.update_booking_status(booking.id, booking.status, booking.expires_at, now)
            .await?;
        tx.release_seats(booking.id, now).await?;

        let refund = match tx.find_payment(booking.id).await? {
            Some(payment) if payment.is_refundable() => {
                tx.update_payment_status(payment.id, PaymentStatus::Refunded, now)
                    .await?;
                Some(Refund::for_payment(&payment, reference::refund_reference(), now))
            }
            _ => None,
        };
        tx.commit().await?;

        let mut message = format!("Booking {} has been cancelled.", booking.reference);
        if let Some(refund) = &refund {
            message.push_str(&format!(
                " A refund of {} has been issued ({}).",
                refund.amount, refund.refund_reference
            ));
        }
        if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
            message.push_str(&format!(" Cancellation reason noted: {}", reason));
        }

        info!(
            "Booking {} cancelled by user {}, refunded: {}",
            booking.reference,
            user_id,
            refund.is_some()
        );
        self.publish_status(&booking);

        Ok(CancellationOutcome {
            booking,
            refund,
            message,
        })
    }
}
