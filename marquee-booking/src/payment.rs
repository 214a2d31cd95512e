use marquee_core::{
    reference, Booking, BookingError, BookingEvent, BookingResult, BookingStatus, LifecycleEvent, Payment,
    PaymentOutcome,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::BookingEngine;

/// Longest payment method label the payments table accepts
pub const MAX_PAYMENT_METHOD_LEN: usize = 50;

fn validate_payment_method(method: &str) -> BookingResult<()> {
    if method.trim().is_empty() {
        return Err(BookingError::ValidationError("payment method is required".to_string()));
    }
    if method.chars().count() > MAX_PAYMENT_METHOD_LEN {
        return Err(BookingError::ValidationError(format!(
            "payment method must be at most {} characters",
            MAX_PAYMENT_METHOD_LEN
        )));
    }
    Ok(())
}

impl BookingEngine {
    /// Apply a simulated payment result to a pending booking.
    ///
    /// Idempotent per booking: once a payment row exists it is returned as-is
    /// and nothing else changes. A hold that lapsed before payment arrived is
    /// expired and reported as `InvalidState`.
    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
        payment_method: &str,
        outcome: PaymentOutcome,
    ) -> BookingResult<Payment> {
        validate_payment_method(payment_method)?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        // 1. Re-read the booking under lock
        let mut booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        // 2. Retried confirmation
        if let Some(existing) = tx.find_payment(booking_id).await? {
            info!(
                "Payment {} already recorded for booking {}",
                existing.transaction_id, booking.reference
            );
            return Ok(existing);
        }

        if booking.status != BookingStatus::Pending {
            return Err(BookingError::InvalidState(format!(
                "booking {} is {}, only pending bookings accept payment",
                booking.reference, booking.status
            )));
        }

        // 3. Hold ran out before payment arrived
        if booking.hold_lapsed(now) {
            booking.transition(LifecycleEvent::HoldLapsed, now)?;
            tx.update_booking_status(booking.id, booking.status, booking.expires_at, now)
                .await?;
            tx.release_seats(booking.id, now).await?;
            tx.commit().await?;

            warn!("Hold on booking {} lapsed before payment", booking.reference);
            self.publish_status(&booking);
            return Err(BookingError::InvalidState(format!(
                "hold on booking {} has expired",
                booking.reference
            )));
        }

        // 4. Record the payment and move the booking in the same commit
        let payment = Payment::new(
            booking.id,
            booking.total_amount,
            outcome,
            reference::transaction_id(),
            payment_method.to_string(),
            now,
        );
        tx.insert_payment(&payment).await?;

        let event = match outcome {
            PaymentOutcome::Success => LifecycleEvent::PaymentSucceeded,
            PaymentOutcome::Failure => LifecycleEvent::PaymentFailed,
        };
        booking.transition(event, now)?;
        tx.update_booking_status(booking.id, booking.status, booking.expires_at, now)
            .await?;
        if booking.status == BookingStatus::Expired {
            tx.release_seats(booking.id, now).await?;
        }
        tx.commit().await?;

        match outcome {
            PaymentOutcome::Success => info!(
                "Booking {} confirmed, transaction {}",
                booking.reference, payment.transaction_id
            ),
            PaymentOutcome::Failure => warn!(
                "Payment failed for booking {}, seats released",
                booking.reference
            ),
        }
        self.publish_status(&booking);

        Ok(payment)
    }

    pub(crate) fn publish_status(&self, booking: &Booking) {
        self.events.publish(BookingEvent::StatusChanged {
            booking_id: booking.id,
            showtime_id: booking.showtime_id,
            status: booking.status,
            at: booking.updated_at,
        });
    }
}
