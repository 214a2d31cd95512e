use marquee_core::{BookingEvent, BookingResult};
use tracing::{debug, info};

use crate::engine::BookingEngine;

impl BookingEngine {
    /// Expire every pending hold whose deadline has passed and free its seats.
    ///
    /// Safe to run repeatedly and alongside itself or booking creation: a
    /// second pass finds nothing left to expire and returns 0.
    pub async fn sweep_expired(&self) -> BookingResult<u64> {
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let count = tx.expire_lapsed_holds(now).await?;
        tx.commit().await?;

        if count == 0 {
            debug!("Sweep found no lapsed holds");
            return Ok(0);
        }

        info!("Swept {} lapsed hold(s)", count);
        self.events.publish(BookingEvent::HoldsSwept { count, at: now });
        Ok(count)
    }
}
