use marquee_booking::BookingEngine;
use marquee_core::BookingEvent;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Run `sweep_expired` every `every` until `shutdown` flips to true or its
/// sender goes away.
///
/// A failed pass is logged and retried on the next tick; the sweep is
/// idempotent so nothing is lost.
pub async fn run_sweeper(engine: BookingEngine, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Expiry sweeper started, interval {:?}", every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.sweep_expired().await {
                    Ok(0) => {}
                    Ok(count) => info!("Sweeper expired {} hold(s)", count),
                    Err(e) => error!("Sweep failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Expiry sweeper stopped");
}

/// Log every booking event as JSON. Stands in for a push channel to clients.
pub async fn log_events(mut rx: broadcast::Receiver<BookingEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!("booking event {}", json),
                Err(e) => warn!("Unserializable booking event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event log lagged, skipped {} event(s)", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use marquee_core::{BookingRules, Clock, ManualClock, Seat, SeatType, Showtime};
    use marquee_store::MemoryStore;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweeper_expires_lapsed_holds_then_stops() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let screen_id = Uuid::new_v4();
        let start = clock.now() + ChronoDuration::days(1);
        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id: Uuid::new_v4(),
            screen_id,
            start_time: start,
            end_time: start + ChronoDuration::hours(2),
            price_multiplier: Decimal::ONE,
        };
        let seat = Seat {
            id: Uuid::new_v4(),
            screen_id,
            row: "C".to_string(),
            number: 7,
            seat_type: SeatType::Recliner,
            base_price: Decimal::new(2200, 2),
        };
        store.insert_showtime(showtime.clone()).await;
        store.insert_seat(seat.clone()).await;

        let engine = BookingEngine::with_clock(Arc::new(store), clock.clone(), BookingRules::default());
        engine
            .create_booking(Uuid::new_v4(), showtime.id, &[seat.id])
            .await
            .unwrap();
        clock.advance(ChronoDuration::minutes(15));

        let mut events = engine.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweeper(engine.clone(), Duration::from_millis(10), stop_rx));

        let swept = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(BookingEvent::HoldsSwept { count, .. }) = events.recv().await {
                    return count;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(swept, 1);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let availability = engine.get_availability(showtime.id).await.unwrap();
        assert_eq!(availability.available_seats, 1);
    }
}
