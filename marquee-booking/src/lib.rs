pub mod availability;
pub mod cancellation;
pub mod engine;
pub mod payment;
pub mod queries;
pub mod reservation;
pub mod sweeper;

pub use availability::{SeatAvailability, ShowtimeSeats};
pub use cancellation::CancellationOutcome;
pub use engine::BookingEngine;
pub use marquee_core::{BookingError, BookingResult};
