use chrono::Duration;
use serde::Deserialize;

/// Tunables for the booking engine. Loaded from the `booking` config section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BookingRules {
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: i64,
    #[serde(default = "default_max_seats")]
    pub max_seats_per_booking: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_hold_minutes() -> i64 { 10 }
fn default_max_seats() -> usize { 10 }
fn default_page_size() -> u32 { 20 }
fn default_max_page_size() -> u32 { 100 }

/// Holds longer than a day are a misconfiguration
pub const MAX_HOLD_MINUTES: i64 = 24 * 60;

impl BookingRules {
    pub fn hold_duration(&self) -> Duration {
        Duration::minutes(self.hold_minutes)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_HOLD_MINUTES).contains(&self.hold_minutes) {
            return Err(format!(
                "booking.hold_minutes must be between 1 and {}, got {}",
                MAX_HOLD_MINUTES, self.hold_minutes
            ));
        }
        if self.max_seats_per_booking == 0 {
            return Err("booking.max_seats_per_booking must be at least 1".to_string());
        }
        if self.max_page_size == 0 {
            return Err("booking.max_page_size must be at least 1".to_string());
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(format!(
                "booking.default_page_size must be between 1 and {}, got {}",
                self.max_page_size, self.default_page_size
            ));
        }
        Ok(())
    }
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            hold_minutes: default_hold_minutes(),
            max_seats_per_booking: default_max_seats(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}
