use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::pricing;

/// Seat category, as stored by the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Regular,
    Premium,
    Recliner,
}

impl SeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Regular => "regular",
            SeatType::Premium => "premium",
            SeatType::Recliner => "recliner",
        }
    }
}

impl fmt::Display for SeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(SeatType::Regular),
            "premium" => Ok(SeatType::Premium),
            "recliner" => Ok(SeatType::Recliner),
            other => Err(format!("unknown seat type: {}", other)),
        }
    }
}

/// A screening of a movie on one screen. Owned by the catalog; the booking
/// engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Showtime {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub screen_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price_multiplier: Decimal,
}

impl Showtime {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }
}

/// A physical seat on a screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub screen_id: Uuid,
    pub row: String,
    pub number: i32,
    pub seat_type: SeatType,
    pub base_price: Decimal,
}

impl Seat {
    /// Price of this seat for the given showtime, rounded to cents.
    pub fn price_for(&self, showtime: &Showtime) -> Decimal {
        pricing::seat_price(self.base_price, showtime.price_multiplier)
    }

    pub fn label(&self) -> String {
        format!("{}{}", self.row, self.number)
    }
}
