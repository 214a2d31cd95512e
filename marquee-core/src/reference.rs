use chrono::{DateTime, Utc};
use uuid::Uuid;

fn random_hex(len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    hex[..len].to_string()
}

/// Human-readable booking reference, e.g. `BK20261018A1B2C3`
pub fn booking_reference(now: DateTime<Utc>) -> String {
    format!("BK{}{}", now.format("%Y%m%d"), random_hex(6))
}

/// Simulated payment transaction id, e.g. `TXN0A1B2C3D4E5F`
pub fn transaction_id() -> String {
    format!("TXN{}", random_hex(12))
}

/// Simulated refund reference, e.g. `RF0A1B2C3D4E5F`
pub fn refund_reference() -> String {
    format!("RF{}", random_hex(12))
}
