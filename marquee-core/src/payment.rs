use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Result of a simulated payment attempt, supplied by the caller.
///
/// There is no gateway behind this: whoever invokes the payment handler
/// decides the outcome. `Success` is the default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    #[default]
    Success,
    Failure,
}

impl PaymentOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Success => PaymentStatus::Success,
            PaymentOutcome::Failure => PaymentStatus::Failed,
        }
    }
}

/// The single payment attached to a booking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub transaction_id: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        booking_id: Uuid,
        amount: Decimal,
        outcome: PaymentOutcome,
        transaction_id: String,
        payment_method: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            amount,
            status: outcome.status(),
            transaction_id,
            payment_method,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_refundable(&self) -> bool {
        self.status == PaymentStatus::Success
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Processed,
}

/// Simulated refund issued when a paid booking is cancelled. Never persisted;
/// the refunded payment row is the durable record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Refund {
    pub refund_reference: String,
    pub original_transaction_id: String,
    pub amount: Decimal,
    pub status: RefundStatus,
    pub processed_at: DateTime<Utc>,
    pub is_simulated: bool,
    pub message: String,
}

impl Refund {
    pub fn for_payment(payment: &Payment, refund_reference: String, now: DateTime<Utc>) -> Self {
        Self {
            message: format!(
                "Refund of {} for transaction {} processed (simulated).",
                payment.amount, payment.transaction_id
            ),
            refund_reference,
            original_transaction_id: payment.transaction_id.clone(),
            amount: payment.amount,
            status: RefundStatus::Processed,
            processed_at: now,
            is_simulated: true,
        }
    }
}
