use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub customer_id: String,
    pub amount: i64,
    pub refunded_amount: i64,
    /// Held by refunds whose gateway call is still outstanding.
    pub refund_reserved: i64,
    pub method: PaymentMethod,
    pub gateway: String,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub timing: PaymentTiming,
    pub invoice_number: Option<String>,
    pub paid_at: Option<NaiveDateTime>,
    pub failure_reason: Option<String>,
    pub gateway_response: Option<String>,
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Payment {
    /// What can still be refunded.
    pub fn refundable_balance(&self) -> i64 {
        self.amount - self.refunded_amount - self.refund_reserved
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "PARTIALLY_REFUNDED" => Some(PaymentStatus::PartiallyRefunded),
            _ => None,
        }
    }

    pub fn is_settling(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    pub fn is_refundable(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::PartiallyRefunded)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Upi,
    NetBanking,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::NetBanking => "NET_BANKING",
            PaymentMethod::Wallet => "WALLET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CARD" => Some(PaymentMethod::Card),
            "UPI" => Some(PaymentMethod::Upi),
            "NET_BANKING" => Some(PaymentMethod::NetBanking),
            "WALLET" => Some(PaymentMethod::Wallet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentTiming {
    #[default]
    Advance,
    PostService,
}

impl PaymentTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTiming::Advance => "ADVANCE",
            PaymentTiming::PostService => "POST_SERVICE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADVANCE" => Some(PaymentTiming::Advance),
            "POST_SERVICE" => Some(PaymentTiming::PostService),
            _ => None,
        }
    }
}
