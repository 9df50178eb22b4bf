pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::PaymentMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayOutcome {
    Success,
    Failed,
    Pending,
}

impl GatewayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOutcome::Success => "SUCCESS",
            GatewayOutcome::Failed => "FAILED",
            GatewayOutcome::Pending => "PENDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(GatewayOutcome::Success),
            "FAILED" => Some(GatewayOutcome::Failed),
            "PENDING" => Some(GatewayOutcome::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub outcome: GatewayOutcome,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub outcome: GatewayOutcome,
    pub message: Option<String>,
}

/// Moves money. Callers only record what it reports and never retry.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn initiate(
        &self,
        amount: i64,
        method: PaymentMethod,
        customer_ref: &str,
    ) -> anyhow::Result<ChargeReceipt>;

    async fn refund(&self, transaction_id: &str, amount: i64) -> anyhow::Result<RefundReceipt>;
}
