use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use super::{ChargeReceipt, GatewayOutcome, PaymentGateway, RefundReceipt};
use crate::models::PaymentMethod;

/// Stand-in gateway for development: charges succeed with a configured
/// probability and refunds always succeed.
pub struct SimulatedGateway {
    success_rate: f64,
}

impl SimulatedGateway {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn initiate(
        &self,
        amount: i64,
        method: PaymentMethod,
        customer_ref: &str,
    ) -> anyhow::Result<ChargeReceipt> {
        anyhow::ensure!(amount > 0, "charge amount must be positive");

        let approved = rand::thread_rng().gen_bool(self.success_rate);
        let transaction_id = format!("sim_txn_{}", Uuid::new_v4().simple());

        tracing::debug!(
            customer = customer_ref,
            method = method.as_str(),
            amount,
            approved,
            "simulated charge"
        );

        Ok(ChargeReceipt {
            transaction_id,
            outcome: if approved {
                GatewayOutcome::Success
            } else {
                GatewayOutcome::Failed
            },
            message: (!approved).then(|| "card declined by simulated issuer".to_string()),
        })
    }

    async fn refund(&self, transaction_id: &str, amount: i64) -> anyhow::Result<RefundReceipt> {
        anyhow::ensure!(amount > 0, "refund amount must be positive");
        tracing::debug!(transaction_id, amount, "simulated refund");

        Ok(RefundReceipt {
            refund_id: format!("sim_rfnd_{}", Uuid::new_v4().simple()),
            outcome: GatewayOutcome::Success,
            message: None,
        })
    }
}
