use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::gateway::{
    ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway, RefundReceipt, RefundRequest,
    TransferReceipt, TransferRequest,
};

#[derive(Debug, Default)]
struct SandboxState {
    sequence: u64,
    charges: HashMap<String, (ChargeRequest, ChargeReceipt)>,
    transfers: HashMap<String, (TransferRequest, TransferReceipt)>,
    refunds: HashMap<String, (RefundRequest, RefundReceipt)>,
    /// Refunded total per charge id
    refunded: HashMap<String, Decimal>,
    fail_charges: u32,
    fail_transfers: u32,
    fail_refunds: u32,
}

impl SandboxState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}_sandbox_{:06}", prefix, self.sequence)
    }

    fn take_failure(counter: &mut u32) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

/// In-process gateway that records every money movement
///
/// Replays with a known idempotency key return the original receipt without
/// moving money again. Failures can be injected per operation.
#[derive(Debug, Default)]
pub struct SandboxGateway {
    state: Mutex<SandboxState>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` charge calls fail
    pub async fn fail_next_charges(&self, count: u32) {
        self.state.lock().await.fail_charges = count;
    }

    pub async fn fail_next_transfers(&self, count: u32) {
        self.state.lock().await.fail_transfers = count;
    }

    pub async fn fail_next_refunds(&self, count: u32) {
        self.state.lock().await.fail_refunds = count;
    }

    /// Executed charges, one per idempotency key
    pub async fn charges(&self) -> Vec<ChargeRequest> {
        let state = self.state.lock().await;
        state.charges.values().map(|(request, _)| request.clone()).collect()
    }

    pub async fn transfers(&self) -> Vec<TransferRequest> {
        let state = self.state.lock().await;
        state.transfers.values().map(|(request, _)| request.clone()).collect()
    }

    pub async fn refunds(&self) -> Vec<RefundRequest> {
        let state = self.state.lock().await;
        state.refunds.values().map(|(request, _)| request.clone()).collect()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;

        if SandboxState::take_failure(&mut state.fail_charges) {
            tracing::warn!(key = %request.idempotency_key, "Sandbox charge failure injected");
            return Err(GatewayError::Declined("sandbox declined the charge".to_string()));
        }
        if request.amount <= Decimal::ZERO {
            return Err(GatewayError::Rejected(format!(
                "charge amount must be positive, got {}",
                request.amount
            )));
        }

        if let Some((previous, receipt)) = state.charges.get(&request.idempotency_key) {
            if previous.amount != request.amount || previous.currency != request.currency {
                return Err(GatewayError::Rejected(
                    "idempotency key reused with different parameters".to_string(),
                ));
            }
            return Ok(receipt.clone());
        }

        let receipt = ChargeReceipt {
            charge_id: state.next_id("ch"),
        };
        tracing::debug!(charge_id = %receipt.charge_id, amount = %request.amount, "Sandbox charge executed");
        state
            .charges
            .insert(request.idempotency_key.clone(), (request, receipt.clone()));
        Ok(receipt)
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, GatewayError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;

        if SandboxState::take_failure(&mut state.fail_transfers) {
            tracing::warn!(key = %request.idempotency_key, "Sandbox transfer failure injected");
            return Err(GatewayError::Unavailable("sandbox transfer timed out".to_string()));
        }
        if request.amount < Decimal::ZERO {
            return Err(GatewayError::Rejected(format!(
                "transfer amount must not be negative, got {}",
                request.amount
            )));
        }

        if let Some((previous, receipt)) = state.transfers.get(&request.idempotency_key) {
            if previous.amount != request.amount
                || previous.destination_account != request.destination_account
            {
                return Err(GatewayError::Rejected(
                    "idempotency key reused with different parameters".to_string(),
                ));
            }
            return Ok(receipt.clone());
        }

        let receipt = TransferReceipt {
            transfer_id: state.next_id("tr"),
        };
        tracing::debug!(transfer_id = %receipt.transfer_id, amount = %request.amount, "Sandbox transfer executed");
        state
            .transfers
            .insert(request.idempotency_key.clone(), (request, receipt.clone()));
        Ok(receipt)
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, GatewayError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;

        if SandboxState::take_failure(&mut state.fail_refunds) {
            tracing::warn!(key = %request.idempotency_key, "Sandbox refund failure injected");
            return Err(GatewayError::Unavailable("sandbox refund timed out".to_string()));
        }

        if let Some((previous, receipt)) = state.refunds.get(&request.idempotency_key) {
            if previous.amount != request.amount || previous.charge_id != request.charge_id {
                return Err(GatewayError::Rejected(
                    "idempotency key reused with different parameters".to_string(),
                ));
            }
            return Ok(receipt.clone());
        }

        let charged = state
            .charges
            .values()
            .find(|(_, receipt)| receipt.charge_id == request.charge_id)
            .map(|(charge, _)| charge.amount)
            .ok_or_else(|| GatewayError::Rejected(format!("unknown charge {}", request.charge_id)))?;
        let already = state
            .refunded
            .get(&request.charge_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if request.amount <= Decimal::ZERO || already + request.amount > charged {
            return Err(GatewayError::Rejected(format!(
                "refund of {} exceeds the refundable balance of {}",
                request.amount,
                charged - already
            )));
        }

        let receipt = RefundReceipt {
            refund_id: state.next_id("re"),
        };
        state
            .refunded
            .insert(request.charge_id.clone(), already + request.amount);
        tracing::debug!(refund_id = %receipt.refund_id, amount = %request.amount, "Sandbox refund executed");
        state
            .refunds
            .insert(request.idempotency_key.clone(), (request, receipt.clone()));
        Ok(receipt)
    }
}
