// Payment gateway boundary
//
// The engine only needs charge, transfer and refund. Every call carries a stable
// idempotency key so retries after a timeout or crash never move money twice.

pub mod sandbox;

pub use sandbox::SandboxGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors reported by the payment gateway
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Charge declined: {0}")]
    Declined(String),

    /// Transient failure; the same request may be retried with the same key
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway refused the request as malformed or conflicting
    #[error("Request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub payment_intent_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub charge_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub destination_account: String,
    pub amount: Decimal,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub charge_id: String,
    pub amount: Decimal,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
}

/// Payment gateway capability consumed by the lifecycle and the splitter
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError>;

    /// Transfer funds to a host's connected payout account
    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, GatewayError>;

    async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, GatewayError>;
}

/// Stable idempotency keys, one per money movement
pub struct IdempotencyKey;

impl IdempotencyKey {
    pub fn charge(booking_id: Uuid) -> String {
        format!("charge:{}", booking_id)
    }

    pub fn transfer(payment_id: Uuid) -> String {
        format!("transfer:{}", payment_id)
    }

    pub fn refund(booking_id: Uuid) -> String {
        format!("refund:{}", booking_id)
    }

    pub fn deposit(payment_id: Uuid) -> String {
        format!("deposit:{}", payment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_keys_are_stable() {
        let id = Uuid::from_u128(0xabc);
        assert_eq!(IdempotencyKey::charge(id), IdempotencyKey::charge(id));
        assert_eq!(IdempotencyKey::transfer(id), format!("transfer:{}", id));
        assert_ne!(IdempotencyKey::transfer(id), IdempotencyKey::deposit(id));
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Unavailable("timeout".to_string());
        assert_eq!(err.to_string(), "Gateway unavailable: timeout");
    }
}
