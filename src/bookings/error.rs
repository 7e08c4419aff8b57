use uuid::Uuid;

use crate::bookings::models::BookingStatus;
use crate::db::StoreError;
use crate::gateway::GatewayError;
use crate::pricing::QuoteError;

/// Error types for booking lifecycle and settlement operations
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking {0} not found")]
    NotFound(Uuid),

    /// Illegal lifecycle move; never silently ignored
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    /// A time-driven transition was proposed before it is due
    #[error("Transition not yet due: {0}")]
    NotYetDue(String),

    /// Charge, transfer or refund failed; the row keeps its pre-transition state
    #[error("Payment gateway failure: {0}")]
    GatewayFailure(#[from] GatewayError),

    /// A second settlement was attempted for an already-settled payment
    #[error("Payment {payment_id} has already been settled")]
    DoubleSettlementAttempt { payment_id: Uuid },

    #[error("Booking invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Version checks kept failing; the caller may retry the request
    #[error("Booking {0} is being modified concurrently")]
    ConcurrentModification(Uuid),

    #[error("Host of property {0} has no payout account")]
    MissingPayoutAccount(Uuid),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateCommission { payment_id } => {
                BookingError::DoubleSettlementAttempt { payment_id }
            }
            StoreError::DateRangeUnavailable { property_id } => BookingError::InvalidDateRange(
                format!("dates are no longer available for property {}", property_id),
            ),
            StoreError::NotFound { entity: "Booking", id } => BookingError::NotFound(id),
            other => BookingError::Storage(other),
        }
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::Storage(StoreError::Database(err))
    }
}
