use uuid::Uuid;

use crate::db::StoreError;

/// Errors that stop a quote from being produced
///
/// A quote either comes back complete or not at all; none of these variants
/// carry a partial breakdown.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Property {0} not found")]
    PropertyNotFound(Uuid),

    /// Sale listings have no stays to price
    #[error("Listing category '{0}' cannot be booked")]
    NotBookable(String),

    #[error("Unknown listing category: {0}")]
    UnknownCategory(String),

    #[error("Occupancy not allowed: {0}")]
    OccupancyExceeded(String),

    #[error("Pets are not allowed at this property")]
    PetsNotAllowed,

    /// A monetary total came out negative or failed to reconcile
    #[error("Pricing invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuoteError::InvalidDateRange("check-out must be after check-in".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid date range: check-out must be after check-in"
        );

        let err = QuoteError::NotBookable("sale".to_string());
        assert_eq!(err.to_string(), "Listing category 'sale' cannot be booked");
    }

    #[test]
    fn test_store_error_is_transparent() {
        let id = Uuid::nil();
        let err: QuoteError = StoreError::NotFound { entity: "Listing", id }.into();
        assert_eq!(err.to_string(), format!("Listing {} not found", id));
    }
}
