use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

/// Type alias for the PostgreSQL connection pool
pub type DbPool = PgPool;

/// SQLSTATE raised by the booking date-range exclusion constraint
const EXCLUSION_VIOLATION: &str = "23P01";
/// SQLSTATE raised by unique constraints
const UNIQUE_VIOLATION: &str = "23505";

/// Errors surfaced by the persistence boundary
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The row changed since it was read; the caller must re-read and retry
    #[error("Booking {booking_id} was modified concurrently")]
    VersionConflict { booking_id: Uuid },

    /// Same as `VersionConflict`, for payment rows
    #[error("Payment {payment_id} was modified concurrently")]
    PaymentVersionConflict { payment_id: Uuid },

    /// A commission row already exists for this payment
    #[error("Commission already recorded for payment {payment_id}")]
    DuplicateCommission { payment_id: Uuid },

    /// Another active booking already holds part of the requested dates
    #[error("Dates are no longer available for property {property_id}")]
    DateRangeUnavailable { property_id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A stored row could not be decoded into a domain type
    #[error("Stored data is invalid: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True when the database rejected the write with the given SQLSTATE
    pub(crate) fn has_sqlstate(err: &sqlx::Error, code: &str) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(code),
            _ => false,
        }
    }

    pub(crate) fn is_exclusion_violation(err: &sqlx::Error) -> bool {
        Self::has_sqlstate(err, EXCLUSION_VIOLATION)
    }

    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        Self::has_sqlstate(err, UNIQUE_VIOLATION)
    }
}

/// Creates and configures a PostgreSQL connection pool
///
/// # Arguments
/// * `database_url` - PostgreSQL connection string
/// * `max_connections` - Upper bound on pooled connections
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    tracing::debug!("Creating database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    tracing::info!("Database connection pool created successfully");
    Ok(pool)
}
