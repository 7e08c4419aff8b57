// HTTP error mapping
// Every handler returns Result<T, ApiError>; domain errors convert into it

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::bookings::BookingError;
use crate::db::StoreError;
use crate::pricing::QuoteError;

/// Main error type for the API
///
/// Each variant maps to one HTTP status code and a stable `error_code`.
#[derive(Debug)]
pub enum ApiError {
    /// Request DTO validation failed (400)
    ValidationError(validator::ValidationErrors),

    /// Request is well-formed but describes something impossible (400)
    BadRequest { error_code: &'static str, message: String },

    /// 404
    NotFound { resource: String, id: String },

    /// Current state forbids the operation (409)
    Conflict { error_code: &'static str, message: String },

    /// The listing cannot accommodate the request (422)
    Unprocessable { error_code: &'static str, message: String },

    /// Charge, transfer or refund failed upstream (502)
    GatewayFailure(String),

    /// Storage failure; details are logged, not returned (500)
    DatabaseError(StoreError),

    /// 500
    InternalError(String),

    /// Missing or malformed caller identity (401)
    Unauthorized(String),

    /// 403
    Forbidden(String),
}

/// Consistent error response structure
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "INVALID_DATE_RANGE")
    pub error_code: String,

    pub message: String,

    /// Field-level validation errors; omitted when empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl ApiError {
    /// Convert to a status code and response body
    ///
    /// Expected client errors log at debug, state conflicts and access
    /// failures at warn, server-side failures at error.
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let body = match self {
            ApiError::ValidationError(errors) => {
                debug!("Validation error: {:?}", errors);
                let mut body = ErrorResponse::new("VALIDATION_ERROR", "Request validation failed");
                body.details = Some(serde_json::to_value(errors).unwrap_or(serde_json::json!({})));
                body
            }
            ApiError::BadRequest { error_code, message } => {
                debug!("Bad request ({}): {}", error_code, message);
                ErrorResponse::new(error_code, message.clone())
            }
            ApiError::NotFound { resource, id } => {
                debug!("Resource not found: {} with id {}", resource, id);
                ErrorResponse::new("NOT_FOUND", format!("{} with id {} not found", resource, id))
            }
            ApiError::Conflict { error_code, message } => {
                warn!("Conflict ({}): {}", error_code, message);
                ErrorResponse::new(error_code, message.clone())
            }
            ApiError::Unprocessable { error_code, message } => {
                debug!("Unprocessable ({}): {}", error_code, message);
                ErrorResponse::new(error_code, message.clone())
            }
            ApiError::GatewayFailure(message) => {
                warn!("Payment gateway failure: {}", message);
                ErrorResponse::new("GATEWAY_FAILURE", message.clone())
            }
            ApiError::DatabaseError(store_error) => {
                error!("Database error: {:?}", store_error);
                ErrorResponse::new("DATABASE_ERROR", "A database error occurred")
            }
            ApiError::InternalError(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                ErrorResponse::new("INTERNAL_ERROR", "An internal server error occurred")
            }
            ApiError::Unauthorized(message) => {
                warn!("Unauthorized access attempt: {}", message);
                ErrorResponse::new("UNAUTHORIZED", message.clone())
            }
            ApiError::Forbidden(message) => {
                warn!("Forbidden access attempt: {}", message);
                ErrorResponse::new("FORBIDDEN", message.clone())
            }
        };
        (status, body)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::GatewayFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<QuoteError> for ApiError {
    fn from(err: QuoteError) -> Self {
        let message = err.to_string();
        match err {
            QuoteError::InvalidDateRange(_) => ApiError::BadRequest {
                error_code: "INVALID_DATE_RANGE",
                message,
            },
            QuoteError::UnknownCategory(_) => ApiError::BadRequest {
                error_code: "UNKNOWN_CATEGORY",
                message,
            },
            QuoteError::PropertyNotFound(id) => ApiError::NotFound {
                resource: "Property".to_string(),
                id: id.to_string(),
            },
            QuoteError::NotBookable(_) => ApiError::Unprocessable {
                error_code: "NOT_BOOKABLE",
                message,
            },
            QuoteError::OccupancyExceeded(_) => ApiError::Unprocessable {
                error_code: "OCCUPANCY_EXCEEDED",
                message,
            },
            QuoteError::PetsNotAllowed => ApiError::Unprocessable {
                error_code: "PETS_NOT_ALLOWED",
                message,
            },
            QuoteError::InvariantViolation(_) => ApiError::InternalError(message),
            QuoteError::Storage(store_error) => ApiError::DatabaseError(store_error),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::NotFound(id) => ApiError::NotFound {
                resource: "Booking".to_string(),
                id: id.to_string(),
            },
            BookingError::InvalidTransition { .. } => ApiError::Conflict {
                error_code: "INVALID_TRANSITION",
                message,
            },
            BookingError::InvalidDateRange(_) => ApiError::Conflict {
                error_code: "DATES_UNAVAILABLE",
                message,
            },
            BookingError::NotYetDue(_) => ApiError::Conflict {
                error_code: "NOT_YET_DUE",
                message,
            },
            BookingError::DoubleSettlementAttempt { .. } => ApiError::Conflict {
                error_code: "DOUBLE_SETTLEMENT",
                message,
            },
            BookingError::ConcurrentModification(_) => ApiError::Conflict {
                error_code: "CONCURRENT_MODIFICATION",
                message,
            },
            BookingError::MissingPayoutAccount(_) => ApiError::Conflict {
                error_code: "MISSING_PAYOUT_ACCOUNT",
                message,
            },
            BookingError::GatewayFailure(_) => ApiError::GatewayFailure(message),
            BookingError::Forbidden(reason) => ApiError::Forbidden(reason),
            BookingError::InvariantViolation(_) => ApiError::InternalError(message),
            BookingError::Quote(quote_error) => quote_error.into(),
            BookingError::Storage(store_error) => ApiError::DatabaseError(store_error),
        }
    }
}
