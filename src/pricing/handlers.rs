// HTTP handlers for quoting and pricing administration

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::require_admin;
use crate::bookings::models::Actor;
use crate::error::{ApiError, ErrorResponse};
use crate::pricing::models::{PriceBreakdown, StayRequest};

/// Request DTO for pricing a stay
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct QuoteRequest {
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[validate(range(min = 1, max = 64, message = "Guests must be between 1 and 64"))]
    pub guests: u32,
    #[serde(default)]
    #[validate(range(max = 16, message = "At most 16 pets"))]
    pub pets: u32,
}

impl QuoteRequest {
    pub fn stay_request(&self) -> StayRequest {
        StayRequest {
            property_id: self.property_id,
            check_in: self.check_in,
            check_out: self.check_out,
            guests: self.guests,
            pets: self.pets,
        }
    }
}

/// Response DTO for a cache invalidation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvalidateResponse {
    pub property_id: Uuid,
    /// Whether a cached snapshot was dropped
    pub invalidated: bool,
}

/// Handler for POST /api/quotes
#[utoipa::path(
    post,
    path = "/api/quotes",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Itemised price of the stay", body = PriceBreakdown),
        (status = 400, description = "Invalid dates or request", body = ErrorResponse),
        (status = 404, description = "Property not found", body = ErrorResponse),
        (status = 422, description = "Listing cannot host this stay", body = ErrorResponse)
    ),
    tag = "pricing"
)]
pub async fn quote_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<PriceBreakdown>, ApiError> {
    request.validate()?;
    tracing::debug!(property_id = %request.property_id, "Quote requested");

    let breakdown = state.quotes.quote(&request.stay_request()).await?;
    Ok(Json(breakdown))
}

/// Handler for POST /api/admin/pricing/{property_id}/invalidate
/// Drops the cached pricing snapshot after rates or rules change
#[utoipa::path(
    post,
    path = "/api/admin/pricing/{property_id}/invalidate",
    params(
        ("property_id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Snapshot cache invalidated", body = InvalidateResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    tag = "pricing"
)]
pub async fn invalidate_pricing_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(property_id): Path<Uuid>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    require_admin(&actor)?;

    let invalidated = state.quotes.invalidate(property_id).await;
    Ok(Json(InvalidateResponse {
        property_id,
        invalidated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(guests: u32, pets: u32) -> QuoteRequest {
        QuoteRequest {
            property_id: Uuid::nil(),
            check_in: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 8, 4).unwrap(),
            guests,
            pets,
        }
    }

    #[test]
    fn test_quote_request_validation() {
        assert!(request(2, 0).validate().is_ok());
        assert!(request(0, 0).validate().is_err());
        assert!(request(65, 0).validate().is_err());
        assert!(request(2, 17).validate().is_err());
    }

    #[test]
    fn test_pets_default_to_zero() {
        let json = r#"{"property_id":"00000000-0000-0000-0000-000000000000","check_in":"2025-08-01","check_out":"2025-08-04","guests":2}"#;
        let parsed: QuoteRequest = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.pets, 0);
        assert_eq!(parsed.stay_request().guests, 2);
    }
}
