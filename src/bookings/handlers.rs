// HTTP handlers for booking lifecycle endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::require_admin;
use crate::bookings::models::{Actor, Booking, Payment};
use crate::bookings::service::{ReconcileReport, SweepReport};
use crate::error::{ApiError, ErrorResponse};
use crate::pricing::models::StayRequest;

/// Request DTO for booking a quoted stay
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBookingRequest {
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[validate(range(min = 1, max = 64, message = "Guests must be between 1 and 64"))]
    pub guests: u32,
    #[serde(default)]
    #[validate(range(max = 16, message = "At most 16 pets"))]
    pub pets: u32,
    /// Gateway payment intent authorised by the guest
    #[validate(length(min = 1, max = 255, message = "Payment intent id is required"))]
    pub payment_intent_id: String,
    /// Total the guest saw; the booking is refused if the price moved since
    pub expected_total: Option<Decimal>,
}

impl CreateBookingRequest {
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

/// Request DTO for cancelling a booking
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CancelBookingRequest {
    #[validate(length(min = 1, max = 500, message = "Reason must be 1-500 characters"))]
    pub reason: String,
}

/// Request DTO for opening a dispute
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OpenDisputeRequest {
    #[validate(length(min = 1, max = 2000, message = "Reason must be 1-2000 characters"))]
    pub reason: String,
}

/// Response DTO for a cancellation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancellationResponse {
    pub booking_id: Uuid,
    /// Refund on the booking total; the deposit is returned on top
    pub refund_amount: Decimal,
}

/// Response DTO for a booking with its payment
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookingDetails {
    pub booking: Booking,
    pub payment: Option<Payment>,
}

/// Handler for POST /api/bookings
/// Quotes the stay server-side, creates the booking and charges the guest
#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created and paid", body = Booking),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Dates taken or price changed", body = ErrorResponse),
        (status = 502, description = "Charge failed; booking stays pending", body = ErrorResponse)
    ),
    tag = "bookings"
)]
pub async fn create_booking_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    request.validate()?;

    let quote = state.quotes.quote(&request.stay_request()).await?;
    if let Some(expected) = request.expected_total {
        if expected != quote.total {
            return Err(ApiError::Conflict {
                error_code: "QUOTE_CHANGED",
                message: format!("price changed from {} to {}", expected, quote.total),
            });
        }
    }

    let booking = state
        .bookings
        .create_booking(&actor, &quote, &request.payment_intent_id)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

/// Handler for GET /api/bookings/{id}
#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking with its payment", body = BookingDetails),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Booking not found", body = ErrorResponse)
    ),
    tag = "bookings"
)]
pub async fn get_booking_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingDetails>, ApiError> {
    let booking = state.bookings.get_booking(booking_id, &actor).await?;
    let payment = state.bookings.payment_for(&booking).await?;
    Ok(Json(BookingDetails { booking, payment }))
}

/// Handler for POST /api/bookings/{id}/pay
/// Retries the charge of a booking still awaiting payment
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/pay",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking confirmed", body = Booking),
        (status = 409, description = "Booking is not awaiting payment", body = ErrorResponse),
        (status = 502, description = "Charge failed", body = ErrorResponse)
    ),
    tag = "bookings"
)]
pub async fn retry_payment_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state.bookings.retry_payment(booking_id, &actor).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/{id}/keys
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/keys",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Stay started", body = Booking),
        (status = 409, description = "Invalid status transition", body = ErrorResponse)
    ),
    tag = "bookings"
)]
pub async fn keys_received_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state.bookings.mark_keys_received(booking_id, &actor).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/{id}/complete
/// Guest confirms the stay is over, which settles the host payout
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/complete",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking completed", body = Booking),
        (status = 409, description = "Invalid status transition", body = ErrorResponse)
    ),
    tag = "bookings"
)]
pub async fn confirm_completion_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state.bookings.confirm_completion(booking_id, &actor).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/bookings/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/cancel",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = CancellationResponse),
        (status = 409, description = "Invalid status transition", body = ErrorResponse)
    ),
    tag = "bookings"
)]
pub async fn cancel_booking_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<CancellationResponse>, ApiError> {
    request.validate()?;

    let refund_amount = state
        .bookings
        .cancel_booking(booking_id, &actor, &request.reason)
        .await?;

    Ok(Json(CancellationResponse {
        booking_id,
        refund_amount,
    }))
}

/// Handler for POST /api/bookings/{id}/dispute
#[utoipa::path(
    post,
    path = "/api/bookings/{id}/dispute",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = OpenDisputeRequest,
    responses(
        (status = 200, description = "Dispute opened, escrow frozen", body = Booking),
        (status = 409, description = "Invalid status transition", body = ErrorResponse)
    ),
    tag = "bookings"
)]
pub async fn open_dispute_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<OpenDisputeRequest>,
) -> Result<Json<Booking>, ApiError> {
    request.validate()?;

    let booking = state
        .bookings
        .open_dispute(booking_id, &actor, &request.reason)
        .await?;
    Ok(Json(booking))
}

/// Handler for POST /api/admin/bookings/{id}/complete
#[utoipa::path(
    post,
    path = "/api/admin/bookings/{id}/complete",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking completed by admin", body = Booking),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Invalid status transition", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn admin_complete_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    require_admin(&actor)?;
    let booking = state.bookings.admin_complete(booking_id, &actor).await?;
    Ok(Json(booking))
}

/// Handler for POST /api/admin/lifecycle/sweep
/// Runs the scheduled transitions now instead of waiting for the next tick
#[utoipa::path(
    post,
    path = "/api/admin/lifecycle/sweep",
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn run_sweep_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
) -> Result<Json<SweepReport>, ApiError> {
    require_admin(&actor)?;
    let report = state.bookings.run_scheduled_transitions().await?;
    Ok(Json(report))
}

/// Handler for POST /api/admin/lifecycle/reconcile
#[utoipa::path(
    post,
    path = "/api/admin/lifecycle/reconcile",
    responses(
        (status = 200, description = "Reconciliation report", body = ReconcileReport),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn reconcile_handler(
    State(state): State<crate::AppState>,
    actor: Actor,
) -> Result<Json<ReconcileReport>, ApiError> {
    require_admin(&actor)?;
    let report = state.bookings.reconcile().await?;
    Ok(Json(report))
}
