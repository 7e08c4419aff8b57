//! Stay Ledger
//!
//! Pricing and escrow settlement engine for a property marketplace: quotes
//! stays, runs the booking lifecycle, holds guest funds in escrow and splits
//! them between host and platform once the stay is over.

pub mod auth;
pub mod bookings;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod pricing;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::bookings::{BookingService, BookingStore, LifecycleSettings};
use crate::clock::Clock;
use crate::gateway::PaymentGateway;
use crate::pricing::{PricingRepository, PricingSnapshotCache, QuoteBuilder, QuoteService, RateResolver};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        pricing::handlers::quote_handler,
        pricing::handlers::invalidate_pricing_handler,
        bookings::handlers::create_booking_handler,
        bookings::handlers::get_booking_handler,
        bookings::handlers::retry_payment_handler,
        bookings::handlers::keys_received_handler,
        bookings::handlers::confirm_completion_handler,
        bookings::handlers::cancel_booking_handler,
        bookings::handlers::open_dispute_handler,
        bookings::handlers::admin_complete_handler,
        bookings::handlers::run_sweep_handler,
        bookings::handlers::reconcile_handler,
    ),
    components(
        schemas(
            pricing::QuoteRequest,
            pricing::InvalidateResponse,
            pricing::PriceBreakdown,
            pricing::NightlyRate,
            pricing::AppliedDiscount,
            pricing::DiscountType,
            pricing::ListingCategory,
            pricing::CancellationPolicy,
            bookings::CreateBookingRequest,
            bookings::CancelBookingRequest,
            bookings::OpenDisputeRequest,
            bookings::CancellationResponse,
            bookings::BookingDetails,
            bookings::Booking,
            bookings::Payment,
            bookings::BookingStatus,
            bookings::PaymentStatus,
            bookings::PaymentType,
            bookings::EscrowStatus,
            bookings::ActorRole,
            bookings::SweepReport,
            bookings::ReconcileReport,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "pricing", description = "Stay quotes"),
        (name = "bookings", description = "Booking lifecycle and escrow"),
        (name = "admin", description = "Operator endpoints")
    ),
    info(
        title = "Stay Ledger API",
        version = "0.1.0",
        description = "Booking pricing and escrow settlement for a property marketplace"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub quotes: QuoteService,
    pub bookings: BookingService,
}

impl AppState {
    /// Wire the quoting and lifecycle services over one set of collaborators
    pub fn new(
        pricing_repository: Arc<dyn PricingRepository>,
        booking_store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        rate_resolver: RateResolver,
        settings: LifecycleSettings,
    ) -> Self {
        let quotes = QuoteService::new(
            pricing_repository,
            Arc::new(PricingSnapshotCache::default()),
            clock.clone(),
            QuoteBuilder::new(rate_resolver),
        );
        let bookings = BookingService::new(booking_store, gateway, clock, quotes.clone(), settings);
        Self { quotes, bookings }
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and request tracing
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/quotes", post(pricing::quote_handler))
        .route("/api/bookings", post(bookings::create_booking_handler))
        .route("/api/bookings/:id", get(bookings::get_booking_handler))
        .route("/api/bookings/:id/pay", post(bookings::retry_payment_handler))
        .route("/api/bookings/:id/keys", post(bookings::keys_received_handler))
        .route("/api/bookings/:id/complete", post(bookings::confirm_completion_handler))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking_handler))
        .route("/api/bookings/:id/dispute", post(bookings::open_dispute_handler))
        .route(
            "/api/admin/pricing/:property_id/invalidate",
            post(pricing::invalidate_pricing_handler),
        )
        .route("/api/admin/bookings/:id/complete", post(bookings::admin_complete_handler))
        .route("/api/admin/lifecycle/sweep", post(bookings::run_sweep_handler))
        .route("/api/admin/lifecycle/reconcile", post(bookings::reconcile_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
