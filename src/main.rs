use std::sync::Arc;

use stay_ledger::{
    bookings::{spawn_lifecycle_sweeper, BookingStore, PgBookingStore},
    clock::SystemClock,
    config::AppConfig,
    create_router, db,
    gateway::SandboxGateway,
    memory::MemoryStore,
    pricing::{PgPricingRepository, PricingRepository},
    AppState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Stay Ledger - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    let (pricing_repository, booking_store): (Arc<dyn PricingRepository>, Arc<dyn BookingStore>) =
        match config.database_url.as_deref() {
            Some(database_url) => {
                tracing::info!("Connecting to database...");
                let db_pool = db::create_pool(database_url, config.max_connections)
                    .await
                    .expect("Failed to create database pool");

                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations")
                    .run(&db_pool)
                    .await
                    .expect("Failed to run database migrations");
                tracing::info!("Migrations completed successfully");

                let pricing: Arc<dyn PricingRepository> = Arc::new(PgPricingRepository::new(db_pool.clone()));
                let bookings: Arc<dyn BookingStore> = Arc::new(PgBookingStore::new(db_pool));
                (pricing, bookings)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
                let store = Arc::new(MemoryStore::new());
                let pricing: Arc<dyn PricingRepository> = store.clone();
                let bookings: Arc<dyn BookingStore> = store;
                (pricing, bookings)
            }
        };

    // Real gateway integrations live outside this service
    tracing::warn!("Using the sandbox payment gateway; no money moves");
    let gateway = Arc::new(SandboxGateway::new());

    let state = AppState::new(
        pricing_repository,
        booking_store,
        gateway,
        Arc::new(SystemClock),
        config.rate_resolver(),
        config.lifecycle_settings(),
    );

    let sweeper = spawn_lifecycle_sweeper(state.bookings.clone(), config.sweep_interval);

    let app = create_router(state);

    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Stay Ledger is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");

    sweeper.abort();
}
