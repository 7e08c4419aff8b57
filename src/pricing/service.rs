use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::pricing::{
    availability::AvailabilityIndex,
    cache::PricingSnapshotCache,
    error::QuoteError,
    models::{ListingSnapshot, PriceBreakdown, StayRequest},
    quote_builder::QuoteBuilder,
    repository::PricingRepository,
};

/// Public quoting entry point
///
/// Loads the inputs once per quote and hands them to the pure builder.
#[derive(Clone)]
pub struct QuoteService {
    repository: Arc<dyn PricingRepository>,
    cache: Arc<PricingSnapshotCache>,
    clock: Arc<dyn Clock>,
    builder: QuoteBuilder,
}

impl QuoteService {
    /// Create a new QuoteService
    pub fn new(
        repository: Arc<dyn PricingRepository>,
        cache: Arc<PricingSnapshotCache>,
        clock: Arc<dyn Clock>,
        builder: QuoteBuilder,
    ) -> Self {
        Self {
            repository,
            cache,
            clock,
            builder,
        }
    }

    /// Price a stay as of the injected clock's "now"
    pub async fn quote(&self, request: &StayRequest) -> Result<PriceBreakdown, QuoteError> {
        let snapshot = self.listing_snapshot(request.property_id).await?;
        let fee_table = self.repository.platform_fee_table().await?;
        let booked = self.repository.booked_ranges(request.property_id).await?;
        let availability = AvailabilityIndex::new(request.property_id, booked);

        let breakdown = self.builder.build(
            &snapshot,
            &availability,
            request,
            &fee_table,
            self.clock.now(),
        )?;

        tracing::debug!(
            property_id = %request.property_id,
            nights = breakdown.nights,
            total = %breakdown.total,
            "Quote built"
        );
        Ok(breakdown)
    }

    /// Cached listing snapshot, loaded on miss
    pub async fn listing_snapshot(&self, property_id: Uuid) -> Result<ListingSnapshot, QuoteError> {
        if let Some(snapshot) = self.cache.get(property_id).await {
            return Ok(snapshot);
        }

        let snapshot = self
            .repository
            .load_listing_snapshot(property_id)
            .await?
            .ok_or(QuoteError::PropertyNotFound(property_id))?;
        self.cache.insert(property_id, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Forget the cached snapshot after rates or rules change
    pub async fn invalidate(&self, property_id: Uuid) -> bool {
        self.cache.invalidate(property_id).await
    }
}
