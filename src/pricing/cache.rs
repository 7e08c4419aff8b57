// Listing snapshot cache
//
// Keeps recently loaded listing snapshots for a short TTL. Rate or rule changes
// must call `invalidate` for the property.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pricing::models::ListingSnapshot;

/// Time-to-live for cached snapshots (60 seconds)
pub const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: ListingSnapshot,
    loaded_at: Instant,
}

impl CachedSnapshot {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() > ttl
    }
}

/// TTL cache of listing snapshots keyed by property id
#[derive(Debug)]
pub struct PricingSnapshotCache {
    entries: RwLock<HashMap<Uuid, CachedSnapshot>>,
    ttl: Duration,
}

impl Default for PricingSnapshotCache {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}

impl PricingSnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh snapshot for a property, if cached
    pub async fn get(&self, property_id: Uuid) -> Option<ListingSnapshot> {
        let entries = self.entries.read().await;
        match entries.get(&property_id) {
            Some(entry) if !entry.is_stale(self.ttl) => {
                tracing::debug!(%property_id, "Listing snapshot cache hit");
                Some(entry.snapshot.clone())
            }
            _ => None,
        }
    }

    pub async fn insert(&self, property_id: Uuid, snapshot: ListingSnapshot) {
        let mut entries = self.entries.write().await;
        entries.insert(
            property_id,
            CachedSnapshot {
                snapshot,
                loaded_at: Instant::now(),
            },
        );
    }

    /// Drop the cached snapshot so the next quote reloads it
    pub async fn invalidate(&self, property_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(&property_id).is_some();
        tracing::info!(%property_id, removed, "Listing snapshot cache invalidated");
        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::models::{CancellationPolicy, ListingFees, ListingPricing};
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;

    fn snapshot(property_id: Uuid) -> ListingSnapshot {
        ListingSnapshot {
            listing: ListingPricing {
                property_id,
                host_user_id: Uuid::nil(),
                host_payout_account: None,
                base_price: dec!(100),
                currency: "USD".to_string(),
                min_nights: 1,
                max_nights: None,
                max_guests: None,
                check_in_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                check_out_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                cancellation_policy: CancellationPolicy::Flexible,
                commission_rate: dec!(10),
                fees: ListingFees::Sale,
            },
            seasonal_rates: vec![],
            pricing_rules: vec![],
        }
    }

    #[tokio::test]
    async fn test_cache_hit_and_invalidate() {
        let cache = PricingSnapshotCache::default();
        let id = Uuid::from_u128(1);
        assert!(cache.get(id).await.is_none());

        cache.insert(id, snapshot(id)).await;
        assert_eq!(cache.get(id).await, Some(snapshot(id)));

        assert!(cache.invalidate(id).await);
        assert!(cache.get(id).await.is_none());
        assert!(!cache.invalidate(id).await);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_always_stale() {
        let cache = PricingSnapshotCache::new(Duration::ZERO);
        let id = Uuid::from_u128(2);
        cache.insert(id, snapshot(id)).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(cache.get(id).await.is_none());
    }
}
