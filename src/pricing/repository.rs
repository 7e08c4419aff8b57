use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::bookings::models::BookingStatus;
use crate::db::StoreError;
use crate::pricing::models::{
    CancellationPolicy, DateRange, DiscountType, ListingCategory, ListingFees, ListingPricing,
    ListingSnapshot, PlatformFeeTable, PricingRule, RuleConditions, SeasonalRate,
};

/// Read side of the persistence boundary used for quoting
#[async_trait]
pub trait PricingRepository: Send + Sync {
    /// Listing pricing context with its seasonal rates and active pricing rules,
    /// read as one consistent snapshot. `None` when the property does not exist.
    async fn load_listing_snapshot(&self, property_id: Uuid) -> Result<Option<ListingSnapshot>, StoreError>;

    /// Guest-facing platform service fee per category
    async fn platform_fee_table(&self) -> Result<PlatformFeeTable, StoreError>;

    /// Date ranges held by active bookings of the property
    async fn booked_ranges(&self, property_id: Uuid) -> Result<Vec<DateRange>, StoreError>;
}

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    property_id: Uuid,
    host_user_id: Uuid,
    host_payout_account: Option<String>,
    category: ListingCategory,
    base_price: Decimal,
    currency: String,
    min_nights: i32,
    max_nights: Option<i32>,
    max_guests: Option<i32>,
    check_in_time: NaiveTime,
    check_out_time: NaiveTime,
    cancellation_policy: CancellationPolicy,
    commission_rate: Decimal,
    fees: Json<ListingFees>,
}

impl TryFrom<ListingRow> for ListingPricing {
    type Error = StoreError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let Json(fees) = row.fees;
        if fees.category() != row.category {
            return Err(StoreError::Corrupt(format!(
                "listing {} is '{}' but its fees are shaped for '{}'",
                row.property_id,
                row.category,
                fees.category()
            )));
        }

        Ok(ListingPricing {
            property_id: row.property_id,
            host_user_id: row.host_user_id,
            host_payout_account: row.host_payout_account,
            base_price: row.base_price,
            currency: row.currency,
            min_nights: to_count(row.min_nights, "min_nights")?,
            max_nights: row.max_nights.map(|n| to_count(n, "max_nights")).transpose()?,
            max_guests: row.max_guests.map(|n| to_count(n, "max_guests")).transpose()?,
            check_in_time: row.check_in_time,
            check_out_time: row.check_out_time,
            cancellation_policy: row.cancellation_policy,
            commission_rate: row.commission_rate,
            fees,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SeasonalRateRow {
    id: Uuid,
    property_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    price_per_night: Decimal,
    weekend_multiplier: Decimal,
    created_at: DateTime<Utc>,
}

impl From<SeasonalRateRow> for SeasonalRate {
    fn from(row: SeasonalRateRow) -> Self {
        SeasonalRate {
            id: row.id,
            property_id: row.property_id,
            start_date: row.start_date,
            end_date: row.end_date,
            price_per_night: row.price_per_night,
            weekend_multiplier: row.weekend_multiplier,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PricingRuleRow {
    id: Uuid,
    property_id: Uuid,
    rule_type: DiscountType,
    discount_percent: Decimal,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    conditions: Json<RuleConditions>,
    is_active: bool,
}

impl From<PricingRuleRow> for PricingRule {
    fn from(row: PricingRuleRow) -> Self {
        PricingRule {
            id: row.id,
            property_id: row.property_id,
            rule_type: row.rule_type,
            discount_percent: row.discount_percent,
            start_date: row.start_date,
            end_date: row.end_date,
            conditions: row.conditions.0,
            is_active: row.is_active,
        }
    }
}

fn to_count(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} is negative: {}", field, value)))
}

/// PostgreSQL-backed pricing reads
#[derive(Clone)]
pub struct PgPricingRepository {
    pool: PgPool,
}

impl PgPricingRepository {
    /// Create a new PgPricingRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

#[async_trait]
impl PricingRepository for PgPricingRepository {
    async fn load_listing_snapshot(&self, property_id: Uuid) -> Result<Option<ListingSnapshot>, StoreError> {
        tracing::debug!(%property_id, "Loading listing pricing snapshot");
        let mut tx = self.begin_snapshot().await?;

        let row = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT property_id, host_user_id, host_payout_account, category, base_price, currency,
                   min_nights, max_nights, max_guests, check_in_time, check_out_time,
                   cancellation_policy, commission_rate, fees
            FROM listing_pricing
            WHERE property_id = $1
            "#,
        )
        .bind(property_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let listing = ListingPricing::try_from(row)?;

        let seasonal_rates = sqlx::query_as::<_, SeasonalRateRow>(
            r#"
            SELECT id, property_id, start_date, end_date, price_per_night, weekend_multiplier, created_at
            FROM seasonal_rates
            WHERE property_id = $1
            ORDER BY start_date, created_at, id
            "#,
        )
        .bind(property_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(SeasonalRate::from)
        .collect();

        let pricing_rules = sqlx::query_as::<_, PricingRuleRow>(
            r#"
            SELECT id, property_id, rule_type, discount_percent, start_date, end_date, conditions, is_active
            FROM pricing_rules
            WHERE property_id = $1 AND is_active = true
            ORDER BY id
            "#,
        )
        .bind(property_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(PricingRule::from)
        .collect();

        tx.commit().await?;

        Ok(Some(ListingSnapshot {
            listing,
            seasonal_rates,
            pricing_rules,
        }))
    }

    async fn platform_fee_table(&self) -> Result<PlatformFeeTable, StoreError> {
        let rows: Vec<(String, Decimal)> =
            sqlx::query_as("SELECT category, fee_percent FROM platform_service_fees")
                .fetch_all(&self.pool)
                .await?;

        let mut short_stay = None;
        let mut rent = None;
        let mut sale = None;
        for (category, fee_percent) in rows {
            match category.parse::<ListingCategory>() {
                Ok(ListingCategory::ShortStay) => short_stay = Some(fee_percent),
                Ok(ListingCategory::Rent) => rent = Some(fee_percent),
                Ok(ListingCategory::Sale) => sale = Some(fee_percent),
                Err(_) => {
                    tracing::warn!(%category, "Ignoring platform service fee for unknown category");
                }
            }
        }

        let require = |value: Option<Decimal>, category: ListingCategory| {
            value.ok_or_else(|| {
                StoreError::Corrupt(format!("no platform service fee configured for '{}'", category))
            })
        };

        Ok(PlatformFeeTable {
            short_stay: require(short_stay, ListingCategory::ShortStay)?,
            rent: require(rent, ListingCategory::Rent)?,
            sale: sale.unwrap_or(Decimal::ZERO),
        })
    }

    async fn booked_ranges(&self, property_id: Uuid) -> Result<Vec<DateRange>, StoreError> {
        let active: Vec<String> = BookingStatus::ACTIVE
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();
        let rows: Vec<(NaiveDate, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT check_in_date, check_out_date
            FROM bookings
            WHERE property_id = $1 AND status = ANY($2)
            ORDER BY check_in_date
            "#,
        )
        .bind(property_id)
        .bind(active)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(check_in, check_out)| DateRange {
                check_in,
                check_out,
            })
            .collect())
    }
}
