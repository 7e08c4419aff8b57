// Rate Resolver
//
// Produces the per-night price sequence of a stay from the listing's base price,
// seasonal overrides and the weekend multiplier.

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::pricing::{
    error::QuoteError,
    models::{DateRange, ListingPricing, NightlyRate, SeasonalRate},
    price_calculator::PriceCalculator,
};

/// Nights priced as weekend nights unless configured otherwise
pub const DEFAULT_WEEKEND_DAYS: [Weekday; 2] = [Weekday::Fri, Weekday::Sat];

/// Longest stay accepted for listings without their own maximum
pub const DEFAULT_MAX_STAY_NIGHTS: u32 = 365;

/// Resolves nightly rates for a stay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateResolver {
    weekend_days: Vec<Weekday>,
    max_stay_nights: u32,
}

impl Default for RateResolver {
    fn default() -> Self {
        Self::new(DEFAULT_WEEKEND_DAYS.to_vec())
    }
}

impl RateResolver {
    pub fn new(weekend_days: Vec<Weekday>) -> Self {
        Self {
            weekend_days,
            max_stay_nights: DEFAULT_MAX_STAY_NIGHTS,
        }
    }

    /// Platform-wide stay cap for listings with no `max_nights`
    pub fn with_max_stay_nights(mut self, max_stay_nights: u32) -> Self {
        self.max_stay_nights = max_stay_nights;
        self
    }

    pub fn weekend_days(&self) -> &[Weekday] {
        &self.weekend_days
    }

    pub fn max_stay_nights(&self) -> u32 {
        self.max_stay_nights
    }

    /// Whether the night starting on `date` is a weekend night
    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        self.weekend_days.contains(&date.weekday())
    }

    /// Validate the stay length against the listing's night bounds
    pub fn validate_stay(&self, listing: &ListingPricing, stay: &DateRange) -> Result<(), QuoteError> {
        let nights = stay.nights();
        if nights < listing.min_nights {
            return Err(QuoteError::InvalidDateRange(format!(
                "stay of {} nights is below the minimum of {}",
                nights, listing.min_nights
            )));
        }
        let max_nights = listing.max_nights.unwrap_or(self.max_stay_nights);
        if nights > max_nights {
            return Err(QuoteError::InvalidDateRange(format!(
                "stay of {} nights exceeds the maximum of {}",
                nights, max_nights
            )));
        }
        Ok(())
    }

    /// Resolve one rate per night of `[check_in, check_out)`
    ///
    /// # Arguments
    /// * `listing` - Pricing context holding the base price and night bounds
    /// * `seasonal_rates` - Seasonal overrides of the property, in any order
    /// * `check_in` - First night of the stay
    /// * `check_out` - Departure date (not a night of the stay)
    pub fn resolve(
        &self,
        listing: &ListingPricing,
        seasonal_rates: &[SeasonalRate],
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<NightlyRate>, QuoteError> {
        let stay = DateRange::new(check_in, check_out)?;
        self.validate_stay(listing, &stay)?;

        let rates = stay
            .night_dates()
            .map(|date| self.rate_for_night(listing, Self::select_seasonal_rate(seasonal_rates, date), date))
            .collect();

        let rate_ids = Self::conflicting_rate_ids(seasonal_rates, &stay);
        if !rate_ids.is_empty() {
            tracing::warn!(
                property_id = %listing.property_id,
                %check_in,
                %check_out,
                rate_ids = ?rate_ids,
                "RuleConflict: overlapping seasonal rates, latest start date wins"
            );
        }

        Ok(rates)
    }

    fn rate_for_night(&self, listing: &ListingPricing, seasonal: Option<&SeasonalRate>, date: NaiveDate) -> NightlyRate {
        let weekend = self.is_weekend(date);

        match seasonal {
            Some(seasonal) => {
                let multiplier = if weekend {
                    seasonal.weekend_multiplier
                } else {
                    Decimal::ONE
                };
                NightlyRate {
                    date,
                    rate: PriceCalculator::round(seasonal.price_per_night * multiplier),
                    seasonal_rate_id: Some(seasonal.id),
                    weekend,
                }
            }
            None => NightlyRate {
                date,
                rate: PriceCalculator::round(listing.base_price),
                seasonal_rate_id: None,
                weekend,
            },
        }
    }

    /// Pick the seasonal rate covering `date`
    ///
    /// Overlapping windows resolve to the latest start date, then the most
    /// recently created row, then the highest id.
    pub fn select_seasonal_rate(seasonal_rates: &[SeasonalRate], date: NaiveDate) -> Option<&SeasonalRate> {
        Self::pick_winner(&Self::covering_rates(seasonal_rates, date))
    }

    /// Ids of every seasonal rate that overlaps another on some night of `stay`
    pub fn conflicting_rate_ids(seasonal_rates: &[SeasonalRate], stay: &DateRange) -> Vec<Uuid> {
        let mut conflicting = BTreeSet::new();
        for date in stay.night_dates() {
            let covering = Self::covering_rates(seasonal_rates, date);
            if covering.len() > 1 {
                conflicting.extend(covering.iter().map(|rate| rate.id));
            }
        }
        conflicting.into_iter().collect()
    }

    fn covering_rates(seasonal_rates: &[SeasonalRate], date: NaiveDate) -> Vec<&SeasonalRate> {
        seasonal_rates.iter().filter(|rate| rate.covers(date)).collect()
    }

    fn pick_winner<'a>(covering: &[&'a SeasonalRate]) -> Option<&'a SeasonalRate> {
        covering
            .iter()
            .copied()
            .max_by_key(|rate| (rate.start_date, rate.created_at, rate.id))
    }
}
