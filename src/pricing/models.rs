use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pricing::error::QuoteError;

/// Listing category; decides which fee shape applies and whether stays exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ListingCategory {
    ShortStay,
    Rent,
    #[serde(alias = "buy")]
    Sale,
}

impl ListingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingCategory::ShortStay => "short-stay",
            ListingCategory::Rent => "rent",
            ListingCategory::Sale => "sale",
        }
    }

    /// Only rent and short-stay listings have nights to price
    pub fn is_bookable(&self) -> bool {
        !matches!(self, ListingCategory::Sale)
    }
}

impl fmt::Display for ListingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ListingCategory {
    type Err = QuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short-stay" | "short_stay" => Ok(ListingCategory::ShortStay),
            "rent" => Ok(ListingCategory::Rent),
            "sale" | "buy" => Ok(ListingCategory::Sale),
            other => Err(QuoteError::UnknownCategory(other.to_string())),
        }
    }
}

/// Cancellation policy identifier carried by a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CancellationPolicy {
    Flexible,
    Moderate,
    Strict,
}

impl CancellationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationPolicy::Flexible => "flexible",
            CancellationPolicy::Moderate => "moderate",
            CancellationPolicy::Strict => "strict",
        }
    }
}

impl fmt::Display for CancellationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Security deposit held alongside the booking total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDeposit {
    pub amount: Decimal,
    pub refundable: bool,
}

/// Fee charged for each guest above `threshold`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraGuestFee {
    pub per_guest: Decimal,
    pub threshold: u32,
}

/// Fee configuration of a short-stay listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortStayFees {
    #[serde(default)]
    pub cleaning_fee: Decimal,
    #[serde(default)]
    pub extra_guest: Option<ExtraGuestFee>,
    /// `None` means the host does not accept pets
    #[serde(default)]
    pub pet_fee: Option<Decimal>,
    #[serde(default)]
    pub security_deposit: Option<SecurityDeposit>,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
}

/// Fee configuration of a rental listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentFees {
    /// Move-out cleaning, charged once
    #[serde(default)]
    pub cleaning_fee: Decimal,
    #[serde(default)]
    pub pet_fee: Option<Decimal>,
    #[serde(default)]
    pub security_deposit: Option<SecurityDeposit>,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
}

/// Per-category fee configuration, tagged by `category`
///
/// Unknown categories fail deserialization instead of falling back to a
/// default shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "kebab-case")]
pub enum ListingFees {
    ShortStay(ShortStayFees),
    Rent(RentFees),
    Sale,
}

impl ListingFees {
    pub fn category(&self) -> ListingCategory {
        match self {
            ListingFees::ShortStay(_) => ListingCategory::ShortStay,
            ListingFees::Rent(_) => ListingCategory::Rent,
            ListingFees::Sale => ListingCategory::Sale,
        }
    }

    /// Normalise the category-specific shape into the fields the assembler reads
    pub fn stay_fees(&self) -> Result<StayFees, QuoteError> {
        match self {
            ListingFees::ShortStay(fees) => Ok(StayFees {
                cleaning_fee: fees.cleaning_fee,
                extra_guest: fees.extra_guest.clone(),
                pet_fee: fees.pet_fee,
                security_deposit: fees.security_deposit.clone(),
                tax_rate: fees.tax_rate,
            }),
            ListingFees::Rent(fees) => Ok(StayFees {
                cleaning_fee: fees.cleaning_fee,
                extra_guest: None,
                pet_fee: fees.pet_fee,
                security_deposit: fees.security_deposit.clone(),
                tax_rate: fees.tax_rate,
            }),
            ListingFees::Sale => Err(QuoteError::NotBookable(ListingCategory::Sale.to_string())),
        }
    }
}

/// Fee inputs for a bookable stay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StayFees {
    pub cleaning_fee: Decimal,
    pub extra_guest: Option<ExtraGuestFee>,
    pub pet_fee: Option<Decimal>,
    pub security_deposit: Option<SecurityDeposit>,
    pub tax_rate: Option<Decimal>,
}

/// Read-only pricing context of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingPricing {
    pub property_id: Uuid,
    pub host_user_id: Uuid,
    /// Connected payout account of the host, if onboarded
    pub host_payout_account: Option<String>,
    pub base_price: Decimal,
    pub currency: String,
    pub min_nights: u32,
    pub max_nights: Option<u32>,
    pub max_guests: Option<u32>,
    pub check_in_time: NaiveTime,
    pub check_out_time: NaiveTime,
    pub cancellation_policy: CancellationPolicy,
    /// Platform commission taken from the host payout, in percent
    pub commission_rate: Decimal,
    pub fees: ListingFees,
}

impl ListingPricing {
    pub fn category(&self) -> ListingCategory {
        self.fees.category()
    }
}

/// Seasonal nightly price override
///
/// The window covers `start_date..=end_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalRate {
    pub id: Uuid,
    pub property_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_per_night: Decimal,
    pub weekend_multiplier: Decimal,
    pub created_at: DateTime<Utc>,
}

impl SeasonalRate {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Discount rule type; at most one rule of each type applies to a stay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    LengthOfStay,
    EarlyBird,
    LastMinute,
    Promotional,
}

impl DiscountType {
    /// Fixed evaluation order used when itemising stacked discounts
    pub const ALL: [DiscountType; 4] = [
        DiscountType::LengthOfStay,
        DiscountType::EarlyBird,
        DiscountType::LastMinute,
        DiscountType::Promotional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::LengthOfStay => "length_of_stay",
            DiscountType::EarlyBird => "early_bird",
            DiscountType::LastMinute => "last_minute",
            DiscountType::Promotional => "promotional",
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured eligibility conditions of a pricing rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    pub min_nights: Option<u32>,
    /// Early-bird: booking must be made at least this many days ahead
    pub min_days_before_checkin: Option<i64>,
    /// Last-minute: booking must be made at most this many days ahead
    pub max_days_before_checkin: Option<i64>,
}

/// Discount rule row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: Uuid,
    pub property_id: Uuid,
    pub rule_type: DiscountType,
    pub discount_percent: Decimal,
    /// Window on the booking-creation date, inclusive on both ends
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub conditions: RuleConditions,
    pub is_active: bool,
}

/// Guest-facing platform service fee, in percent, per listing category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFeeTable {
    pub short_stay: Decimal,
    pub rent: Decimal,
    pub sale: Decimal,
}

impl PlatformFeeTable {
    pub fn rate_for(&self, category: ListingCategory) -> Decimal {
        match category {
            ListingCategory::ShortStay => self.short_stay,
            ListingCategory::Rent => self.rent,
            ListingCategory::Sale => self.sale,
        }
    }
}

/// Everything the quote builder reads about one listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListingSnapshot {
    pub listing: ListingPricing,
    pub seasonal_rates: Vec<SeasonalRate>,
    pub pricing_rules: Vec<PricingRule>,
}

/// Half-open stay range `[check_in, check_out)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, QuoteError> {
        if check_out <= check_in {
            return Err(QuoteError::InvalidDateRange(format!(
                "check-out {} must be after check-in {}",
                check_out, check_in
            )));
        }
        Ok(Self {
            check_in,
            check_out,
        })
    }

    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days().max(0) as u32
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// Dates of each night in the stay, in order
    pub fn night_dates(&self) -> impl Iterator<Item = NaiveDate> {
        self.check_in.iter_days().take(self.nights() as usize)
    }
}

/// What the guest asks to price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRequest {
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub pets: u32,
}

/// Resolved price of one night
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NightlyRate {
    pub date: NaiveDate,
    pub rate: Decimal,
    pub seasonal_rate_id: Option<Uuid>,
    pub weekend: bool,
}

/// One discount applied to the subtotal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppliedDiscount {
    pub rule_id: Uuid,
    pub discount_type: DiscountType,
    pub percent: Decimal,
    pub amount: Decimal,
}

/// Itemised, immutable price of a stay
///
/// `total = subtotal - savings + cleaning_fee + extra_guest_fee + pet_fee
/// + service_fee + tax_amount`. The security deposit is tracked next to the
/// total, never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriceBreakdown {
    pub property_id: Uuid,
    pub category: ListingCategory,
    pub currency: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub pets: u32,
    pub nights: u32,
    pub base_price: Decimal,
    pub nightly_rates: Vec<NightlyRate>,
    pub subtotal: Decimal,
    pub discounts: Vec<AppliedDiscount>,
    pub savings: Decimal,
    pub discounted_subtotal: Decimal,
    pub cleaning_fee: Decimal,
    pub extra_guest_fee: Decimal,
    pub pet_fee: Decimal,
    pub service_fee_rate: Decimal,
    pub service_fee: Decimal,
    pub total_before_tax: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub security_deposit: Decimal,
    pub security_deposit_refundable: bool,
    pub quoted_at: DateTime<Utc>,
}

impl PriceBreakdown {
    /// Amount the guest authorises: the total plus the escrowed deposit
    pub fn amount_due(&self) -> Decimal {
        self.total + self.security_deposit
    }

    pub fn stay(&self) -> DateRange {
        DateRange {
            check_in: self.check_in,
            check_out: self.check_out,
        }
    }

    /// Check every monetary field is non-negative and the totals reconcile
    pub fn verify(&self) -> Result<(), QuoteError> {
        let amounts = [
            ("base_price", self.base_price),
            ("subtotal", self.subtotal),
            ("savings", self.savings),
            ("discounted_subtotal", self.discounted_subtotal),
            ("cleaning_fee", self.cleaning_fee),
            ("extra_guest_fee", self.extra_guest_fee),
            ("pet_fee", self.pet_fee),
            ("service_fee", self.service_fee),
            ("total_before_tax", self.total_before_tax),
            ("tax_amount", self.tax_amount),
            ("total", self.total),
            ("security_deposit", self.security_deposit),
        ];
        for (field, amount) in amounts {
            if amount < Decimal::ZERO {
                return Err(QuoteError::InvariantViolation(format!(
                    "{} is negative: {}",
                    field, amount
                )));
            }
        }
        if let Some(night) = self.nightly_rates.iter().find(|n| n.rate < Decimal::ZERO) {
            return Err(QuoteError::InvariantViolation(format!(
                "nightly rate for {} is negative: {}",
                night.date, night.rate
            )));
        }
        if let Some(discount) = self.discounts.iter().find(|d| d.amount < Decimal::ZERO) {
            return Err(QuoteError::InvariantViolation(format!(
                "{} discount is negative: {}",
                discount.discount_type, discount.amount
            )));
        }

        if self.nights as usize != self.nightly_rates.len() {
            return Err(QuoteError::InvariantViolation(format!(
                "{} nights but {} nightly rates",
                self.nights,
                self.nightly_rates.len()
            )));
        }

        let nightly_sum: Decimal = self.nightly_rates.iter().map(|n| n.rate).sum();
        let discount_sum: Decimal = self.discounts.iter().map(|d| d.amount).sum();
        let before_tax = self.discounted_subtotal
            + self.cleaning_fee
            + self.extra_guest_fee
            + self.pet_fee
            + self.service_fee;
        let reconciled = self.subtotal - self.savings
            + self.cleaning_fee
            + self.extra_guest_fee
            + self.pet_fee
            + self.service_fee
            + self.tax_amount;

        let checks = [
            ("subtotal", nightly_sum, self.subtotal),
            ("savings", discount_sum, self.savings),
            ("discounted_subtotal", self.subtotal - self.savings, self.discounted_subtotal),
            ("total_before_tax", before_tax, self.total_before_tax),
            ("total", reconciled, self.total),
        ];
        for (field, expected, actual) in checks {
            if expected != actual {
                return Err(QuoteError::InvariantViolation(format!(
                    "{} does not reconcile: expected {}, got {}",
                    field, expected, actual
                )));
            }
        }

        Ok(())
    }
}
