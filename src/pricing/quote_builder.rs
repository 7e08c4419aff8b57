// Quote Builder
//
// Pure orchestration of rate resolution, discounts and fees into a PriceBreakdown.
// Every input, including "now" and the platform fee table, is passed in.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::pricing::{
    availability::AvailabilityIndex,
    discount_engine::{DiscountContext, DiscountEngine},
    error::QuoteError,
    fee_assembler::FeeAssembler,
    models::{DateRange, ListingSnapshot, PlatformFeeTable, PriceBreakdown, StayRequest},
    price_calculator::PriceCalculator,
    rate_resolver::RateResolver,
};

/// Builds itemised quotes
///
/// Holds no mutable state, so one builder can serve concurrent quotes.
#[derive(Debug, Clone, Default)]
pub struct QuoteBuilder {
    rate_resolver: RateResolver,
}

impl QuoteBuilder {
    pub fn new(rate_resolver: RateResolver) -> Self {
        Self { rate_resolver }
    }

    pub fn rate_resolver(&self) -> &RateResolver {
        &self.rate_resolver
    }

    /// Price a stay
    ///
    /// The same snapshot, request, fee table and `now` always produce the same
    /// breakdown. Any failure returns an error and no partial breakdown.
    pub fn build(
        &self,
        snapshot: &ListingSnapshot,
        availability: &AvailabilityIndex,
        request: &StayRequest,
        fee_table: &PlatformFeeTable,
        now: DateTime<Utc>,
    ) -> Result<PriceBreakdown, QuoteError> {
        let listing = &snapshot.listing;
        let category = listing.category();
        if !category.is_bookable() {
            return Err(QuoteError::NotBookable(category.to_string()));
        }

        let stay = DateRange::new(request.check_in, request.check_out)?;

        let lead_days = (stay.check_in - now.date_naive()).num_days();
        if lead_days < 0 {
            return Err(QuoteError::InvalidDateRange(format!(
                "check-in {} is in the past",
                stay.check_in
            )));
        }

        if request.guests == 0 {
            return Err(QuoteError::OccupancyExceeded(
                "at least one guest is required".to_string(),
            ));
        }
        if let Some(max_guests) = listing.max_guests {
            if request.guests > max_guests {
                return Err(QuoteError::OccupancyExceeded(format!(
                    "{} guests requested, listing allows {}",
                    request.guests, max_guests
                )));
            }
        }

        if let Some(conflict) = availability.first_conflict(&stay) {
            tracing::debug!(
                property_id = %listing.property_id,
                booked_from = %conflict.check_in,
                booked_to = %conflict.check_out,
                "Requested dates overlap an existing booking"
            );
            return Err(QuoteError::InvalidDateRange(format!(
                "dates overlap an existing booking from {} to {}",
                conflict.check_in, conflict.check_out
            )));
        }

        let stay_fees = listing.fees.stay_fees()?;

        let nightly_rates = self.rate_resolver.resolve(
            listing,
            &snapshot.seasonal_rates,
            stay.check_in,
            stay.check_out,
        )?;
        let rates: Vec<Decimal> = nightly_rates.iter().map(|night| night.rate).collect();
        let subtotal = PriceCalculator::calculate_subtotal(&rates);

        let ctx = DiscountContext {
            nights: stay.nights(),
            lead_days,
            booked_on: now.date_naive(),
        };
        let discounts = DiscountEngine::apply(subtotal, &snapshot.pricing_rules, &ctx);
        let discounted_subtotal = subtotal - discounts.savings;

        let fees = FeeAssembler::assemble(
            discounted_subtotal,
            request.guests,
            request.pets,
            &stay_fees,
            fee_table.rate_for(category),
        )?;

        let total = PriceCalculator::calculate_total(&[
            discounted_subtotal,
            fees.cleaning_fee,
            fees.extra_guest_fee,
            fees.pet_fee,
            fees.service_fee,
            fees.tax_amount,
        ]);

        let breakdown = PriceBreakdown {
            property_id: listing.property_id,
            category,
            currency: listing.currency.clone(),
            check_in: stay.check_in,
            check_out: stay.check_out,
            guests: request.guests,
            pets: request.pets,
            nights: stay.nights(),
            base_price: PriceCalculator::round(listing.base_price),
            nightly_rates,
            subtotal,
            discounts: discounts.discounts,
            savings: discounts.savings,
            discounted_subtotal,
            cleaning_fee: fees.cleaning_fee,
            extra_guest_fee: fees.extra_guest_fee,
            pet_fee: fees.pet_fee,
            service_fee_rate: fees.service_fee_rate,
            service_fee: fees.service_fee,
            total_before_tax: fees.total_before_tax,
            tax_rate: fees.tax_rate,
            tax_amount: fees.tax_amount,
            total,
            security_deposit: fees.security_deposit,
            security_deposit_refundable: fees.security_deposit_refundable,
            quoted_at: now,
        };

        if let Err(err) = breakdown.verify() {
            tracing::error!(property_id = %listing.property_id, error = %err, "Quote failed reconciliation");
            return Err(err);
        }

        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::models::{
        CancellationPolicy, ExtraGuestFee, ListingFees, ListingPricing, PricingRule,
        RuleConditions, SecurityDeposit, ShortStayFees,
    };
    use crate::pricing::models::DiscountType;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap()
    }

    fn fee_table() -> PlatformFeeTable {
        PlatformFeeTable {
            short_stay: dec!(10),
            rent: dec!(5),
            sale: dec!(0),
        }
    }

    fn snapshot() -> ListingSnapshot {
        ListingSnapshot {
            listing: ListingPricing {
                property_id: Uuid::from_u128(42),
                host_user_id: Uuid::from_u128(7),
                host_payout_account: Some("acct_host".to_string()),
                base_price: dec!(100),
                currency: "EUR".to_string(),
                min_nights: 1,
                max_nights: Some(28),
                max_guests: Some(4),
                check_in_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                check_out_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                cancellation_policy: CancellationPolicy::Strict,
                commission_rate: dec!(15),
                fees: ListingFees::ShortStay(ShortStayFees {
                    cleaning_fee: dec!(20),
                    extra_guest: None,
                    pet_fee: None,
                    security_deposit: None,
                    tax_rate: Some(dec!(5)),
                }),
            },
            seasonal_rates: vec![],
            pricing_rules: vec![],
        }
    }

    fn request(check_in: NaiveDate, check_out: NaiveDate, guests: u32, pets: u32) -> StayRequest {
        StayRequest {
            property_id: Uuid::from_u128(42),
            check_in,
            check_out,
            guests,
            pets,
        }
    }

    fn empty_calendar() -> AvailabilityIndex {
        AvailabilityIndex::new(Uuid::from_u128(42), vec![])
    }

    #[test]
    fn test_simple_stay_totals() {
        // Mon-Thu, no weekend nights
        let breakdown = QuoteBuilder::default()
            .build(
                &snapshot(),
                &empty_calendar(),
                &request(date(2025, 6, 2), date(2025, 6, 5), 2, 0),
                &fee_table(),
                now(),
            )
            .unwrap();

        assert_eq!(breakdown.nights, 3);
        assert_eq!(breakdown.subtotal, dec!(300));
        assert_eq!(breakdown.service_fee, dec!(30));
        assert_eq!(breakdown.tax_amount, dec!(17.50));
        assert_eq!(breakdown.total, dec!(367.50));
        assert_eq!(breakdown.security_deposit, dec!(0));
        assert_eq!(breakdown.amount_due(), dec!(367.50));
    }

    #[test]
    fn test_sale_listing_not_bookable() {
        let mut snap = snapshot();
        snap.listing.fees = ListingFees::Sale;
        let result = QuoteBuilder::default().build(
            &snap,
            &empty_calendar(),
            &request(date(2025, 6, 2), date(2025, 6, 5), 2, 0),
            &fee_table(),
            now(),
        );
        assert!(matches!(result, Err(QuoteError::NotBookable(_))));
    }

    #[test]
    fn test_booked_dates_rejected() {
        let calendar = AvailabilityIndex::new(
            Uuid::from_u128(42),
            vec![DateRange::new(date(2025, 6, 4), date(2025, 6, 6)).unwrap()],
        );
        let result = QuoteBuilder::default().build(
            &snapshot(),
            &calendar,
            &request(date(2025, 6, 2), date(2025, 6, 5), 2, 0),
            &fee_table(),
            now(),
        );
        assert!(matches!(result, Err(QuoteError::InvalidDateRange(_))));
    }

    #[test]
    fn test_past_check_in_rejected() {
        let result = QuoteBuilder::default().build(
            &snapshot(),
            &empty_calendar(),
            &request(date(2025, 4, 20), date(2025, 4, 22), 2, 0),
            &fee_table(),
            now(),
        );
        assert!(matches!(result, Err(QuoteError::InvalidDateRange(_))));
    }

    #[test]
    fn test_occupancy_limits() {
        let builder = QuoteBuilder::default();
        let too_many = builder.build(
            &snapshot(),
            &empty_calendar(),
            &request(date(2025, 6, 2), date(2025, 6, 5), 5, 0),
            &fee_table(),
            now(),
        );
        assert!(matches!(too_many, Err(QuoteError::OccupancyExceeded(_))));

        let nobody = builder.build(
            &snapshot(),
            &empty_calendar(),
            &request(date(2025, 6, 2), date(2025, 6, 5), 0, 0),
            &fee_table(),
            now(),
        );
        assert!(matches!(nobody, Err(QuoteError::OccupancyExceeded(_))));
    }

    #[test]
    fn test_lead_time_drives_early_bird() {
        let mut snap = snapshot();
        snap.pricing_rules.push(PricingRule {
            id: Uuid::from_u128(1),
            property_id: Uuid::from_u128(42),
            rule_type: DiscountType::EarlyBird,
            discount_percent: dec!(10),
            start_date: None,
            end_date: None,
            conditions: RuleConditions {
                min_days_before_checkin: Some(30),
                ..Default::default()
            },
            is_active: true,
        });
        let builder = QuoteBuilder::default();

        // 32 days ahead
        let early = builder
            .build(&snap, &empty_calendar(), &request(date(2025, 6, 2), date(2025, 6, 5), 2, 0), &fee_table(), now())
            .unwrap();
        assert_eq!(early.savings, dec!(30));
        assert_eq!(early.discounted_subtotal, dec!(270));

        // 13 days ahead
        let late = builder
            .build(&snap, &empty_calendar(), &request(date(2025, 5, 14), date(2025, 5, 15), 2, 0), &fee_table(), now())
            .unwrap();
        assert!(late.discounts.is_empty());
    }

    #[test]
    fn test_deposit_and_extra_guests_tracked_separately() {
        let mut snap = snapshot();
        snap.listing.fees = ListingFees::ShortStay(ShortStayFees {
            cleaning_fee: dec!(20),
            extra_guest: Some(ExtraGuestFee {
                per_guest: dec!(10),
                threshold: 2,
            }),
            pet_fee: Some(dec!(15)),
            security_deposit: Some(SecurityDeposit {
                amount: dec!(200),
                refundable: true,
            }),
            tax_rate: Some(dec!(5)),
        });
        let breakdown = QuoteBuilder::default()
            .build(&snap, &empty_calendar(), &request(date(2025, 6, 2), date(2025, 6, 5), 4, 1), &fee_table(), now())
            .unwrap();

        assert_eq!(breakdown.extra_guest_fee, dec!(20));
        assert_eq!(breakdown.pet_fee, dec!(15));
        // 300 + 20 + 20 + 15 + 30 = 385, tax 19.25
        assert_eq!(breakdown.total_before_tax, dec!(385));
        assert_eq!(breakdown.tax_amount, dec!(19.25));
        assert_eq!(breakdown.total, dec!(404.25));
        assert_eq!(breakdown.security_deposit, dec!(200));
        assert_eq!(breakdown.amount_due(), dec!(604.25));
    }

    #[test]
    fn test_identical_inputs_identical_quote() {
        let builder = QuoteBuilder::default();
        let req = request(date(2025, 6, 6), date(2025, 6, 9), 2, 0);
        let a = builder.build(&snapshot(), &empty_calendar(), &req, &fee_table(), now()).unwrap();
        let b = builder.build(&snapshot(), &empty_calendar(), &req, &fee_table(), now()).unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::pricing::models::{
        CancellationPolicy, DiscountType, ExtraGuestFee, ListingFees, ListingPricing,
        PricingRule, RuleConditions, SecurityDeposit, ShortStayFees,
    };
    use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn cents(value: u32) -> Decimal {
        Decimal::new(value as i64, 2)
    }

    fn discount_type_strategy() -> impl Strategy<Value = DiscountType> {
        prop_oneof![
            Just(DiscountType::LengthOfStay),
            Just(DiscountType::EarlyBird),
            Just(DiscountType::LastMinute),
            Just(DiscountType::Promotional),
        ]
    }

    /// Every valid quote reconciles, is reproducible, has no negative money and leaves the deposit out of the total
    #[test]
    fn prop_quote_reconciles() {
        proptest!(|(
            base in 1u32..=500_000u32,
            cleaning in 0u32..=30_000u32,
            per_guest in 0u32..=10_000u32,
            threshold in 0u32..=6u32,
            pet in prop::option::of(0u32..=10_000u32),
            deposit in 0u32..=100_000u32,
            tax in prop::option::of(0u32..=2_500u32),
            service in 0u32..=2_000u32,
            lead in 0i64..=200,
            nights in 1i64..=30,
            guests in 1u32..=8u32,
            pets in 0u32..=2u32,
            rules in prop::collection::vec((discount_type_strategy(), 1u32..=6_000u32), 0..=6)
        )| {
            let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
            let check_in = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(lead);
            let check_out = check_in + Duration::days(nights);

            let snapshot = ListingSnapshot {
                listing: ListingPricing {
                    property_id: Uuid::nil(),
                    host_user_id: Uuid::nil(),
                    host_payout_account: None,
                    base_price: cents(base),
                    currency: "USD".to_string(),
                    min_nights: 1,
                    max_nights: None,
                    max_guests: None,
                    check_in_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                    check_out_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                    cancellation_policy: CancellationPolicy::Flexible,
                    commission_rate: Decimal::from(10),
                    fees: ListingFees::ShortStay(ShortStayFees {
                        cleaning_fee: cents(cleaning),
                        extra_guest: Some(ExtraGuestFee { per_guest: cents(per_guest), threshold }),
                        pet_fee: pet.map(cents),
                        security_deposit: Some(SecurityDeposit { amount: cents(deposit), refundable: true }),
                        tax_rate: tax.map(cents),
                    }),
                },
                seasonal_rates: vec![],
                pricing_rules: rules
                    .into_iter()
                    .enumerate()
                    .map(|(i, (rule_type, bp))| PricingRule {
                        id: Uuid::from_u128(i as u128 + 1),
                        property_id: Uuid::nil(),
                        rule_type,
                        discount_percent: cents(bp),
                        start_date: None,
                        end_date: None,
                        conditions: RuleConditions::default(),
                        is_active: true,
                    })
                    .collect(),
            };
            let table = PlatformFeeTable { short_stay: cents(service), rent: Decimal::ZERO, sale: Decimal::ZERO };
            let req = StayRequest { property_id: Uuid::nil(), check_in, check_out, guests, pets };
            let calendar = AvailabilityIndex::new(Uuid::nil(), vec![]);

            match QuoteBuilder::default().build(&snapshot, &calendar, &req, &table, now) {
                Ok(b) => {
                    prop_assert!(b.verify().is_ok());
                    let again = QuoteBuilder::default().build(&snapshot, &calendar, &req, &table, now).unwrap();
                    prop_assert_eq!(serde_json::to_string(&b).unwrap(), serde_json::to_string(&again).unwrap());
                    prop_assert_eq!(
                        b.total,
                        b.subtotal - b.savings + b.cleaning_fee + b.extra_guest_fee + b.pet_fee + b.service_fee + b.tax_amount
                    );
                    prop_assert_eq!(b.amount_due() - b.total, b.security_deposit);
                }
                Err(QuoteError::PetsNotAllowed) => prop_assert!(pets > 0 && pet.is_none()),
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        });
    }
}
