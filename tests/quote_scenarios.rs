// End-to-end quoting through QuoteService and the in-memory store

mod common;

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::*;
use stay_ledger::pricing::{
    CancellationPolicy, DiscountType, ExtraGuestFee, ListingFees, PricingRule, QuoteError,
    RuleConditions, SeasonalRate, ShortStayFees,
};

#[tokio::test]
async fn test_simple_stay() {
    let harness = Harness::new();

    let quote = harness
        .quotes()
        .quote(&stay(date(2025, 6, 2), date(2025, 6, 5)))
        .await
        .unwrap();

    assert_eq!(quote.nights, 3);
    assert_eq!(quote.subtotal, dec!(300));
    assert_eq!(quote.cleaning_fee, dec!(20));
    assert_eq!(quote.service_fee, dec!(30));
    assert_eq!(quote.tax_amount, dec!(17.5));
    assert_eq!(quote.total, dec!(367.5));
    assert_eq!(quote.security_deposit, dec!(0));
    assert_eq!(quote.quoted_at, start());
}

#[tokio::test]
async fn test_stacked_discounts_apply_to_pre_discount_subtotal() {
    let harness = Harness::new();
    harness
        .store
        .add_pricing_rule(PricingRule {
            id: Uuid::from_u128(1),
            property_id: PROPERTY,
            rule_type: DiscountType::EarlyBird,
            discount_percent: dec!(10),
            start_date: None,
            end_date: None,
            conditions: RuleConditions {
                min_days_before_checkin: Some(30),
                ..RuleConditions::default()
            },
            is_active: true,
        })
        .unwrap();
    harness
        .store
        .add_pricing_rule(PricingRule {
            id: Uuid::from_u128(2),
            property_id: PROPERTY,
            rule_type: DiscountType::LengthOfStay,
            discount_percent: dec!(15),
            start_date: None,
            end_date: None,
            conditions: RuleConditions {
                min_nights: Some(7),
                ..RuleConditions::default()
            },
            is_active: true,
        })
        .unwrap();

    // 32 days ahead, 10 nights
    let quote = harness
        .quotes()
        .quote(&stay(date(2025, 6, 2), date(2025, 6, 12)))
        .await
        .unwrap();

    assert_eq!(quote.subtotal, dec!(1000));
    assert_eq!(quote.savings, dec!(250));
    assert_eq!(quote.discounted_subtotal, dec!(750));
    assert_eq!(quote.discounts.len(), 2);
    assert_eq!(quote.service_fee, dec!(75));
    // (750 + 20 + 75) × 5%
    assert_eq!(quote.tax_amount, dec!(42.25));
    assert_eq!(quote.total, dec!(887.25));
}

#[tokio::test]
async fn test_seasonal_weekend_rates() {
    let harness = Harness::new();
    harness
        .store
        .add_seasonal_rate(SeasonalRate {
            id: Uuid::from_u128(10),
            property_id: PROPERTY,
            start_date: date(2025, 6, 1),
            end_date: date(2025, 6, 30),
            price_per_night: dec!(150),
            weekend_multiplier: dec!(1.2),
            created_at: Utc::now(),
        })
        .unwrap();

    // Thu, Fri, Sat nights
    let quote = harness
        .quotes()
        .quote(&stay(date(2025, 6, 5), date(2025, 6, 8)))
        .await
        .unwrap();

    let rates: Vec<_> = quote.nightly_rates.iter().map(|night| night.rate).collect();
    assert_eq!(rates, vec![dec!(150), dec!(180), dec!(180)]);
    assert_eq!(quote.subtotal, dec!(510));
}

#[tokio::test]
async fn test_extra_guest_fee_is_flat_per_booking() {
    let mut snapshot = listing();
    snapshot.listing.fees = ListingFees::ShortStay(ShortStayFees {
        extra_guest: Some(ExtraGuestFee {
            per_guest: dec!(25),
            threshold: 2,
        }),
        ..fees()
    });
    let harness = Harness::with_listing(snapshot, fee_table());

    let mut request = stay(date(2025, 6, 2), date(2025, 6, 5));
    request.guests = 4;
    let quote = harness.quotes().quote(&request).await.unwrap();

    assert_eq!(quote.extra_guest_fee, dec!(50));
}

#[tokio::test]
async fn test_booked_dates_cannot_be_quoted() {
    let harness = Harness::new();
    harness.book(date(2025, 6, 2), date(2025, 6, 5)).await;

    let overlapping = harness
        .quotes()
        .quote(&stay(date(2025, 6, 4), date(2025, 6, 6)))
        .await;
    assert!(matches!(overlapping, Err(QuoteError::InvalidDateRange(_))));

    // Back-to-back stays share the changeover day
    let next = harness
        .quotes()
        .quote(&stay(date(2025, 6, 5), date(2025, 6, 7)))
        .await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_pets_rejected_without_pet_fee() {
    let harness = Harness::new();
    let mut request = stay(date(2025, 6, 2), date(2025, 6, 5));
    request.pets = 1;

    let result = harness.quotes().quote(&request).await;
    assert!(matches!(result, Err(QuoteError::PetsNotAllowed)));
}

#[tokio::test]
async fn test_unknown_property() {
    let harness = Harness::new();
    let mut request = stay(date(2025, 6, 2), date(2025, 6, 5));
    request.property_id = Uuid::from_u128(404);

    let result = harness.quotes().quote(&request).await;
    assert!(matches!(result, Err(QuoteError::PropertyNotFound(_))));
}

#[tokio::test]
async fn test_rate_change_visible_after_invalidation() {
    let harness = Harness::new();
    let request = stay(date(2025, 6, 2), date(2025, 6, 5));
    assert_eq!(harness.quotes().quote(&request).await.unwrap().subtotal, dec!(300));

    harness
        .store
        .add_seasonal_rate(SeasonalRate {
            id: Uuid::from_u128(11),
            property_id: PROPERTY,
            start_date: date(2025, 6, 1),
            end_date: date(2025, 6, 30),
            price_per_night: dec!(200),
            weekend_multiplier: dec!(1),
            created_at: Utc::now(),
        })
        .unwrap();

    // Still served from the snapshot cache
    assert_eq!(harness.quotes().quote(&request).await.unwrap().subtotal, dec!(300));

    assert!(harness.quotes().invalidate(PROPERTY).await);
    assert_eq!(harness.quotes().quote(&request).await.unwrap().subtotal, dec!(600));
}

#[tokio::test]
async fn test_sale_listing_not_bookable() {
    let mut snapshot = plain_listing(CancellationPolicy::Flexible);
    snapshot.listing.fees = ListingFees::Sale;
    let harness = Harness::with_listing(snapshot, fee_table());

    let result = harness
        .quotes()
        .quote(&stay(date(2025, 6, 2), date(2025, 6, 5)))
        .await;
    assert!(matches!(result, Err(QuoteError::NotBookable(_))));
}
