// Shared fixtures for the integration tests
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use stay_ledger::{
    bookings::{Actor, ActorRole, Booking, BookingService, LifecycleSettings},
    clock::FixedClock,
    gateway::{PaymentGateway, SandboxGateway},
    memory::MemoryStore,
    pricing::{
        CancellationPolicy, ListingFees, ListingPricing, ListingSnapshot, PlatformFeeTable,
        QuoteService, RateResolver, SecurityDeposit, ShortStayFees, StayRequest,
    },
    AppState,
};

pub const PROPERTY: Uuid = Uuid::from_u128(42);
pub const HOST: Uuid = Uuid::from_u128(7);
pub const GUEST: Uuid = Uuid::from_u128(1001);
pub const OTHER_GUEST: Uuid = Uuid::from_u128(1002);
pub const ADMIN: Uuid = Uuid::from_u128(9001);
pub const HOST_ACCOUNT: &str = "acct_host_42";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Instant every harness starts at
pub fn start() -> DateTime<Utc> {
    at(2025, 5, 1, 9, 30)
}

pub fn guest() -> Actor {
    Actor::new(GUEST, ActorRole::Guest)
}

pub fn other_guest() -> Actor {
    Actor::new(OTHER_GUEST, ActorRole::Guest)
}

pub fn host() -> Actor {
    Actor::new(HOST, ActorRole::Host)
}

pub fn admin() -> Actor {
    Actor::new(ADMIN, ActorRole::Admin)
}

pub fn fee_table() -> PlatformFeeTable {
    PlatformFeeTable {
        short_stay: dec!(10),
        rent: dec!(5),
        sale: dec!(0),
    }
}

pub fn fees() -> ShortStayFees {
    ShortStayFees {
        cleaning_fee: dec!(20),
        extra_guest: None,
        pet_fee: None,
        security_deposit: None,
        tax_rate: Some(dec!(5)),
    }
}

/// Base 100/night, cleaning 20, tax 5%, 15% commission, moderate policy
pub fn listing() -> ListingSnapshot {
    ListingSnapshot {
        listing: ListingPricing {
            property_id: PROPERTY,
            host_user_id: HOST,
            host_payout_account: Some(HOST_ACCOUNT.to_string()),
            base_price: dec!(100),
            currency: "EUR".to_string(),
            min_nights: 1,
            max_nights: Some(60),
            max_guests: Some(4),
            check_in_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            check_out_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            cancellation_policy: CancellationPolicy::Moderate,
            commission_rate: dec!(15),
            fees: ListingFees::ShortStay(fees()),
        },
        seasonal_rates: vec![],
        pricing_rules: vec![],
    }
}

/// Listing whose total is exactly nights × 100 (no fees, no tax)
pub fn plain_listing(policy: CancellationPolicy) -> ListingSnapshot {
    let mut snapshot = listing();
    snapshot.listing.cancellation_policy = policy;
    snapshot.listing.fees = ListingFees::ShortStay(ShortStayFees {
        cleaning_fee: Decimal::ZERO,
        extra_guest: None,
        pet_fee: None,
        security_deposit: None,
        tax_rate: None,
    });
    snapshot
}

pub fn listing_with_deposit(amount: Decimal, refundable: bool) -> ListingSnapshot {
    let mut snapshot = listing();
    snapshot.listing.fees = ListingFees::ShortStay(ShortStayFees {
        security_deposit: Some(SecurityDeposit { amount, refundable }),
        ..fees()
    });
    snapshot
}

pub fn stay(check_in: NaiveDate, check_out: NaiveDate) -> StayRequest {
    StayRequest {
        property_id: PROPERTY,
        check_in,
        check_out,
        guests: 2,
        pets: 0,
    }
}

/// Engine wired over the in-memory store, sandbox gateway and a pinned clock
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<SandboxGateway>,
    pub clock: Arc<FixedClock>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_listing(listing(), fee_table())
    }

    pub fn with_listing(snapshot: ListingSnapshot, fee_table: PlatformFeeTable) -> Self {
        Self::with_gateway(snapshot, fee_table, |sandbox| -> Arc<dyn PaymentGateway> { sandbox })
    }

    /// Route engine traffic through `wrap` while `gateway` still records it
    pub fn with_gateway<F>(snapshot: ListingSnapshot, fee_table: PlatformFeeTable, wrap: F) -> Self
    where
        F: FnOnce(Arc<SandboxGateway>) -> Arc<dyn PaymentGateway>,
    {
        let store = Arc::new(MemoryStore::with_fee_table(fee_table));
        store.put_listing(snapshot);
        let gateway = Arc::new(SandboxGateway::new());
        let clock = Arc::new(FixedClock::new(start()));

        let state = AppState::new(
            store.clone(),
            store.clone(),
            wrap(gateway.clone()),
            clock.clone(),
            RateResolver::default(),
            LifecycleSettings::default(),
        );

        Self {
            store,
            gateway,
            clock,
            state,
        }
    }

    pub fn quotes(&self) -> &QuoteService {
        &self.state.quotes
    }

    pub fn bookings(&self) -> &BookingService {
        &self.state.bookings
    }

    /// Quote and book a stay as the default guest
    pub async fn book(&self, check_in: NaiveDate, check_out: NaiveDate) -> Booking {
        let quote = self.quotes().quote(&stay(check_in, check_out)).await.unwrap();
        self.bookings()
            .create_booking(&guest(), &quote, "pi_guest")
            .await
            .unwrap()
    }

    /// Book Mon 2 June to Thu 5 June 2025 and let the stay begin
    pub async fn book_and_check_in(&self) -> Booking {
        let booking = self.book(date(2025, 6, 2), date(2025, 6, 5)).await;
        self.clock.set(at(2025, 6, 2, 15, 0));
        self.bookings()
            .mark_keys_received(booking.id, &host())
            .await
            .unwrap()
    }
}
