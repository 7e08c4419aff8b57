// In-process store
//
// Implements both persistence traits with the same semantics as the Postgres
// store: overlap rejection for active bookings, one commission per payment,
// one payment per booking and version-checked booking updates. Used by the
// tests and by local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::bookings::models::{
    Booking, BookingStatus, CommissionStatus, CommissionTransaction, Payment,
};
use crate::bookings::repository::BookingStore;
use crate::db::StoreError;
use crate::pricing::models::{DateRange, ListingSnapshot, PlatformFeeTable, PricingRule, SeasonalRate};
use crate::pricing::repository::PricingRepository;

#[derive(Debug, Default)]
struct MemoryState {
    listings: HashMap<Uuid, ListingSnapshot>,
    fee_table: Option<PlatformFeeTable>,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, Payment>,
    commissions: HashMap<Uuid, CommissionTransaction>,
}

impl MemoryState {
    fn payment_of(&self, booking: &Booking) -> Option<&Payment> {
        booking.payment_id.and_then(|id| self.payments.get(&id))
    }

    fn bookings_matching<F>(&self, predicate: F) -> Vec<Booking>
    where
        F: Fn(&Booking) -> bool,
    {
        let mut found: Vec<Booking> = self
            .bookings
            .values()
            .filter(|booking| predicate(booking))
            .cloned()
            .collect();
        found.sort_by_key(|booking| (booking.created_at, booking.id));
        found
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a platform service-fee table
    pub fn with_fee_table(fee_table: PlatformFeeTable) -> Self {
        let store = Self::new();
        store.set_fee_table(fee_table);
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not wedge the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_fee_table(&self, fee_table: PlatformFeeTable) {
        self.lock().fee_table = Some(fee_table);
    }

    /// Insert or replace a listing with its rates and rules
    pub fn put_listing(&self, snapshot: ListingSnapshot) {
        let property_id = snapshot.listing.property_id;
        self.lock().listings.insert(property_id, snapshot);
    }

    pub fn add_seasonal_rate(&self, rate: SeasonalRate) -> Result<(), StoreError> {
        let mut state = self.lock();
        let snapshot = state.listings.get_mut(&rate.property_id).ok_or(StoreError::NotFound {
            entity: "Listing",
            id: rate.property_id,
        })?;
        snapshot.seasonal_rates.push(rate);
        Ok(())
    }

    pub fn add_pricing_rule(&self, rule: PricingRule) -> Result<(), StoreError> {
        let mut state = self.lock();
        let snapshot = state.listings.get_mut(&rule.property_id).ok_or(StoreError::NotFound {
            entity: "Listing",
            id: rule.property_id,
        })?;
        snapshot.pricing_rules.push(rule);
        Ok(())
    }

    pub fn commissions(&self) -> Vec<CommissionTransaction> {
        self.lock().commissions.values().cloned().collect()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.lock().payments.values().cloned().collect()
    }
}

#[async_trait]
impl PricingRepository for MemoryStore {
    async fn load_listing_snapshot(&self, property_id: Uuid) -> Result<Option<ListingSnapshot>, StoreError> {
        let state = self.lock();
        Ok(state.listings.get(&property_id).map(|snapshot| {
            let mut snapshot = snapshot.clone();
            snapshot.pricing_rules.retain(|rule| rule.is_active);
            snapshot.pricing_rules.sort_by_key(|rule| rule.id);
            snapshot
                .seasonal_rates
                .sort_by_key(|rate| (rate.start_date, rate.created_at, rate.id));
            snapshot
        }))
    }

    async fn platform_fee_table(&self) -> Result<PlatformFeeTable, StoreError> {
        self.lock()
            .fee_table
            .clone()
            .ok_or_else(|| StoreError::Corrupt("no platform service fees configured".to_string()))
    }

    async fn booked_ranges(&self, property_id: Uuid) -> Result<Vec<DateRange>, StoreError> {
        let state = self.lock();
        let mut ranges: Vec<DateRange> = state
            .bookings
            .values()
            .filter(|booking| booking.property_id == property_id && booking.status.is_active())
            .map(Booking::stay)
            .collect();
        ranges.sort_by_key(|range| range.check_in);
        Ok(ranges)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        let mut state = self.lock();
        let stay = booking.stay();
        let taken = state.bookings.values().any(|existing| {
            existing.property_id == booking.property_id
                && existing.status.is_active()
                && existing.stay().overlaps(&stay)
        });
        if booking.status.is_active() && taken {
            return Err(StoreError::DateRangeUnavailable {
                property_id: booking.property_id,
            });
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking.clone())
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    async fn update_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        let mut state = self.lock();
        let stored = state.bookings.get_mut(&booking.id).ok_or(StoreError::NotFound {
            entity: "Booking",
            id: booking.id,
        })?;
        if stored.version != booking.version {
            return Err(StoreError::VersionConflict {
                booking_id: booking.id,
            });
        }
        let mut updated = booking.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn confirm_payment(&self, booking: &Booking, payment: &Payment) -> Result<(Booking, Payment), StoreError> {
        let mut state = self.lock();
        let stored = state.bookings.get(&booking.id).ok_or(StoreError::NotFound {
            entity: "Booking",
            id: booking.id,
        })?;
        let already_paid = state
            .payments
            .values()
            .any(|existing| existing.booking_id == booking.id);
        if stored.version != booking.version || already_paid {
            return Err(StoreError::VersionConflict {
                booking_id: booking.id,
            });
        }

        let mut updated = booking.clone();
        updated.version += 1;
        state.bookings.insert(updated.id, updated.clone());
        state.payments.insert(payment.id, payment.clone());
        Ok((updated, payment.clone()))
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.lock().payments.get(&id).cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<Payment, StoreError> {
        let mut state = self.lock();
        let stored = state.payments.get_mut(&payment.id).ok_or(StoreError::NotFound {
            entity: "Payment",
            id: payment.id,
        })?;
        if stored.version != payment.version {
            return Err(StoreError::PaymentVersionConflict {
                payment_id: payment.id,
            });
        }
        let mut updated = payment.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn insert_commission(&self, commission: &CommissionTransaction) -> Result<CommissionTransaction, StoreError> {
        let mut state = self.lock();
        let duplicate = state
            .commissions
            .values()
            .any(|existing| existing.payment_id == commission.payment_id);
        if duplicate {
            return Err(StoreError::DuplicateCommission {
                payment_id: commission.payment_id,
            });
        }
        state.commissions.insert(commission.id, commission.clone());
        Ok(commission.clone())
    }

    async fn find_commission_by_payment(&self, payment_id: Uuid) -> Result<Option<CommissionTransaction>, StoreError> {
        Ok(self
            .lock()
            .commissions
            .values()
            .find(|commission| commission.payment_id == payment_id)
            .cloned())
    }

    async fn update_commission(&self, commission: &CommissionTransaction) -> Result<CommissionTransaction, StoreError> {
        let mut state = self.lock();
        let stored = state.commissions.get_mut(&commission.id).ok_or(StoreError::NotFound {
            entity: "CommissionTransaction",
            id: commission.id,
        })?;
        if stored.status != CommissionStatus::Completed {
            *stored = commission.clone();
        }
        Ok(stored.clone())
    }

    async fn confirmed_due_for_check_in(&self, today: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        Ok(self.lock().bookings_matching(|booking| {
            booking.status == BookingStatus::Confirmed && booking.check_in_date <= today
        }))
    }

    async fn in_stay_due_for_release(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        Ok(self.lock().bookings_matching(|booking| {
            booking.status == BookingStatus::InStay
                && booking.auto_release_scheduled
                && booking
                    .escrow_release_eligible_at
                    .map_or(false, |eligible_at| eligible_at <= now)
        }))
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        Ok(self.lock().bookings_matching(|booking| {
            booking.status == BookingStatus::PendingPayment && booking.created_at < cutoff
        }))
    }

    async fn completed_without_commission(&self) -> Result<Vec<Booking>, StoreError> {
        let state = self.lock();
        Ok(state.bookings_matching(|booking| {
            booking.status == BookingStatus::Completed
                && booking.payment_id.map_or(false, |payment_id| {
                    !state
                        .commissions
                        .values()
                        .any(|commission| commission.payment_id == payment_id)
                })
        }))
    }

    async fn unsettled_commissions(&self) -> Result<Vec<CommissionTransaction>, StoreError> {
        let mut found: Vec<CommissionTransaction> = self
            .lock()
            .commissions
            .values()
            .filter(|commission| commission.status != CommissionStatus::Completed)
            .cloned()
            .collect();
        found.sort_by_key(|commission| (commission.created_at, commission.id));
        Ok(found)
    }

    async fn cancelled_awaiting_refund(&self) -> Result<Vec<Booking>, StoreError> {
        let state = self.lock();
        Ok(state.bookings_matching(|booking| {
            booking.status == BookingStatus::Cancelled
                && state
                    .payment_of(booking)
                    .map_or(false, |payment| payment.escrow_status.is_holding())
        }))
    }

    async fn completed_with_unsettled_deposit(&self) -> Result<Vec<Booking>, StoreError> {
        let state = self.lock();
        Ok(state.bookings_matching(|booking| {
            booking.status == BookingStatus::Completed
                && state.payment_of(booking).map_or(false, |payment| {
                    payment.deposit_amount > Decimal::ZERO && payment.deposit_settled_at.is_none()
                })
        }))
    }
}
