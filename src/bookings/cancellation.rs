// Cancellation policy lookup
//
// Refunds are always computed against the booking's original total, never a
// re-quoted price.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::bookings::models::{ActorRole, BookingStatus};
use crate::pricing::{models::CancellationPolicy, price_calculator::PriceCalculator};

/// Refund percent for a guest cancellation `days_before_check_in` days ahead
///
/// | policy   | 100%       | 50%       | otherwise |
/// |----------|------------|-----------|-----------|
/// | flexible | ≥ 1 day    | -         | 0%        |
/// | moderate | ≥ 5 days   | ≥ 1 day   | 0%        |
/// | strict   | ≥ 14 days  | ≥ 7 days  | 0%        |
pub fn refund_percent(policy: CancellationPolicy, days_before_check_in: i64) -> Decimal {
    let full = Decimal::ONE_HUNDRED;
    let half = Decimal::from(50);
    match policy {
        CancellationPolicy::Flexible => {
            if days_before_check_in >= 1 {
                full
            } else {
                Decimal::ZERO
            }
        }
        CancellationPolicy::Moderate => {
            if days_before_check_in >= 5 {
                full
            } else if days_before_check_in >= 1 {
                half
            } else {
                Decimal::ZERO
            }
        }
        CancellationPolicy::Strict => {
            if days_before_check_in >= 14 {
                full
            } else if days_before_check_in >= 7 {
                half
            } else {
                Decimal::ZERO
            }
        }
    }
}

/// Inputs of a refund decision
#[derive(Debug, Clone, Copy)]
pub struct CancellationTerms {
    pub policy: CancellationPolicy,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub check_in_date: NaiveDate,
    pub cancelled_on: NaiveDate,
    pub initiated_by: ActorRole,
}

/// Refund owed on the booking total (the security deposit is returned separately)
///
/// Nothing was charged while payment is pending, so nothing is refunded.
/// Host- and admin-initiated cancellations refund in full.
pub fn refund_amount(terms: &CancellationTerms) -> Decimal {
    if terms.status == BookingStatus::PendingPayment {
        return Decimal::ZERO;
    }

    match terms.initiated_by {
        ActorRole::Host | ActorRole::Admin => PriceCalculator::round(terms.total_amount),
        ActorRole::Guest | ActorRole::System => {
            let days_before = (terms.check_in_date - terms.cancelled_on).num_days();
            let percent = refund_percent(terms.policy, days_before);
            PriceCalculator::percent_of(terms.total_amount, percent)
        }
    }
}
