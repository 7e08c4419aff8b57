// Commission & payout splitter
//
// The commission row is written before any money moves and is the source of
// truth for the split afterwards. Retries re-read it and reuse the same
// transfer idempotency key.

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::bookings::{
    error::BookingError,
    models::{
        Booking, BookingStatus, CommissionStatus, CommissionTransaction, EscrowStatus, Payment,
        PaymentStatus,
    },
    repository::BookingStore,
    service::MAX_CAS_ATTEMPTS,
};
use crate::clock::Clock;
use crate::db::StoreError;
use crate::gateway::{IdempotencyKey, PaymentGateway, RefundRequest, TransferRequest};
use crate::pricing::price_calculator::PriceCalculator;

/// Escrow release reason recorded when a stay completes
pub const RELEASE_REASON_COMPLETED: &str = "stay_completed";

/// Platform commission and host share of one booking total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub commission_amount: Decimal,
    pub host_amount: Decimal,
}

impl CommissionSplit {
    /// Split `total` at `commission_rate` percent
    ///
    /// The host amount is derived by subtraction so the two parts always sum
    /// to the total exactly.
    pub fn compute(total: Decimal, commission_rate: Decimal) -> Result<Self, BookingError> {
        if total < Decimal::ZERO {
            return Err(BookingError::InvariantViolation(format!(
                "cannot split negative total {}",
                total
            )));
        }
        if commission_rate < Decimal::ZERO || commission_rate > Decimal::ONE_HUNDRED {
            return Err(BookingError::InvariantViolation(format!(
                "commission rate {} is outside [0, 100]",
                commission_rate
            )));
        }

        let total = PriceCalculator::round(total);
        let commission_amount = PriceCalculator::percent_of(total, commission_rate);
        Ok(Self {
            commission_amount,
            host_amount: total - commission_amount,
        })
    }
}

/// Apply `apply` to the freshest copy of a payment and write it back
///
/// `apply` returns false when the row needs no change. On a version conflict
/// the row is re-read and `apply` runs again, so a writer never overwrites
/// fields another writer set after its read.
pub(crate) async fn update_payment_with<F>(
    store: &dyn BookingStore,
    payment_id: Uuid,
    mut apply: F,
) -> Result<Payment, BookingError>
where
    F: FnMut(&mut Payment) -> bool + Send,
{
    let mut booking_id = payment_id;
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let mut payment = store.find_payment(payment_id).await?.ok_or_else(|| {
            BookingError::InvariantViolation(format!("payment {} is missing", payment_id))
        })?;
        booking_id = payment.booking_id;
        if !apply(&mut payment) {
            return Ok(payment);
        }
        match store.update_payment(&payment).await {
            Ok(updated) => return Ok(updated),
            Err(StoreError::PaymentVersionConflict { .. }) => {
                tracing::debug!(%payment_id, attempt, "Version conflict, re-reading payment");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(BookingError::ConcurrentModification(booking_id))
}

/// Materializes commission rows and pays hosts out of escrow
#[derive(Clone)]
pub struct PayoutSplitter {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl PayoutSplitter {
    /// Create a new PayoutSplitter
    pub fn new(store: Arc<dyn BookingStore>, gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { store, gateway, clock }
    }

    /// Settle a completed booking exactly once
    ///
    /// # Errors
    /// - `DoubleSettlementAttempt` when a commission row already exists for the payment
    /// - `GatewayFailure` when the payout transfer fails; the row stays `failed`
    ///   and `retry_payout` picks it up later
    pub async fn settle(&self, booking: &Booking) -> Result<CommissionTransaction, BookingError> {
        if booking.status != BookingStatus::Completed {
            return Err(BookingError::InvariantViolation(format!(
                "booking {} cannot be settled while {}",
                booking.id, booking.status
            )));
        }
        let payment_id = booking.payment_id.ok_or_else(|| {
            BookingError::InvariantViolation(format!("completed booking {} has no payment", booking.id))
        })?;

        if self.store.find_commission_by_payment(payment_id).await?.is_some() {
            tracing::warn!(booking_id = %booking.id, %payment_id, "Duplicate settlement trigger rejected");
            return Err(BookingError::DoubleSettlementAttempt { payment_id });
        }

        let split = CommissionSplit::compute(booking.total_amount, booking.commission_rate)?;
        let now = self.clock.now();
        let row = CommissionTransaction {
            id: Uuid::new_v4(),
            payment_id,
            booking_id: booking.id,
            property_id: booking.property_id,
            host_user_id: booking.host_user_id,
            destination_account: booking.host_payout_account.clone(),
            currency: booking.currency.clone(),
            total_amount: PriceCalculator::round(booking.total_amount),
            commission_rate: booking.commission_rate,
            commission_amount: split.commission_amount,
            host_amount: split.host_amount,
            status: CommissionStatus::Pending,
            stripe_transfer_id: None,
            escrow_released_at: None,
            attempts: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        // The unique index on payment_id decides a race between two triggers
        let row = self.store.insert_commission(&row).await.map_err(|err| {
            let err = BookingError::from(err);
            if matches!(err, BookingError::DoubleSettlementAttempt { .. }) {
                tracing::warn!(booking_id = %booking.id, %payment_id, "Concurrent settlement lost the insert race");
            }
            err
        })?;

        tracing::info!(
            booking_id = %booking.id,
            %payment_id,
            commission = %row.commission_amount,
            host_amount = %row.host_amount,
            "Commission recorded"
        );

        self.execute_payout(row).await
    }

    /// Retry the payout of a pending or failed commission from its stored amounts
    pub async fn retry_payout(&self, row: CommissionTransaction) -> Result<CommissionTransaction, BookingError> {
        if row.status == CommissionStatus::Completed {
            return Ok(row);
        }
        tracing::debug!(commission_id = %row.id, attempts = row.attempts, "Retrying payout");
        self.execute_payout(row).await
    }

    async fn execute_payout(&self, mut row: CommissionTransaction) -> Result<CommissionTransaction, BookingError> {
        let request = TransferRequest {
            destination_account: row.destination_account.clone(),
            amount: row.host_amount,
            currency: row.currency.clone(),
            idempotency_key: IdempotencyKey::transfer(row.payment_id),
        };

        match self.gateway.transfer(request).await {
            Ok(receipt) => {
                let now = self.clock.now();
                row.status = CommissionStatus::Completed;
                row.stripe_transfer_id = Some(receipt.transfer_id);
                row.escrow_released_at = Some(now);
                row.attempts += 1;
                row.failure_reason = None;
                row.updated_at = now;
                let row = self.store.update_commission(&row).await?;

                self.release_escrow(row.payment_id).await?;
                tracing::info!(
                    commission_id = %row.id,
                    transfer_id = ?row.stripe_transfer_id,
                    "Host payout completed"
                );
                Ok(row)
            }
            Err(err) => {
                row.status = CommissionStatus::Failed;
                row.attempts += 1;
                row.failure_reason = Some(err.to_string());
                row.updated_at = self.clock.now();
                self.store.update_commission(&row).await?;
                tracing::warn!(commission_id = %row.id, error = %err, "Host payout failed");
                Err(err.into())
            }
        }
    }

    async fn release_escrow(&self, payment_id: Uuid) -> Result<(), BookingError> {
        let now = self.clock.now();
        update_payment_with(self.store.as_ref(), payment_id, |payment| {
            if !payment.escrow_status.is_holding() {
                return false;
            }
            payment.escrow_status = EscrowStatus::Released;
            payment.escrow_released_at = Some(now);
            payment.escrow_release_reason = Some(RELEASE_REASON_COMPLETED.to_string());
            payment.updated_at = now;
            true
        })
        .await?;
        Ok(())
    }

    /// Return or forward the security deposit of a completed booking
    ///
    /// A refundable deposit goes back to the guest, a non-refundable one goes
    /// to the host outside the commission split. Both use the deposit key, so
    /// a repeated call never moves the deposit twice.
    ///
    /// Only the deposit fields are written, onto a fresh read of the payment
    /// taken after the gateway call.
    pub async fn settle_deposit(&self, booking: &Booking, payment: Payment) -> Result<Payment, BookingError> {
        if payment.deposit_settled_at.is_some() || payment.deposit_amount <= Decimal::ZERO {
            return Ok(payment);
        }

        let key = IdempotencyKey::deposit(payment.id);
        let deposit = payment.deposit_amount;

        let refund_id = if booking.security_deposit_refundable {
            let receipt = self
                .gateway
                .refund(RefundRequest {
                    charge_id: payment.charge_id.clone(),
                    amount: deposit,
                    idempotency_key: key,
                })
                .await?;
            tracing::info!(booking_id = %booking.id, amount = %deposit, "Security deposit refunded");
            Some(receipt.refund_id)
        } else {
            self.gateway
                .transfer(TransferRequest {
                    destination_account: booking.host_payout_account.clone(),
                    amount: deposit,
                    currency: payment.currency.clone(),
                    idempotency_key: key,
                })
                .await?;
            tracing::info!(booking_id = %booking.id, amount = %deposit, "Security deposit forwarded to host");
            None
        };

        let now = self.clock.now();
        update_payment_with(self.store.as_ref(), payment.id, |current| {
            // A concurrent settlement of the same deposit already recorded it
            if current.deposit_settled_at.is_some() {
                return false;
            }
            if let Some(refund_id) = &refund_id {
                current.refunded_amount += current.deposit_amount;
                current.refunded_at = Some(now);
                current.refund_id = Some(refund_id.clone());
                current.status = PaymentStatus::PartiallyRefunded;
            }
            current.deposit_settled_at = Some(now);
            current.updated_at = now;
            true
        })
        .await
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    /// Commission plus host share equals the total exactly
    #[test]
    fn prop_split_sums_to_total() {
        proptest!(|(
            cents in 0i64..=100_000_000i64,
            rate_bp in 0i64..=10_000i64
        )| {
            let total = Decimal::new(cents, 2);
            let rate = Decimal::new(rate_bp, 2);
            let split = CommissionSplit::compute(total, rate).unwrap();

            prop_assert_eq!(split.commission_amount + split.host_amount, total);
            prop_assert!(split.commission_amount >= Decimal::ZERO);
            prop_assert!(split.host_amount >= Decimal::ZERO);
            prop_assert!(split.commission_amount.scale() <= 2);
        });
    }
}
