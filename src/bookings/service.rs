use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::bookings::{
    cancellation::{self, CancellationTerms},
    error::BookingError,
    models::{
        Actor, ActorRole, Booking, BookingStatus, EscrowStatus, Payment, PaymentStatus, PaymentType,
    },
    repository::BookingStore,
    settlement::{update_payment_with, PayoutSplitter},
    status_machine::StatusMachine,
};
use crate::clock::Clock;
use crate::db::StoreError;
use crate::gateway::{ChargeRequest, IdempotencyKey, PaymentGateway, RefundRequest};
use crate::pricing::{PriceBreakdown, QuoteError, QuoteService};

/// Compare-and-swap attempts before giving up with `ConcurrentModification`
pub(crate) const MAX_CAS_ATTEMPTS: u32 = 3;

pub const RELEASE_REASON_CANCELLATION_REFUND: &str = "cancellation_refund";
pub const RELEASE_REASON_CANCELLATION_RETAINED: &str = "cancellation_retained";
pub const PAYMENT_TIMEOUT_REASON: &str = "payment not received";

/// Timing knobs of the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Dispute window after the check-out time before escrow auto-releases
    pub escrow_grace: Duration,
    /// Age after which an unpaid booking is cancelled and its dates freed
    pub pending_payment_ttl: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            escrow_grace: Duration::hours(48),
            pending_payment_ttl: Duration::minutes(30),
        }
    }
}

/// Outcome of one scheduled sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// confirmed → in_stay
    pub started: u32,
    /// in_stay → completed by auto-release
    pub completed: u32,
    /// pending_payment → cancelled after the payment timeout
    pub expired: u32,
    /// Proposals the state machine or a guard turned down
    pub rejected: u32,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub settled: u32,
    pub payouts_retried: u32,
    pub refunds_retried: u32,
    pub deposits_settled: u32,
    pub failures: u32,
}

/// Booking lifecycle: creation, payment, stay, completion and cancellation
///
/// Every status change goes through `StatusMachine` and a version-checked
/// write. Gateway calls happen before the transition they fund (charge) or
/// after the transition that owes them (payout, refund), never under a lock.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    quotes: QuoteService,
    splitter: PayoutSplitter,
    settings: LifecycleSettings,
}

impl BookingService {
    /// Create a new BookingService
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        quotes: QuoteService,
        settings: LifecycleSettings,
    ) -> Self {
        let splitter = PayoutSplitter::new(store.clone(), gateway.clone(), clock.clone());
        Self {
            store,
            gateway,
            clock,
            quotes,
            splitter,
            settings,
        }
    }

    pub fn settings(&self) -> LifecycleSettings {
        self.settings
    }

    /// Create a booking from a quote and charge the guest
    ///
    /// The booking is inserted as `pending_payment` first so its dates are
    /// held while the charge runs. The charged amount is exactly the quote's
    /// total plus deposit. On gateway failure the booking stays pending and
    /// `retry_payment` may be called with the same payment intent.
    ///
    /// # Errors
    /// - `Forbidden` unless the actor is a guest
    /// - `InvalidDateRange` when the dates were taken since the quote
    /// - `MissingPayoutAccount` when the host cannot be paid out
    /// - `GatewayFailure` when the charge fails
    pub async fn create_booking(
        &self,
        guest: &Actor,
        quote: &PriceBreakdown,
        payment_intent_id: &str,
    ) -> Result<Booking, BookingError> {
        if guest.role != ActorRole::Guest {
            return Err(BookingError::Forbidden("only guests can book a stay".to_string()));
        }
        quote.verify()?;

        let snapshot = self.quotes.listing_snapshot(quote.property_id).await?;
        let listing = &snapshot.listing;
        let payment_type = PaymentType::for_category(listing.category())
            .ok_or_else(|| QuoteError::NotBookable(listing.category().to_string()))?;
        let host_payout_account = listing
            .host_payout_account
            .clone()
            .filter(|account| !account.trim().is_empty())
            .ok_or(BookingError::MissingPayoutAccount(listing.property_id))?;

        let now = self.clock.now();
        let check_out_at = quote
            .check_out
            .and_time(listing.check_out_time)
            .and_utc();

        let booking = Booking {
            id: Uuid::new_v4(),
            property_id: quote.property_id,
            user_id: guest.user_id,
            host_user_id: listing.host_user_id,
            host_payout_account,
            check_in_date: quote.check_in,
            check_out_date: quote.check_out,
            check_out_at,
            guests_count: count_to_i32(quote.guests)?,
            pets_count: count_to_i32(quote.pets)?,
            status: BookingStatus::PendingPayment,
            payment_type,
            currency: quote.currency.clone(),
            total_amount: quote.total,
            booking_fee: quote.service_fee,
            security_deposit: quote.security_deposit,
            security_deposit_refundable: quote.security_deposit_refundable,
            cancellation_policy: listing.cancellation_policy,
            commission_rate: listing.commission_rate,
            payment_intent_id: payment_intent_id.to_string(),
            payment_id: None,
            escrow_release_eligible_at: None,
            auto_release_scheduled: false,
            guest_confirmed_completion: false,
            keys_received_at: None,
            completed_at: None,
            disputed_at: None,
            dispute_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            refund_amount: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let booking = self.store.insert_booking(&booking).await?;
        tracing::info!(
            booking_id = %booking.id,
            property_id = %booking.property_id,
            total = %booking.total_amount,
            "Booking created, awaiting payment"
        );

        self.charge_and_confirm(booking).await
    }

    /// Charge a booking that is still awaiting payment
    pub async fn retry_payment(&self, booking_id: Uuid, actor: &Actor) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        authorize(actor, &booking, &[ActorRole::Guest, ActorRole::Admin])?;
        self.charge_and_confirm(booking).await
    }

    async fn charge_and_confirm(&self, booking: Booking) -> Result<Booking, BookingError> {
        StatusMachine::transition(booking.status, BookingStatus::Confirmed)?;

        let amount = booking.amount_charged();
        let receipt = self
            .gateway
            .charge(ChargeRequest {
                payment_intent_id: booking.payment_intent_id.clone(),
                amount,
                currency: booking.currency.clone(),
                idempotency_key: IdempotencyKey::charge(booking.id),
            })
            .await
            .map_err(|err| {
                tracing::warn!(booking_id = %booking.id, error = %err, "Charge failed, booking stays pending");
                err
            })?;

        let now = self.clock.now();
        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            property_id: booking.property_id,
            user_id: booking.user_id,
            amount,
            deposit_amount: booking.security_deposit,
            currency: booking.currency.clone(),
            payment_type: booking.payment_type,
            status: PaymentStatus::Succeeded,
            escrow_status: EscrowStatus::Held,
            escrow_released_at: None,
            escrow_release_reason: None,
            charge_id: receipt.charge_id.clone(),
            stripe_payment_intent_id: booking.payment_intent_id.clone(),
            refund_id: None,
            refunded_amount: Decimal::ZERO,
            refunded_at: None,
            deposit_settled_at: None,
            last_error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut current = booking;
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut next = current.clone();
            next.status = BookingStatus::Confirmed;
            next.payment_id = Some(payment.id);
            next.escrow_release_eligible_at = Some(current.check_out_at + self.settings.escrow_grace);
            next.auto_release_scheduled = true;
            next.updated_at = now;

            match self.store.confirm_payment(&next, &payment).await {
                Ok((confirmed, _)) => {
                    tracing::info!(
                        booking_id = %confirmed.id,
                        payment_id = %payment.id,
                        amount = %amount,
                        "Payment captured, booking confirmed"
                    );
                    return Ok(confirmed);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::debug!(booking_id = %current.id, attempt, "Version conflict confirming payment");
                    current = self.load(current.id).await?;
                    match current.status {
                        BookingStatus::PendingPayment => continue,
                        // A concurrent retry recorded the same idempotent charge
                        BookingStatus::Confirmed if current.payment_id.is_some() => return Ok(current),
                        status => {
                            self.return_orphan_charge(&current, &receipt.charge_id, amount).await;
                            return Err(BookingError::InvalidTransition {
                                from: status,
                                to: BookingStatus::Confirmed,
                            });
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(BookingError::ConcurrentModification(current.id))
    }

    /// Refund a charge whose booking was cancelled while the charge was in flight
    async fn return_orphan_charge(&self, booking: &Booking, charge_id: &str, amount: Decimal) {
        let result = self
            .gateway
            .refund(RefundRequest {
                charge_id: charge_id.to_string(),
                amount,
                idempotency_key: IdempotencyKey::refund(booking.id),
            })
            .await;
        match result {
            Ok(receipt) => tracing::warn!(
                booking_id = %booking.id,
                refund_id = %receipt.refund_id,
                "Charge landed on a booking that is no longer pending; refunded"
            ),
            Err(err) => tracing::error!(
                booking_id = %booking.id,
                charge_id,
                error = %err,
                "Charge landed on a booking that is no longer pending and the refund failed"
            ),
        }
    }

    /// Fetch a booking visible to the actor
    pub async fn get_booking(&self, booking_id: Uuid, actor: &Actor) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        authorize(actor, &booking, &[ActorRole::Guest, ActorRole::Host, ActorRole::Admin])?;
        Ok(booking)
    }

    /// Payment funding a booking, if it was charged
    pub async fn payment_for(&self, booking: &Booking) -> Result<Option<Payment>, BookingError> {
        match booking.payment_id {
            Some(payment_id) => Ok(self.store.find_payment(payment_id).await?),
            None => Ok(None),
        }
    }

    /// Keys handed over: `confirmed → in_stay`
    pub async fn mark_keys_received(&self, booking_id: Uuid, actor: &Actor) -> Result<Booking, BookingError> {
        self.transition(
            booking_id,
            actor,
            &[ActorRole::Guest, ActorRole::Host, ActorRole::Admin],
            BookingStatus::InStay,
            |booking, now| {
                booking.keys_received_at = Some(now);
                Ok(())
            },
        )
        .await
    }

    /// Time-driven `confirmed → in_stay` once the check-in date arrives
    pub async fn begin_stay(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.transition(
            booking_id,
            &Actor::system(),
            &[ActorRole::System],
            BookingStatus::InStay,
            |booking, now| {
                if now.date_naive() < booking.check_in_date {
                    return Err(BookingError::NotYetDue(format!(
                        "check-in is on {}",
                        booking.check_in_date
                    )));
                }
                Ok(())
            },
        )
        .await
    }

    /// Guest confirms the stay is over: `in_stay → completed`, then settle
    pub async fn confirm_completion(&self, booking_id: Uuid, actor: &Actor) -> Result<Booking, BookingError> {
        let booking = self
            .transition(
                booking_id,
                actor,
                &[ActorRole::Guest],
                BookingStatus::Completed,
                |booking, now| {
                    if booking.status == BookingStatus::Disputed {
                        return Err(BookingError::Forbidden(
                            "only an admin can resolve a disputed booking".to_string(),
                        ));
                    }
                    booking.guest_confirmed_completion = true;
                    booking.completed_at = Some(now);
                    Ok(())
                },
            )
            .await?;
        self.after_completion(&booking).await;
        Ok(booking)
    }

    /// Time-driven auto-release: `in_stay → completed` once the grace period is over
    ///
    /// Never completes a disputed booking.
    pub async fn auto_complete(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .transition(
                booking_id,
                &Actor::system(),
                &[ActorRole::System],
                BookingStatus::Completed,
                |booking, now| {
                    if booking.status != BookingStatus::InStay {
                        return Err(BookingError::InvalidTransition {
                            from: booking.status,
                            to: BookingStatus::Completed,
                        });
                    }
                    match booking.escrow_release_eligible_at {
                        Some(eligible_at) if booking.auto_release_scheduled && now >= eligible_at => {}
                        eligible_at => {
                            return Err(BookingError::NotYetDue(format!(
                                "escrow release eligible at {:?}",
                                eligible_at
                            )))
                        }
                    }
                    booking.completed_at = Some(now);
                    Ok(())
                },
            )
            .await?;
        self.after_completion(&booking).await;
        Ok(booking)
    }

    /// Admin override from `in_stay` or `disputed`
    pub async fn admin_complete(&self, booking_id: Uuid, actor: &Actor) -> Result<Booking, BookingError> {
        let booking = self
            .transition(
                booking_id,
                actor,
                &[ActorRole::Admin],
                BookingStatus::Completed,
                |booking, now| {
                    booking.completed_at = Some(now);
                    Ok(())
                },
            )
            .await?;
        self.after_completion(&booking).await;
        Ok(booking)
    }

    /// Open a dispute during the stay and freeze the escrow
    pub async fn open_dispute(&self, booking_id: Uuid, actor: &Actor, reason: &str) -> Result<Booking, BookingError> {
        let booking = self
            .transition(
                booking_id,
                actor,
                &[ActorRole::Guest, ActorRole::Host],
                BookingStatus::Disputed,
                |booking, now| {
                    booking.disputed_at = Some(now);
                    booking.dispute_reason = Some(reason.to_string());
                    booking.auto_release_scheduled = false;
                    Ok(())
                },
            )
            .await?;

        if let Some(payment_id) = booking.payment_id {
            let now = self.clock.now();
            update_payment_with(self.store.as_ref(), payment_id, |payment| {
                if payment.escrow_status != EscrowStatus::Held {
                    return false;
                }
                payment.escrow_status = EscrowStatus::Frozen;
                payment.updated_at = now;
                true
            })
            .await?;
        }

        tracing::info!(booking_id = %booking.id, actor = %actor.role, "Dispute opened, escrow frozen");
        Ok(booking)
    }

    /// Cancel a booking and return the refund owed on its total
    ///
    /// The refund is computed against the original total. The security
    /// deposit goes back in full on top of it. A failed refund is recorded on
    /// the payment and retried by `reconcile`; the cancellation itself stands.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        reason: &str,
    ) -> Result<Decimal, BookingError> {
        let booking = self
            .transition(
                booking_id,
                actor,
                &[ActorRole::Guest, ActorRole::Host, ActorRole::Admin, ActorRole::System],
                BookingStatus::Cancelled,
                |booking, now| {
                    if booking.status == BookingStatus::Disputed && !actor.is_admin() {
                        return Err(BookingError::Forbidden(
                            "only an admin can resolve a disputed booking".to_string(),
                        ));
                    }
                    let refund = cancellation::refund_amount(&CancellationTerms {
                        policy: booking.cancellation_policy,
                        status: booking.status,
                        total_amount: booking.total_amount,
                        check_in_date: booking.check_in_date,
                        cancelled_on: now.date_naive(),
                        initiated_by: actor.role,
                    });
                    booking.cancelled_at = Some(now);
                    booking.cancelled_by = Some(actor.role);
                    booking.cancellation_reason = Some(reason.to_string());
                    booking.refund_amount = Some(refund);
                    booking.auto_release_scheduled = false;
                    Ok(())
                },
            )
            .await?;

        let refund = booking.refund_amount.unwrap_or(Decimal::ZERO);
        tracing::info!(
            booking_id = %booking.id,
            cancelled_by = %actor.role,
            refund = %refund,
            "Booking cancelled"
        );

        if let Err(err) = self.settle_cancellation(&booking).await {
            tracing::warn!(booking_id = %booking.id, error = %err, "Cancellation refund pending reconciliation");
        }
        Ok(refund)
    }

    /// Refund a cancelled booking's escrow, or release it when nothing is owed
    async fn settle_cancellation(&self, booking: &Booking) -> Result<(), BookingError> {
        let Some(payment) = self.payment_for(booking).await? else {
            return Ok(());
        };
        if !payment.escrow_status.is_holding() {
            return Ok(());
        }

        let owed = booking.refund_amount.unwrap_or(Decimal::ZERO) + payment.deposit_amount;
        let now = self.clock.now();

        if owed <= Decimal::ZERO {
            update_payment_with(self.store.as_ref(), payment.id, |current| {
                if !current.escrow_status.is_holding() {
                    return false;
                }
                current.escrow_status = EscrowStatus::Released;
                current.escrow_released_at = Some(now);
                current.escrow_release_reason = Some(RELEASE_REASON_CANCELLATION_RETAINED.to_string());
                current.updated_at = now;
                true
            })
            .await?;
            return Ok(());
        }

        let result = self
            .gateway
            .refund(RefundRequest {
                charge_id: payment.charge_id.clone(),
                amount: owed,
                idempotency_key: IdempotencyKey::refund(booking.id),
            })
            .await;

        match result {
            Ok(receipt) => {
                update_payment_with(self.store.as_ref(), payment.id, |current| {
                    // Same refund key: a concurrent retry already recorded it
                    if !current.escrow_status.is_holding() {
                        return false;
                    }
                    let full = owed >= current.amount;
                    current.refund_id = Some(receipt.refund_id.clone());
                    current.refunded_amount += owed;
                    current.refunded_at = Some(now);
                    current.deposit_settled_at = Some(now);
                    current.status = if full {
                        PaymentStatus::Refunded
                    } else {
                        PaymentStatus::PartiallyRefunded
                    };
                    current.escrow_status = if full {
                        EscrowStatus::Refunded
                    } else {
                        EscrowStatus::PartiallyRefunded
                    };
                    current.escrow_released_at = Some(now);
                    current.escrow_release_reason = Some(RELEASE_REASON_CANCELLATION_REFUND.to_string());
                    current.last_error = None;
                    current.updated_at = now;
                    true
                })
                .await?;
                tracing::info!(booking_id = %booking.id, amount = %owed, "Cancellation refund issued");
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                update_payment_with(self.store.as_ref(), payment.id, |current| {
                    current.last_error = Some(message.clone());
                    current.updated_at = now;
                    true
                })
                .await?;
                Err(err.into())
            }
        }
    }

    /// Settle the host payout and the deposit of a freshly completed booking
    ///
    /// The completion already stands, so failures are logged and left to `reconcile`.
    async fn after_completion(&self, booking: &Booking) {
        tracing::info!(booking_id = %booking.id, "Booking completed");

        if let Err(err) = self.splitter.settle(booking).await {
            match err {
                BookingError::DoubleSettlementAttempt { .. } => {
                    tracing::warn!(booking_id = %booking.id, "Settlement already recorded")
                }
                other => {
                    tracing::warn!(booking_id = %booking.id, error = %other, "Settlement pending reconciliation")
                }
            }
        }

        if let Err(err) = self.settle_deposit(booking).await {
            tracing::warn!(booking_id = %booking.id, error = %err, "Deposit settlement pending reconciliation");
        }
    }

    async fn settle_deposit(&self, booking: &Booking) -> Result<(), BookingError> {
        if let Some(payment) = self.payment_for(booking).await? {
            self.splitter.settle_deposit(booking, payment).await?;
        }
        Ok(())
    }

    /// Propose every time-driven transition that is due
    ///
    /// The sweep only proposes; the state machine and guards decide. A
    /// rejected proposal is normal (a guest may have acted first) and is
    /// logged at debug level.
    pub async fn run_scheduled_transitions(&self) -> Result<SweepReport, BookingError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for booking in self.store.confirmed_due_for_check_in(now.date_naive()).await? {
            match self.begin_stay(booking.id).await {
                Ok(_) => report.started += 1,
                Err(err) => {
                    tracing::debug!(booking_id = %booking.id, error = %err, "Check-in proposal rejected");
                    report.rejected += 1;
                }
            }
        }

        for booking in self.store.in_stay_due_for_release(now).await? {
            match self.auto_complete(booking.id).await {
                Ok(_) => report.completed += 1,
                Err(err) => {
                    tracing::debug!(booking_id = %booking.id, error = %err, "Auto-release proposal rejected");
                    report.rejected += 1;
                }
            }
        }

        let cutoff = now - self.settings.pending_payment_ttl;
        for booking in self.store.pending_created_before(cutoff).await? {
            match self
                .cancel_booking(booking.id, &Actor::system(), PAYMENT_TIMEOUT_REASON)
                .await
            {
                Ok(_) => report.expired += 1,
                Err(err) => {
                    tracing::debug!(booking_id = %booking.id, error = %err, "Payment timeout proposal rejected");
                    report.rejected += 1;
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                started = report.started,
                completed = report.completed,
                expired = report.expired,
                rejected = report.rejected,
                "Scheduled sweep finished"
            );
        }
        Ok(report)
    }

    /// Retry every settlement and refund that is owed but not done
    ///
    /// Payouts are retried from the stored commission row, never recomputed.
    pub async fn reconcile(&self) -> Result<ReconcileReport, BookingError> {
        let mut report = ReconcileReport::default();

        for booking in self.store.completed_without_commission().await? {
            match self.splitter.settle(&booking).await {
                Ok(_) => report.settled += 1,
                Err(BookingError::DoubleSettlementAttempt { .. }) => {}
                Err(err) => {
                    tracing::warn!(booking_id = %booking.id, error = %err, "Reconcile settlement failed");
                    report.failures += 1;
                }
            }
        }

        for commission in self.store.unsettled_commissions().await? {
            let commission_id = commission.id;
            match self.splitter.retry_payout(commission).await {
                Ok(_) => report.payouts_retried += 1,
                Err(err) => {
                    tracing::warn!(%commission_id, error = %err, "Reconcile payout failed");
                    report.failures += 1;
                }
            }
        }

        for booking in self.store.cancelled_awaiting_refund().await? {
            match self.settle_cancellation(&booking).await {
                Ok(()) => report.refunds_retried += 1,
                Err(err) => {
                    tracing::warn!(booking_id = %booking.id, error = %err, "Reconcile refund failed");
                    report.failures += 1;
                }
            }
        }

        for booking in self.store.completed_with_unsettled_deposit().await? {
            match self.settle_deposit(&booking).await {
                Ok(()) => report.deposits_settled += 1,
                Err(err) => {
                    tracing::warn!(booking_id = %booking.id, error = %err, "Reconcile deposit failed");
                    report.failures += 1;
                }
            }
        }

        if report == ReconcileReport::default() {
            return Ok(report);
        }
        tracing::info!(
            settled = report.settled,
            payouts_retried = report.payouts_retried,
            refunds_retried = report.refunds_retried,
            deposits_settled = report.deposits_settled,
            failures = report.failures,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn load(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    /// Read, validate and write one status change with a version check
    ///
    /// On a version conflict the booking is re-read and the whole move is
    /// re-validated, so a racing trigger sees the winner's status.
    async fn transition<F>(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        allowed: &[ActorRole],
        to: BookingStatus,
        mut apply: F,
    ) -> Result<Booking, BookingError>
    where
        F: FnMut(&mut Booking, DateTime<Utc>) -> Result<(), BookingError> + Send,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let mut booking = self.load(booking_id).await?;
            authorize(actor, &booking, allowed)?;
            let from = booking.status;
            StatusMachine::transition(from, to)?;

            let now = self.clock.now();
            apply(&mut booking, now)?;
            booking.status = to;
            booking.updated_at = now;

            match self.store.update_booking(&booking).await {
                Ok(updated) => {
                    tracing::info!(
                        %booking_id,
                        %from,
                        %to,
                        actor = %actor.role,
                        "Booking status changed"
                    );
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::debug!(%booking_id, attempt, "Version conflict, re-reading booking");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(BookingError::ConcurrentModification(booking_id))
    }
}

/// Check the actor may act on the booking in one of the allowed roles
fn authorize(actor: &Actor, booking: &Booking, allowed: &[ActorRole]) -> Result<(), BookingError> {
    if !allowed.contains(&actor.role) {
        return Err(BookingError::Forbidden(format!(
            "{} cannot perform this action",
            actor.role
        )));
    }
    let permitted = match actor.role {
        ActorRole::Guest => actor.is_guest_of(booking),
        ActorRole::Host => actor.is_host_of(booking),
        ActorRole::Admin | ActorRole::System => true,
    };
    if permitted {
        Ok(())
    } else {
        Err(BookingError::Forbidden(format!(
            "booking {} does not belong to this {}",
            booking.id, actor.role
        )))
    }
}

fn count_to_i32(count: u32) -> Result<i32, BookingError> {
    i32::try_from(count)
        .map_err(|_| BookingError::InvariantViolation(format!("count {} out of range", count)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    use crate::pricing::models::CancellationPolicy;

    fn booking(guest: Uuid, host: Uuid) -> Booking {
        let created = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        Booking {
            id: Uuid::from_u128(1),
            property_id: Uuid::from_u128(2),
            user_id: guest,
            host_user_id: host,
            host_payout_account: "acct_host".to_string(),
            check_in_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            check_out_date: NaiveDate::from_ymd_opt(2025, 8, 4).unwrap(),
            check_out_at: Utc.with_ymd_and_hms(2025, 8, 4, 11, 0, 0).unwrap(),
            guests_count: 2,
            pets_count: 0,
            status: BookingStatus::Confirmed,
            payment_type: PaymentType::ShortStay,
            currency: "USD".to_string(),
            total_amount: dec!(367.50),
            booking_fee: dec!(30),
            security_deposit: dec!(0),
            security_deposit_refundable: true,
            cancellation_policy: CancellationPolicy::Moderate,
            commission_rate: dec!(15),
            payment_intent_id: "pi_1".to_string(),
            payment_id: None,
            escrow_release_eligible_at: None,
            auto_release_scheduled: false,
            guest_confirmed_completion: false,
            keys_received_at: None,
            completed_at: None,
            disputed_at: None,
            dispute_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            refund_amount: None,
            version: 0,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_authorize_owner_guest() {
        let guest = Uuid::from_u128(10);
        let b = booking(guest, Uuid::from_u128(20));
        let actor = Actor::new(guest, ActorRole::Guest);
        assert!(authorize(&actor, &b, &[ActorRole::Guest]).is_ok());
    }

    #[test]
    fn test_authorize_rejects_other_guest() {
        let b = booking(Uuid::from_u128(10), Uuid::from_u128(20));
        let stranger = Actor::new(Uuid::from_u128(11), ActorRole::Guest);
        assert!(matches!(
            authorize(&stranger, &b, &[ActorRole::Guest]),
            Err(BookingError::Forbidden(_))
        ));
    }

    #[test]
    fn test_authorize_rejects_role_not_allowed() {
        let host = Uuid::from_u128(20);
        let b = booking(Uuid::from_u128(10), host);
        let actor = Actor::new(host, ActorRole::Host);
        assert!(authorize(&actor, &b, &[ActorRole::Host]).is_ok());
        assert!(authorize(&actor, &b, &[ActorRole::Guest]).is_err());
    }

    #[test]
    fn test_admin_and_system_act_on_any_booking() {
        let b = booking(Uuid::from_u128(10), Uuid::from_u128(20));
        let admin = Actor::new(Uuid::from_u128(99), ActorRole::Admin);
        assert!(authorize(&admin, &b, &[ActorRole::Admin]).is_ok());
        assert!(authorize(&Actor::system(), &b, &[ActorRole::System]).is_ok());
    }

    #[test]
    fn test_default_settings() {
        let settings = LifecycleSettings::default();
        assert_eq!(settings.escrow_grace, Duration::hours(48));
        assert_eq!(settings.pending_payment_ttl, Duration::minutes(30));
    }

    #[test]
    fn test_count_conversion() {
        assert_eq!(count_to_i32(4).unwrap(), 4);
        assert!(count_to_i32(u32::MAX).is_err());
    }
}
