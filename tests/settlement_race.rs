// Concurrent completion triggers must settle a booking exactly once
// and never lose each other's payment writes

mod common;

use async_trait::async_trait;
use proptest::prelude::*;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use common::*;
use stay_ledger::bookings::{BookingError, BookingStatus, CommissionStatus, EscrowStatus};
use stay_ledger::gateway::{
    ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway, RefundReceipt, RefundRequest,
    SandboxGateway, TransferReceipt, TransferRequest,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Race guest confirmation against the auto-release job and return how many won
async fn race(guest_delay_us: u64, job_delay_us: u64, via_sweep: bool) -> (Harness, usize) {
    let harness = Harness::new();
    let booking = harness.book_and_check_in().await;
    // Same logical instant: past the grace period, guest still confirming
    harness.clock.set(at(2025, 6, 7, 11, 0));

    let service = harness.bookings().clone();
    let guest_trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_micros(guest_delay_us)).await;
        service.confirm_completion(booking.id, &guest()).await.map(|_| ())
    });

    let service = harness.bookings().clone();
    let job_trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_micros(job_delay_us)).await;
        if via_sweep {
            service
                .run_scheduled_transitions()
                .await
                .map(|report| report.completed == 1)
        } else {
            service.auto_complete(booking.id).await.map(|_| true)
        }
    });

    let mut winners = 0;
    match guest_trigger.await.unwrap() {
        Ok(()) => winners += 1,
        Err(err) => assert!(
            matches!(err, BookingError::InvalidTransition { .. }),
            "unexpected guest error: {err}"
        ),
    }
    match job_trigger.await.unwrap() {
        Ok(true) => winners += 1,
        Ok(false) => {}
        Err(err) => assert!(
            matches!(err, BookingError::InvalidTransition { .. }),
            "unexpected job error: {err}"
        ),
    }

    (harness, winners)
}

#[test]
fn test_simultaneous_triggers_settle_once() {
    let rt = runtime();
    let (harness, winners) = rt.block_on(race(0, 0, false));
    assert_eq!(winners, 1);

    rt.block_on(async {
        assert_eq!(harness.store.commissions().len(), 1);
        assert_eq!(harness.gateway.transfers().await.len(), 1);
    });
}

/// Holds the first refund in flight until the test releases it
struct RefundGate {
    armed: AtomicBool,
    started: Notify,
    proceed: Notify,
}

impl RefundGate {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(true),
            started: Notify::new(),
            proceed: Notify::new(),
        }
    }
}

struct GatedRefunds {
    inner: Arc<SandboxGateway>,
    gate: Arc<RefundGate>,
}

#[async_trait]
impl PaymentGateway for GatedRefunds {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.inner.charge(request).await
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, GatewayError> {
        self.inner.transfer(request).await
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, GatewayError> {
        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.started.notify_one();
            self.gate.proceed.notified().await;
        }
        self.inner.refund(request).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_deposit_refund_keeps_reconciled_release() {
    let gate = Arc::new(RefundGate::new());
    let wrapped = gate.clone();
    let harness = Harness::with_gateway(listing_with_deposit(dec!(200), true), fee_table(), move |sandbox| -> Arc<dyn PaymentGateway> {
        Arc::new(GatedRefunds { inner: sandbox, gate: wrapped })
    });
    let booking = harness.book_and_check_in().await;
    harness.clock.set(at(2025, 6, 5, 12, 0));
    harness.gateway.fail_next_transfers(1).await;

    let service = harness.bookings().clone();
    let completion = tokio::spawn(async move { service.confirm_completion(booking.id, &guest()).await });

    // Payout failed and the deposit refund is now stuck at the gateway
    gate.started.notified().await;
    assert_eq!(harness.store.commissions()[0].status, CommissionStatus::Failed);

    let report = harness.bookings().reconcile().await.unwrap();
    assert_eq!(report.payouts_retried, 1);
    assert_eq!(report.deposits_settled, 1);
    assert_eq!(harness.store.payments()[0].escrow_status, EscrowStatus::Released);

    gate.proceed.notify_one();
    let completed = completion.await.unwrap().unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);

    let payment = harness.store.payments().remove(0);
    assert_eq!(payment.escrow_status, EscrowStatus::Released);
    assert!(payment.escrow_released_at.is_some());
    assert!(payment.deposit_settled_at.is_some());
    assert_eq!(payment.refunded_amount, dec!(200));

    assert_eq!(harness.gateway.refunds().await.len(), 1);
    let commissions = harness.store.commissions();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].status, CommissionStatus::Completed);
}

mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_one_commission_and_one_payout(
            guest_delay_us in 0u64..200,
            job_delay_us in 0u64..200,
            via_sweep in any::<bool>(),
        ) {
            let rt = runtime();
            let (harness, winners) = rt.block_on(race(guest_delay_us, job_delay_us, via_sweep));

            prop_assert_eq!(winners, 1);

            let commissions = harness.store.commissions();
            prop_assert_eq!(commissions.len(), 1);
            prop_assert_eq!(commissions[0].status, CommissionStatus::Completed);
            prop_assert_eq!(
                commissions[0].commission_amount + commissions[0].host_amount,
                commissions[0].total_amount
            );

            let transfers = rt.block_on(harness.gateway.transfers());
            prop_assert_eq!(transfers.len(), 1);

            let booking_id = commissions[0].booking_id;
            let booking = rt
                .block_on(harness.bookings().get_booking(booking_id, &admin()))
                .unwrap();
            prop_assert_eq!(booking.status, BookingStatus::Completed);
        }
    }
}
