use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::bookings::service::BookingService;

/// Periodically run the lifecycle sweep and the reconciliation pass
///
/// Each tick proposes the due transitions first, then retries owed payouts
/// and refunds. Errors are logged and the loop keeps going.
pub fn spawn_lifecycle_sweeper(service: BookingService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = every.as_secs(), "Lifecycle sweeper started");

        loop {
            ticker.tick().await;

            if let Err(err) = service.run_scheduled_transitions().await {
                tracing::error!(error = %err, "Scheduled sweep failed");
            }
            if let Err(err) = service.reconcile().await {
                tracing::error!(error = %err, "Reconciliation failed");
            }
        }
    })
}
