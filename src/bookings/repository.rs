use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::bookings::models::{Booking, BookingStatus, CommissionTransaction, Payment};
use crate::db::StoreError;

/// Write side of the persistence boundary
///
/// Every write is atomic per row. Booking updates are compare-and-swap on
/// `version` and fail with `VersionConflict` when the row moved underneath.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a new booking; fails with `DateRangeUnavailable` when an active
    /// booking of the same property overlaps
    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, StoreError>;

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Persist the mutable fields of `booking` if its version is still current
    async fn update_booking(&self, booking: &Booking) -> Result<Booking, StoreError>;

    /// Record a successful charge and the booking's move to `confirmed` together
    async fn confirm_payment(&self, booking: &Booking, payment: &Payment) -> Result<(Booking, Payment), StoreError>;

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    /// Version-checked write; `PaymentVersionConflict` when the row changed since it was read
    async fn update_payment(&self, payment: &Payment) -> Result<Payment, StoreError>;

    /// Insert the one commission row of a payment; `DuplicateCommission` on a second insert
    async fn insert_commission(&self, commission: &CommissionTransaction) -> Result<CommissionTransaction, StoreError>;

    async fn find_commission_by_payment(&self, payment_id: Uuid) -> Result<Option<CommissionTransaction>, StoreError>;

    /// Persist payout progress; a completed commission is never overwritten
    async fn update_commission(&self, commission: &CommissionTransaction) -> Result<CommissionTransaction, StoreError>;

    /// Confirmed bookings whose check-in date has arrived
    async fn confirmed_due_for_check_in(&self, today: NaiveDate) -> Result<Vec<Booking>, StoreError>;

    /// In-stay bookings past their escrow release time
    async fn in_stay_due_for_release(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError>;

    /// Bookings still awaiting payment that were created before `cutoff`
    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, StoreError>;

    async fn completed_without_commission(&self) -> Result<Vec<Booking>, StoreError>;

    /// Commissions whose payout is pending or failed
    async fn unsettled_commissions(&self) -> Result<Vec<CommissionTransaction>, StoreError>;

    /// Cancelled bookings whose payment is still held in escrow
    async fn cancelled_awaiting_refund(&self) -> Result<Vec<Booking>, StoreError>;

    /// Completed bookings whose security deposit has not been settled
    async fn completed_with_unsettled_deposit(&self) -> Result<Vec<Booking>, StoreError>;
}

const BOOKING_COLUMNS: &str = r#"
    id, property_id, user_id, host_user_id, host_payout_account, check_in_date, check_out_date,
    check_out_at, guests_count, pets_count, status, payment_type, currency, total_amount,
    booking_fee, security_deposit, security_deposit_refundable, cancellation_policy,
    commission_rate, payment_intent_id, payment_id, escrow_release_eligible_at,
    auto_release_scheduled, guest_confirmed_completion, keys_received_at, completed_at,
    disputed_at, dispute_reason, cancelled_at, cancelled_by, cancellation_reason, refund_amount,
    version, created_at, updated_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, booking_id, property_id, user_id, amount, deposit_amount, currency, payment_type, status,
    escrow_status, escrow_released_at, escrow_release_reason, charge_id, stripe_payment_intent_id,
    refund_id, refunded_amount, refunded_at, deposit_settled_at, last_error, version, created_at,
    updated_at
"#;

const COMMISSION_COLUMNS: &str = r#"
    id, payment_id, booking_id, property_id, host_user_id, destination_account, currency,
    total_amount, commission_rate, commission_amount, host_amount, status, stripe_transfer_id,
    escrow_released_at, attempts, failure_reason, created_at, updated_at
"#;

/// PostgreSQL-backed booking, payment and commission rows
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Create a new PgBookingStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn bookings_where(&self, condition: &str) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bookings b WHERE {} ORDER BY b.created_at",
            BOOKING_COLUMNS, condition
        );
        let bookings = sqlx::query_as::<_, Booking>(&sql).fetch_all(&self.pool).await?;
        Ok(bookings)
    }

    /// Map a CAS miss to NotFound or VersionConflict
    async fn version_miss(&self, booking_id: Uuid) -> StoreError {
        let exists: Result<Option<(Uuid,)>, sqlx::Error> =
            sqlx::query_as("SELECT id FROM bookings WHERE id = $1")
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await;
        match exists {
            Ok(Some(_)) => StoreError::VersionConflict { booking_id },
            Ok(None) => StoreError::NotFound {
                entity: "Booking",
                id: booking_id,
            },
            Err(err) => StoreError::Database(err),
        }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO bookings ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                    $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35)
            RETURNING {columns}
            "#,
            columns = BOOKING_COLUMNS
        );

        let result = sqlx::query_as::<_, Booking>(&sql)
            .bind(booking.id)
            .bind(booking.property_id)
            .bind(booking.user_id)
            .bind(booking.host_user_id)
            .bind(&booking.host_payout_account)
            .bind(booking.check_in_date)
            .bind(booking.check_out_date)
            .bind(booking.check_out_at)
            .bind(booking.guests_count)
            .bind(booking.pets_count)
            .bind(booking.status)
            .bind(booking.payment_type)
            .bind(&booking.currency)
            .bind(booking.total_amount)
            .bind(booking.booking_fee)
            .bind(booking.security_deposit)
            .bind(booking.security_deposit_refundable)
            .bind(booking.cancellation_policy)
            .bind(booking.commission_rate)
            .bind(&booking.payment_intent_id)
            .bind(booking.payment_id)
            .bind(booking.escrow_release_eligible_at)
            .bind(booking.auto_release_scheduled)
            .bind(booking.guest_confirmed_completion)
            .bind(booking.keys_received_at)
            .bind(booking.completed_at)
            .bind(booking.disputed_at)
            .bind(&booking.dispute_reason)
            .bind(booking.cancelled_at)
            .bind(booking.cancelled_by)
            .bind(&booking.cancellation_reason)
            .bind(booking.refund_amount)
            .bind(booking.version)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(inserted) => Ok(inserted),
            Err(err) if StoreError::is_exclusion_violation(&err) => {
                Err(StoreError::DateRangeUnavailable {
                    property_id: booking.property_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let booking = sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn update_booking(&self, booking: &Booking) -> Result<Booking, StoreError> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $1, payment_id = $2, escrow_release_eligible_at = $3,
                auto_release_scheduled = $4, guest_confirmed_completion = $5, keys_received_at = $6,
                completed_at = $7, disputed_at = $8, dispute_reason = $9, cancelled_at = $10,
                cancelled_by = $11, cancellation_reason = $12, refund_amount = $13, updated_at = $14,
                version = version + 1
            WHERE id = $15 AND version = $16
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );

        let updated = sqlx::query_as::<_, Booking>(&sql)
            .bind(booking.status)
            .bind(booking.payment_id)
            .bind(booking.escrow_release_eligible_at)
            .bind(booking.auto_release_scheduled)
            .bind(booking.guest_confirmed_completion)
            .bind(booking.keys_received_at)
            .bind(booking.completed_at)
            .bind(booking.disputed_at)
            .bind(&booking.dispute_reason)
            .bind(booking.cancelled_at)
            .bind(booking.cancelled_by)
            .bind(&booking.cancellation_reason)
            .bind(booking.refund_amount)
            .bind(booking.updated_at)
            .bind(booking.id)
            .bind(booking.version)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Ok(row),
            None => Err(self.version_miss(booking.id).await),
        }
    }

    async fn confirm_payment(&self, booking: &Booking, payment: &Payment) -> Result<(Booking, Payment), StoreError> {
        let mut tx = self.pool.begin().await?;

        let insert_sql = format!(
            r#"
            INSERT INTO payments ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19,
                    $20, $21, $22)
            RETURNING {columns}
            "#,
            columns = PAYMENT_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Payment>(&insert_sql)
            .bind(payment.id)
            .bind(payment.booking_id)
            .bind(payment.property_id)
            .bind(payment.user_id)
            .bind(payment.amount)
            .bind(payment.deposit_amount)
            .bind(&payment.currency)
            .bind(payment.payment_type)
            .bind(payment.status)
            .bind(payment.escrow_status)
            .bind(payment.escrow_released_at)
            .bind(&payment.escrow_release_reason)
            .bind(&payment.charge_id)
            .bind(&payment.stripe_payment_intent_id)
            .bind(&payment.refund_id)
            .bind(payment.refunded_amount)
            .bind(payment.refunded_at)
            .bind(payment.deposit_settled_at)
            .bind(&payment.last_error)
            .bind(payment.version)
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .fetch_one(&mut *tx)
            .await;
        // One payment per booking; a concurrent confirmation already won
        let inserted = match inserted {
            Ok(row) => row,
            Err(err) if StoreError::is_unique_violation(&err) => {
                return Err(StoreError::VersionConflict {
                    booking_id: booking.id,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let update_sql = format!(
            r#"
            UPDATE bookings
            SET status = $1, payment_id = $2, escrow_release_eligible_at = $3,
                auto_release_scheduled = $4, updated_at = $5, version = version + 1
            WHERE id = $6 AND version = $7
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let updated = sqlx::query_as::<_, Booking>(&update_sql)
            .bind(booking.status)
            .bind(booking.payment_id)
            .bind(booking.escrow_release_eligible_at)
            .bind(booking.auto_release_scheduled)
            .bind(booking.updated_at)
            .bind(booking.id)
            .bind(booking.version)
            .fetch_optional(&mut *tx)
            .await?;

        match updated {
            Some(row) => {
                tx.commit().await?;
                Ok((row, inserted))
            }
            None => {
                tx.rollback().await?;
                Err(self.version_miss(booking.id).await)
            }
        }
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    async fn update_payment(&self, payment: &Payment) -> Result<Payment, StoreError> {
        let sql = format!(
            r#"
            UPDATE payments
            SET status = $1, escrow_status = $2, escrow_released_at = $3, escrow_release_reason = $4,
                refund_id = $5, refunded_amount = $6, refunded_at = $7, deposit_settled_at = $8,
                last_error = $9, updated_at = $10, version = version + 1
            WHERE id = $11 AND version = $12
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );
        let updated = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment.status)
            .bind(payment.escrow_status)
            .bind(payment.escrow_released_at)
            .bind(&payment.escrow_release_reason)
            .bind(&payment.refund_id)
            .bind(payment.refunded_amount)
            .bind(payment.refunded_at)
            .bind(payment.deposit_settled_at)
            .bind(&payment.last_error)
            .bind(payment.updated_at)
            .bind(payment.id)
            .bind(payment.version)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Ok(row),
            None => match self.find_payment(payment.id).await? {
                Some(_) => Err(StoreError::PaymentVersionConflict {
                    payment_id: payment.id,
                }),
                None => Err(StoreError::NotFound {
                    entity: "Payment",
                    id: payment.id,
                }),
            },
        }
    }

    async fn insert_commission(&self, commission: &CommissionTransaction) -> Result<CommissionTransaction, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO commission_transactions ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {columns}
            "#,
            columns = COMMISSION_COLUMNS
        );
        let result = sqlx::query_as::<_, CommissionTransaction>(&sql)
            .bind(commission.id)
            .bind(commission.payment_id)
            .bind(commission.booking_id)
            .bind(commission.property_id)
            .bind(commission.host_user_id)
            .bind(&commission.destination_account)
            .bind(&commission.currency)
            .bind(commission.total_amount)
            .bind(commission.commission_rate)
            .bind(commission.commission_amount)
            .bind(commission.host_amount)
            .bind(commission.status)
            .bind(&commission.stripe_transfer_id)
            .bind(commission.escrow_released_at)
            .bind(commission.attempts)
            .bind(&commission.failure_reason)
            .bind(commission.created_at)
            .bind(commission.updated_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(row),
            Err(err) if StoreError::is_unique_violation(&err) => Err(StoreError::DuplicateCommission {
                payment_id: commission.payment_id,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_commission_by_payment(&self, payment_id: Uuid) -> Result<Option<CommissionTransaction>, StoreError> {
        let sql = format!(
            "SELECT {} FROM commission_transactions WHERE payment_id = $1",
            COMMISSION_COLUMNS
        );
        let commission = sqlx::query_as::<_, CommissionTransaction>(&sql)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(commission)
    }

    async fn update_commission(&self, commission: &CommissionTransaction) -> Result<CommissionTransaction, StoreError> {
        let sql = format!(
            r#"
            UPDATE commission_transactions
            SET status = $1, stripe_transfer_id = $2, escrow_released_at = $3, attempts = $4,
                failure_reason = $5, updated_at = $6
            WHERE id = $7 AND status <> 'completed'
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        );
        let updated = sqlx::query_as::<_, CommissionTransaction>(&sql)
            .bind(commission.status)
            .bind(&commission.stripe_transfer_id)
            .bind(commission.escrow_released_at)
            .bind(commission.attempts)
            .bind(&commission.failure_reason)
            .bind(commission.updated_at)
            .bind(commission.id)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Ok(row),
            None => self
                .find_commission_by_payment(commission.payment_id)
                .await?
                .ok_or(StoreError::NotFound {
                    entity: "CommissionTransaction",
                    id: commission.id,
                }),
        }
    }

    async fn confirmed_due_for_check_in(&self, today: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = 'confirmed' AND check_in_date <= $1 ORDER BY check_in_date",
            BOOKING_COLUMNS
        );
        let bookings = sqlx::query_as::<_, Booking>(&sql)
            .bind(today)
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    async fn in_stay_due_for_release(&self, now: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM bookings
            WHERE status = 'in_stay' AND auto_release_scheduled AND escrow_release_eligible_at <= $1
            ORDER BY escrow_release_eligible_at
            "#,
            BOOKING_COLUMNS
        );
        let bookings = sqlx::query_as::<_, Booking>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = 'pending_payment' AND created_at < $1 ORDER BY created_at",
            BOOKING_COLUMNS
        );
        let bookings = sqlx::query_as::<_, Booking>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    async fn completed_without_commission(&self) -> Result<Vec<Booking>, StoreError> {
        self.bookings_where(
            r#"b.status = 'completed' AND b.payment_id IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM commission_transactions c WHERE c.payment_id = b.payment_id)"#,
        )
        .await
    }

    async fn unsettled_commissions(&self) -> Result<Vec<CommissionTransaction>, StoreError> {
        let sql = format!(
            "SELECT {} FROM commission_transactions WHERE status IN ('pending', 'failed') ORDER BY created_at",
            COMMISSION_COLUMNS
        );
        let commissions = sqlx::query_as::<_, CommissionTransaction>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(commissions)
    }

    async fn cancelled_awaiting_refund(&self) -> Result<Vec<Booking>, StoreError> {
        self.bookings_where(
            r#"b.status = 'cancelled'
               AND EXISTS (SELECT 1 FROM payments p
                           WHERE p.id = b.payment_id AND p.escrow_status IN ('held', 'frozen'))"#,
        )
        .await
    }

    async fn completed_with_unsettled_deposit(&self) -> Result<Vec<Booking>, StoreError> {
        self.bookings_where(
            r#"b.status = 'completed'
               AND EXISTS (SELECT 1 FROM payments p
                           WHERE p.id = b.payment_id AND p.deposit_amount > 0
                             AND p.deposit_settled_at IS NULL)"#,
        )
        .await
    }
}
