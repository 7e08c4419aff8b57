use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pricing::models::{CancellationPolicy, DateRange, ListingCategory};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    InStay,
    Completed,
    Cancelled,
    Disputed,
}

impl BookingStatus {
    /// Statuses that hold the booked dates on the calendar
    pub const ACTIVE: [BookingStatus; 4] = [
        BookingStatus::PendingPayment,
        BookingStatus::Confirmed,
        BookingStatus::InStay,
        BookingStatus::Disputed,
    ];

    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::PendingPayment,
        BookingStatus::Confirmed,
        BookingStatus::InStay,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Disputed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InStay => "in_stay",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Disputed => "disputed",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of the guest's charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    PartiallyRefunded,
    Refunded,
}

/// Kind of stay a payment funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PaymentType {
    ShortStay,
    Rent,
}

impl PaymentType {
    /// `None` for sale listings, which are never booked
    pub fn for_category(category: ListingCategory) -> Option<Self> {
        match category {
            ListingCategory::ShortStay => Some(PaymentType::ShortStay),
            ListingCategory::Rent => Some(PaymentType::Rent),
            ListingCategory::Sale => None,
        }
    }
}

/// Where the charged funds sit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Held,
    /// Held and blocked from release while a dispute is open
    Frozen,
    Released,
    PartiallyRefunded,
    Refunded,
}

impl EscrowStatus {
    pub fn is_holding(&self) -> bool {
        matches!(self, EscrowStatus::Held | EscrowStatus::Frozen)
    }
}

/// Payout state of a commission transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Completed,
    Failed,
}

/// Who is acting on a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Guest,
    Host,
    Admin,
    /// Scheduled jobs
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Guest => "guest",
            ActorRole::Host => "host",
            ActorRole::Admin => "admin",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller identity as supplied by the upstream auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: ActorRole) -> Self {
        Self { user_id, role }
    }

    pub fn system() -> Self {
        Self {
            user_id: Uuid::nil(),
            role: ActorRole::System,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Guest who owns the booking
    pub fn is_guest_of(&self, booking: &Booking) -> bool {
        self.role == ActorRole::Guest && self.user_id == booking.user_id
    }

    /// Host of the booked property
    pub fn is_host_of(&self, booking: &Booking) -> bool {
        self.role == ActorRole::Host && self.user_id == booking.host_user_id
    }
}

/// Booking row
///
/// Never deleted; cancellation is a terminal status. `version` increases on
/// every write and guards compare-and-swap updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Booking {
    pub id: Uuid,
    pub property_id: Uuid,
    /// Guest who booked
    pub user_id: Uuid,
    pub host_user_id: Uuid,
    pub host_payout_account: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    /// Check-out date at the listing's check-out time
    pub check_out_at: DateTime<Utc>,
    pub guests_count: i32,
    pub pets_count: i32,
    pub status: BookingStatus,
    pub payment_type: PaymentType,
    pub currency: String,
    pub total_amount: Decimal,
    /// Platform service fee included in `total_amount`
    pub booking_fee: Decimal,
    pub security_deposit: Decimal,
    pub security_deposit_refundable: bool,
    pub cancellation_policy: CancellationPolicy,
    /// Commission percent captured when the booking was made
    pub commission_rate: Decimal,
    pub payment_intent_id: String,
    pub payment_id: Option<Uuid>,
    pub escrow_release_eligible_at: Option<DateTime<Utc>>,
    pub auto_release_scheduled: bool,
    pub guest_confirmed_completion: bool,
    pub keys_received_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub dispute_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<ActorRole>,
    pub cancellation_reason: Option<String>,
    pub refund_amount: Option<Decimal>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn stay(&self) -> DateRange {
        DateRange {
            check_in: self.check_in_date,
            check_out: self.check_out_date,
        }
    }

    /// Total plus deposit, the amount charged to the guest
    pub fn amount_charged(&self) -> Decimal {
        self.total_amount + self.security_deposit
    }

    pub fn has_open_dispute(&self) -> bool {
        self.status == BookingStatus::Disputed
    }
}

/// Guest charge funding one booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub property_id: Uuid,
    pub user_id: Uuid,
    /// Charged amount: booking total plus security deposit
    pub amount: Decimal,
    pub deposit_amount: Decimal,
    pub currency: String,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub escrow_status: EscrowStatus,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub escrow_release_reason: Option<String>,
    pub charge_id: String,
    pub stripe_payment_intent_id: String,
    pub refund_id: Option<String>,
    pub refunded_amount: Decimal,
    pub refunded_at: Option<DateTime<Utc>>,
    pub deposit_settled_at: Option<DateTime<Utc>>,
    /// Last gateway failure recorded against this payment
    pub last_error: Option<String>,
    /// Increases on every write; guards compare-and-swap updates
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Commission split of one payment
///
/// The row is the source of truth for the split once created; payout retries
/// read amounts from it instead of recomputing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CommissionTransaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub property_id: Uuid,
    pub host_user_id: Uuid,
    pub destination_account: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub host_amount: Decimal,
    pub status: CommissionStatus,
    pub stripe_transfer_id: Option<String>,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
