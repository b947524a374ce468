use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    BookingStatus, ContactSnapshot, DomainEvent, DomainEventType, Gateway, PaymentEventType,
    PaymentType,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourtStatus {
    Enabled,
    Locked,
}

/// Catalog data owned by facility management; read-only to the booking
/// core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Court {
    pub id: Uuid,
    pub facility_id: Uuid,
    pub category_id: Uuid,
    pub price_per_hour: BigDecimal,
    pub status: CourtStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlotDefinition {
    pub id: Uuid,
    pub court_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub active: bool,
}

impl TimeSlotDefinition {
    pub fn minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn price(&self, price_per_hour: &BigDecimal) -> BigDecimal {
        price_per_hour * BigDecimal::from(self.minutes()) / BigDecimal::from(60)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    pub courts: Vec<Court>,
    pub time_slots: Vec<TimeSlotDefinition>,
}

impl Catalog {
    pub fn court(&self, id: Uuid) -> Option<&Court> {
        self.courts.iter().find(|c| c.id == id)
    }

    pub fn time_slot(&self, id: Uuid) -> Option<&TimeSlotDefinition> {
        self.time_slots.iter().find(|s| s.id == id)
    }

    pub fn slots_for_court(&self, court_id: Uuid) -> impl Iterator<Item = &TimeSlotDefinition> {
        self.time_slots.iter().filter(move |s| s.court_id == court_id)
    }
}

/// The unit of contention: at most one active booking may hold a given
/// key at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub time_slot_id: Uuid,
}

/// Slot held by a booking, snapshotted at creation so later catalog edits
/// cannot reprice or reshape an existing booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedSlot {
    pub court_id: Uuid,
    pub time_slot_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price: BigDecimal,
}

impl ReservedSlot {
    pub fn key(&self, date: NaiveDate) -> SlotKey {
        SlotKey {
            court_id: self.court_id,
            date,
            time_slot_id: self.time_slot_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub facility_id: Uuid,
    pub check_in_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub total_price: BigDecimal,
    pub payment_type: PaymentType,
    pub transaction_code: Option<String>,
    pub status: BookingStatus,
    pub customer: ContactSnapshot,
    pub slots: Vec<ReservedSlot>,
}

impl Booking {
    pub fn slot_keys(&self) -> Vec<SlotKey> {
        self.slots.iter().map(|s| s.key(self.check_in_date)).collect()
    }

    /// AwaitingPayment -> DepositPaid. Duplicate "paid" callbacks land
    /// here as no-ops, which is what makes at-least-once gateway delivery
    /// safe upstream.
    pub fn mark_paid(&mut self, transaction_code: &str) -> bool {
        if self.status != BookingStatus::AwaitingPayment {
            return false;
        }
        self.status = BookingStatus::DepositPaid;
        if self.transaction_code.is_none() {
            self.transaction_code = Some(transaction_code.to_string());
        }
        true
    }

    /// DepositPaid -> Completed, with AwaitingPayment -> Completed kept
    /// open for offline full-payment bookings.
    pub fn mark_completed(&mut self) -> bool {
        match self.status {
            BookingStatus::AwaitingPayment | BookingStatus::DepositPaid => {
                self.status = BookingStatus::Completed;
                true
            }
            BookingStatus::Completed | BookingStatus::Cancelled => false,
        }
    }

    /// Any non-terminal state -> Cancelled. Terminal states absorb, so a
    /// late "failed" event can never undo a completed booking.
    pub fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = BookingStatus::Cancelled;
        true
    }

    pub fn domain_event(&self, event_type: DomainEventType, reason: Option<String>) -> DomainEvent {
        let mut court_ids: Vec<Uuid> = self.slots.iter().map(|s| s.court_id).collect();
        court_ids.sort();
        court_ids.dedup();
        DomainEvent {
            event_type,
            booking_id: self.id,
            facility_id: self.facility_id,
            court_ids,
            customer: self.customer.clone(),
            amount: self.total_price.clone(),
            status_id: self.status.status_id(),
            check_in_date: self.check_in_date,
            reason,
            occurred_at: Utc::now(),
        }
    }
}

/// Append-only ledger row; `(gateway, gateway_transaction_id, event_type)`
/// is the idempotency key.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentEventRecord {
    pub gateway: Gateway,
    pub gateway_transaction_id: String,
    pub event_type: PaymentEventType,
    pub booking_id: Uuid,
    pub amount: Option<BigDecimal>,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}
