use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    BookingStatus, CancelReason, CanonicalPaymentEvent, DomainEvent, DomainEventType, Gateway,
    PaymentEventType,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::BookingError;
use crate::guard::SlotConflict;
use crate::models::{Booking, Catalog, PaymentEventRecord, SlotKey};

/// Result of a booking state-machine call: either a transition happened
/// and produced its canonical event, or the call was a safe no-op.
#[derive(Debug)]
pub enum Transition {
    Applied(DomainEvent),
    Noop,
}

/// Result of attempting to insert a booking together with its slot holds.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Booking),
    Held(Vec<SlotConflict>),
}

/// Result of running a normalized payment event against the ledger and
/// the booking it correlates to.
#[derive(Debug)]
pub enum LedgerApply {
    Duplicate,
    UnknownCode,
    Applied {
        booking_id: Uuid,
        status: BookingStatus,
        event: Option<DomainEvent>,
    },
}

#[derive(Default)]
struct State {
    bookings: HashMap<Uuid, Booking>,
    /// Active holds only; entries are removed the moment the owning
    /// booking is cancelled.
    holds: HashMap<SlotKey, Uuid>,
    by_transaction_code: HashMap<String, Uuid>,
    ledger: Vec<PaymentEventRecord>,
    ledger_keys: HashSet<(Gateway, String, PaymentEventType)>,
}

impl State {
    fn cancel_booking(&mut self, booking_id: Uuid, reason: CancelReason) -> Transition {
        let Some(booking) = self.bookings.get_mut(&booking_id) else {
            return Transition::Noop;
        };
        if !booking.cancel() {
            return Transition::Noop;
        }
        // Status flip and slot release commit together; there is no
        // window where one is visible without the other.
        let keys = booking.slot_keys();
        let event = booking.domain_event(
            DomainEventType::BookingCancelled,
            Some(reason.as_str().to_string()),
        );
        for key in keys {
            self.holds.remove(&key);
        }
        Transition::Applied(event)
    }
}

/// In-memory booking store. Bookings, the hold index, and the payment
/// ledger live behind one `RwLock`, so every mutating method is a single
/// all-or-nothing commit. The persistence layer proper (accounts, blogs,
/// reporting, the rest of the platform CRUD) is an external collaborator
/// and never reaches into this state.
pub struct Store {
    catalog: Catalog,
    state: RwLock<State>,
}

impl Store {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            state: RwLock::new(State::default()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Hold every slot of `booking` and insert it, or report the keys
    /// already held. All-or-nothing: a single conflicting key leaves no
    /// trace of the request.
    pub async fn insert_if_free(&self, booking: Booking) -> InsertOutcome {
        let mut state = self.state.write().await;

        let conflicts: Vec<SlotConflict> = booking
            .slot_keys()
            .iter()
            .filter_map(|key| {
                state.holds.get(key).map(|holder| SlotConflict {
                    court_id: key.court_id,
                    date: key.date,
                    time_slot_id: key.time_slot_id,
                    holder_status: state
                        .bookings
                        .get(holder)
                        .map(|b| b.status)
                        .unwrap_or(BookingStatus::AwaitingPayment),
                })
            })
            .collect();

        if !conflicts.is_empty() {
            return InsertOutcome::Held(conflicts);
        }

        for key in booking.slot_keys() {
            state.holds.insert(key, booking.id);
        }
        if let Some(code) = &booking.transaction_code {
            state.by_transaction_code.insert(code.clone(), booking.id);
        }
        state.bookings.insert(booking.id, booking.clone());
        InsertOutcome::Inserted(booking)
    }

    pub async fn get(&self, booking_id: Uuid) -> Option<Booking> {
        self.state.read().await.bookings.get(&booking_id).cloned()
    }

    pub async fn find_by_transaction_code(&self, code: &str) -> Option<Booking> {
        let state = self.state.read().await;
        let id = state.by_transaction_code.get(code)?;
        state.bookings.get(id).cloned()
    }

    /// Time-slot ids currently held for a (court, date) pair.
    pub async fn held_slots(&self, court_id: Uuid, date: NaiveDate) -> HashSet<Uuid> {
        self.state
            .read()
            .await
            .holds
            .keys()
            .filter(|key| key.court_id == court_id && key.date == date)
            .map(|key| key.time_slot_id)
            .collect()
    }

    /// Offline completion, used when the facility settles a cash booking
    /// at check-in. Gateway-driven completion goes through
    /// `apply_payment_event` instead.
    pub async fn mark_completed(&self, booking_id: Uuid) -> Result<Transition, BookingError> {
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        if !booking.mark_completed() {
            return Ok(Transition::Noop);
        }
        Ok(Transition::Applied(
            booking.domain_event(DomainEventType::BookingCompleted, None),
        ))
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        reason: CancelReason,
    ) -> Result<Transition, BookingError> {
        let mut state = self.state.write().await;
        if !state.bookings.contains_key(&booking_id) {
            return Err(BookingError::BookingNotFound(booking_id));
        }
        Ok(state.cancel_booking(booking_id, reason))
    }

    /// Run one normalized payment event through the ledger and the
    /// booking it correlates to: duplicate check first, booking
    /// transition second, ledger append last. The append happens only
    /// after the transition (or no-op) succeeded, so a retried delivery
    /// can never find a recorded-but-unapplied event.
    pub async fn apply_payment_event(
        &self,
        event: &CanonicalPaymentEvent,
        raw_payload: serde_json::Value,
    ) -> LedgerApply {
        let mut state = self.state.write().await;

        let key = (
            event.gateway,
            event.gateway_transaction_id.clone(),
            event.event_type,
        );
        if state.ledger_keys.contains(&key) {
            return LedgerApply::Duplicate;
        }

        let Some(&booking_id) = state.by_transaction_code.get(&event.transaction_code) else {
            return LedgerApply::UnknownCode;
        };

        let transition = match event.event_type {
            PaymentEventType::Authorized => {
                let booking = state
                    .bookings
                    .get_mut(&booking_id)
                    .expect("hold index points at a live booking");
                if booking.mark_paid(&event.transaction_code) {
                    Transition::Applied(booking.domain_event(DomainEventType::BookingPaid, None))
                } else {
                    Transition::Noop
                }
            }
            PaymentEventType::Captured => {
                let booking = state
                    .bookings
                    .get_mut(&booking_id)
                    .expect("hold index points at a live booking");
                if booking.mark_completed() {
                    Transition::Applied(
                        booking.domain_event(DomainEventType::BookingCompleted, None),
                    )
                } else {
                    Transition::Noop
                }
            }
            PaymentEventType::Cancelled => {
                state.cancel_booking(booking_id, CancelReason::GatewayCancelled)
            }
            PaymentEventType::Failed => {
                state.cancel_booking(booking_id, CancelReason::PaymentFailed)
            }
        };

        state.ledger.push(PaymentEventRecord {
            gateway: event.gateway,
            gateway_transaction_id: event.gateway_transaction_id.clone(),
            event_type: event.event_type,
            booking_id,
            amount: event.amount.clone(),
            raw_payload,
            received_at: Utc::now(),
        });
        state.ledger_keys.insert(key);

        let status = state
            .bookings
            .get(&booking_id)
            .map(|b| b.status)
            .unwrap_or(BookingStatus::Cancelled);
        LedgerApply::Applied {
            booking_id,
            status,
            event: match transition {
                Transition::Applied(event) => Some(event),
                Transition::Noop => None,
            },
        }
    }

    /// Ledger rows recorded for a booking, oldest first.
    pub async fn ledger_for(&self, booking_id: Uuid) -> Vec<PaymentEventRecord> {
        self.state
            .read()
            .await
            .ledger
            .iter()
            .filter(|row| row.booking_id == booking_id)
            .cloned()
            .collect()
    }

    /// Cancel every AwaitingPayment booking created at or before
    /// `older_than`, releasing its slots. Returns the cancellation events
    /// in creation order.
    pub async fn expire_unpaid(&self, older_than: DateTime<Utc>) -> Vec<DomainEvent> {
        let mut state = self.state.write().await;

        let mut expired: Vec<(DateTime<Utc>, Uuid)> = state
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::AwaitingPayment && b.created_at <= older_than)
            .map(|b| (b.created_at, b.id))
            .collect();
        expired.sort();

        let mut events = Vec::with_capacity(expired.len());
        for (_, booking_id) in expired {
            if let Transition::Applied(event) =
                state.cancel_booking(booking_id, CancelReason::Expired)
            {
                events.push(event);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Booking, Catalog, ReservedSlot};
    use bigdecimal::BigDecimal;
    use chrono::{Duration as ChronoDuration, NaiveTime};
    use shared::{ContactSnapshot, PaymentType};

    fn booking_with_code(code: &str) -> Booking {
        let court_id = Uuid::new_v4();
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            check_in_date: Utc::now().date_naive() + ChronoDuration::days(7),
            created_at: Utc::now(),
            total_price: BigDecimal::from(300),
            payment_type: PaymentType::Deposit,
            transaction_code: Some(code.to_string()),
            status: BookingStatus::AwaitingPayment,
            customer: ContactSnapshot {
                name: "An Nguyen".to_string(),
                email: "an@example.com".to_string(),
                phone: "0901234567".to_string(),
            },
            slots: vec![ReservedSlot {
                court_id,
                time_slot_id: Uuid::new_v4(),
                start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                price: BigDecimal::from(300),
            }],
        }
    }

    fn canonical(code: &str, txn_id: &str, event_type: PaymentEventType) -> CanonicalPaymentEvent {
        CanonicalPaymentEvent {
            gateway: Gateway::CardPay,
            gateway_transaction_id: txn_id.to_string(),
            transaction_code: code.to_string(),
            event_type,
            amount: Some(BigDecimal::from(300)),
        }
    }

    async fn seeded(code: &str) -> (Store, Uuid) {
        let store = Store::new(Catalog::default());
        let booking = booking_with_code(code);
        let id = booking.id;
        assert!(matches!(
            store.insert_if_free(booking).await,
            InsertOutcome::Inserted(_)
        ));
        (store, id)
    }

    #[tokio::test]
    async fn replayed_event_is_recorded_exactly_once() {
        let (store, id) = seeded("TXN-1").await;
        let event = canonical("TXN-1", "pi_1", PaymentEventType::Authorized);
        let raw = serde_json::json!({"replayed": true});

        assert!(matches!(
            store.apply_payment_event(&event, raw.clone()).await,
            LedgerApply::Applied { status: BookingStatus::DepositPaid, .. }
        ));
        assert!(matches!(
            store.apply_payment_event(&event, raw.clone()).await,
            LedgerApply::Duplicate
        ));
        assert!(matches!(
            store.apply_payment_event(&event, raw).await,
            LedgerApply::Duplicate
        ));

        assert_eq!(store.ledger_for(id).await.len(), 1);
        assert_eq!(store.get(id).await.unwrap().status, BookingStatus::DepositPaid);
    }

    #[tokio::test]
    async fn stale_cancel_after_completion_is_applied_but_moves_nothing() {
        let (store, id) = seeded("TXN-1").await;
        let raw = serde_json::json!({});

        store
            .apply_payment_event(&canonical("TXN-1", "pi_1", PaymentEventType::Captured), raw.clone())
            .await;
        let outcome = store
            .apply_payment_event(&canonical("TXN-1", "pi_2", PaymentEventType::Cancelled), raw)
            .await;

        let LedgerApply::Applied { status, event, .. } = outcome else {
            panic!("stale events still count as applied");
        };
        assert_eq!(status, BookingStatus::Completed);
        assert!(event.is_none());
        // Both deliveries are in the audit trail.
        assert_eq!(store.ledger_for(id).await.len(), 2);
    }

    #[tokio::test]
    async fn failed_payment_releases_the_slots() {
        let (store, id) = seeded("TXN-1").await;
        let booking = store.get(id).await.unwrap();
        let key = booking.slot_keys()[0];

        store
            .apply_payment_event(
                &canonical("TXN-1", "pi_1", PaymentEventType::Failed),
                serde_json::json!({}),
            )
            .await;

        assert_eq!(store.get(id).await.unwrap().status, BookingStatus::Cancelled);
        assert!(!store
            .held_slots(key.court_id, key.date)
            .await
            .contains(&key.time_slot_id));
    }

    #[tokio::test]
    async fn uncorrelated_event_leaves_no_ledger_row() {
        let (store, id) = seeded("TXN-1").await;
        let outcome = store
            .apply_payment_event(
                &canonical("TXN-unknown", "pi_1", PaymentEventType::Captured),
                serde_json::json!({}),
            )
            .await;
        assert!(matches!(outcome, LedgerApply::UnknownCode));
        assert_eq!(store.ledger_for(id).await.len(), 0);
        assert_eq!(
            store.get(id).await.unwrap().status,
            BookingStatus::AwaitingPayment
        );
    }

    #[tokio::test]
    async fn cancelled_slots_are_immediately_reservable() {
        let (store, id) = seeded("TXN-1").await;
        let held = store.get(id).await.unwrap();

        store.cancel(id, CancelReason::CustomerRequest).await.unwrap();

        let mut replacement = booking_with_code("TXN-2");
        replacement.check_in_date = held.check_in_date;
        replacement.slots = held.slots.clone();
        assert!(matches!(
            store.insert_if_free(replacement).await,
            InsertOutcome::Inserted(_)
        ));
    }

    #[tokio::test]
    async fn expire_unpaid_skips_fresh_and_paid_bookings() {
        let store = Store::new(Catalog::default());

        let mut old_unpaid = booking_with_code("TXN-old");
        old_unpaid.created_at = Utc::now() - ChronoDuration::minutes(90);
        let old_id = old_unpaid.id;

        let mut old_paid = booking_with_code("TXN-paid");
        old_paid.created_at = Utc::now() - ChronoDuration::minutes(90);
        old_paid.status = BookingStatus::DepositPaid;
        let paid_id = old_paid.id;

        let fresh = booking_with_code("TXN-fresh");
        let fresh_id = fresh.id;

        for b in [old_unpaid, old_paid, fresh] {
            store.insert_if_free(b).await;
        }

        let events = store
            .expire_unpaid(Utc::now() - ChronoDuration::minutes(30))
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].booking_id, old_id);

        assert_eq!(store.get(old_id).await.unwrap().status, BookingStatus::Cancelled);
        assert_eq!(store.get(paid_id).await.unwrap().status, BookingStatus::DepositPaid);
        assert_eq!(
            store.get(fresh_id).await.unwrap().status,
            BookingStatus::AwaitingPayment
        );
    }
}
