use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{BookingStatus, ContactSnapshot, PaymentType};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{Booking, CourtStatus, ReservedSlot};
use crate::store::{InsertOutcome, Store};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SlotRequest {
    pub court_id: Uuid,
    pub time_slot_id: Uuid,
}

/// Validated-input shape for a booking attempt, before any slot is held.
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub user_id: Uuid,
    pub facility_id: Uuid,
    pub check_in_date: NaiveDate,
    pub payment_type: PaymentType,
    pub customer: ContactSnapshot,
    pub slots: Vec<SlotRequest>,
}

/// A requested tuple that is already held, with enough detail for the
/// caller to offer alternatives.
#[derive(Debug, Clone, Serialize)]
pub struct SlotConflict {
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub time_slot_id: Uuid,
    pub holder_status: BookingStatus,
}

#[derive(Debug)]
pub enum ReserveOutcome {
    Created(Booking),
    Conflict(Vec<SlotConflict>),
    /// A conflicting transaction held the (court, date) lock past the
    /// configured timeout. Retryable; distinct from a true conflict.
    LockTimeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    pub time_slot_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub held: bool,
}

/// Serializes booking attempts per (court, date) pair and performs the
/// all-or-nothing reserve-and-create step. Locking any finer than the
/// (court, date) pair risks partial holds under concurrent multi-slot
/// requests; locks are acquired in sorted pair order so two requests
/// spanning the same pairs cannot deadlock.
pub struct AvailabilityGuard {
    store: Arc<Store>,
    locks: StdMutex<HashMap<(Uuid, NaiveDate), Arc<AsyncMutex<()>>>>,
    lock_timeout: Duration,
}

impl AvailabilityGuard {
    pub fn new(store: Arc<Store>, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks: StdMutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Atomically verify and hold every requested slot, creating the
    /// booking in the same commit. Validation happens before any lock or
    /// hold is taken, so a rejected request has no side effects.
    pub async fn try_reserve(&self, draft: BookingDraft) -> Result<ReserveOutcome, BookingError> {
        let booking = self.validate(&draft)?;

        let mut pairs: Vec<(Uuid, NaiveDate)> = booking
            .slot_keys()
            .iter()
            .map(|key| (key.court_id, key.date))
            .collect();
        pairs.sort();
        pairs.dedup();

        let mut guards = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let lock = self.court_day_lock(pair);
            match tokio::time::timeout(self.lock_timeout, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => return Ok(ReserveOutcome::LockTimeout),
            }
        }

        let outcome = match self.store.insert_if_free(booking).await {
            InsertOutcome::Inserted(booking) => ReserveOutcome::Created(booking),
            InsertOutcome::Held(conflicts) => ReserveOutcome::Conflict(conflicts),
        };
        drop(guards);
        Ok(outcome)
    }

    /// Per-slot availability for a (court, date) pair. Holds committed by
    /// an earlier `try_reserve` are visible here immediately.
    pub async fn availability(
        &self,
        court_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<SlotAvailability>, BookingError> {
        let catalog = self.store.catalog();
        if catalog.court(court_id).is_none() {
            return Err(BookingError::CourtNotFound(court_id));
        }

        let held = self.store.held_slots(court_id, date).await;
        let mut slots: Vec<SlotAvailability> = catalog
            .slots_for_court(court_id)
            .filter(|def| def.active)
            .map(|def| SlotAvailability {
                time_slot_id: def.id,
                start_time: def.start_time,
                end_time: def.end_time,
                held: held.contains(&def.id),
            })
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    fn validate(&self, draft: &BookingDraft) -> Result<Booking, BookingError> {
        if draft.slots.is_empty() {
            return Err(BookingError::Validation(
                "a booking needs at least one slot".to_string(),
            ));
        }

        let today = Utc::now().date_naive();
        if draft.check_in_date < today {
            return Err(BookingError::Validation(format!(
                "check-in date {} is in the past",
                draft.check_in_date
            )));
        }

        let mut seen = HashSet::new();
        for slot in &draft.slots {
            if !seen.insert((slot.court_id, slot.time_slot_id)) {
                return Err(BookingError::Validation(format!(
                    "time slot {} requested twice",
                    slot.time_slot_id
                )));
            }
        }

        let catalog = self.store.catalog();
        let mut total_price = BigDecimal::from(0);
        let mut reserved = Vec::with_capacity(draft.slots.len());
        for slot in &draft.slots {
            let court = catalog.court(slot.court_id).ok_or_else(|| {
                BookingError::Validation(format!("unknown court {}", slot.court_id))
            })?;
            if court.facility_id != draft.facility_id {
                return Err(BookingError::Validation(format!(
                    "court {} does not belong to facility {}",
                    slot.court_id, draft.facility_id
                )));
            }
            if court.status != CourtStatus::Enabled {
                return Err(BookingError::Validation(format!(
                    "court {} is locked by facility management",
                    slot.court_id
                )));
            }

            let def = catalog.time_slot(slot.time_slot_id).ok_or_else(|| {
                BookingError::Validation(format!("unknown time slot {}", slot.time_slot_id))
            })?;
            if def.court_id != slot.court_id {
                return Err(BookingError::Validation(format!(
                    "time slot {} does not belong to court {}",
                    slot.time_slot_id, slot.court_id
                )));
            }
            if !def.active {
                return Err(BookingError::Validation(format!(
                    "time slot {} is inactive",
                    slot.time_slot_id
                )));
            }

            let price = def.price(&court.price_per_hour);
            total_price += price.clone();
            reserved.push(ReservedSlot {
                court_id: slot.court_id,
                time_slot_id: slot.time_slot_id,
                start_time: def.start_time,
                end_time: def.end_time,
                price,
            });
        }

        let transaction_code = draft
            .payment_type
            .is_gateway()
            .then(|| format!("TXN-{}", Uuid::new_v4().simple()));

        Ok(Booking {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            facility_id: draft.facility_id,
            check_in_date: draft.check_in_date,
            created_at: Utc::now(),
            total_price,
            payment_type: draft.payment_type,
            transaction_code,
            status: BookingStatus::AwaitingPayment,
            customer: draft.customer.clone(),
            slots: reserved,
        })
    }

    fn court_day_lock(&self, pair: (Uuid, NaiveDate)) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("court-day lock registry poisoned");
        locks.entry(pair).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Catalog, Court, TimeSlotDefinition};
    use chrono::Duration as ChronoDuration;
    use futures::future::join_all;

    const HOURLY: i64 = 150;

    struct Fixture {
        guard: Arc<AvailabilityGuard>,
        facility_id: Uuid,
        court_id: Uuid,
        slot_a: Uuid,
        slot_b: Uuid,
        slot_inactive: Uuid,
    }

    fn fixture() -> Fixture {
        fixture_with_timeout(Duration::from_secs(5))
    }

    fn fixture_with_timeout(lock_timeout: Duration) -> Fixture {
        let facility_id = Uuid::new_v4();
        let court_id = Uuid::new_v4();
        let slot_a = Uuid::new_v4();
        let slot_b = Uuid::new_v4();
        let slot_inactive = Uuid::new_v4();

        let catalog = Catalog {
            courts: vec![Court {
                id: court_id,
                facility_id,
                category_id: Uuid::new_v4(),
                price_per_hour: BigDecimal::from(HOURLY),
                status: CourtStatus::Enabled,
            }],
            time_slots: vec![
                TimeSlotDefinition {
                    id: slot_a,
                    court_id,
                    start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                    active: true,
                },
                TimeSlotDefinition {
                    id: slot_b,
                    court_id,
                    start_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                    active: true,
                },
                TimeSlotDefinition {
                    id: slot_inactive,
                    court_id,
                    start_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
                    active: false,
                },
            ],
        };

        let store = Arc::new(Store::new(catalog));
        Fixture {
            guard: Arc::new(AvailabilityGuard::new(store, lock_timeout)),
            facility_id,
            court_id,
            slot_a,
            slot_b,
            slot_inactive,
        }
    }

    fn draft(fixture: &Fixture, slot_ids: &[Uuid]) -> BookingDraft {
        BookingDraft {
            user_id: Uuid::new_v4(),
            facility_id: fixture.facility_id,
            check_in_date: Utc::now().date_naive() + ChronoDuration::days(7),
            payment_type: PaymentType::Deposit,
            customer: ContactSnapshot {
                name: "An Nguyen".to_string(),
                email: "an@example.com".to_string(),
                phone: "0901234567".to_string(),
            },
            slots: slot_ids
                .iter()
                .map(|&time_slot_id| SlotRequest {
                    court_id: fixture.court_id,
                    time_slot_id,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn reserve_prices_the_booking_from_the_catalog() {
        let fx = fixture();
        let outcome = fx
            .guard
            .try_reserve(draft(&fx, &[fx.slot_a, fx.slot_b]))
            .await
            .unwrap();
        let ReserveOutcome::Created(booking) = outcome else {
            panic!("expected a created booking");
        };
        assert_eq!(booking.status, BookingStatus::AwaitingPayment);
        assert_eq!(booking.total_price, BigDecimal::from(2 * HOURLY));
        assert_eq!(booking.slots.len(), 2);
        assert!(booking.transaction_code.is_some());
    }

    #[tokio::test]
    async fn conflict_names_the_held_tuples_only() {
        let fx = fixture();
        fx.guard.try_reserve(draft(&fx, &[fx.slot_b])).await.unwrap();

        let outcome = fx
            .guard
            .try_reserve(draft(&fx, &[fx.slot_a, fx.slot_b]))
            .await
            .unwrap();
        let ReserveOutcome::Conflict(conflicts) = outcome else {
            panic!("expected a conflict");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].time_slot_id, fx.slot_b);
        assert_eq!(conflicts[0].holder_status, BookingStatus::AwaitingPayment);
    }

    #[tokio::test]
    async fn rejected_multi_slot_request_holds_nothing() {
        let fx = fixture();
        fx.guard.try_reserve(draft(&fx, &[fx.slot_b])).await.unwrap();

        let outcome = fx
            .guard
            .try_reserve(draft(&fx, &[fx.slot_a, fx.slot_b]))
            .await
            .unwrap();
        assert!(matches!(outcome, ReserveOutcome::Conflict(_)));

        // Slot A must still be free after the failed combined request.
        let outcome = fx.guard.try_reserve(draft(&fx, &[fx.slot_a])).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Created(_)));
    }

    #[tokio::test]
    async fn concurrent_requests_have_exactly_one_winner() {
        let fx = fixture();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let guard = fx.guard.clone();
                let draft = draft(&fx, &[fx.slot_a]);
                tokio::spawn(async move { guard.try_reserve(draft).await.unwrap() })
            })
            .collect();

        let mut created = 0;
        let mut conflicts = 0;
        for outcome in join_all(tasks).await {
            match outcome.unwrap() {
                ReserveOutcome::Created(_) => created += 1,
                ReserveOutcome::Conflict(c) => {
                    assert_eq!(c[0].time_slot_id, fx.slot_a);
                    conflicts += 1;
                }
                ReserveOutcome::LockTimeout => panic!("unexpected lock timeout"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn held_lock_turns_into_a_retryable_timeout() {
        let fx = fixture_with_timeout(Duration::from_millis(20));
        let d = draft(&fx, &[fx.slot_a]);
        let pair = (fx.court_id, d.check_in_date);

        let _held = fx.guard.court_day_lock(pair).lock_owned().await;
        let outcome = fx.guard.try_reserve(d).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::LockTimeout));
    }

    #[tokio::test]
    async fn validation_rejects_before_any_hold() {
        let fx = fixture();

        let mut past = draft(&fx, &[fx.slot_a]);
        past.check_in_date = Utc::now().date_naive() - ChronoDuration::days(1);
        assert!(matches!(
            fx.guard.try_reserve(past).await,
            Err(BookingError::Validation(_))
        ));

        assert!(matches!(
            fx.guard.try_reserve(draft(&fx, &[fx.slot_inactive])).await,
            Err(BookingError::Validation(_))
        ));

        assert!(matches!(
            fx.guard.try_reserve(draft(&fx, &[Uuid::new_v4()])).await,
            Err(BookingError::Validation(_))
        ));

        let mut wrong_court = draft(&fx, &[fx.slot_a]);
        wrong_court.slots[0].court_id = Uuid::new_v4();
        assert!(matches!(
            fx.guard.try_reserve(wrong_court).await,
            Err(BookingError::Validation(_))
        ));

        // Nothing above may have held slot A.
        let outcome = fx.guard.try_reserve(draft(&fx, &[fx.slot_a])).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Created(_)));
    }

    #[tokio::test]
    async fn availability_reflects_committed_holds() {
        let fx = fixture();
        let d = draft(&fx, &[fx.slot_a]);
        let date = d.check_in_date;
        fx.guard.try_reserve(d).await.unwrap();

        let slots = fx.guard.availability(fx.court_id, date).await.unwrap();
        // Inactive definitions are not offered at all.
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().any(|s| s.time_slot_id == fx.slot_a && s.held));
        assert!(slots.iter().any(|s| s.time_slot_id == fx.slot_b && !s.held));
    }
}
