use std::sync::Arc;

use chrono::Utc;
use shared::{BookingStatus, CancelReason, DomainEvent, DomainEventType};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::guard::{AvailabilityGuard, BookingDraft, ReserveOutcome, SlotAvailability};
use crate::models::Booking;
use crate::policy::{CancellationPolicy, IneligibleReason};
use crate::store::{Store, Transition};

/// Outcome of a self-service cancellation request. The endpoint answers
/// 200 for all four; repeated calls are safe no-ops.
#[derive(Debug)]
pub enum CancelOutcome {
    Cancelled(Booking),
    AlreadyCancelled,
    Rejected(IneligibleReason),
    UnknownCode,
}

/// Booking entry points behind the HTTP surface: reserve-and-create,
/// lookup, availability, and customer cancellation.
pub struct BookingService {
    store: Arc<Store>,
    guard: AvailabilityGuard,
    policy: CancellationPolicy,
    events: mpsc::UnboundedSender<DomainEvent>,
}

impl BookingService {
    pub fn new(
        store: Arc<Store>,
        guard: AvailabilityGuard,
        policy: CancellationPolicy,
        events: mpsc::UnboundedSender<DomainEvent>,
    ) -> Self {
        Self {
            store,
            guard,
            policy,
            events,
        }
    }

    pub async fn create_booking(
        &self,
        draft: BookingDraft,
    ) -> Result<ReserveOutcome, BookingError> {
        let outcome = self.guard.try_reserve(draft).await?;
        if let ReserveOutcome::Created(booking) = &outcome {
            info!(
                booking_id = %booking.id,
                total_price = %booking.total_price,
                slots = booking.slots.len(),
                "booking created"
            );
            self.emit(booking.domain_event(DomainEventType::BookingCreated, None));
        }
        Ok(outcome)
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.store
            .get(booking_id)
            .await
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    pub async fn availability(
        &self,
        court_id: Uuid,
        date: chrono::NaiveDate,
    ) -> Result<Vec<SlotAvailability>, BookingError> {
        self.guard.availability(court_id, date).await
    }

    /// Check-in completion for offline-settled bookings. Returns whether
    /// the booking moved; repeated calls are no-ops.
    pub async fn complete_booking(&self, booking_id: Uuid) -> Result<bool, BookingError> {
        match self.store.mark_completed(booking_id).await? {
            Transition::Applied(event) => {
                self.emit(event);
                Ok(true)
            }
            Transition::Noop => Ok(false),
        }
    }

    /// Customer-initiated cancellation, keyed by the transaction code the
    /// payment flow handed out. Eligibility is checked here, once, before
    /// the state machine is invoked.
    pub async fn cancel_by_transaction_code(&self, transaction_code: &str) -> CancelOutcome {
        let Some(booking) = self.store.find_by_transaction_code(transaction_code).await else {
            return CancelOutcome::UnknownCode;
        };

        if booking.status == BookingStatus::Cancelled {
            return CancelOutcome::AlreadyCancelled;
        }

        if let Err(reason) = self.policy.check(&booking, Utc::now().date_naive()) {
            info!(
                booking_id = %booking.id,
                "cancellation rejected: {}", reason
            );
            return CancelOutcome::Rejected(reason);
        }

        match self.store.cancel(booking.id, CancelReason::CustomerRequest).await {
            Ok(Transition::Applied(event)) => {
                self.emit(event);
                match self.store.get(booking.id).await {
                    Some(booking) => CancelOutcome::Cancelled(booking),
                    None => CancelOutcome::AlreadyCancelled,
                }
            }
            // Lost a race with the reaper or a gateway cancellation;
            // either way the booking is cancelled now.
            Ok(Transition::Noop) => CancelOutcome::AlreadyCancelled,
            Err(_) => CancelOutcome::UnknownCode,
        }
    }

    fn emit(&self, event: DomainEvent) {
        if self.events.send(event).is_err() {
            warn!("notification queue closed, event dropped");
        }
    }
}
