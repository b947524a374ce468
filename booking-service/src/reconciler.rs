use std::sync::Arc;

use shared::{BookingStatus, DomainEvent, Gateway};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateways;
use crate::store::{LedgerApply, Store};

/// Outcome of running one inbound gateway payload through the
/// reconciler. Webhook endpoints acknowledge all three with 200; the
/// distinction exists for logging and for the ledger.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The event is recorded; the booking moved, or was already at or
    /// past the requested state.
    Applied {
        booking_id: Uuid,
        status: BookingStatus,
    },
    /// Dropped without touching any state: unparseable, foreign, or a
    /// duplicate delivery.
    Ignored(String),
    /// Parsed and fresh, but not applicable: nothing to correlate it to.
    Rejected(String),
}

/// Gateway-agnostic payment event processor: normalize, dedupe against
/// the ledger, apply to the booking state machine, record. Steps two
/// through four know nothing about any particular provider.
pub struct PaymentReconciler {
    store: Arc<Store>,
    events: mpsc::UnboundedSender<DomainEvent>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<Store>, events: mpsc::UnboundedSender<DomainEvent>) -> Self {
        Self { store, events }
    }

    pub async fn apply(&self, gateway: Gateway, raw: &serde_json::Value) -> ApplyOutcome {
        let canonical = match gateways::normalize(gateway, raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    gateway = gateway.as_str(),
                    "discarding gateway payload: {}", e
                );
                return ApplyOutcome::Ignored(e.to_string());
            }
        };

        match self.store.apply_payment_event(&canonical, raw.clone()).await {
            LedgerApply::Duplicate => {
                info!(
                    gateway = gateway.as_str(),
                    gateway_transaction_id = %canonical.gateway_transaction_id,
                    event_type = canonical.event_type.as_str(),
                    "duplicate payment event, already in ledger"
                );
                ApplyOutcome::Ignored("duplicate".to_string())
            }
            LedgerApply::UnknownCode => {
                warn!(
                    gateway = gateway.as_str(),
                    transaction_code = %canonical.transaction_code,
                    "payment event does not correlate to any booking"
                );
                ApplyOutcome::Rejected(format!(
                    "unknown transaction code {}",
                    canonical.transaction_code
                ))
            }
            LedgerApply::Applied {
                booking_id,
                status,
                event,
            } => {
                match event {
                    Some(event) => {
                        if self.events.send(event).is_err() {
                            warn!("notification queue closed, event dropped");
                        }
                    }
                    None => info!(
                        booking_id = %booking_id,
                        event_type = canonical.event_type.as_str(),
                        "stale payment event, booking state unchanged"
                    ),
                }
                ApplyOutcome::Applied { booking_id, status }
            }
        }
    }
}
