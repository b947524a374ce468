use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::DomainEvent;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

/// Delivery seam for canonical domain events. The transport behind it
/// (dashboard feeds, mail, push) is an external collaborator; the core
/// only ever calls `publish` best-effort.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Default dispatcher: structured log line per event. Stands in for the
/// real transport in local runs.
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        info!(
            event_type = event.event_type.as_str(),
            booking_id = %event.booking_id,
            facility_id = %event.facility_id,
            status_id = event.status_id,
            "publishing domain event"
        );
        Ok(())
    }
}

/// Dispatcher that records everything it is asked to publish. Used by
/// tests in place of a live transport.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<DomainEvent>>,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

impl RecordingDispatcher {
    pub async fn published(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

/// Drains the in-process event queue and publishes each event after its
/// originating state change has committed. A dispatcher failure is
/// logged and swallowed; it never reaches back into booking or ledger
/// state.
pub struct DispatchProcessor {
    dispatcher: Arc<dyn NotificationDispatcher>,
    rx: mpsc::UnboundedReceiver<DomainEvent>,
}

impl DispatchProcessor {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        rx: mpsc::UnboundedReceiver<DomainEvent>,
    ) -> Self {
        Self { dispatcher, rx }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            if let Err(e) = self.dispatcher.publish(&event).await {
                error!(
                    "Failed to publish {} for booking {}: {}",
                    event.event_type.as_str(),
                    event.booking_id,
                    e
                );
            }
        }
    }
}
