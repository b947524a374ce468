use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared::DomainEvent;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{info, warn};

use crate::store::Store;

/// Background expiry of bookings that never received a payment event.
/// Uses the same `cancel` transition as the reconciler, so the two can
/// never race destructively: whichever runs second finds a terminal
/// state and no-ops.
pub struct ExpiryReaper {
    store: Arc<Store>,
    events: mpsc::UnboundedSender<DomainEvent>,
    expiry: chrono::Duration,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(
        store: Arc<Store>,
        events: mpsc::UnboundedSender<DomainEvent>,
        expiry: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            events,
            expiry,
            interval,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);
        loop {
            interval.tick().await;
            let expired = self.expire_once().await;
            if expired > 0 {
                info!("Expired {} unpaid bookings", expired);
            }
        }
    }

    /// One reaper pass; returns how many bookings were expired.
    pub async fn expire_once(&self) -> usize {
        let cutoff = Utc::now() - self.expiry;
        let events = self.store.expire_unpaid(cutoff).await;
        let expired = events.len();
        for event in events {
            if self.events.send(event).is_err() {
                warn!("notification queue closed, event dropped");
            }
        }
        expired
    }
}
