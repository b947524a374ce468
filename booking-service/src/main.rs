use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use booking_service::api::{self, AppState};
use booking_service::dispatcher::{DispatchProcessor, LoggingDispatcher};
use booking_service::guard::AvailabilityGuard;
use booking_service::handlers::BookingService;
use booking_service::models::Catalog;
use booking_service::policy::CancellationPolicy;
use booking_service::reaper::ExpiryReaper;
use booking_service::reconciler::PaymentReconciler;
use booking_service::store::Store;

#[derive(Parser)]
#[command(name = "booking-service")]
struct Args {
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Court and time-slot catalog, exported by facility management.
    #[arg(long, env = "CATALOG_PATH", default_value = "catalog.json")]
    catalog_path: PathBuf,

    /// How long an AwaitingPayment booking may sit before the reaper
    /// releases its slots.
    #[arg(long, env = "PAYMENT_EXPIRY_MINUTES", default_value = "30")]
    payment_expiry_minutes: i64,

    #[arg(long, env = "REAPER_INTERVAL_SECS", default_value = "60")]
    reaper_interval_secs: u64,

    /// Upper bound on waiting for a conflicting reservation to finish.
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value = "5000")]
    lock_timeout_ms: u64,

    #[arg(long, env = "CANCELLATION_GRACE_DAYS", default_value = "3")]
    cancellation_grace_days: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let catalog = load_catalog(&args.catalog_path)?;
    info!(
        "Loaded catalog: {} courts, {} time slots",
        catalog.courts.len(),
        catalog.time_slots.len()
    );

    let store = Arc::new(Store::new(catalog));
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let guard = AvailabilityGuard::new(
        store.clone(),
        Duration::from_millis(args.lock_timeout_ms),
    );
    let policy = CancellationPolicy::new(args.cancellation_grace_days);
    let service = Arc::new(BookingService::new(
        store.clone(),
        guard,
        policy,
        events_tx.clone(),
    ));
    let reconciler = Arc::new(PaymentReconciler::new(store.clone(), events_tx.clone()));

    let processor = DispatchProcessor::new(Arc::new(LoggingDispatcher), events_rx);
    tokio::spawn(async move {
        processor.run().await;
    });

    let reaper = ExpiryReaper::new(
        store,
        events_tx,
        chrono::Duration::minutes(args.payment_expiry_minutes),
        Duration::from_secs(args.reaper_interval_secs),
    );
    tokio::spawn(async move {
        reaper.run().await;
    });

    let app = api::create_router(AppState {
        service,
        reconciler,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    info!("Booking service listening on port {}", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog file {}", path.display()))?;
    serde_json::from_str(&raw).context("parsing catalog file")
}
