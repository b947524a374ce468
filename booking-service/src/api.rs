use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{ContactSnapshot, Gateway, PaymentType};
use tracing::warn;
use uuid::Uuid;

use crate::error::BookingError;
use crate::guard::{BookingDraft, ReserveOutcome, SlotConflict, SlotRequest};
use crate::handlers::{BookingService, CancelOutcome};
use crate::models::{Booking, ReservedSlot};
use crate::reconciler::PaymentReconciler;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BookingService>,
    pub reconciler: Arc<PaymentReconciler>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: Uuid,
    pub facility_id: Uuid,
    pub check_in_date: NaiveDate,
    pub slots: Vec<SlotRequest>,
    pub payment_type_id: i32,
    pub customer: ContactSnapshot,
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub booking_id: Uuid,
    pub status: &'static str,
    pub status_id: i32,
    pub facility_id: Uuid,
    pub check_in_date: NaiveDate,
    pub total_price: BigDecimal,
    pub transaction_code: Option<String>,
    pub customer: ContactSnapshot,
    pub slots: Vec<ReservedSlot>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        Self {
            booking_id: booking.id,
            status: booking.status.as_str(),
            status_id: booking.status.status_id(),
            facility_id: booking.facility_id,
            check_in_date: booking.check_in_date,
            total_price: booking.total_price,
            transaction_code: booking.transaction_code,
            customer: booking.customer,
            slots: booking.slots,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub conflicting_slots: Vec<SlotConflict>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/complete", post(complete_booking))
        .route("/courts/:id/availability", get(court_availability))
        .route("/payments/cancel/:transaction_code", post(cancel_payment))
        .route("/webhooks/cardpay", post(cardpay_webhook))
        .route("/webhooks/momo", post(momo_webhook))
        .route("/webhooks/zalopay", post(zalopay_webhook))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Response {
    let Some(payment_type) = PaymentType::from_id(request.payment_type_id) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: format!("unknown payment type {}", request.payment_type_id),
            }),
        )
            .into_response();
    };

    let draft = BookingDraft {
        user_id: request.user_id,
        facility_id: request.facility_id,
        check_in_date: request.check_in_date,
        payment_type,
        customer: request.customer,
        slots: request.slots,
    };

    match state.service.create_booking(draft).await {
        Ok(ReserveOutcome::Created(booking)) => {
            (StatusCode::CREATED, Json(BookingView::from(booking))).into_response()
        }
        Ok(ReserveOutcome::Conflict(conflicting_slots)) => (
            StatusCode::CONFLICT,
            Json(ConflictResponse { conflicting_slots }),
        )
            .into_response(),
        Ok(ReserveOutcome::LockTimeout) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "timed out waiting for the slot lock, retry".to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service.get_booking(id).await {
        Ok(booking) => Json(BookingView::from(booking)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn complete_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.service.complete_booking(id).await {
        Ok(true) => Json(ActionResponse {
            status: "completed",
            reason: None,
        })
        .into_response(),
        Ok(false) => Json(ActionResponse {
            status: "noop",
            reason: Some("booking is already settled or cancelled".to_string()),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn court_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Response {
    match state.service.availability(id, query.date).await {
        Ok(slots) => Json(slots).into_response(),
        Err(e) => error_response(e),
    }
}

async fn cancel_payment(
    State(state): State<AppState>,
    Path(transaction_code): Path<String>,
) -> Json<ActionResponse> {
    let response = match state
        .service
        .cancel_by_transaction_code(&transaction_code)
        .await
    {
        CancelOutcome::Cancelled(_) => ActionResponse {
            status: "cancelled",
            reason: None,
        },
        CancelOutcome::AlreadyCancelled => ActionResponse {
            status: "noop",
            reason: Some("already cancelled".to_string()),
        },
        CancelOutcome::Rejected(reason) => ActionResponse {
            status: "rejected",
            reason: Some(reason.to_string()),
        },
        CancelOutcome::UnknownCode => ActionResponse {
            status: "noop",
            reason: Some("unknown transaction code".to_string()),
        },
    };
    Json(response)
}

async fn cardpay_webhook(State(state): State<AppState>, body: String) -> Json<WebhookAck> {
    gateway_webhook(state, Gateway::CardPay, body).await
}

async fn momo_webhook(State(state): State<AppState>, body: String) -> Json<WebhookAck> {
    gateway_webhook(state, Gateway::Momo, body).await
}

async fn zalopay_webhook(State(state): State<AppState>, body: String) -> Json<WebhookAck> {
    gateway_webhook(state, Gateway::ZaloPay, body).await
}

/// Webhooks answer 200 no matter what happened internally; a non-200
/// only makes the gateway redeliver a payload we already know we cannot
/// use. Real outcomes are observable through the booking status.
async fn gateway_webhook(state: AppState, gateway: Gateway, body: String) -> Json<WebhookAck> {
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(raw) => {
            state.reconciler.apply(gateway, &raw).await;
        }
        Err(e) => {
            warn!(
                gateway = gateway.as_str(),
                "discarding non-JSON webhook body: {}", e
            );
        }
    }
    Json(WebhookAck { received: true })
}

async fn health_check() -> &'static str {
    "OK"
}

fn error_response(error: BookingError) -> Response {
    let status = match &error {
        BookingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::BookingNotFound(_) | BookingError::CourtNotFound(_) => StatusCode::NOT_FOUND,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}
