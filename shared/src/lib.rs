use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    AwaitingPayment,
    DepositPaid,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Numeric status code carried on published events for legacy
    /// dashboard consumers.
    pub fn status_id(&self) -> i32 {
        match self {
            BookingStatus::AwaitingPayment => 1,
            BookingStatus::DepositPaid => 7,
            BookingStatus::Cancelled => 9,
            BookingStatus::Completed => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::AwaitingPayment => "awaiting_payment",
            BookingStatus::DepositPaid => "deposit_paid",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Deposit,
    Full,
    Offline,
}

impl PaymentType {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(PaymentType::Deposit),
            2 => Some(PaymentType::Full),
            3 => Some(PaymentType::Offline),
            _ => None,
        }
    }

    pub fn is_gateway(&self) -> bool {
        matches!(self, PaymentType::Deposit | PaymentType::Full)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gateway {
    CardPay,
    Momo,
    ZaloPay,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::CardPay => "cardpay",
            Gateway::Momo => "momo",
            Gateway::ZaloPay => "zalopay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentEventType {
    Authorized,
    Captured,
    Cancelled,
    Failed,
}

impl PaymentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEventType::Authorized => "authorized",
            PaymentEventType::Captured => "captured",
            PaymentEventType::Cancelled => "cancelled",
            PaymentEventType::Failed => "failed",
        }
    }
}

/// Gateway-agnostic payment event, produced by the per-provider
/// normalizers. Everything downstream of normalization works on this
/// shape only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPaymentEvent {
    pub gateway: Gateway,
    pub gateway_transaction_id: String,
    pub transaction_code: String,
    pub event_type: PaymentEventType,
    pub amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    CustomerRequest,
    PaymentFailed,
    GatewayCancelled,
    Expired,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::CustomerRequest => "customer_request",
            CancelReason::PaymentFailed => "payment_failed",
            CancelReason::GatewayCancelled => "gateway_cancelled",
            CancelReason::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEventType {
    BookingCreated,
    BookingPaid,
    BookingCompleted,
    BookingCancelled,
}

impl DomainEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventType::BookingCreated => "booking_created",
            DomainEventType::BookingPaid => "booking_paid",
            DomainEventType::BookingCompleted => "booking_completed",
            DomainEventType::BookingCancelled => "booking_cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Canonical event handed to the notification dispatcher after a booking
/// transition has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: DomainEventType,
    pub booking_id: Uuid,
    pub facility_id: Uuid,
    pub court_ids: Vec<Uuid>,
    pub customer: ContactSnapshot,
    pub amount: BigDecimal,
    pub status_id: i32,
    pub check_in_date: NaiveDate,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ids_match_published_codes() {
        assert_eq!(BookingStatus::DepositPaid.status_id(), 7);
        assert_eq!(BookingStatus::Cancelled.status_id(), 9);
        assert_eq!(BookingStatus::Completed.status_id(), 10);
    }

    #[test]
    fn terminal_states() {
        assert!(!BookingStatus::AwaitingPayment.is_terminal());
        assert!(!BookingStatus::DepositPaid.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn payment_type_from_id() {
        assert_eq!(PaymentType::from_id(1), Some(PaymentType::Deposit));
        assert_eq!(PaymentType::from_id(2), Some(PaymentType::Full));
        assert_eq!(PaymentType::from_id(3), Some(PaymentType::Offline));
        assert_eq!(PaymentType::from_id(99), None);
    }
}
