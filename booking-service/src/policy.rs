use chrono::NaiveDate;
use shared::{BookingStatus, PaymentType};
use thiserror::Error;

use crate::models::Booking;

/// Why a booking cannot be cancelled through the self-service flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IneligibleReason {
    #[error("only deposit bookings can be cancelled")]
    NotDeposit,

    #[error("booking is not in the deposit-paid state")]
    NotDepositPaid,

    #[error("booking has no recorded transaction code")]
    NoTransactionCode,

    #[error("check-in is within the {0}-day grace window")]
    WithinGraceWindow(i64),
}

/// Self-service cancellation eligibility. This is business policy, not a
/// state-machine guard: the `cancel` transition itself stays permissive
/// so the reaper and the reconciler can use it, and every caller that
/// acts on behalf of the customer consults this one rule.
#[derive(Debug, Clone, Copy)]
pub struct CancellationPolicy {
    grace_days: i64,
}

impl CancellationPolicy {
    pub fn new(grace_days: i64) -> Self {
        Self { grace_days }
    }

    pub fn check(&self, booking: &Booking, today: NaiveDate) -> Result<(), IneligibleReason> {
        if booking.payment_type != PaymentType::Deposit {
            return Err(IneligibleReason::NotDeposit);
        }
        if booking.status != BookingStatus::DepositPaid {
            return Err(IneligibleReason::NotDepositPaid);
        }
        if booking.transaction_code.is_none() {
            return Err(IneligibleReason::NoTransactionCode);
        }
        if (booking.check_in_date - today).num_days() <= self.grace_days {
            return Err(IneligibleReason::WithinGraceWindow(self.grace_days));
        }
        Ok(())
    }
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self { grace_days: 3 }
    }
}
