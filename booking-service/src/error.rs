use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the booking core. Expected outcomes (slot conflicts,
/// duplicate payment events, ineligible cancellations) are not errors and
/// are carried by their own result types instead.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("court {0} not found")]
    CourtNotFound(Uuid),
}
