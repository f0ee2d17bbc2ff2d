//! Error taxonomy for the seat-hold subsystem.
//!
//! Business errors
//! are values the orchestrator returns directly; only infra failures are
//! wrapped from the underlying driver errors via `From`.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum HoldError {
    // === Validation ===
    #[error("seat set must contain between 1 and {max} seats")]
    InvalidSeatCount { max: usize },

    #[error("duplicate seat id in request")]
    DuplicateSeatId,

    #[error("seat ids span more than one event")]
    CrossEventSeats,

    #[error("hold token must not be empty")]
    MissingHoldToken,

    #[error("payment id must not be empty")]
    MissingPaymentId,

    #[error("event {0} is not published")]
    EventNotBookable(i64),

    // === Business ===
    #[error("one or more requested seats are unavailable")]
    SeatsUnavailable,

    #[error("hold token not found")]
    HoldNotFound,

    #[error("hold is no longer active (expired, confirmed, or cancelled)")]
    HoldExpired,

    #[error("customer id does not match hold owner")]
    CustomerMismatch,

    #[error("booking reference not found")]
    BookingNotFound,

    // === Infra ===
    #[error("database error: {0}")]
    Database(String),

    #[error("lock store error: {0}")]
    LockStore(String),

    #[error("event log error: {0}")]
    EventLog(String),

    #[error("transient error, retry exhausted: {0}")]
    Transient(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    System(String),
}

impl HoldError {
    /// Stable machine-readable code, for API clients and logs.
    pub fn code(&self) -> &'static str {
        match self {
            HoldError::InvalidSeatCount { .. }
            | HoldError::DuplicateSeatId
            | HoldError::CrossEventSeats
            | HoldError::MissingHoldToken
            | HoldError::MissingPaymentId
            | HoldError::EventNotBookable(_) => "VALIDATION_ERROR",
            HoldError::SeatsUnavailable => "SEATS_UNAVAILABLE",
            HoldError::HoldNotFound | HoldError::BookingNotFound => "NOT_FOUND",
            HoldError::HoldExpired => "HOLD_EXPIRED",
            HoldError::CustomerMismatch => "CUSTOMER_MISMATCH",
            HoldError::Database(_) | HoldError::LockStore(_) | HoldError::EventLog(_) => {
                "INFRASTRUCTURE_ERROR"
            }
            HoldError::Transient(_) => "TRANSIENT_ERROR",
            HoldError::Timeout(_) => "TIMEOUT",
            HoldError::System(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status returned to the caller.
    pub fn http_status(&self) -> u16 {
        match self {
            HoldError::InvalidSeatCount { .. }
            | HoldError::DuplicateSeatId
            | HoldError::CrossEventSeats
            | HoldError::MissingHoldToken
            | HoldError::MissingPaymentId
            | HoldError::EventNotBookable(_)
            | HoldError::CustomerMismatch => 400,
            HoldError::HoldNotFound | HoldError::BookingNotFound => 404,
            HoldError::HoldExpired => 410,
            HoldError::SeatsUnavailable => 409,
            HoldError::Database(_) | HoldError::LockStore(_) | HoldError::EventLog(_) => 503,
            HoldError::Transient(_) => 503,
            HoldError::Timeout(_) => 504,
            HoldError::System(_) => 500,
        }
    }
}

impl From<sqlx::Error> for HoldError {
    fn from(e: sqlx::Error) -> Self {
        HoldError::Database(e.to_string())
    }
}

impl From<redis::RedisError> for HoldError {
    fn from(e: redis::RedisError) -> Self {
        HoldError::LockStore(e.to_string())
    }
}

impl From<anyhow::Error> for HoldError {
    fn from(e: anyhow::Error) -> Self {
        HoldError::System(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_match_spec_table() {
        assert_eq!(HoldError::SeatsUnavailable.http_status(), 409);
        assert_eq!(HoldError::HoldNotFound.http_status(), 404);
        assert_eq!(HoldError::HoldExpired.http_status(), 410);
        assert_eq!(HoldError::CustomerMismatch.http_status(), 400);
        assert_eq!(
            HoldError::InvalidSeatCount { max: 10 }.http_status(),
            400
        );
    }

    #[test]
    fn display_is_human_readable() {
        let e = HoldError::SeatsUnavailable;
        assert_eq!(e.to_string(), "one or more requested seats are unavailable");
    }
}
