//! Identifier mint (C1): hold tokens, booking references, idempotency keys.

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;

/// Opaque hold token: `HOLD_` followed by 32 uppercase alphanumeric
/// characters of randomness, total length ~37.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HoldToken(String);

impl HoldToken {
    pub fn mint() -> Self {
        let body: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect();
        HoldToken(format!("HOLD_{body}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HoldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for HoldToken {
    fn from(s: String) -> Self {
        HoldToken(s)
    }
}

impl std::ops::Deref for HoldToken {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// Opaque booking reference: 8 uppercase alphanumeric characters.
///
/// Uniqueness is enforced by the `bookings.booking_reference` unique index,
/// not by entropy alone; [`crate::holds::db::RecordStore::insert_booking`]
/// retries minting on a unique-constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookingReference(String);

impl BookingReference {
    pub fn mint() -> Self {
        let body: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect();
        BookingReference(body)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BookingReference {
    fn from(s: String) -> Self {
        BookingReference(s)
    }
}

/// Maximum mint attempts before surfacing a system error.
pub const MAX_BOOKING_REFERENCE_ATTEMPTS: u32 = 5;

/// Idempotency key minted for clients that don't supply `X-Idempotency-Key`
/// on `POST /api/bookings/hold`. Used as-is by
/// [`crate::http::place_hold`] as a fallback so every hold carries a key the
/// record store can dedup on, even when the client opts out of supplying
/// its own.
pub fn mint_idempotency_key() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_token_shape() {
        let t = HoldToken::mint();
        assert!(t.as_str().starts_with("HOLD_"));
        assert_eq!(t.as_str().len(), 5 + 32);
        assert!(t.as_str()[5..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn booking_reference_shape() {
        let r = BookingReference::mint();
        assert_eq!(r.as_str().len(), 8);
        assert!(r.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hold_tokens_are_practically_unique() {
        let a = HoldToken::mint();
        let b = HoldToken::mint();
        assert_ne!(a, b);
    }
}
