//! Flat value records for Event, Seat, SeatHold, Booking.
//!
//! Entities are plain structs fetched explicitly through [`crate::holds::db`]
//! calls, never navigated as a cyclic object graph.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::ids::{BookingReference, HoldToken};
use super::state::{BookingStatus, HoldStatus, SeatStatus};

pub type EventId = i64;
pub type SeatId = i64;
pub type CustomerId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_id: EventId,
    pub title: String,
    pub total_capacity: i32,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Seat {
    pub seat_id: SeatId,
    pub event_id: EventId,
    pub row_letter: String,
    pub seat_number: i32,
    pub price: Decimal,
    pub status: SeatStatus,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeatHold {
    pub hold_token: HoldToken,
    pub customer_id: CustomerId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub status: HoldStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `X-Idempotency-Key`, client-supplied or server-minted.
    pub idempotency_key: String,
}

impl SeatHold {
    /// `ownerValue` recorded in the per-seat lock: `"{customerId}:{holdToken}"`.
    pub fn owner_value(&self) -> String {
        format!("{}:{}", self.customer_id, self.hold_token)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub booking_reference: BookingReference,
    pub customer_id: CustomerId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_id: String,
    pub hold_token: HoldToken,
    pub confirmed_at: DateTime<Utc>,
}

/// Response DTO for `PlaceHold`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HoldResponse {
    pub hold_token: String,
    pub customer_id: CustomerId,
    pub event_id: EventId,
    pub event_title: String,
    pub seat_count: usize,
    pub total_amount: Decimal,
    pub expires_at: DateTime<Utc>,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub message: String,
    /// Set when C3 was unreachable and the hold was placed via DB-only
    /// fallback.
    pub degraded: bool,
}

/// Response DTO for `ConfirmBooking`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BookingDto {
    pub booking_reference: String,
    pub customer_id: CustomerId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub total_amount: Decimal,
    pub status: &'static str,
    pub payment_id: String,
    pub hold_token: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Response DTO for `GET /api/bookings/hold/{holdToken}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SeatHoldDto {
    pub hold_token: String,
    pub customer_id: CustomerId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub status: &'static str,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&SeatHold> for SeatHoldDto {
    fn from(h: &SeatHold) -> Self {
        SeatHoldDto {
            hold_token: h.hold_token.to_string(),
            customer_id: h.customer_id,
            event_id: h.event_id,
            seat_ids: h.seat_ids.clone(),
            status: h.status.as_str(),
            expires_at: h.expires_at,
            created_at: h.created_at,
        }
    }
}

impl From<&Booking> for BookingDto {
    fn from(b: &Booking) -> Self {
        BookingDto {
            booking_reference: b.booking_reference.to_string(),
            customer_id: b.customer_id,
            event_id: b.event_id,
            seat_ids: b.seat_ids.clone(),
            total_amount: b.total_amount,
            status: b.status.as_str(),
            payment_id: b.payment_id.clone(),
            hold_token: b.hold_token.to_string(),
            confirmed_at: b.confirmed_at,
        }
    }
}

/// Seat view merged with C3 overlay, for C9.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SeatView {
    pub seat_id: SeatId,
    pub row_letter: String,
    pub seat_number: i32,
    pub price: Decimal,
    pub status: &'static str,
}
