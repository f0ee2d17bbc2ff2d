//! Seat/hold/booking state enums.
//!
//! State IDs are stable strings stored directly in Postgres (`status` columns
//! are `TEXT`, not `SMALLINT`) since nothing outside this crate needs a dense
//! numeric encoding and the hold/booking tables are low-volume relative to
//! the matching-engine style state the IDs convention was built for.

use std::fmt;

/// Seat lifecycle: `AVAILABLE -> HELD -> BOOKED`, with `HELD -> AVAILABLE` on
/// cancel or expiry. `BOOKED` is terminal for this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Held => "HELD",
            SeatStatus::Booked => "BOOKED",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatStatus::Available),
            "HELD" => Ok(SeatStatus::Held),
            "BOOKED" => Ok(SeatStatus::Booked),
            other => Err(format!("unknown seat status: {other}")),
        }
    }
}

/// SeatHold lifecycle: `ACTIVE` on creation, terminal into exactly one of
/// the other three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldStatus {
    Active,
    Expired,
    Confirmed,
    Cancelled,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Active => "ACTIVE",
            HoldStatus::Expired => "EXPIRED",
            HoldStatus::Confirmed => "CONFIRMED",
            HoldStatus::Cancelled => "CANCELLED",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HoldStatus::Active)
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HoldStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(HoldStatus::Active),
            "EXPIRED" => Ok(HoldStatus::Expired),
            "CONFIRMED" => Ok(HoldStatus::Confirmed),
            "CANCELLED" => Ok(HoldStatus::Cancelled),
            other => Err(format!("unknown hold status: {other}")),
        }
    }
}

/// Booking lifecycle: `CONFIRMED` on success, terminal (refunds out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "REFUNDED" => Ok(BookingStatus::Refunded),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_status_round_trips() {
        for s in [SeatStatus::Available, SeatStatus::Held, SeatStatus::Booked] {
            let parsed: SeatStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn hold_status_terminality() {
        assert!(!HoldStatus::Active.is_terminal());
        assert!(HoldStatus::Expired.is_terminal());
        assert!(HoldStatus::Confirmed.is_terminal());
        assert!(HoldStatus::Cancelled.is_terminal());
    }

    #[test]
    fn booking_status_round_trips() {
        for s in [
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Refunded,
        ] {
            let parsed: BookingStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
