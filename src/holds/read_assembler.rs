//! Read assembler (C9): merges C2 seat rows with the C3 overlay to produce
//! near-real-time seat views. Falls back to DB-only state if C3 is
//! unavailable. Never mutates the record store.

use std::sync::Arc;

use super::adapters::SeatLockStore;
use super::db::RecordStore;
use super::error::HoldError;
use super::types::{Event, EventId, SeatView};

pub struct ReadAssembler {
    db: Arc<RecordStore>,
    lock_store: Arc<dyn SeatLockStore>,
}

pub struct EventWithSeats {
    pub event: Event,
    pub seats: Vec<SeatView>,
    /// `true` if the overlay could not be fetched and seat statuses are
    /// DB-only.
    pub degraded: bool,
}

impl ReadAssembler {
    pub fn new(db: Arc<RecordStore>, lock_store: Arc<dyn SeatLockStore>) -> Self {
        ReadAssembler { db, lock_store }
    }

    pub async fn event_with_seats(&self, event_id: EventId) -> Result<EventWithSeats, HoldError> {
        let event = self
            .db
            .find_event(event_id)
            .await?
            .ok_or(HoldError::EventNotBookable(event_id))?;
        let seats = self.db.find_by_event_id_with_seats(event_id).await?;

        let (overlay, degraded) = match self.lock_store.get_event_overlay(event_id).await {
            Ok(overlay) => (overlay, false),
            Err(e) => {
                tracing::warn!(error = %e, event_id, "overlay unavailable, falling back to DB-only seat view");
                (std::collections::HashMap::new(), true)
            }
        };

        let views = seats
            .into_iter()
            .map(|seat| {
                let status = overlay.get(&seat.seat_id).copied().unwrap_or(seat.status);
                SeatView {
                    seat_id: seat.seat_id,
                    row_letter: seat.row_letter,
                    seat_number: seat.seat_number,
                    price: seat.price,
                    status: status.as_str(),
                }
            })
            .collect();

        Ok(EventWithSeats {
            event,
            seats: views,
            degraded,
        })
    }
}
