//! State-transition consumer (C6): applies `HELD -> AVAILABLE` for seats
//! whose hold expired, driven by messages on `seat-state-transitions`.
//!
//! Ordering for a given seat is preserved by partitioning on
//! `{eventId}:{seatId}` (handled by the Kafka consumer group upstream in
//! `holds::eventlog::subscribe`); this module processes one decoded message
//! at a time and is safe to call concurrently across distinct seats.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::adapters::{EventPublisher, SeatLockStore};
use super::db::RecordStore;
use super::error::HoldError;
use super::state::{HoldStatus, SeatStatus};
use super::types::{EventId, SeatId};

pub const HOLD_AUDIT_TOPIC: &str = "seat-hold-expired";

#[derive(Debug, Deserialize)]
struct SeatHoldExpiredPayload {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(rename = "eventId")]
    event_id: EventId,
    #[serde(rename = "seatId")]
    seat_id: SeatId,
}

pub struct TransitionConsumer {
    db: Arc<RecordStore>,
    lock_store: Arc<dyn SeatLockStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl TransitionConsumer {
    pub fn new(
        db: Arc<RecordStore>,
        lock_store: Arc<dyn SeatLockStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        TransitionConsumer {
            db,
            lock_store,
            publisher,
        }
    }

    /// Processes one raw `seat-state-transitions` payload. Unknown event
    /// types and malformed payloads are logged and acknowledged (return
    /// `Ok(())`, not retried); any other error propagates so
    /// the caller leaves the message unacked for redelivery.
    pub async fn handle(&self, payload: serde_json::Value) -> Result<(), HoldError> {
        let parsed: Result<SeatHoldExpiredPayload, _> = serde_json::from_value(payload.clone());
        let event = match parsed {
            Ok(e) if e.event_type == "SEAT_HOLD_EXPIRED" => e,
            Ok(e) => {
                tracing::info!(event_type = %e.event_type, "ignoring unknown transition event type");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, payload = %payload, "malformed transition payload, acking");
                return Ok(());
            }
        };
        self.apply_seat_hold_expired(event.event_id, event.seat_id).await
    }

    async fn apply_seat_hold_expired(
        &self,
        event_id: EventId,
        seat_id: SeatId,
    ) -> Result<(), HoldError> {
        let mut tx = self.db.pool().begin().await?;
        let affected = self.db.release_seats(&mut tx, &[seat_id]).await?;
        if affected == 0 {
            // Seat already AVAILABLE or BOOKED: idempotency cut.
            tx.rollback().await?;
            return Ok(());
        }

        let now = Utc::now();
        let expired_holds = self
            .db
            .find_expired_holds_for_seat(event_id, seat_id, now)
            .await?;
        for hold in &expired_holds {
            self.db
                .set_hold_status(&mut tx, hold.hold_token.as_str(), HoldStatus::Expired)
                .await?;
        }
        tx.commit().await?;

        // The DB transition is durably committed at this point; the hold is
        // already EXPIRED and won't be picked up by the reconciler (which
        // only scans ACTIVE holds), so a transient failure here must be
        // logged and swallowed rather than propagated — returning Err would
        // nack the message and redeliver it, but redelivery re-enters the
        // idempotency cut above and never retries this overlay/audit step.
        if let Err(e) = self
            .lock_store
            .set_seat_status(event_id, seat_id, SeatStatus::Available)
            .await
        {
            tracing::warn!(error = %e, event_id, seat_id, "failed to update overlay after expiry commit");
        }

        for hold in &expired_holds {
            let audit = json!({
                "eventType": "SEAT_HOLD_EXPIRED",
                "timestamp": now.timestamp_millis(),
                "source": "state-transition-consumer",
                "holdToken": hold.hold_token.to_string(),
                "customerId": hold.customer_id,
                "eventId": hold.event_id,
                "seatIds": hold.seat_ids,
                "status": HoldStatus::Expired.as_str(),
                "expiresAt": hold.expires_at.timestamp_millis(),
            });
            if let Err(e) = self
                .publisher
                .publish(HOLD_AUDIT_TOPIC, hold.hold_token.as_str(), audit)
                .await
            {
                tracing::warn!(error = %e, hold_token = %hold.hold_token, "failed to publish expiry audit event");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_expected_payload_shape() {
        let payload = json!({
            "eventType": "SEAT_HOLD_EXPIRED",
            "timestamp": 1,
            "source": "lock-ttl",
            "eventId": 1,
            "seatId": 10,
        });
        let parsed: SeatHoldExpiredPayload = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.event_type, "SEAT_HOLD_EXPIRED");
        assert_eq!(parsed.event_id, 1);
        assert_eq!(parsed.seat_id, 10);
    }
}
