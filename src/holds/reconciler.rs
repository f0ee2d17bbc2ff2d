//! Reconciler (C7): periodic safety net for expired holds whose TTL
//! notification was lost.
//!
//! A config struct with a `Default`, a `run() -> !` loop calling
//! `scan_and_recover()` on a fixed delay, and per-hold failure isolation
//! so one bad row doesn't abort the tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use super::adapters::{EventPublisher, SeatLockStore};
use super::db::RecordStore;
use super::error::HoldError;
use super::state::{HoldStatus, SeatStatus};
use super::types::SeatHold;

pub const HOLD_AUDIT_TOPIC: &str = "seat-hold-expired";

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Ships enabled by default: this is the safety net that closes the
    /// gap when an expiry notification from the lock store is lost, so
    /// disabling it should be a deliberate operator choice, not a default.
    pub enabled: bool,
    pub tick_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            enabled: true,
            tick_interval: Duration::from_secs(60),
        }
    }
}

pub struct Reconciler {
    db: Arc<RecordStore>,
    lock_store: Arc<dyn SeatLockStore>,
    publisher: Arc<dyn EventPublisher>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        db: Arc<RecordStore>,
        lock_store: Arc<dyn SeatLockStore>,
        publisher: Arc<dyn EventPublisher>,
        config: ReconcilerConfig,
    ) -> Self {
        Reconciler {
            db,
            lock_store,
            publisher,
            config,
        }
    }

    /// Runs until the process exits. No-ops forever if disabled, rather
    /// than refusing to start, so operators can flip the config knob live
    /// behind a restart without touching call sites.
    pub async fn run(&self) -> ! {
        loop {
            if self.config.enabled {
                match self.scan_and_recover().await {
                    Ok(recovered) if recovered > 0 => {
                        tracing::info!(recovered, "reconciler recovered expired holds");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "reconciler tick failed");
                    }
                }
            }
            tokio::time::sleep(self.config.tick_interval).await;
        }
    }

    /// One tick: returns the number of holds actually recovered.
    pub async fn scan_and_recover(&self) -> Result<usize, HoldError> {
        let now = Utc::now();
        let expired = self.db.find_expired_holds(now).await?;
        if expired.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = expired.len(), "reconciler found expired holds");

        let mut recovered = 0usize;
        for hold in &expired {
            match self.recover_one(hold, now).await {
                Ok(true) => recovered += 1,
                Ok(false) => {} // lock still present, TTL remains authoritative
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        hold_token = %hold.hold_token,
                        "failed to recover expired hold, continuing tick"
                    );
                }
            }
        }
        Ok(recovered)
    }

    /// If *any* seat's lock still matches the hold's owner value, the TTL
    /// is still authoritative — skip and let it fire naturally. Otherwise
    /// release and mark expired.
    async fn recover_one(&self, hold: &SeatHold, now: chrono::DateTime<Utc>) -> Result<bool, HoldError> {
        let owner_value = hold.owner_value();
        for &seat_id in &hold.seat_ids {
            if self
                .lock_store
                .lock_matches(hold.event_id, seat_id, &owner_value)
                .await?
            {
                return Ok(false);
            }
        }

        let mut tx = self.db.pool().begin().await?;
        let released = self.db.release_seats(&mut tx, &hold.seat_ids).await;
        let released = match released {
            Ok(n) => n,
            Err(e) => {
                tx.rollback().await.ok();
                self.lock_store
                    .set_seat_status_many(hold.event_id, &hold.seat_ids, SeatStatus::Held)
                    .await
                    .ok();
                return Err(e.into());
            }
        };
        if let Err(e) = self
            .db
            .set_hold_status(&mut tx, hold.hold_token.as_str(), HoldStatus::Expired)
            .await
        {
            tx.rollback().await.ok();
            self.lock_store
                .set_seat_status_many(hold.event_id, &hold.seat_ids, SeatStatus::Held)
                .await
                .ok();
            return Err(e.into());
        }
        if let Err(e) = tx.commit().await {
            self.lock_store
                .set_seat_status_many(hold.event_id, &hold.seat_ids, SeatStatus::Held)
                .await
                .ok();
            return Err(e.into());
        }

        self.lock_store
            .set_seat_status_many(hold.event_id, &hold.seat_ids, SeatStatus::Available)
            .await?;

        if released > 0 {
            let audit = json!({
                "eventType": "SEAT_HOLD_EXPIRED",
                "timestamp": now.timestamp_millis(),
                "source": "reconciler",
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
                // DB and overlay are already correctly recovered at this
                // point; a publish failure shouldn't turn a successful
                // recovery into a logged failure and drop it from the
                // recovered count.
                tracing::warn!(error = %e, hold_token = %hold.hold_token, "failed to publish reconciler expiry audit event");
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_enabled() {
        assert!(ReconcilerConfig::default().enabled);
        assert_eq!(ReconcilerConfig::default().tick_interval, Duration::from_secs(60));
    }
}
