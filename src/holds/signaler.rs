//! Expiry signaler (C5): observes C3's TTL-expiration notifications and
//! emits one event per seat onto `seat-state-transitions`.
//!
//! A cheap, crash-tolerant translator — no database access, no state beyond
//! the subscription itself. Modeled as a long-lived task with an explicit
//! start/stop lifecycle, not a global singleton listener. Talks to C3
//! through the `SeatLockStore` trait's `subscribe_expired_keys`, so this
//! can run against `MockLockStore` in tests instead of only a live Redis
//! connection.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;

use super::adapters::{EventPublisher, SeatLockStore};
use super::error::HoldError;
use super::lockstore::parse_expired_lock_key;

pub const SEAT_STATE_TRANSITIONS_TOPIC: &str = "seat-state-transitions";

/// Runs until the subscription ends or the task is aborted, translating
/// each expired lock key from `lock_store` into one `seat-state-transitions`
/// event.
pub async fn run(
    lock_store: Arc<dyn SeatLockStore>,
    publisher: Arc<dyn EventPublisher>,
) -> Result<(), HoldError> {
    let (tx, mut rx) = mpsc::channel(256);
    let subscription = lock_store.subscribe_expired_keys(tx);
    tokio::pin!(subscription);

    loop {
        tokio::select! {
            key = rx.recv() => {
                match key {
                    Some(expired_key) => handle_expired_key(&expired_key, &publisher).await,
                    None => return Ok(()),
                }
            }
            result = &mut subscription => {
                return result;
            }
        }
    }
}

async fn handle_expired_key(expired_key: &str, publisher: &Arc<dyn EventPublisher>) {
    let Some((event_id, seat_id)) = parse_expired_lock_key(expired_key) else {
        tracing::warn!(key = %expired_key, "dropping expired key with unrecognized shape");
        return;
    };
    let partition_key = format!("{event_id}:{seat_id}");
    let payload = json!({
        "eventType": "SEAT_HOLD_EXPIRED",
        "timestamp": Utc::now().timestamp_millis(),
        "source": "lock-ttl",
        "eventId": event_id,
        "seatId": seat_id,
    });
    if let Err(e) = publisher
        .publish(SEAT_STATE_TRANSITIONS_TOPIC, &partition_key, payload)
        .await
    {
        tracing::warn!(error = %e, event_id, seat_id, "failed to publish expiry signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holds::adapters::MockEventPublisher;

    #[tokio::test]
    async fn publishes_one_event_per_well_formed_key() {
        let mock = Arc::new(MockEventPublisher::new());
        let publisher: Arc<dyn EventPublisher> = mock.clone();
        handle_expired_key("seat:1:10:HELD", &publisher).await;
        assert_eq!(mock.count_for_topic(SEAT_STATE_TRANSITIONS_TOPIC), 1);
    }

    #[tokio::test]
    async fn drops_malformed_key_without_publishing() {
        let mock = Arc::new(MockEventPublisher::new());
        let publisher: Arc<dyn EventPublisher> = mock.clone();
        handle_expired_key("garbage", &publisher).await;
        assert_eq!(mock.count_for_topic(SEAT_STATE_TRANSITIONS_TOPIC), 0);
    }
}
