//! Testable seams over C3 (lock/overlay store) and C4 (event log).
//!
//! Production code depends on these traits, not on `redis`/`rdkafka`
//! directly, so the orchestrator/reconciler/consumer can be exercised with
//! in-memory doubles in unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::error::HoldError;
use super::state::SeatStatus;
use super::types::{EventId, SeatId};

/// Per-seat TTL lock + per-event status overlay (C3).
#[async_trait]
pub trait SeatLockStore: Send + Sync {
    /// Atomic set-if-absent with expiry. `true` iff the key did not exist.
    async fn try_acquire_seat_lock(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        owner_value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, HoldError>;

    /// Atomic delete-if-equal (compare-and-delete). Not an error if the key
    /// is already gone or held by a different owner (a no-op TTL race).
    async fn release_seat_lock(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        expected_owner_value: &str,
    ) -> Result<(), HoldError>;

    async fn set_seat_status(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        status: SeatStatus,
    ) -> Result<(), HoldError>;

    async fn set_seat_status_many(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        status: SeatStatus,
    ) -> Result<(), HoldError>;

    async fn get_event_overlay(
        &self,
        event_id: EventId,
    ) -> Result<HashMap<SeatId, SeatStatus>, HoldError>;

    /// Checks whether a lock still exists and matches `expected_owner_value`
    /// (used by the reconciler).
    async fn lock_matches(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        expected_owner_value: &str,
    ) -> Result<bool, HoldError>;

    /// Subscribes to this store's TTL-expiration notifications, forwarding
    /// each expired lock key to `tx` until the subscription ends or the
    /// receiving end is dropped. Lets the expiry signaler run against
    /// `MockLockStore` instead of only a live Redis connection.
    async fn subscribe_expired_keys(&self, tx: mpsc::Sender<String>) -> Result<(), HoldError>;
}

/// Append-only partitioned topics (C4).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// `partition_key` is `{eventId}:{seatId}` for transition events or the
    /// hold token for audit events.
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: serde_json::Value,
    ) -> Result<(), HoldError>;
}

/// In-memory `SeatLockStore` for unit tests.
#[derive(Default)]
pub struct MockLockStore {
    locks: Mutex<HashMap<(EventId, SeatId), String>>,
    overlay: Mutex<HashMap<EventId, HashMap<SeatId, SeatStatus>>>,
    pub acquire_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    fail_acquire: Mutex<bool>,
    unreachable: Mutex<bool>,
    expired_keys: Mutex<Vec<String>>,
}

impl MockLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        *self.fail_acquire.lock().unwrap() = fail;
    }

    /// Simulates a C3 connection-type error for the degraded-path test.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    /// Queues a key to be delivered by the next `subscribe_expired_keys`
    /// call, standing in for a real Redis keyspace notification.
    pub fn queue_expired_key(&self, key: impl Into<String>) {
        self.expired_keys.lock().unwrap().push(key.into());
    }
}

#[async_trait]
impl SeatLockStore for MockLockStore {
    async fn try_acquire_seat_lock(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        owner_value: &str,
        _ttl_seconds: u64,
    ) -> Result<bool, HoldError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if *self.unreachable.lock().unwrap() {
            return Err(HoldError::LockStore("connection refused (mock)".into()));
        }
        if *self.fail_acquire.lock().unwrap() {
            return Ok(false);
        }
        let mut locks = self.locks.lock().unwrap();
        if locks.contains_key(&(event_id, seat_id)) {
            return Ok(false);
        }
        locks.insert((event_id, seat_id), owner_value.to_string());
        Ok(true)
    }

    async fn release_seat_lock(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        expected_owner_value: &str,
    ) -> Result<(), HoldError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        let mut locks = self.locks.lock().unwrap();
        if let Some(v) = locks.get(&(event_id, seat_id)) {
            if v == expected_owner_value {
                locks.remove(&(event_id, seat_id));
            }
        }
        Ok(())
    }

    async fn set_seat_status(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        status: SeatStatus,
    ) -> Result<(), HoldError> {
        self.overlay
            .lock()
            .unwrap()
            .entry(event_id)
            .or_default()
            .insert(seat_id, status);
        Ok(())
    }

    async fn set_seat_status_many(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        status: SeatStatus,
    ) -> Result<(), HoldError> {
        let mut overlay = self.overlay.lock().unwrap();
        let event_overlay = overlay.entry(event_id).or_default();
        for seat_id in seat_ids {
            event_overlay.insert(*seat_id, status);
        }
        Ok(())
    }

    async fn get_event_overlay(
        &self,
        event_id: EventId,
    ) -> Result<HashMap<SeatId, SeatStatus>, HoldError> {
        Ok(self
            .overlay
            .lock()
            .unwrap()
            .get(&event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn lock_matches(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        expected_owner_value: &str,
    ) -> Result<bool, HoldError> {
        Ok(self
            .locks
            .lock()
            .unwrap()
            .get(&(event_id, seat_id))
            .map(|v| v == expected_owner_value)
            .unwrap_or(false))
    }

    async fn subscribe_expired_keys(&self, tx: mpsc::Sender<String>) -> Result<(), HoldError> {
        let keys = std::mem::take(&mut *self.expired_keys.lock().unwrap());
        for key in keys {
            if tx.send(key).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// In-memory `EventPublisher` for unit tests.
#[derive(Default)]
pub struct MockEventPublisher {
    pub published: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_for_topic(&self, topic: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == topic)
            .count()
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: serde_json::Value,
    ) -> Result<(), HoldError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), partition_key.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_acquire_then_release_frees_the_seat() {
        let store = MockLockStore::new();
        assert!(
            store
                .try_acquire_seat_lock(1, 10, "100:HOLD_x", 600)
                .await
                .unwrap()
        );
        assert!(
            !store
                .try_acquire_seat_lock(1, 10, "101:HOLD_y", 600)
                .await
                .unwrap()
        );
        store
            .release_seat_lock(1, 10, "100:HOLD_x")
            .await
            .unwrap();
        assert!(
            store
                .try_acquire_seat_lock(1, 10, "101:HOLD_y", 600)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn release_with_wrong_owner_is_a_no_op() {
        let store = MockLockStore::new();
        store
            .try_acquire_seat_lock(1, 10, "100:HOLD_x", 600)
            .await
            .unwrap();
        store
            .release_seat_lock(1, 10, "999:HOLD_other")
            .await
            .unwrap();
        assert!(store.lock_matches(1, 10, "100:HOLD_x").await.unwrap());
    }
}
