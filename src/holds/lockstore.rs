//! Redis-backed implementation of C3: per-seat TTL locks and the per-event
//! status overlay.
//!
//! Atomic reserve via `SET NX PX`, best-effort cleanup via `redis::pipe()`
//! bulk ops, and the wire contracts (`seat:{eventId}:{seatId}:HELD` lock
//! keys, `{eventId}:seat_status` overlay hash with a 600s refresh TTL).

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tokio::sync::mpsc;

use super::adapters::SeatLockStore;
use super::error::HoldError;
use super::state::SeatStatus;
use super::types::{EventId, SeatId};

/// Overlay entries refresh their TTL on every write.
pub const OVERLAY_TTL_SECONDS: u64 = 600;

/// Releases a lock only if its current value matches `expected`. Redis has
/// no native compare-and-delete, so this is a small Lua script executed
/// atomically (the standard Redis "distributed lock release" idiom).
const RELEASE_IF_MATCH_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct RedisLockStore {
    conn: ConnectionManager,
    redis_url: String,
}

impl RedisLockStore {
    pub async fn connect(redis_url: &str) -> Result<Self, HoldError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| HoldError::LockStore(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| HoldError::LockStore(e.to_string()))?;
        Ok(RedisLockStore {
            conn,
            redis_url: redis_url.to_string(),
        })
    }

    fn lock_key(event_id: EventId, seat_id: SeatId) -> String {
        format!("seat:{event_id}:{seat_id}:HELD")
    }

    fn overlay_key(event_id: EventId) -> String {
        format!("{event_id}:seat_status")
    }
}

#[async_trait]
impl SeatLockStore for RedisLockStore {
    async fn try_acquire_seat_lock(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        owner_value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, HoldError> {
        let mut conn = self.conn.clone();
        let key = Self::lock_key(event_id, seat_id);
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(owner_value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(HoldError::from)?;
        Ok(acquired.is_some())
    }

    async fn release_seat_lock(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        expected_owner_value: &str,
    ) -> Result<(), HoldError> {
        let mut conn = self.conn.clone();
        let key = Self::lock_key(event_id, seat_id);
        let script = redis::Script::new(RELEASE_IF_MATCH_SCRIPT);
        let _: i64 = script
            .key(&key)
            .arg(expected_owner_value)
            .invoke_async(&mut conn)
            .await
            .map_err(HoldError::from)?;
        Ok(())
    }

    async fn set_seat_status(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        status: SeatStatus,
    ) -> Result<(), HoldError> {
        self.set_seat_status_many(event_id, &[seat_id], status).await
    }

    async fn set_seat_status_many(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        status: SeatStatus,
    ) -> Result<(), HoldError> {
        if seat_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let key = Self::overlay_key(event_id);
        let mut pipe = redis::pipe();
        for seat_id in seat_ids {
            pipe.hset(&key, seat_id.to_string(), status.as_str());
        }
        pipe.expire(&key, OVERLAY_TTL_SECONDS as i64);
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(HoldError::from)?;
        Ok(())
    }

    async fn get_event_overlay(
        &self,
        event_id: EventId,
    ) -> Result<HashMap<SeatId, SeatStatus>, HoldError> {
        let mut conn = self.conn.clone();
        let key = Self::overlay_key(event_id);
        let raw: HashMap<String, String> = conn.hgetall(&key).await.map_err(HoldError::from)?;
        Ok(raw
            .into_iter()
            .filter_map(|(seat_id, status)| {
                let seat_id: SeatId = seat_id.parse().ok()?;
                let status: SeatStatus = status.parse().ok()?;
                Some((seat_id, status))
            })
            .collect())
    }

    async fn lock_matches(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        expected_owner_value: &str,
    ) -> Result<bool, HoldError> {
        let mut conn = self.conn.clone();
        let key = Self::lock_key(event_id, seat_id);
        let value: Option<String> = conn.get(&key).await.map_err(HoldError::from)?;
        Ok(value.as_deref() == Some(expected_owner_value))
    }

    /// Opens a dedicated pub/sub connection (separate from the shared
    /// `ConnectionManager`, which is for commands) and subscribes to
    /// `__keyevent@0__:expired`, forwarding each expired key as it arrives.
    async fn subscribe_expired_keys(&self, tx: mpsc::Sender<String>) -> Result<(), HoldError> {
        let client = redis::Client::open(self.redis_url.as_str()).map_err(HoldError::from)?;
        let mut pubsub = client.get_async_pubsub().await.map_err(HoldError::from)?;
        pubsub
            .psubscribe("__keyevent@0__:expired")
            .await
            .map_err(HoldError::from)?;

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let expired_key: String = match msg.get_payload() {
                Ok(k) => k,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed keyspace notification payload");
                    continue;
                }
            };
            if tx.send(expired_key).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Parses `seat:{eventId}:{seatId}:HELD` lock keys, as observed on the
/// `__keyevent@0__:expired` channel. Returns `None` (and the
/// caller logs a warning) on any other shape.
pub fn parse_expired_lock_key(key: &str) -> Option<(EventId, SeatId)> {
    let mut parts = key.split(':');
    if parts.next()? != "seat" {
        return None;
    }
    let event_id: EventId = parts.next()?.parse().ok()?;
    let seat_id: SeatId = parts.next()?.parse().ok()?;
    if parts.next()? != "HELD" {
        return None;
    }
    if parts.next().is_some() {
        return None;
    }
    Some((event_id, seat_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lock_keys() {
        assert_eq!(parse_expired_lock_key("seat:1:10:HELD"), Some((1, 10)));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(parse_expired_lock_key("seat:1:10"), None);
        assert_eq!(parse_expired_lock_key("seat:1:10:HELD:extra"), None);
        assert_eq!(parse_expired_lock_key("other:1:10:HELD"), None);
        assert_eq!(parse_expired_lock_key("seat:abc:10:HELD"), None);
    }
}
