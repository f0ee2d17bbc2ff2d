//! Hold orchestrator (C8): the protocol core. `PlaceHold`, `ConfirmBooking`,
//! `CancelHold`.
//!
//! Replaces framework-managed transaction/post-commit
//! annotations with an explicit [`UnitOfWork`] — a small registry of
//! post-commit / post-rollback actions invoked by the caller immediately
//! after `tx.commit()`/`tx.rollback()`. This is what makes the two overlay
//! paths (commit -> new status, rollback -> re-affirm prior status)
//! first-class instead of framework magic.
//!
//! CAS-gated DB transitions, idempotent dedup by request id, and explicit
//! fallback handling for a critical-path business rule: the
//! lock-store-unreachable degraded path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use super::adapters::{EventPublisher, SeatLockStore};
use super::db::RecordStore;
use super::error::HoldError;
use super::ids::HoldToken;
use super::state::{HoldStatus, SeatStatus};
use super::types::{BookingDto, CustomerId, EventId, HoldResponse, SeatHold, SeatHoldDto, SeatId};

pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_SEATS_PER_HOLD: usize = 10;
/// Bound on each suspension point (C2 tx, C3 lock op, C4 publish), per spec
/// §5's "bounded timeout (default 30s)".
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

const SEAT_HOLD_CREATED_TOPIC: &str = "seat-hold-created";
const SEAT_HOLD_CONFIRMED_TOPIC: &str = "seat-hold-confirmed";
const SEAT_HOLD_CANCELLED_TOPIC: &str = "seat-hold-cancelled";
const BOOKING_CONFIRMED_TOPIC: &str = "booking-confirmed";

/// Post-commit / post-rollback actions registered during a protocol step
/// and run by the orchestrator once the transaction boundary resolves.
/// Plain data, not closures, so the set of effects a step can have stays
/// enumerable and testable.
enum PostCommitHook {
    SetOverlayMany(EventId, Vec<SeatId>, SeatStatus),
    ReleaseLock(EventId, SeatId, String),
    Publish {
        topic: &'static str,
        partition_key: String,
        payload: serde_json::Value,
    },
}

enum PostRollbackHook {
    SetOverlayMany(EventId, Vec<SeatId>, SeatStatus),
}

#[derive(Default)]
struct UnitOfWork {
    post_commit: Vec<PostCommitHook>,
    post_rollback: Vec<PostRollbackHook>,
}

impl UnitOfWork {
    fn on_commit(&mut self, hook: PostCommitHook) {
        self.post_commit.push(hook);
    }

    fn on_rollback(&mut self, hook: PostRollbackHook) {
        self.post_rollback.push(hook);
    }
}

/// Tracks seat locks acquired mid-`PlaceHold` so a task that never reaches
/// the point where it would otherwise release or intentionally keep them —
/// aborted by `timeout_op`, or simply dropped on client disconnect — still
/// releases them instead of leaking until TTL. [`LockGuard::disarm`] must be
/// called once the locks' fate (released or deliberately kept) is decided
/// through the ordinary commit/rollback path; anything still tracked when
/// the guard drops is released best-effort in a detached task, since `Drop`
/// can't `.await`.
struct LockGuard {
    lock_store: Arc<dyn SeatLockStore>,
    event_id: EventId,
    owner_value: String,
    seat_ids: Vec<SeatId>,
}

impl LockGuard {
    fn new(lock_store: Arc<dyn SeatLockStore>, event_id: EventId, owner_value: String) -> Self {
        LockGuard {
            lock_store,
            event_id,
            owner_value,
            seat_ids: Vec::new(),
        }
    }

    fn track(&mut self, seat_id: SeatId) {
        self.seat_ids.push(seat_id);
    }

    /// Hands the tracked locks off to the caller's own release path; the
    /// guard no longer touches them on drop.
    fn disarm(&mut self) {
        self.seat_ids.clear();
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.seat_ids.is_empty() {
            return;
        }
        let lock_store = self.lock_store.clone();
        let event_id = self.event_id;
        let owner_value = self.owner_value.clone();
        let seat_ids = std::mem::take(&mut self.seat_ids);
        tokio::spawn(async move {
            for seat_id in seat_ids {
                if let Err(e) = lock_store.release_seat_lock(event_id, seat_id, &owner_value).await {
                    tracing::warn!(error = %e, event_id, seat_id, "lock release on cancellation failed");
                }
            }
        });
    }
}

pub struct HoldOrchestrator {
    db: Arc<RecordStore>,
    lock_store: Arc<dyn SeatLockStore>,
    publisher: Arc<dyn EventPublisher>,
    max_seats_per_hold: usize,
    hold_duration: Duration,
    operation_timeout: Duration,
}

impl HoldOrchestrator {
    pub fn new(
        db: Arc<RecordStore>,
        lock_store: Arc<dyn SeatLockStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        HoldOrchestrator {
            db,
            lock_store,
            publisher,
            max_seats_per_hold: DEFAULT_MAX_SEATS_PER_HOLD,
            hold_duration: DEFAULT_HOLD_DURATION,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_max_seats_per_hold(mut self, max: usize) -> Self {
        self.max_seats_per_hold = max;
        self
    }

    pub fn with_hold_duration(mut self, duration: Duration) -> Self {
        self.hold_duration = duration;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Bounds a single suspension point (C2 tx op, C3 lock op, C4 publish)
    /// to `operation_timeout`. `op_name` identifies the
    /// suspension point in the resulting [`HoldError::Timeout`].
    async fn timeout_op<T>(
        &self,
        op_name: &'static str,
        fut: impl Future<Output = Result<T, HoldError>>,
    ) -> Result<T, HoldError> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(HoldError::Timeout(op_name.to_string())),
        }
    }

    async fn run_unit_of_work(&self, uow: UnitOfWork, committed: bool) {
        if committed {
            for hook in uow.post_commit {
                match hook {
                    PostCommitHook::SetOverlayMany(event_id, seat_ids, status) => {
                        let result = self
                            .timeout_op("overlay_set_many", async {
                                self.lock_store
                                    .set_seat_status_many(event_id, &seat_ids, status)
                                    .await
                            })
                            .await;
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "overlay update after commit failed");
                        }
                    }
                    PostCommitHook::ReleaseLock(event_id, seat_id, owner_value) => {
                        let result = self
                            .timeout_op("lock_release", async {
                                self.lock_store
                                    .release_seat_lock(event_id, seat_id, &owner_value)
                                    .await
                            })
                            .await;
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "lock release after commit failed");
                        }
                    }
                    PostCommitHook::Publish {
                        topic,
                        partition_key,
                        payload,
                    } => {
                        let result = self
                            .timeout_op("event_publish", async {
                                self.publisher.publish(topic, &partition_key, payload).await
                            })
                            .await;
                        if let Err(e) = result {
                            // Audit publish failures never roll back a committed
                            // transaction.
                            tracing::warn!(error = %e, topic, "audit publish failed");
                        }
                    }
                }
            }
        } else {
            for hook in uow.post_rollback {
                match hook {
                    PostRollbackHook::SetOverlayMany(event_id, seat_ids, status) => {
                        let result = self
                            .timeout_op("overlay_set_many", async {
                                self.lock_store
                                    .set_seat_status_many(event_id, &seat_ids, status)
                                    .await
                            })
                            .await;
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "overlay re-affirmation after rollback failed");
                        }
                    }
                }
            }
        }
    }

    fn validate_seat_ids(&self, seat_ids: &[SeatId]) -> Result<(), HoldError> {
        if seat_ids.is_empty() || seat_ids.len() > self.max_seats_per_hold {
            return Err(HoldError::InvalidSeatCount {
                max: self.max_seats_per_hold,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for id in seat_ids {
            if !seen.insert(id) {
                return Err(HoldError::DuplicateSeatId);
            }
        }
        Ok(())
    }

    /// `PlaceHold`. `idempotency_key` is the client's
    /// `X-Idempotency-Key` (or a server-minted fallback); a repeat
    /// of the same key short-circuits to the hold created by the first
    /// request instead of re-running the protocol.
    pub async fn place_hold(
        &self,
        customer_id: CustomerId,
        event_id: EventId,
        seat_ids: Vec<SeatId>,
        hold_duration: Option<Duration>,
        idempotency_key: String,
    ) -> Result<HoldResponse, HoldError> {
        self.validate_seat_ids(&seat_ids)?;

        if let Some(existing) = self
            .timeout_op("idempotency_lookup", async {
                self.db
                    .find_by_idempotency_key(&idempotency_key)
                    .await
                    .map_err(HoldError::from)
            })
            .await?
        {
            if existing.customer_id != customer_id || existing.event_id != event_id {
                return Err(HoldError::CustomerMismatch);
            }
            return self.hold_response_for_existing(existing).await;
        }

        let event = self
            .timeout_op("find_event", async { self.db.find_event(event_id).await.map_err(HoldError::from) })
            .await?
            .ok_or(HoldError::EventNotBookable(event_id))?;
        if !event.published {
            return Err(HoldError::EventNotBookable(event_id));
        }

        let seats = self
            .timeout_op("find_seats", async {
                self.db.find_seats_by_ids(&seat_ids).await.map_err(HoldError::from)
            })
            .await?;
        if seats.len() != seat_ids.len() || seats.iter().any(|s| s.event_id != event_id) {
            return Err(HoldError::CrossEventSeats);
        }

        let hold_duration = hold_duration.unwrap_or(self.hold_duration);
        let hold_token = HoldToken::mint();
        let owner_value = format!("{customer_id}:{hold_token}");

        let mut lock_guard = LockGuard::new(self.lock_store.clone(), event_id, owner_value.clone());
        let degraded = match self
            .acquire_all_locks_or_release(event_id, &seat_ids, &owner_value, hold_duration)
            .await
        {
            LockAcquisition::Acquired(acquired) => {
                for seat_id in acquired {
                    lock_guard.track(seat_id);
                }
                false
            }
            LockAcquisition::Conflict => return Err(HoldError::SeatsUnavailable),
            LockAcquisition::StoreUnreachable => true,
        };

        let mut tx = self
            .timeout_op("tx_begin", async { self.db.pool().begin().await.map_err(HoldError::from) })
            .await?;
        let affected = if degraded {
            self.timeout_op("hold_seats_guarded_with_row_lock", async {
                self.db
                    .hold_seats_guarded_with_row_lock(&mut tx, &seat_ids)
                    .await
                    .map_err(HoldError::from)
            })
            .await?
        } else {
            self.timeout_op("hold_seats_guarded", async {
                self.db.hold_seats_guarded(&mut tx, &seat_ids).await.map_err(HoldError::from)
            })
            .await?
        };

        if affected as usize != seat_ids.len() {
            tx.rollback().await?;
            if !degraded {
                self.release_locks(event_id, &seat_ids, &owner_value).await;
            }
            lock_guard.disarm();
            return Err(HoldError::SeatsUnavailable);
        }

        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(hold_duration).unwrap_or(chrono::Duration::seconds(600));
        let hold = SeatHold {
            hold_token: hold_token.clone(),
            customer_id,
            event_id,
            seat_ids: seat_ids.clone(),
            status: HoldStatus::Active,
            expires_at,
            created_at: now,
            updated_at: now,
            idempotency_key: idempotency_key.clone(),
        };
        self.timeout_op("insert_seat_hold", async {
            self.db.insert_seat_hold(&mut tx, &hold).await.map_err(HoldError::from)
        })
        .await?;

        let mut uow = UnitOfWork::default();
        uow.on_commit(PostCommitHook::SetOverlayMany(
            event_id,
            seat_ids.clone(),
            SeatStatus::Held,
        ));
        uow.on_commit(PostCommitHook::Publish {
            topic: SEAT_HOLD_CREATED_TOPIC,
            partition_key: hold_token.to_string(),
            payload: json!({
                "eventType": "SEAT_HOLD_CREATED",
                "timestamp": now.timestamp_millis(),
                "source": "hold-orchestrator",
                "holdToken": hold_token.to_string(),
                "customerId": customer_id,
                "eventId": event_id,
                "seatIds": seat_ids,
                "status": HoldStatus::Active.as_str(),
                "expiresAt": expires_at.timestamp_millis(),
            }),
        });
        uow.on_rollback(PostRollbackHook::SetOverlayMany(
            event_id,
            seat_ids.clone(),
            SeatStatus::Available,
        ));

        match self.timeout_op("tx_commit", async { tx.commit().await.map_err(HoldError::from) }).await {
            Ok(()) => {
                // Locks are intentionally kept for the life of the hold; the
                // guard's job ends here.
                lock_guard.disarm();
                self.run_unit_of_work(uow, true).await;
            }
            Err(e) => {
                self.run_unit_of_work(uow, false).await;
                return Err(e);
            }
        }

        let total_amount: Decimal = seats.iter().map(|s| s.price).sum();
        let message = if degraded {
            "hold placed via degraded (DB-only) fallback: lock store unreachable".to_string()
        } else {
            "hold placed".to_string()
        };

        Ok(HoldResponse {
            hold_token: hold_token.to_string(),
            customer_id,
            event_id,
            event_title: event.title,
            seat_count: seat_ids.len(),
            total_amount,
            expires_at,
            status: "ACTIVE",
            created_at: now,
            message,
            degraded,
        })
    }

    /// Rebuilds the response a repeated `X-Idempotency-Key` would have
    /// produced, from the hold already on record instead of re-running the
    /// protocol.
    async fn hold_response_for_existing(&self, hold: SeatHold) -> Result<HoldResponse, HoldError> {
        let event = self
            .timeout_op("find_event", async {
                self.db.find_event(hold.event_id).await.map_err(HoldError::from)
            })
            .await?
            .ok_or(HoldError::EventNotBookable(hold.event_id))?;
        let seats = self
            .timeout_op("find_seats", async {
                self.db.find_seats_by_ids(&hold.seat_ids).await.map_err(HoldError::from)
            })
            .await?;
        let total_amount: Decimal = seats.iter().map(|s| s.price).sum();
        Ok(HoldResponse {
            hold_token: hold.hold_token.to_string(),
            customer_id: hold.customer_id,
            event_id: hold.event_id,
            event_title: event.title,
            seat_count: hold.seat_ids.len(),
            total_amount,
            expires_at: hold.expires_at,
            status: hold.status.as_str(),
            created_at: hold.created_at,
            message: "hold already placed for this idempotency key".to_string(),
            degraded: false,
        })
    }

    async fn acquire_all_locks_or_release(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        owner_value: &str,
        hold_duration: Duration,
    ) -> LockAcquisition {
        let mut acquired = Vec::with_capacity(seat_ids.len());
        for &seat_id in seat_ids {
            let result = self
                .timeout_op("lock_acquire", async {
                    self.lock_store
                        .try_acquire_seat_lock(event_id, seat_id, owner_value, hold_duration.as_secs())
                        .await
                })
                .await;
            match result {
                Ok(true) => acquired.push(seat_id),
                Ok(false) => {
                    self.release_locks(event_id, &acquired, owner_value).await;
                    return LockAcquisition::Conflict;
                }
                Err(_connection_error) => {
                    // Degraded path: release whatever we
                    // grabbed and fall back to DB-only guarding.
                    self.release_locks(event_id, &acquired, owner_value).await;
                    return LockAcquisition::StoreUnreachable;
                }
            }
        }
        LockAcquisition::Acquired(acquired)
    }

    async fn release_locks(&self, event_id: EventId, seat_ids: &[SeatId], owner_value: &str) {
        for &seat_id in seat_ids {
            let result = self
                .timeout_op("lock_release", async {
                    self.lock_store.release_seat_lock(event_id, seat_id, owner_value).await
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, event_id, seat_id, "failed to release lock during rollback");
            }
        }
    }

    /// `ConfirmBooking`.
    pub async fn confirm_booking(
        &self,
        hold_token: &str,
        customer_id: CustomerId,
        payment_id: &str,
    ) -> Result<BookingDto, HoldError> {
        if hold_token.is_empty() {
            return Err(HoldError::MissingHoldToken);
        }
        if payment_id.is_empty() {
            return Err(HoldError::MissingPaymentId);
        }

        let hold = self
            .timeout_op("find_by_hold_token", async {
                self.db.find_by_hold_token(hold_token).await.map_err(HoldError::from)
            })
            .await?
            .ok_or(HoldError::HoldNotFound)?;
        if hold.customer_id != customer_id {
            return Err(HoldError::CustomerMismatch);
        }
        if hold.status != HoldStatus::Active || hold.is_expired(Utc::now()) {
            return Err(HoldError::HoldExpired);
        }

        let mut tx = self
            .timeout_op("tx_begin", async { self.db.pool().begin().await.map_err(HoldError::from) })
            .await?;
        let affected = self
            .timeout_op("book_seats", async {
                self.db.book_seats(&mut tx, &hold.seat_ids).await.map_err(HoldError::from)
            })
            .await?;
        if affected as usize != hold.seat_ids.len() {
            // A concurrent expiry released the seats between load and update;
            // the DB predicate is load-bearing here, not the lock.
            tx.rollback().await?;
            return Err(HoldError::HoldExpired);
        }
        self.timeout_op("set_hold_status", async {
            self.db
                .set_hold_status(&mut tx, hold_token, HoldStatus::Confirmed)
                .await
                .map_err(HoldError::from)
        })
        .await?;

        let now = Utc::now();
        let total_amount: Decimal = self
            .timeout_op("find_seats", async {
                self.db.find_seats_by_ids(&hold.seat_ids).await.map_err(HoldError::from)
            })
            .await?
            .iter()
            .map(|s| s.price)
            .sum();
        let reference = self
            .timeout_op("insert_booking", async {
                self.db
                    .insert_booking(
                        &mut tx,
                        customer_id,
                        hold.event_id,
                        &hold.seat_ids,
                        total_amount,
                        payment_id,
                        &hold.hold_token,
                        now,
                    )
                    .await
                    .map_err(HoldError::from)
            })
            .await?;

        let mut uow = UnitOfWork::default();
        uow.on_commit(PostCommitHook::SetOverlayMany(
            hold.event_id,
            hold.seat_ids.clone(),
            SeatStatus::Booked,
        ));
        for &seat_id in &hold.seat_ids {
            uow.on_commit(PostCommitHook::ReleaseLock(
                hold.event_id,
                seat_id,
                hold.owner_value(),
            ));
        }
        uow.on_commit(PostCommitHook::Publish {
            topic: BOOKING_CONFIRMED_TOPIC,
            partition_key: hold_token.to_string(),
            payload: json!({
                "eventType": "BOOKING_CONFIRMED",
                "timestamp": now.timestamp_millis(),
                "source": "hold-orchestrator",
                "bookingReference": reference.to_string(),
                "customerId": customer_id,
                "eventId": hold.event_id,
                "seatIds": hold.seat_ids,
                "totalAmount": total_amount,
                "paymentId": payment_id,
                "holdToken": hold_token,
                "confirmedAt": now.timestamp_millis(),
            }),
        });
        uow.on_commit(PostCommitHook::Publish {
            topic: SEAT_HOLD_CONFIRMED_TOPIC,
            partition_key: hold_token.to_string(),
            payload: json!({
                "eventType": "SEAT_HOLD_CONFIRMED",
                "timestamp": now.timestamp_millis(),
                "source": "hold-orchestrator",
                "holdToken": hold_token,
                "customerId": customer_id,
                "eventId": hold.event_id,
                "seatIds": hold.seat_ids,
                "status": HoldStatus::Confirmed.as_str(),
                "expiresAt": hold.expires_at.timestamp_millis(),
            }),
        });
        uow.on_rollback(PostRollbackHook::SetOverlayMany(
            hold.event_id,
            hold.seat_ids.clone(),
            SeatStatus::Held,
        ));

        match self.timeout_op("tx_commit", async { tx.commit().await.map_err(HoldError::from) }).await {
            Ok(()) => self.run_unit_of_work(uow, true).await,
            Err(e) => {
                self.run_unit_of_work(uow, false).await;
                return Err(e);
            }
        }

        Ok(BookingDto {
            booking_reference: reference.to_string(),
            customer_id,
            event_id: hold.event_id,
            seat_ids: hold.seat_ids,
            total_amount,
            status: "CONFIRMED",
            payment_id: payment_id.to_string(),
            hold_token: hold_token.to_string(),
            confirmed_at: now,
        })
    }

    /// `CancelHold`.
    pub async fn cancel_hold(&self, hold_token: &str, customer_id: CustomerId) -> Result<(), HoldError> {
        if hold_token.is_empty() {
            return Err(HoldError::MissingHoldToken);
        }

        let mut tx = self
            .timeout_op("tx_begin", async { self.db.pool().begin().await.map_err(HoldError::from) })
            .await?;
        let hold = self
            .timeout_op("find_by_hold_token_for_update", async {
                self.db
                    .find_by_hold_token_for_update(&mut tx, hold_token)
                    .await
                    .map_err(HoldError::from)
            })
            .await?
            .ok_or(HoldError::HoldNotFound)?;
        if hold.customer_id != customer_id {
            tx.rollback().await?;
            return Err(HoldError::CustomerMismatch);
        }
        if hold.status != HoldStatus::Active {
            tx.rollback().await?;
            return Err(HoldError::HoldExpired);
        }

        self.timeout_op("release_seats", async {
            self.db.release_seats(&mut tx, &hold.seat_ids).await.map_err(HoldError::from)
        })
        .await?;
        self.timeout_op("set_hold_status", async {
            self.db
                .set_hold_status(&mut tx, hold_token, HoldStatus::Cancelled)
                .await
                .map_err(HoldError::from)
        })
        .await?;

        let mut uow = UnitOfWork::default();
        uow.on_commit(PostCommitHook::SetOverlayMany(
            hold.event_id,
            hold.seat_ids.clone(),
            SeatStatus::Available,
        ));
        for &seat_id in &hold.seat_ids {
            uow.on_commit(PostCommitHook::ReleaseLock(
                hold.event_id,
                seat_id,
                hold.owner_value(),
            ));
        }
        uow.on_commit(PostCommitHook::Publish {
            topic: SEAT_HOLD_CANCELLED_TOPIC,
            partition_key: hold_token.to_string(),
            payload: json!({
                "eventType": "SEAT_HOLD_CANCELLED",
                "timestamp": Utc::now().timestamp_millis(),
                "source": "hold-orchestrator",
                "holdToken": hold_token,
                "customerId": customer_id,
                "eventId": hold.event_id,
                "seatIds": hold.seat_ids,
                "status": HoldStatus::Cancelled.as_str(),
                "expiresAt": hold.expires_at.timestamp_millis(),
            }),
        });
        uow.on_rollback(PostRollbackHook::SetOverlayMany(
            hold.event_id,
            hold.seat_ids.clone(),
            SeatStatus::Held,
        ));

        match self.timeout_op("tx_commit", async { tx.commit().await.map_err(HoldError::from) }).await {
            Ok(()) => {
                self.run_unit_of_work(uow, true).await;
                Ok(())
            }
            Err(e) => {
                self.run_unit_of_work(uow, false).await;
                Err(e)
            }
        }
    }

    pub async fn get_hold(&self, hold_token: &str) -> Result<SeatHoldDto, HoldError> {
        let hold = self
            .db
            .find_by_hold_token(hold_token)
            .await?
            .ok_or(HoldError::HoldNotFound)?;
        Ok(SeatHoldDto::from(&hold))
    }

    pub async fn get_booking(&self, booking_reference: &str) -> Result<BookingDto, HoldError> {
        let booking = self
            .db
            .find_booking_by_reference(booking_reference)
            .await?
            .ok_or(HoldError::BookingNotFound)?;
        Ok(BookingDto::from(&booking))
    }
}

enum LockAcquisition {
    Acquired(Vec<SeatId>),
    Conflict,
    StoreUnreachable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holds::adapters::{MockEventPublisher, MockLockStore};

    fn test_orchestrator() -> (Arc<MockLockStore>, Arc<MockEventPublisher>) {
        (Arc::new(MockLockStore::new()), Arc::new(MockEventPublisher::new()))
    }

    #[test]
    fn rejects_empty_and_oversized_seat_sets() {
        let (lock_store, publisher) = test_orchestrator();
        // db is only touched after validation passes, so a pool-less
        // construction is fine for this synchronous check.
        let orchestrator = HoldOrchestratorValidationOnly {
            max_seats_per_hold: DEFAULT_MAX_SEATS_PER_HOLD,
        };
        assert!(orchestrator.validate_seat_ids(&[]).is_err());
        let too_many: Vec<SeatId> = (0..(DEFAULT_MAX_SEATS_PER_HOLD as i64 + 1)).collect();
        assert!(orchestrator.validate_seat_ids(&too_many).is_err());
        let _ = (lock_store, publisher);
    }

    #[test]
    fn rejects_duplicate_seat_ids() {
        let orchestrator = HoldOrchestratorValidationOnly {
            max_seats_per_hold: DEFAULT_MAX_SEATS_PER_HOLD,
        };
        assert!(matches!(
            orchestrator.validate_seat_ids(&[1, 1]),
            Err(HoldError::DuplicateSeatId)
        ));
    }

    /// Mirrors [`HoldOrchestrator::validate_seat_ids`] without requiring a
    /// `RecordStore`/`PgPool`, so validation-only behavior is unit
    /// testable without a live database.
    struct HoldOrchestratorValidationOnly {
        max_seats_per_hold: usize,
    }

    impl HoldOrchestratorValidationOnly {
        fn validate_seat_ids(&self, seat_ids: &[SeatId]) -> Result<(), HoldError> {
            if seat_ids.is_empty() || seat_ids.len() > self.max_seats_per_hold {
                return Err(HoldError::InvalidSeatCount {
                    max: self.max_seats_per_hold,
                });
            }
            let mut seen = std::collections::HashSet::new();
            for id in seat_ids {
                if !seen.insert(id) {
                    return Err(HoldError::DuplicateSeatId);
                }
            }
            Ok(())
        }
    }

    // ---- Real-orchestrator tests, against a live Postgres ------------
    //
    // `MockLockStore`/`MockEventPublisher` exercise C3/C4; `test_pool()`
    // mirrors `db::tests::test_pool` and is `#[ignore]`d, gated on
    // `TEST_DATABASE_URL`, and skipped gracefully when unset.

    use sqlx::PgPool;

    const TEST_DATABASE_URL_ENV: &str = "TEST_DATABASE_URL";

    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var(TEST_DATABASE_URL_ENV).ok()?;
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .ok()
    }

    /// Inserts an event and `n` sequentially numbered seats, returning
    /// `(event_id, seat_ids)`. Event/seat ids are randomized so repeated
    /// test runs against the same database don't collide.
    async fn seed_event_with_seats(pool: &PgPool, n: i64) -> (i64, Vec<i64>) {
        let event_id: i64 = rand::random::<u32>() as i64;
        sqlx::query("INSERT INTO events (event_id, title, total_capacity, published) VALUES ($1, $2, $3, true)")
            .bind(event_id)
            .bind("orchestrator test event")
            .bind(n as i32)
            .execute(pool)
            .await
            .unwrap();
        let mut seat_ids = Vec::with_capacity(n as usize);
        for i in 0..n {
            let seat_id: i64 = event_id * 1000 + i;
            sqlx::query(
                "INSERT INTO seats (seat_id, event_id, row_letter, seat_number, price, status, version) \
                 VALUES ($1, $2, 'A', $3, 25.00, 'AVAILABLE', 0)",
            )
            .bind(seat_id)
            .bind(event_id)
            .bind(i as i32 + 1)
            .execute(pool)
            .await
            .unwrap();
            seat_ids.push(seat_id);
        }
        (event_id, seat_ids)
    }

    fn test_orchestrator_with(
        pool: PgPool,
        lock_store: Arc<MockLockStore>,
        publisher: Arc<MockEventPublisher>,
    ) -> HoldOrchestrator {
        HoldOrchestrator::new(Arc::new(RecordStore::new(pool)), lock_store, publisher)
    }

    #[tokio::test]
    #[ignore]
    async fn place_hold_then_confirm_then_get_booking() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: {TEST_DATABASE_URL_ENV} not set");
            return;
        };
        let (event_id, seat_ids) = seed_event_with_seats(&pool, 2).await;
        let lock_store = Arc::new(MockLockStore::new());
        let publisher = Arc::new(MockEventPublisher::new());
        let orchestrator = test_orchestrator_with(pool, lock_store.clone(), publisher.clone());

        let hold = orchestrator
            .place_hold(42, event_id, seat_ids.clone(), None, "idem-key-1".to_string())
            .await
            .unwrap();
        assert_eq!(hold.status, "ACTIVE");
        assert!(!hold.degraded);
        assert_eq!(publisher.count_for_topic("seat-hold-created"), 1);

        let booking = orchestrator
            .confirm_booking(&hold.hold_token, 42, "payment-1")
            .await
            .unwrap();
        assert_eq!(booking.status, "CONFIRMED");
        assert_eq!(publisher.count_for_topic("booking-confirmed"), 1);

        let fetched = orchestrator.get_booking(&booking.booking_reference).await.unwrap();
        assert_eq!(fetched.booking_reference, booking.booking_reference);
    }

    #[tokio::test]
    #[ignore]
    async fn place_hold_is_idempotent_on_repeated_key() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: {TEST_DATABASE_URL_ENV} not set");
            return;
        };
        let (event_id, seat_ids) = seed_event_with_seats(&pool, 1).await;
        let orchestrator = test_orchestrator_with(pool, Arc::new(MockLockStore::new()), Arc::new(MockEventPublisher::new()));

        let first = orchestrator
            .place_hold(7, event_id, seat_ids.clone(), None, "idem-key-2".to_string())
            .await
            .unwrap();
        let second = orchestrator
            .place_hold(7, event_id, seat_ids.clone(), None, "idem-key-2".to_string())
            .await
            .unwrap();
        assert_eq!(first.hold_token, second.hold_token);
    }

    #[tokio::test]
    #[ignore]
    async fn place_hold_reports_seats_unavailable_on_lock_conflict() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: {TEST_DATABASE_URL_ENV} not set");
            return;
        };
        let (event_id, seat_ids) = seed_event_with_seats(&pool, 1).await;
        let lock_store = Arc::new(MockLockStore::new());
        lock_store.set_fail_acquire(true);
        let orchestrator = test_orchestrator_with(pool, lock_store, Arc::new(MockEventPublisher::new()));

        let result = orchestrator
            .place_hold(1, event_id, seat_ids, None, "idem-key-3".to_string())
            .await;
        assert!(matches!(result, Err(HoldError::SeatsUnavailable)));
    }

    #[tokio::test]
    #[ignore]
    async fn place_hold_falls_back_to_degraded_mode_when_lock_store_unreachable() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: {TEST_DATABASE_URL_ENV} not set");
            return;
        };
        let (event_id, seat_ids) = seed_event_with_seats(&pool, 1).await;
        let lock_store = Arc::new(MockLockStore::new());
        lock_store.set_unreachable(true);
        let orchestrator = test_orchestrator_with(pool, lock_store, Arc::new(MockEventPublisher::new()));

        let hold = orchestrator
            .place_hold(1, event_id, seat_ids, None, "idem-key-4".to_string())
            .await
            .unwrap();
        assert!(hold.degraded);
    }

    #[tokio::test]
    #[ignore]
    async fn cancel_hold_releases_seats_and_publishes() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: {TEST_DATABASE_URL_ENV} not set");
            return;
        };
        let (event_id, seat_ids) = seed_event_with_seats(&pool, 1).await;
        let publisher = Arc::new(MockEventPublisher::new());
        let orchestrator = test_orchestrator_with(pool, Arc::new(MockLockStore::new()), publisher.clone());

        let hold = orchestrator
            .place_hold(3, event_id, seat_ids, None, "idem-key-5".to_string())
            .await
            .unwrap();
        orchestrator.cancel_hold(&hold.hold_token, 3).await.unwrap();
        assert_eq!(publisher.count_for_topic("seat-hold-cancelled"), 1);

        let refetched = orchestrator.get_hold(&hold.hold_token).await.unwrap();
        assert_eq!(refetched.status, "CANCELLED");
    }
}
