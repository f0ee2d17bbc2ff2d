//! Record store (C2): the system of record for events, seats, holds, and
//! bookings.
//!
//! All correctness-critical operations are conditional `UPDATE ... WHERE`
//! statements whose caller checks `rows_affected()`. No `SELECT ... FOR
//! UPDATE` appears on the hot `PlaceHold` path; row locks are reserved for
//! the degraded fallback and the cancel/confirm paths that already hold a
//! hold-token scoped row.
//!
//! Uses runtime-checked `sqlx::query`/`sqlx::query_as` (not the
//! compile-time `query!`/`query_as!` macros) throughout, since those macros
//! need a live `DATABASE_URL` at build time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use super::ids::{BookingReference, HoldToken, MAX_BOOKING_REFERENCE_ATTEMPTS};
use super::state::{BookingStatus, HoldStatus, SeatStatus};
use super::types::{Booking, CustomerId, Event, EventId, Seat, SeatHold, SeatId};

pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    pub fn new(pool: PgPool) -> Self {
        RecordStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- Seat queries -----------------------------------------------

    pub async fn find_event(&self, event_id: EventId) -> Result<Option<Event>, sqlx::Error> {
        let row = sqlx::query("SELECT event_id, title, total_capacity, published FROM events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Event {
            event_id: r.get("event_id"),
            title: r.get("title"),
            total_capacity: r.get("total_capacity"),
            published: r.get("published"),
        }))
    }

    pub async fn find_by_event_id_with_seats(
        &self,
        event_id: EventId,
    ) -> Result<Vec<Seat>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT seat_id, event_id, row_letter, seat_number, price, status, version \
             FROM seats WHERE event_id = $1 ORDER BY row_letter, seat_number",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_seat).collect())
    }

    pub async fn find_available_seats_by_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<Seat>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT seat_id, event_id, row_letter, seat_number, price, status, version \
             FROM seats WHERE event_id = $1 AND status = 'AVAILABLE' ORDER BY row_letter, seat_number",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_seat).collect())
    }

    pub async fn find_seats_by_ids(&self, seat_ids: &[SeatId]) -> Result<Vec<Seat>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT seat_id, event_id, row_letter, seat_number, price, status, version \
             FROM seats WHERE seat_id = ANY($1)",
        )
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_seat).collect())
    }

    // ---- Guarded seat transitions (the anti-double-book mechanism) --

    /// `AVAILABLE -> HELD` where `status != 'BOOKED'`. Caller requires
    /// `affected_rows == seat_ids.len()`.
    pub async fn hold_seats_guarded(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        seat_ids: &[SeatId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE seats SET status = 'HELD', version = version + 1 \
             WHERE seat_id = ANY($1) AND status <> 'BOOKED'",
        )
        .bind(seat_ids)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// `HELD -> BOOKED`. Caller requires `affected_rows == seat_ids.len()`.
    pub async fn book_seats(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        seat_ids: &[SeatId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE seats SET status = 'BOOKED', version = version + 1 \
             WHERE seat_id = ANY($1) AND status = 'HELD'",
        )
        .bind(seat_ids)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// `HELD -> AVAILABLE`.
    pub async fn release_seats(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        seat_ids: &[SeatId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE seats SET status = 'AVAILABLE', version = version + 1 \
             WHERE seat_id = ANY($1) AND status = 'HELD'",
        )
        .bind(seat_ids)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Degraded-path fallback: take a transactional
    /// row-level write lock on the seats before the conditional update, so
    /// the DB predicate alone serializes contention when C3 is down.
    pub async fn hold_seats_guarded_with_row_lock(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        seat_ids: &[SeatId],
    ) -> Result<u64, sqlx::Error> {
        sqlx::query("SELECT seat_id FROM seats WHERE seat_id = ANY($1) ORDER BY seat_id FOR UPDATE")
            .bind(seat_ids)
            .fetch_all(&mut **tx)
            .await?;
        self.hold_seats_guarded(tx, seat_ids).await
    }

    // ---- SeatHold ------------------------------------------------------

    pub async fn insert_seat_hold(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        hold: &SeatHold,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO seat_holds \
             (hold_token, customer_id, event_id, seat_ids, status, expires_at, created_at, updated_at, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(hold.hold_token.as_str())
        .bind(hold.customer_id)
        .bind(hold.event_id)
        .bind(&hold.seat_ids)
        .bind(hold.status.as_str())
        .bind(hold.expires_at)
        .bind(hold.created_at)
        .bind(hold.updated_at)
        .bind(&hold.idempotency_key)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_by_hold_token(
        &self,
        hold_token: &str,
    ) -> Result<Option<SeatHold>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT hold_token, customer_id, event_id, seat_ids, status, expires_at, created_at, updated_at, idempotency_key \
             FROM seat_holds WHERE hold_token = $1",
        )
        .bind(hold_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_hold(&r)))
    }

    /// Row-level write lock variant, for the confirm/cancel paths that must
    /// serialize against a concurrent reconciler tick on the same hold.
    pub async fn find_by_hold_token_for_update(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        hold_token: &str,
    ) -> Result<Option<SeatHold>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT hold_token, customer_id, event_id, seat_ids, status, expires_at, created_at, updated_at, idempotency_key \
             FROM seat_holds WHERE hold_token = $1 FOR UPDATE",
        )
        .bind(hold_token)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|r| row_to_hold(&r)))
    }

    /// Dedup lookup for `PlaceHold`'s idempotency-key check: a
    /// repeated `X-Idempotency-Key` returns the hold created by the first
    /// request instead of re-running the protocol.
    pub async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<SeatHold>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT hold_token, customer_id, event_id, seat_ids, status, expires_at, created_at, updated_at, idempotency_key \
             FROM seat_holds WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_hold(&r)))
    }

    pub async fn set_hold_status(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        hold_token: &str,
        status: HoldStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE seat_holds SET status = $1, updated_at = now() WHERE hold_token = $2")
            .bind(status.as_str())
            .bind(hold_token)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn find_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<SeatHold>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT hold_token, customer_id, event_id, seat_ids, status, expires_at, created_at, updated_at, idempotency_key \
             FROM seat_holds WHERE status = 'ACTIVE' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_hold).collect())
    }

    pub async fn find_expired_holds_for_seat(
        &self,
        event_id: EventId,
        seat_id: SeatId,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeatHold>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT hold_token, customer_id, event_id, seat_ids, status, expires_at, created_at, updated_at, idempotency_key \
             FROM seat_holds \
             WHERE status = 'ACTIVE' AND event_id = $1 AND $2 = ANY(seat_ids) AND expires_at <= $3",
        )
        .bind(event_id)
        .bind(seat_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_hold).collect())
    }

    // ---- Booking --------------------------------------------------------

    /// Inserts a booking, retrying the reference mint on a unique-constraint
    /// violation instead of trusting entropy alone.
    pub async fn insert_booking(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        customer_id: CustomerId,
        event_id: EventId,
        seat_ids: &[SeatId],
        total_amount: Decimal,
        payment_id: &str,
        hold_token: &HoldToken,
        confirmed_at: DateTime<Utc>,
    ) -> Result<BookingReference, sqlx::Error> {
        for _ in 0..MAX_BOOKING_REFERENCE_ATTEMPTS {
            let reference = BookingReference::mint();
            let result = sqlx::query(
                "INSERT INTO bookings \
                 (booking_reference, customer_id, event_id, seat_ids, total_amount, status, payment_id, hold_token, confirmed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (booking_reference) DO NOTHING",
            )
            .bind(reference.as_str())
            .bind(customer_id)
            .bind(event_id)
            .bind(seat_ids)
            .bind(total_amount)
            .bind(BookingStatus::Confirmed.as_str())
            .bind(payment_id)
            .bind(hold_token.as_str())
            .bind(confirmed_at)
            .execute(&mut **tx)
            .await?;
            if result.rows_affected() == 1 {
                return Ok(reference);
            }
        }
        // Exhausted retries: surface as a generic constraint violation so
        // the caller maps it the same way as any other DB failure.
        Err(sqlx::Error::RowNotFound)
    }

    pub async fn find_booking_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT booking_reference, customer_id, event_id, seat_ids, total_amount, status, payment_id, hold_token, confirmed_at \
             FROM bookings WHERE booking_reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_booking(&r)))
    }
}

fn row_to_seat(row: sqlx::postgres::PgRow) -> Seat {
    let status_str: String = row.get("status");
    Seat {
        seat_id: row.get("seat_id"),
        event_id: row.get("event_id"),
        row_letter: row.get("row_letter"),
        seat_number: row.get("seat_number"),
        price: row.get("price"),
        status: status_str.parse().expect("status column holds an invalid value"),
        version: row.get("version"),
    }
}

fn row_to_hold(row: &sqlx::postgres::PgRow) -> SeatHold {
    let status_str: String = row.get("status");
    SeatHold {
        hold_token: HoldToken::from(row.get::<String, _>("hold_token")),
        customer_id: row.get("customer_id"),
        event_id: row.get("event_id"),
        seat_ids: row.get("seat_ids"),
        status: status_str.parse().expect("status column holds an invalid value"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        idempotency_key: row.get("idempotency_key"),
    }
}

fn row_to_booking(row: &sqlx::postgres::PgRow) -> Booking {
    let status_str: String = row.get("status");
    Booking {
        booking_reference: BookingReference::from(row.get::<String, _>("booking_reference")),
        customer_id: row.get("customer_id"),
        event_id: row.get("event_id"),
        seat_ids: row.get("seat_ids"),
        total_amount: row.get("total_amount"),
        status: status_str.parse().expect("status column holds an invalid value"),
        payment_id: row.get("payment_id"),
        hold_token: HoldToken::from(row.get::<String, _>("hold_token")),
        confirmed_at: row.get("confirmed_at"),
    }
}

#[cfg(test)]
mod tests {
    //! Integration tests require a live Postgres with `schema.sql` applied;
    //! they are `#[ignore]`d, gated on `TEST_DATABASE_URL`, and skipped
    //! gracefully when unset.
    use super::*;

    const TEST_DATABASE_URL_ENV: &str = "TEST_DATABASE_URL";

    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var(TEST_DATABASE_URL_ENV).ok()?;
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .ok()
    }

    #[tokio::test]
    #[ignore]
    async fn hold_then_book_then_release_is_guarded_by_status() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: {TEST_DATABASE_URL_ENV} not set");
            return;
        };
        let store = RecordStore::new(pool);
        let mut tx = store.pool().begin().await.unwrap();
        let affected = store.hold_seats_guarded(&mut tx, &[1, 2]).await.unwrap();
        assert!(affected <= 2);
        tx.rollback().await.unwrap();
    }
}
