//! HTTP facade over the hold orchestrator and read assembler.
//!
//! Handlers only translate DTOs and [`HoldError`] into status codes (spec
//! §6/§7); all business logic lives in `holds::orchestrator` and
//! `holds::read_assembler`. Router/state wiring follows an
//! `AppState`/`Extension<AppState>` idiom.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::holds::error::HoldError;
use crate::holds::ids::mint_idempotency_key;
use crate::holds::orchestrator::HoldOrchestrator;
use crate::holds::read_assembler::ReadAssembler;
use crate::holds::types::{BookingDto, CustomerId, EventId, HoldResponse, SeatHoldDto, SeatId};

const IDEMPOTENCY_KEY_HEADER: &str = "X-Idempotency-Key";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<HoldOrchestrator>,
    pub read_assembler: Arc<ReadAssembler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/bookings/hold", post(place_hold))
        .route("/api/bookings/{holdToken}/confirm", post(confirm_booking))
        .route("/api/bookings/hold/{holdToken}", delete(cancel_hold))
        .route("/api/bookings/hold/{holdToken}", get(get_hold))
        .route("/api/bookings/{bookingReference}", get(get_booking))
        .route("/api/events/{id}/seats", get(get_event_seats))
        .layer(Extension(state))
}

impl IntoResponse for HoldError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct PlaceHoldRequest {
    #[serde(rename = "customerId")]
    customer_id: CustomerId,
    #[serde(rename = "eventId")]
    event_id: EventId,
    #[serde(rename = "seatIds")]
    seat_ids: Vec<SeatId>,
    #[serde(rename = "holdDurationMinutes")]
    hold_duration_minutes: Option<u64>,
}

async fn place_hold(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(req): Json<PlaceHoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), HoldError> {
    let duration = req
        .hold_duration_minutes
        .map(|m| std::time::Duration::from_secs(m * 60));
    // `X-Idempotency-Key` is optional; clients that omit it get
    // one minted here so every hold still carries a key the record store
    // can dedup on.
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| mint_idempotency_key().to_string());
    let response = state
        .orchestrator
        .place_hold(req.customer_id, req.event_id, req.seat_ids, duration, idempotency_key)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Debug, Deserialize)]
struct ConfirmBookingRequest {
    #[serde(rename = "customerId")]
    customer_id: CustomerId,
    #[serde(rename = "paymentId")]
    payment_id: String,
}

async fn confirm_booking(
    Extension(state): Extension<AppState>,
    Path(hold_token): Path<String>,
    Json(req): Json<ConfirmBookingRequest>,
) -> Result<Json<BookingDto>, HoldError> {
    let booking = state
        .orchestrator
        .confirm_booking(&hold_token, req.customer_id, &req.payment_id)
        .await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
struct CancelHoldQuery {
    #[serde(rename = "customerId")]
    customer_id: CustomerId,
}

async fn cancel_hold(
    Extension(state): Extension<AppState>,
    Path(hold_token): Path<String>,
    Query(query): Query<CancelHoldQuery>,
) -> Result<StatusCode, HoldError> {
    state
        .orchestrator
        .cancel_hold(&hold_token, query.customer_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_hold(
    Extension(state): Extension<AppState>,
    Path(hold_token): Path<String>,
) -> Result<Json<SeatHoldDto>, HoldError> {
    Ok(Json(state.orchestrator.get_hold(&hold_token).await?))
}

async fn get_booking(
    Extension(state): Extension<AppState>,
    Path(booking_reference): Path<String>,
) -> Result<Json<BookingDto>, HoldError> {
    Ok(Json(state.orchestrator.get_booking(&booking_reference).await?))
}

async fn get_event_seats(
    Extension(state): Extension<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<serde_json::Value>, HoldError> {
    let assembled = state.read_assembler.event_with_seats(event_id).await?;
    Ok(Json(serde_json::json!({
        "eventId": assembled.event.event_id,
        "title": assembled.event.title,
        "seats": assembled.seats,
        "degraded": assembled.degraded,
    })))
}
