use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::booking::{BookingError, BookingService};
use crate::model::{BookingRequest, ExtendRequest};
use crate::observability::record_request;

pub type SharedService = Arc<BookingService>;

/// The public booking API. At most `max_in_flight` requests run at once.
pub fn router(service: SharedService, max_in_flight: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/v1/booking", post(create_booking))
        .route("/api/v1/booking/", post(create_booking))
        .route("/api/v1/booking/extend", post(extend_booking))
        .route("/api/v1/booking/:id", get(get_booking))
        .route("/api/v1/booking/:id/chain", get(get_chain))
        .layer(GlobalConcurrencyLimitLayer::new(max_in_flight))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "message": "OK" }))
}

/// 200 with the booking, or 200 `null` when there is none.
async fn get_booking(State(service): State<SharedService>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let response = match service.get_booking(&id).await {
        Ok(booking) => (StatusCode::OK, Json(booking)).into_response(),
        Err(e) => internal_error("get", &e, "Unable to fetch booking"),
    };
    record_request("get", outcome_of(&response), started.elapsed());
    response
}

async fn get_chain(State(service): State<SharedService>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let response = match service.booking_chain(&id).await {
        Ok(chain) => (StatusCode::OK, Json(chain)).into_response(),
        Err(e) => internal_error("chain", &e, "Unable to fetch booking chain"),
    };
    record_request("chain", outcome_of(&response), started.elapsed());
    response
}

/// Client errors come back as a bare JSON string holding the reason.
async fn create_booking(
    State(service): State<SharedService>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let (outcome, response) = match payload {
        Err(rejection) => (
            "invalid_input",
            (
                StatusCode::BAD_REQUEST,
                Json(format!("invalid input: {}", rejection.body_text())),
            )
                .into_response(),
        ),
        Ok(Json(req)) => match service.create_booking(req).await {
            Ok(booking) => ("created", (StatusCode::OK, Json(booking)).into_response()),
            Err(e) if e.is_client_error() => (
                e.label(),
                (StatusCode::BAD_REQUEST, Json(e.to_string())).into_response(),
            ),
            Err(e) => ("internal", internal_error("create", &e, "Unable to create booking")),
        },
    };
    record_request("create", outcome, started.elapsed());
    response
}

/// Client errors come back as `{"error": reason}`.
async fn extend_booking(
    State(service): State<SharedService>,
    payload: Result<Json<ExtendRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let (outcome, response) = match payload {
        Err(rejection) => (
            "invalid_input",
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid input: {}", rejection.body_text()) })),
            )
                .into_response(),
        ),
        Ok(Json(req)) => match service.extend_booking(req).await {
            Ok(booking) => ("extended", (StatusCode::OK, Json(booking)).into_response()),
            Err(e) if e.is_client_error() => (
                e.label(),
                (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
            ),
            Err(e) => ("internal", internal_error("extend", &e, "Unable to extend booking")),
        },
    };
    record_request("extend", outcome, started.elapsed());
    response
}

/// Log the detail, answer with a fixed message.
fn internal_error(operation: &str, e: &BookingError, message: &'static str) -> Response {
    error!("{operation} failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn outcome_of(response: &Response) -> &'static str {
    if response.status().is_success() { "ok" } else { "internal" }
}
