use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use ulid::Ulid;

use staychain::booking::{BookingService, OverlapPolicy};
use staychain::http;
use staychain::ledger::Ledger;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("staychain_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let ledger = Arc::new(Ledger::open(dir.join("bookings.wal")).unwrap());
    let service = Arc::new(BookingService::new(ledger, OverlapPolicy::Inclusive));
    let app = http::router(service, 64);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn day(offset: u64) -> String {
    (today() + Days::new(offset)).format("%Y-%m-%d").to_string()
}

fn booking(guest: &str, unit: &str, offset: u64, nights: i64) -> Value {
    json!({
        "guestName": guest,
        "unitID": unit,
        "checkInDate": day(offset),
        "numberOfNights": nights,
    })
}

struct Api {
    base: String,
    client: reqwest::Client,
}

impl Api {
    async fn start() -> Self {
        let addr = start_test_server().await;
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    let api = Api::start().await;
    let (status, body) = api.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "OK" }));
}

#[tokio::test]
async fn create_fresh_booking() {
    let api = Api::start().await;
    let (status, body) = api.post("/api/v1/booking", &booking("GuestA", "1", 0, 5)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["guestName"], "GuestA");
    assert_eq!(body["unitID"], "1");
    assert_eq!(body["numberOfNights"], 5);
    assert_eq!(body["checkInDate"], day(0));
    assert_eq!(body["firstBookingId"], body["id"]);
    assert!(body["nextBookingId"].is_null());
}

#[tokio::test]
async fn trailing_slash_route_creates_too() {
    let api = Api::start().await;
    let (status, _) = api.post("/api/v1/booking/", &booking("GuestA", "1", 0, 5)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn same_guest_same_unit_rejected() {
    let api = Api::start().await;
    let (status, _) = api.post("/api/v1/booking", &booking("GuestA", "1", 0, 5)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = api.post("/api/v1/booking", &booking("GuestA", "1", 0, 5)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!("The given guest name cannot book the same unit multiple times"));
}

#[tokio::test]
async fn same_guest_different_unit_rejected() {
    let api = Api::start().await;
    api.post("/api/v1/booking", &booking("GuestA", "1", 0, 5)).await;

    let (status, body) = api.post("/api/v1/booking", &booking("GuestA", "2", 0, 5)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!("The same guest cannot be in multiple units at the same time"));
}

#[tokio::test]
async fn different_guest_same_unit_rejected() {
    let api = Api::start().await;
    api.post("/api/v1/booking", &booking("GuestA", "1", 0, 5)).await;

    let (status, body) = api.post("/api/v1/booking", &booking("GuestB", "1", 0, 5)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!("For the given check-in date, the unit is already occupied"));

    let (status, body) = api.post("/api/v1/booking", &booking("GuestB", "1", 1, 5)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!("For the given check-in date, the unit is already occupied"));
}

#[tokio::test]
async fn invalid_input_is_client_error() {
    let api = Api::start().await;
    let (status, body) = api.post("/api/v1/booking", &booking("GuestA", "1", 0, 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("numberOfNights"));

    let (status, _) = api
        .post("/api/v1/booking", &json!({ "guestName": "GuestA" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_booking_extension() {
    let api = Api::start().await;
    let (status, original) = api.post("/api/v1/booking", &booking("GuestA", "1", 0, 5)).await;
    assert_eq!(status, StatusCode::OK);

    let mut ext = booking("GuestA", "1", 6, 3);
    ext["bookingId"] = original["id"].clone();
    let (status, body) = api.post("/api/v1/booking/extend", &ext).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previousBookingId"], original["id"]);
    assert_eq!(body["firstBookingId"], original["id"]);

    let id = original["id"].as_str().unwrap();
    let (status, fetched) = api.get(&format!("/api/v1/booking/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["nextBookingId"], body["id"]);

    let (status, chain) = api.get(&format!("/api/v1/booking/{id}/chain")).await;
    assert_eq!(status, StatusCode::OK);
    let chain = chain.as_array().unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1]["id"], body["id"]);
}

#[tokio::test]
async fn extend_unknown_booking_rejected() {
    let api = Api::start().await;
    let mut ext = booking("GuestA", "1", 6, 3);
    ext["bookingId"] = json!(Ulid::new().to_string());
    let (status, body) = api.post("/api/v1/booking/extend", &ext).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn extend_into_occupied_range_rejected() {
    let api = Api::start().await;
    let (_, original) = api.post("/api/v1/booking", &booking("GuestA", "1", 0, 5)).await;
    api.post("/api/v1/booking", &booking("GuestB", "1", 10, 5)).await;

    let mut ext = booking("GuestA", "1", 8, 3);
    ext["bookingId"] = original["id"].clone();
    let (status, body) = api.post("/api/v1/booking/extend", &ext).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "For the given check-in date, the unit is already occupied" })
    );
}

#[tokio::test]
async fn get_unknown_booking_returns_null() {
    let api = Api::start().await;
    let (status, body) = api.get(&format!("/api/v1/booking/{}", Ulid::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, body) = api.get("/api/v1/booking/not-an-id").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}
