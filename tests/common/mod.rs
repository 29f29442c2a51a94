//! Test utilities and fixtures for Coursepay integration tests

#![allow(dead_code)]

use axum::Router;
use hmac::{Hmac, Mac};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use sha2::Sha256;
use tower_http::trace::TraceLayer;

pub use coursepay::db::{init_db, queries, AppState, DbPool};
pub use coursepay::gateway::{GatewayClient, GatewayConfig, GatewayStatus};
pub use coursepay::handlers;
pub use coursepay::lifecycle;
pub use coursepay::models::*;
pub use coursepay::notify::Notifier;

/// Shared secret used by all test gateway clients.
pub const TEST_SERVER_KEY: &str = "test-server-key-123";

/// Bearer token accepted by the admin router in tests.
pub const TEST_ADMIN_KEY: &str = "test-admin-key";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a single-connection in-memory pool with schema initialized.
/// max_size(1) keeps every checkout on the same underlying database.
pub fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

/// Gateway client with the fixed test secret and an unroutable base URL
/// (tests never perform real charge calls).
pub fn test_gateway() -> GatewayClient {
    GatewayClient::new(
        &GatewayConfig {
            server_key: TEST_SERVER_KEY.to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        },
        reqwest::Client::new(),
    )
}

pub fn create_test_app_state() -> AppState {
    AppState {
        db: test_pool(),
        gateway: test_gateway(),
        // No webhook URL: notifications are log-only in tests
        notifier: Notifier::new(reqwest::Client::new(), None),
        admin_api_key: TEST_ADMIN_KEY.to_string(),
        base_url: "http://localhost:3000".to_string(),
    }
}

/// AppState whose notifier points at an unroutable address, for proving
/// that delivery failures never leak into request handling.
pub fn create_test_app_state_with_broken_notifier() -> AppState {
    let mut state = create_test_app_state();
    state.notifier = Notifier::new(
        reqwest::Client::new(),
        Some("http://127.0.0.1:9/notify".to_string()),
    );
    state
}

/// Full application router (buyer + webhook + admin endpoints).
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::public::router())
        .merge(handlers::webhooks::router())
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create a pending gateway transaction with the given external reference.
pub fn create_gateway_transaction(conn: &Connection, external_ref: &str) -> Transaction {
    queries::create_transaction(
        conn,
        &CreateTransaction {
            buyer_id: "buyer-1".to_string(),
            course_id: "course-rust-101".to_string(),
            promo_code_id: None,
            amount_cents: 250_000,
            discount_cents: 25_000,
            admin_fee_cents: 5_000,
            payment_method: PaymentMethod::Gateway,
            payment_channel: None,
            external_ref: Some(external_ref.to_string()),
            payment_url: Some(format!("https://pay.example/{}", external_ref)),
        },
    )
    .expect("Failed to create gateway transaction")
}

/// Create a pending cash transaction.
pub fn create_cash_transaction(conn: &Connection) -> Transaction {
    create_cash_transaction_for(conn, "buyer-1", "course-rust-101")
}

pub fn create_cash_transaction_for(
    conn: &Connection,
    buyer_id: &str,
    course_id: &str,
) -> Transaction {
    queries::create_transaction(
        conn,
        &CreateTransaction {
            buyer_id: buyer_id.to_string(),
            course_id: course_id.to_string(),
            promo_code_id: None,
            amount_cents: 250_000,
            discount_cents: 0,
            admin_fee_cents: 0,
            payment_method: PaymentMethod::Cash,
            payment_channel: None,
            external_ref: None,
            payment_url: None,
        },
    )
    .expect("Failed to create cash transaction")
}

/// Compute the callback signature the way the gateway does: HMAC-SHA256
/// over the raw body, hex-encoded.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// A well-formed callback body for the given reference and status.
pub fn callback_body(reference: &str, status: &str) -> String {
    serde_json::json!({
        "reference": reference,
        "status": status,
        "channel": "QRIS",
    })
    .to_string()
}
