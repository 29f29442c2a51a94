//! Inbound payment gateway callbacks.
//!
//! The gateway delivers at-least-once: duplicates and out-of-order
//! redeliveries are normal operation, not errors. The handler verifies
//! the signature over the raw body before anything else touches the
//! payload, funnels the mapped status through the lifecycle engine, and
//! acknowledges unknown references with success so the gateway stops
//! retrying payloads we can never match.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::db::AppState;
use crate::gateway::{CallbackPayload, GatewayStatus};
use crate::lifecycle::{self, WebhookOutcome};
use crate::notify::{spawn_payment_notification, PaymentNotification};

pub const SIGNATURE_HEADER: &str = "x-callback-signature";

/// Acknowledgement body returned to the gateway.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

fn ack(success: bool, message: &str) -> Json<WebhookAck> {
    Json(WebhookAck {
        success,
        message: message.to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/payment", post(handle_payment_webhook))
}

pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    // Trust boundary: nothing below may run until the signature over the
    // raw, unparsed body checks out.
    let signature = match headers.get(SIGNATURE_HEADER).map(|v| v.to_str()) {
        Some(Ok(s)) => s,
        Some(Err(_)) | None => {
            return (
                StatusCode::UNAUTHORIZED,
                ack(false, "Missing signature header"),
            );
        }
    };

    match state.gateway.verify_callback_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("webhook rejected: invalid signature");
            return (StatusCode::UNAUTHORIZED, ack(false, "Invalid signature"));
        }
        Err(e) => {
            tracing::error!("signature verification error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ack(false, "Verification error"),
            );
        }
    }

    let payload: CallbackPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("webhook rejected: malformed body: {}", e);
            return (StatusCode::BAD_REQUEST, ack(false, "Invalid JSON"));
        }
    };

    let mapped = GatewayStatus::from_gateway(&payload.status);
    let raw_body = String::from_utf8_lossy(&body).into_owned();

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ack(false, "Database error"),
            );
        }
    };

    match lifecycle::apply_webhook_status(
        &mut conn,
        &payload.reference,
        mapped,
        &raw_body,
        payload.channel.as_deref(),
    ) {
        Ok(WebhookOutcome::NotFound) => {
            // Acknowledge with success: redelivering a payload we cannot
            // match would only produce a retry storm.
            tracing::warn!("webhook for unknown reference {}", payload.reference);
            (StatusCode::OK, ack(true, "Unknown reference"))
        }
        Ok(WebhookOutcome::NoChange) => (StatusCode::OK, ack(true, "No status change")),
        Ok(WebhookOutcome::Expired(_)) => (StatusCode::OK, ack(true, "Transaction expired")),
        Ok(WebhookOutcome::Failed(_)) => (StatusCode::OK, ack(true, "Transaction failed")),
        Ok(WebhookOutcome::Paid { transaction, .. }) => {
            spawn_payment_notification(
                state.notifier.clone(),
                PaymentNotification::payment_confirmed(&transaction),
            );
            (StatusCode::OK, ack(true, "Payment confirmed"))
        }
        Err(e) => {
            // 5xx makes the gateway redeliver; an unacknowledged paid
            // transition must not be dropped.
            tracing::error!("webhook processing failed for {}: {}", payload.reference, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ack(false, "Processing error"),
            )
        }
    }
}
