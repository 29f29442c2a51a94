//! Best-effort payment-confirmation notifications.
//!
//! Dispatch runs after the transaction and enrollment are durably
//! committed and is fully decoupled from the request/response cycle: the
//! task is spawned fire-and-forget, every failure path is caught and
//! logged, and nothing here can roll back payment or enrollment state.
//!
//! Two modes:
//! 1. POST to a configured notification webhook URL
//! 2. Disabled (no URL configured, log only)

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

use crate::models::Transaction;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

/// Payload delivered to the notification channel for a confirmed payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentNotification {
    pub event: &'static str,
    pub invoice_number: String,
    pub buyer_id: String,
    pub course_id: String,
    pub total_cents: i64,
    pub paid_at: Option<i64>,
}

impl PaymentNotification {
    pub fn payment_confirmed(transaction: &Transaction) -> Self {
        Self {
            event: "payment_confirmed",
            invoice_number: transaction.invoice_number.clone(),
            buyer_id: transaction.buyer_id.clone(),
            course_id: transaction.course_id.clone(),
            total_cents: transaction.total_cents,
            paid_at: transaction.paid_at,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        Self {
            client,
            webhook_url,
        }
    }
}

/// Spawn a fire-and-forget delivery task for a payment confirmation.
///
/// The spawned future is panic-isolated: even a panic inside the HTTP
/// stack is caught and logged rather than taking down the runtime worker.
pub fn spawn_payment_notification(notifier: Notifier, notification: PaymentNotification) {
    let Some(url) = notifier.webhook_url else {
        tracing::info!(
            "notification channel disabled - payment confirmation for {} not sent",
            notification.invoice_number
        );
        return;
    };

    let invoice = notification.invoice_number.clone();
    tokio::spawn(
        AssertUnwindSafe(async move {
            send_notification(&notifier.client, &url, &notification).await;
        })
        .catch_unwind()
        .map(move |result| {
            if let Err(panic) = result {
                let panic_msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Notification task panicked for {}: {}", invoice, panic_msg);
            }
        }),
    );
}

/// Deliver a notification with bounded retries.
///
/// Failures are logged and swallowed - a lost confirmation message never
/// invalidates the payment it describes.
async fn send_notification<T: Serialize>(client: &Client, url: &str, payload: &T) {
    for (attempt, delay_secs) in std::iter::once(&0u64)
        .chain(RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
        }

        match client
            .post(url)
            .json(payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                if attempt > 0 {
                    tracing::debug!("Notification delivered after {} retries", attempt);
                }
                return;
            }
            Ok(resp) => {
                tracing::warn!("Notification webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::warn!("Notification webhook failed: {}", e);
            }
        }
    }

    tracing::error!(
        "Notification delivery gave up after {} attempts",
        RETRY_DELAYS.len() + 1
    );
}
