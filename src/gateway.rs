//! Payment gateway adapter: callback authenticity and vocabulary mapping.
//!
//! Everything the gateway sends is untrusted until
//! [`GatewayClient::verify_callback_signature`] has passed; nothing past
//! that point may act on the payload without verification.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Explicitly constructed gateway configuration, passed in at startup.
/// Tests construct one with their own secret instead of reaching for
/// ambient state.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server_key: String,
    pub base_url: String,
}

/// Internal status vocabulary after translating the gateway's own strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Paid,
    Expired,
    Failed,
    /// Anything the gateway says that we do not recognize. Safe no-op in
    /// the lifecycle engine: logged and ignored, never an error.
    Unknown,
}

impl GatewayStatus {
    pub fn from_gateway(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "settlement" | "capture" | "paid" => Self::Paid,
            "expire" | "expired" => Self::Expired,
            "deny" | "cancel" | "failure" | "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Callback body shape. Parsed only after signature verification; the
/// gateway includes more fields than these, which is why the verbatim raw
/// body is what gets snapshotted onto the transaction.
#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    /// The gateway's own transaction identifier.
    pub reference: String,
    pub status: String,
    /// Settlement channel, e.g. "QRIS", "BCA VA".
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateChargeRequest<'a> {
    invoice_number: &'a str,
    amount: i64,
    buyer_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateChargeResponse {
    reference: String,
    payment_url: String,
}

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    server_key: String,
    base_url: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig, client: Client) -> Self {
        Self {
            client,
            server_key: config.server_key.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// Verify a callback signature: HMAC-SHA256 over the raw, unparsed
    /// body, hex-encoded, compared constant-time.
    pub fn verify_callback_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let mut mac = HmacSha256::new_from_slice(self.server_key.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_GATEWAY_SECRET.into()))?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks.
        // An attacker could otherwise measure response times to
        // progressively discover the correct signature byte-by-byte.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();

        // Length check is not constant-time, but that's fine - signature
        // length is not secret (always 64 hex chars for SHA-256)
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    /// Register a charge with the gateway, obtaining its reference for
    /// callback correlation and the payment URL the buyer is redirected to.
    pub async fn create_charge(
        &self,
        invoice_number: &str,
        amount_cents: i64,
        buyer_id: &str,
    ) -> Result<(String, String)> {
        let request = CreateChargeRequest {
            invoice_number,
            amount: amount_cents,
            buyer_id,
        };

        let response = self
            .client
            .post(format!("{}/v1/charges", self.base_url))
            .basic_auth(&self.server_key, None::<&str>)
            .json(&request)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("charge request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "charge request returned {}: {}",
                status, body
            )));
        }

        let charge: CreateChargeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("invalid charge response: {}", e)))?;

        Ok((charge.reference, charge.payment_url))
    }
}
