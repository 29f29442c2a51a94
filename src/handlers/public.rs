//! Buyer-facing endpoints: checkout and transaction status.
//!
//! Course existence/pricing and promo resolution happen upstream in the
//! catalog and promo services; the amounts arriving here are treated as
//! pre-validated.

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Path};
use crate::models::{CreateTransaction, PaymentMethod, TransactionStatus};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/transactions/{invoice_number}", get(get_transaction_status))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub buyer_id: String,
    pub course_id: String,
    #[serde(default)]
    pub promo_code_id: Option<String>,
    /// Course price resolved by the catalog service.
    pub amount_cents: i64,
    /// Discount resolved by the promo service.
    #[serde(default)]
    pub discount_cents: i64,
    /// Gateway surcharge; ignored (forced to 0) for cash.
    #[serde(default)]
    pub admin_fee_cents: i64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub transaction_id: String,
    pub invoice_number: String,
    pub total_cents: i64,
    pub status: TransactionStatus,
    /// Gateway redirect target; absent for cash.
    pub payment_url: Option<String>,
}

/// POST /checkout
///
/// Create a pending transaction. Gateway payments are registered with the
/// gateway first so the buyer gets a payment URL and callbacks can be
/// correlated by the gateway's reference.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    if request.amount_cents < 0 || request.discount_cents < 0 || request.admin_fee_cents < 0 {
        return Err(AppError::BadRequest("Amounts must be non-negative".into()));
    }
    if request.discount_cents > request.amount_cents {
        return Err(AppError::BadRequest(
            "Discount cannot exceed the course price".into(),
        ));
    }

    // Admin fee defaults to 0 for cash; only gateway payments carry one.
    let admin_fee_cents = match request.payment_method {
        PaymentMethod::Gateway => request.admin_fee_cents,
        PaymentMethod::Cash => 0,
    };

    let invoice = crate::id::invoice_number();
    let total_cents = request.amount_cents - request.discount_cents + admin_fee_cents;

    let (external_ref, payment_url) = match request.payment_method {
        PaymentMethod::Gateway => {
            let (reference, url) = state
                .gateway
                .create_charge(&invoice, total_cents, &request.buyer_id)
                .await?;
            (Some(reference), Some(url))
        }
        PaymentMethod::Cash => (None, None),
    };

    let conn = state.db.get()?;
    let transaction = queries::create_transaction(
        &conn,
        &CreateTransaction {
            buyer_id: request.buyer_id,
            course_id: request.course_id,
            promo_code_id: request.promo_code_id,
            amount_cents: request.amount_cents,
            discount_cents: request.discount_cents,
            admin_fee_cents,
            payment_method: request.payment_method,
            payment_channel: None,
            external_ref,
            payment_url,
        },
    )?;

    tracing::info!(
        "checkout created: invoice={} buyer={} course={} method={}",
        transaction.invoice_number,
        transaction.buyer_id,
        transaction.course_id,
        transaction.payment_method
    );

    Ok(Json(CheckoutResponse {
        transaction_id: transaction.id,
        invoice_number: transaction.invoice_number,
        total_cents: transaction.total_cents,
        status: transaction.status,
        payment_url: transaction.payment_url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InvoicePath {
    pub invoice_number: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionStatusResponse {
    pub invoice_number: String,
    pub status: TransactionStatus,
    pub total_cents: i64,
    pub paid_at: Option<i64>,
    pub payment_url: Option<String>,
}

/// GET /transactions/{invoice_number}
///
/// Status poll used by the payment-finish page the gateway redirects to.
pub async fn get_transaction_status(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
) -> Result<Json<TransactionStatusResponse>> {
    let conn = state.db.get()?;

    let transaction = queries::get_transaction_by_invoice(&conn, &path.invoice_number)?
        .or_not_found("Transaction not found")?;

    Ok(Json(TransactionStatusResponse {
        invoice_number: transaction.invoice_number,
        status: transaction.status,
        total_cents: transaction.total_cents,
        paid_at: transaction.paid_at,
        payment_url: transaction.payment_url,
    }))
}
