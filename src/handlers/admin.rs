//! Administrative approve/reject for cash transactions.
//!
//! Cash payments cannot deliver webhooks, so a human confirms or rejects
//! them. Both operations funnel through the same lifecycle engine as the
//! webhook path; the terminal-state guard does not care which actor
//! triggered the transition.

use axum::{middleware::from_fn_with_state, routing::post, Router};
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::extractors::{Json, Path};
use crate::error::Result;
use crate::lifecycle;
use crate::middleware::admin_auth;
use crate::models::{Enrollment, Transaction};
use crate::notify::{spawn_payment_notification, PaymentNotification};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/transactions/{id}/approve", post(approve_transaction))
        .route("/admin/transactions/{id}/reject", post(reject_transaction))
        .layer(from_fn_with_state(state, admin_auth))
}

#[derive(Debug, Deserialize)]
pub struct TransactionPath {
    pub id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RejectRequest {
    /// Optional free-text reason, stored in the transaction notes.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub transaction: Transaction,
    pub enrollment: Enrollment,
    pub newly_enrolled: bool,
}

/// POST /admin/transactions/{id}/approve
///
/// Confirm an out-of-band cash payment. Fails with a domain error for
/// gateway transactions ("wrong payment method") or transactions that
/// already left `pending` ("already processed").
pub async fn approve_transaction(
    State(state): State<AppState>,
    Path(path): Path<TransactionPath>,
) -> Result<Json<ApprovalResponse>> {
    let mut conn = state.db.get()?;

    let approval = lifecycle::approve_cash(&mut conn, &path.id)?;

    // Best-effort confirmation to the buyer; a delivery failure must not
    // turn a recorded payment into an error for the administrator.
    spawn_payment_notification(
        state.notifier.clone(),
        PaymentNotification::payment_confirmed(&approval.transaction),
    );

    Ok(Json(ApprovalResponse {
        transaction: approval.transaction,
        enrollment: approval.enrollment,
        newly_enrolled: approval.newly_enrolled,
    }))
}

/// POST /admin/transactions/{id}/reject
///
/// Reject a pending cash transaction, recording the reason in its notes.
pub async fn reject_transaction(
    State(state): State<AppState>,
    Path(path): Path<TransactionPath>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Transaction>> {
    let conn = state.db.get()?;

    let transaction = lifecycle::reject_cash(&conn, &path.id, request.reason.as_deref())?;

    Ok(Json(transaction))
}
