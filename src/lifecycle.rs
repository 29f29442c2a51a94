//! Transaction lifecycle engine.
//!
//! The single authority for all transaction state transitions, whether
//! triggered by a gateway callback or an administrator action. Every
//! transition out of `pending` is a compare-and-set UPDATE; only the
//! caller that wins the atomic flip to `paid` runs enrollment activation,
//! and the winning flip and the enrollment upsert commit together, so a
//! crash can never persist a paid transaction without its entitlement.

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::{msg, AppError, Result};
use crate::gateway::GatewayStatus;
use crate::models::{Enrollment, PaymentMethod, Transaction};

/// What a webhook delivery did to the referenced transaction.
#[derive(Debug)]
pub enum WebhookOutcome {
    /// No transaction carries this external reference. Logged; the HTTP
    /// handler still acknowledges so the gateway stops retrying.
    NotFound,
    /// Idempotent no-op: duplicate delivery, already-terminal transaction,
    /// or an unrecognized gateway status. The raw snapshot was still
    /// updated.
    NoChange,
    Expired(Transaction),
    Failed(Transaction),
    /// This delivery won the first transition into `paid`. The caller is
    /// responsible for dispatching the payment-confirmation notification.
    Paid {
        transaction: Transaction,
        enrollment: Enrollment,
        newly_enrolled: bool,
    },
}

/// Result of a successful cash approval.
#[derive(Debug)]
pub struct CashApproval {
    pub transaction: Transaction,
    pub enrollment: Enrollment,
    pub newly_enrolled: bool,
}

/// Apply a verified, status-mapped gateway callback to the transaction it
/// references.
///
/// The raw payload snapshot is overwritten on every delivery for a known
/// reference, independent of status change. Transitions only ever leave
/// `pending`; terminal states have no outgoing edges, so a replay or a
/// late status for a settled transaction is a no-op.
pub fn apply_webhook_status(
    conn: &mut Connection,
    external_ref: &str,
    status: GatewayStatus,
    raw_body: &str,
    channel: Option<&str>,
) -> Result<WebhookOutcome> {
    let Some(transaction) = queries::get_transaction_by_external_ref(conn, external_ref)? else {
        return Ok(WebhookOutcome::NotFound);
    };

    let now = Utc::now().timestamp();
    let tx = conn.transaction()?;

    queries::store_callback_snapshot(&tx, &transaction.id, raw_body, channel)?;

    let mut activation: Option<(Enrollment, bool)> = None;
    let mut transitioned = false;

    match status {
        GatewayStatus::Paid => {
            if queries::try_mark_paid(&tx, &transaction.id, now)? {
                // Activation failure rolls the paid flip back (drop of the
                // uncommitted transaction) and surfaces an error, so the
                // gateway redelivers instead of losing the payment.
                activation = Some(queries::activate_enrollment(
                    &tx,
                    &transaction.buyer_id,
                    &transaction.course_id,
                    now,
                )?);
                transitioned = true;
            } else {
                tracing::info!(
                    "duplicate paid callback for {} ignored (status={})",
                    transaction.invoice_number,
                    transaction.status
                );
            }
        }
        GatewayStatus::Expired => {
            transitioned = queries::try_mark_expired(&tx, &transaction.id, now)?;
            if !transitioned {
                tracing::info!(
                    "expire callback for non-pending {} ignored (status={})",
                    transaction.invoice_number,
                    transaction.status
                );
            }
        }
        GatewayStatus::Failed => {
            transitioned = queries::try_mark_failed(&tx, &transaction.id, None)?;
            if !transitioned {
                tracing::info!(
                    "failure callback for non-pending {} ignored (status={})",
                    transaction.invoice_number,
                    transaction.status
                );
            }
        }
        GatewayStatus::Unknown => {
            tracing::warn!(
                "unrecognized gateway status for {} - snapshot stored, no transition",
                transaction.invoice_number
            );
        }
    }

    // Commit persists the snapshot even when no transition happened.
    tx.commit()?;

    if !transitioned {
        return Ok(WebhookOutcome::NoChange);
    }

    let refreshed = queries::get_transaction_by_id(conn, &transaction.id)?
        .ok_or_else(|| AppError::Internal(format!("transaction {} vanished", transaction.id)))?;

    match activation {
        Some((enrollment, newly_enrolled)) => {
            tracing::info!(
                "payment confirmed: invoice={} buyer={} course={} newly_enrolled={}",
                refreshed.invoice_number,
                refreshed.buyer_id,
                refreshed.course_id,
                newly_enrolled
            );
            Ok(WebhookOutcome::Paid {
                transaction: refreshed,
                enrollment,
                newly_enrolled,
            })
        }
        None if status == GatewayStatus::Expired => Ok(WebhookOutcome::Expired(refreshed)),
        None => Ok(WebhookOutcome::Failed(refreshed)),
    }
}

/// Administrator confirmation of an out-of-band cash payment.
///
/// Permitted only for cash transactions still in `pending`. Runs the same
/// terminal-state guard and activation side effect as the webhook path;
/// which actor triggers the transition makes no difference to the state
/// machine.
pub fn approve_cash(conn: &mut Connection, transaction_id: &str) -> Result<CashApproval> {
    let transaction = queries::get_transaction_by_id(conn, transaction_id)?
        .ok_or_else(|| AppError::NotFound(msg::TRANSACTION_NOT_FOUND.into()))?;

    if transaction.payment_method != PaymentMethod::Cash {
        return Err(AppError::BadRequest(msg::WRONG_PAYMENT_METHOD.into()));
    }

    let now = Utc::now().timestamp();
    let tx = conn.transaction()?;

    if !queries::try_mark_paid(&tx, &transaction.id, now)? {
        return Err(AppError::Conflict(msg::ALREADY_PROCESSED.into()));
    }

    let (enrollment, newly_enrolled) =
        queries::activate_enrollment(&tx, &transaction.buyer_id, &transaction.course_id, now)?;

    tx.commit()?;

    let refreshed = queries::get_transaction_by_id(conn, &transaction.id)?
        .ok_or_else(|| AppError::Internal(format!("transaction {} vanished", transaction.id)))?;

    tracing::info!(
        "cash payment approved: invoice={} buyer={} course={}",
        refreshed.invoice_number,
        refreshed.buyer_id,
        refreshed.course_id
    );

    Ok(CashApproval {
        transaction: refreshed,
        enrollment,
        newly_enrolled,
    })
}

/// Administrator rejection of a cash transaction, with an optional
/// free-text reason stored in the notes column. No activation side effect.
pub fn reject_cash(
    conn: &Connection,
    transaction_id: &str,
    reason: Option<&str>,
) -> Result<Transaction> {
    let transaction = queries::get_transaction_by_id(conn, transaction_id)?
        .ok_or_else(|| AppError::NotFound(msg::TRANSACTION_NOT_FOUND.into()))?;

    if transaction.payment_method != PaymentMethod::Cash {
        return Err(AppError::BadRequest(msg::WRONG_PAYMENT_METHOD.into()));
    }

    if !queries::try_mark_failed(conn, &transaction.id, reason)? {
        return Err(AppError::Conflict(msg::ALREADY_PROCESSED.into()));
    }

    let refreshed = queries::get_transaction_by_id(conn, &transaction.id)?
        .ok_or_else(|| AppError::Internal(format!("transaction {} vanished", transaction.id)))?;

    tracing::info!(
        "cash payment rejected: invoice={} reason={:?}",
        refreshed.invoice_number,
        reason
    );

    Ok(refreshed)
}
