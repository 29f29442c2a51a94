use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::id::{invoice_number, EntityType};
use crate::models::*;

use super::from_row::{query_one, ENROLLMENT_COLS, TRANSACTION_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Transactions ============

pub fn create_transaction(conn: &Connection, input: &CreateTransaction) -> Result<Transaction> {
    let id = EntityType::Transaction.gen_id();
    let invoice = invoice_number();
    let created_at = now();

    conn.execute(
        "INSERT INTO transactions (id, invoice_number, buyer_id, course_id, promo_code_id, amount_cents, discount_cents, admin_fee_cents, total_cents, payment_method, payment_channel, external_ref, payment_url, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'pending', ?14)",
        params![
            &id,
            &invoice,
            &input.buyer_id,
            &input.course_id,
            &input.promo_code_id,
            input.amount_cents,
            input.discount_cents,
            input.admin_fee_cents,
            input.total_cents(),
            input.payment_method.as_str(),
            &input.payment_channel,
            &input.external_ref,
            &input.payment_url,
            created_at,
        ],
    )?;

    Ok(Transaction {
        id,
        invoice_number: invoice,
        buyer_id: input.buyer_id.clone(),
        course_id: input.course_id.clone(),
        promo_code_id: input.promo_code_id.clone(),
        amount_cents: input.amount_cents,
        discount_cents: input.discount_cents,
        admin_fee_cents: input.admin_fee_cents,
        total_cents: input.total_cents(),
        payment_method: input.payment_method,
        payment_channel: input.payment_channel.clone(),
        external_ref: input.external_ref.clone(),
        payment_url: input.payment_url.clone(),
        status: TransactionStatus::Pending,
        notes: None,
        last_callback: None,
        created_at,
        paid_at: None,
        expired_at: None,
    })
}

pub fn get_transaction_by_id(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLS),
        &[&id],
    )
}

pub fn get_transaction_by_external_ref(
    conn: &Connection,
    external_ref: &str,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE external_ref = ?1",
            TRANSACTION_COLS
        ),
        &[&external_ref],
    )
}

pub fn get_transaction_by_invoice(
    conn: &Connection,
    invoice_number: &str,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE invoice_number = ?1",
            TRANSACTION_COLS
        ),
        &[&invoice_number],
    )
}

/// Overwrite the stored raw-callback snapshot with the latest payload and
/// record the settlement channel the gateway reported, when present.
/// Runs on every callback for a known reference, whether or not the
/// status changes, so the audit trail stays current for duplicates too.
pub fn store_callback_snapshot(
    conn: &Connection,
    id: &str,
    raw_body: &str,
    channel: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE transactions SET last_callback = ?1, payment_channel = COALESCE(?2, payment_channel) WHERE id = ?3",
        params![raw_body, channel, id],
    )?;
    Ok(())
}

// ============ Status Transitions (compare-and-set) ============
//
// Each transition is a single conditional UPDATE guarded on
// status = 'pending'. The affected-row count is the "did I win the race"
// signal: concurrent deliveries for the same transaction serialize on the
// write lock and exactly one caller observes affected > 0.

/// Atomically move a pending transaction to `paid`, stamping `paid_at`.
/// Returns true if this call won the transition.
pub fn try_mark_paid(conn: &Connection, id: &str, paid_at: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET status = 'paid', paid_at = ?1 WHERE id = ?2 AND status = 'pending'",
        params![paid_at, id],
    )?;
    Ok(affected > 0)
}

/// Atomically move a pending transaction to `expired`, stamping `expired_at`.
pub fn try_mark_expired(conn: &Connection, id: &str, expired_at: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET status = 'expired', expired_at = ?1 WHERE id = ?2 AND status = 'pending'",
        params![expired_at, id],
    )?;
    Ok(affected > 0)
}

/// Atomically move a pending transaction to `failed`, recording an
/// optional reason in the notes column.
pub fn try_mark_failed(conn: &Connection, id: &str, reason: Option<&str>) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET status = 'failed', notes = COALESCE(?1, notes) WHERE id = ?2 AND status = 'pending'",
        params![reason, id],
    )?;
    Ok(affected > 0)
}

pub fn count_transactions(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}

// ============ Enrollments ============

/// Idempotently grant entitlement for (buyer, course).
///
/// Uses INSERT ... ON CONFLICT DO NOTHING so that two paid transactions
/// for the same pair converge on one row; an existing enrollment is left
/// entirely untouched (status, progress, expiry). Returns the enrollment
/// and whether this call created it.
pub fn activate_enrollment(
    conn: &Connection,
    buyer_id: &str,
    course_id: &str,
    enrolled_at: i64,
) -> Result<(Enrollment, bool)> {
    let id = EntityType::Enrollment.gen_id();
    let affected = conn.execute(
        "INSERT INTO enrollments (id, buyer_id, course_id, status, enrolled_at, completed_lessons)
         VALUES (?1, ?2, ?3, 'active', ?4, 0)
         ON CONFLICT (buyer_id, course_id) DO NOTHING",
        params![&id, buyer_id, course_id, enrolled_at],
    )?;

    let enrollment = get_enrollment(conn, buyer_id, course_id)?.ok_or_else(|| {
        crate::error::AppError::Internal(format!(
            "enrollment missing after upsert for buyer={} course={}",
            buyer_id, course_id
        ))
    })?;

    Ok((enrollment, affected > 0))
}

pub fn get_enrollment(
    conn: &Connection,
    buyer_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM enrollments WHERE buyer_id = ?1 AND course_id = ?2",
            ENROLLMENT_COLS
        ),
        &[&buyer_id, &course_id],
    )
}

pub fn count_enrollments(conn: &Connection, buyer_id: &str, course_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE buyer_id = ?1 AND course_id = ?2",
        params![buyer_id, course_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
