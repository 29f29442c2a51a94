//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on invalid stored values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const TRANSACTION_COLS: &str = "id, invoice_number, buyer_id, course_id, promo_code_id, amount_cents, discount_cents, admin_fee_cents, total_cents, payment_method, payment_channel, external_ref, payment_url, status, notes, last_callback, created_at, paid_at, expired_at";

pub const ENROLLMENT_COLS: &str =
    "id, buyer_id, course_id, status, enrolled_at, completed_at, expires_at, completed_lessons";

// ============ FromRow Implementations ============

impl FromRow for Transaction {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get(0)?,
            invoice_number: row.get(1)?,
            buyer_id: row.get(2)?,
            course_id: row.get(3)?,
            promo_code_id: row.get(4)?,
            amount_cents: row.get(5)?,
            discount_cents: row.get(6)?,
            admin_fee_cents: row.get(7)?,
            total_cents: row.get(8)?,
            payment_method: parse_enum(row, 9, "payment_method")?,
            payment_channel: row.get(10)?,
            external_ref: row.get(11)?,
            payment_url: row.get(12)?,
            status: parse_enum(row, 13, "status")?,
            notes: row.get(14)?,
            last_callback: row.get(15)?,
            created_at: row.get(16)?,
            paid_at: row.get(17)?,
            expired_at: row.get(18)?,
        })
    }
}

impl FromRow for Enrollment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Enrollment {
            id: row.get(0)?,
            buyer_id: row.get(1)?,
            course_id: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            enrolled_at: row.get(4)?,
            completed_at: row.get(5)?,
            expires_at: row.get(6)?,
            completed_lessons: row.get(7)?,
        })
    }
}
