//! Prefixed ID generation for Coursepay entities.
//!
//! All IDs use a `cp_` brand prefix to guarantee collision avoidance with
//! payment gateway identifiers.
//!
//! Format: `cp_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use chrono::Utc;
use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["cp_txn_", "cp_enr_"];

/// Validate that a string is a valid Coursepay prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `cp_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in Coursepay.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Transaction,
    Enrollment,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Transaction => "cp_txn",
            Self::Enrollment => "cp_enr",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

/// Generates a human-readable invoice number: `INV-YYYYMMDD-XXXXXXXX`.
///
/// The date part keeps invoices sortable for operators; the random suffix
/// guarantees uniqueness without a counter table.
pub fn invoice_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().as_simple().to_string()[..8].to_uppercase();
    format!("INV-{}-{}", date, suffix)
}
