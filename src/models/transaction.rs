use serde::{Deserialize, Serialize};

/// A single purchase attempt for one course and its financial terms.
///
/// `total_cents` is always `amount - discount + admin_fee`; the admin fee
/// is zero for cash transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub invoice_number: String,

    // Parties / subject
    pub buyer_id: String,
    pub course_id: String,
    pub promo_code_id: Option<String>,

    // Amounts (minor units)
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub admin_fee_cents: i64,
    pub total_cents: i64,

    // Payment metadata
    pub payment_method: PaymentMethod,
    /// Free-text channel reported by the gateway (e.g. "QRIS", "BCA VA").
    /// NULL for cash.
    pub payment_channel: Option<String>,
    /// The gateway's own identifier for this transaction. Unique when
    /// present; used to correlate callbacks to local records.
    pub external_ref: Option<String>,
    /// Gateway-issued redirect target for the buyer.
    pub payment_url: Option<String>,

    pub status: TransactionStatus,
    /// Free text; holds administrator rejection reasons.
    pub notes: Option<String>,
    /// Verbatim body of the most recent gateway callback, kept for audit.
    pub last_callback: Option<String>,

    pub created_at: i64,
    pub paid_at: Option<i64>,
    pub expired_at: Option<i64>,
}

/// Data required to create a new transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransaction {
    pub buyer_id: String,
    pub course_id: String,
    pub promo_code_id: Option<String>,

    pub amount_cents: i64,
    pub discount_cents: i64,
    pub admin_fee_cents: i64,

    pub payment_method: PaymentMethod,
    pub payment_channel: Option<String>,
    pub external_ref: Option<String>,
    pub payment_url: Option<String>,
}

impl CreateTransaction {
    pub fn total_cents(&self) -> i64 {
        self.amount_cents - self.discount_cents + self.admin_fee_cents
    }
}

/// Lifecycle state of a transaction.
///
/// `Pending` is the sole initial state; the other three are terminal and
/// have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Expired,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "expired" => Ok(Self::Expired),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a transaction is settled: through the payment gateway, or by cash
/// handled out-of-band by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gateway,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Cash => "cash",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(Self::Gateway),
            "cash" => Ok(Self::Cash),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
