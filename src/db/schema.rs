use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Purchase attempts and their financial terms.
        -- status forms a DAG: pending is the sole initial state, the
        -- other three are terminal (no outgoing transitions).
        -- paid_at / expired_at are set exactly once, on entry to the
        -- corresponding terminal state.
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            invoice_number TEXT NOT NULL UNIQUE,
            buyer_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            promo_code_id TEXT,
            amount_cents INTEGER NOT NULL,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            admin_fee_cents INTEGER NOT NULL DEFAULT 0,
            total_cents INTEGER NOT NULL,
            payment_method TEXT NOT NULL CHECK (payment_method IN ('gateway', 'cash')),
            payment_channel TEXT,
            external_ref TEXT,
            payment_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'paid', 'expired', 'failed')),
            notes TEXT,
            last_callback TEXT,
            created_at INTEGER NOT NULL,
            paid_at INTEGER,
            expired_at INTEGER
        );
        -- Gateway references are unique when present (cash rows have none).
        CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_external_ref
            ON transactions(external_ref) WHERE external_ref IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_transactions_buyer ON transactions(buyer_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);

        -- Entitlements. One row per (buyer, course) regardless of how many
        -- transactions were attempted; activation is an upsert on that key.
        -- Progress fields are written by the learning subsystem.
        CREATE TABLE IF NOT EXISTS enrollments (
            id TEXT PRIMARY KEY,
            buyer_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'completed', 'expired')),
            enrolled_at INTEGER NOT NULL,
            completed_at INTEGER,
            expires_at INTEGER,
            completed_lessons INTEGER NOT NULL DEFAULT 0,

            UNIQUE (buyer_id, course_id)
        );
        CREATE INDEX IF NOT EXISTS idx_enrollments_buyer ON enrollments(buyer_id);
        "#,
    )
}
