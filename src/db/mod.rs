mod schema;
pub mod from_row;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::gateway::GatewayClient;
use crate::notify::Notifier;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool and configured collaborators.
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (transactions, enrollments)
    pub db: DbPool,
    /// Payment gateway adapter (signature verification, charge creation)
    pub gateway: GatewayClient,
    /// Best-effort payment-confirmation dispatcher
    pub notifier: Notifier,
    /// Bearer token for administrative endpoints
    pub admin_api_key: String,
    /// Base URL for gateway redirect targets (e.g. https://api.example.com)
    pub base_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        // Bound contended store operations instead of hanging; a timeout
        // surfaces as an error, never as a silent state change.
        conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
