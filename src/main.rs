use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursepay::config::Config;
use coursepay::db::{create_pool, init_db, queries, AppState};
use coursepay::gateway::{GatewayClient, GatewayConfig};
use coursepay::handlers;
use coursepay::models::{CreateTransaction, PaymentMethod};
use coursepay::notify::Notifier;

#[derive(Parser, Debug)]
#[command(name = "coursepay")]
#[command(about = "Course commerce backend: gateway webhooks, cash approvals, enrollment activation")]
struct Cli {
    /// Seed the database with dev data (one gateway and one cash transaction)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with dev data for testing webhook and approval flows.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count = queries::count_transactions(&conn).expect("Failed to count transactions");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let gateway_tx = queries::create_transaction(
        &conn,
        &CreateTransaction {
            buyer_id: "dev-buyer-1".to_string(),
            course_id: "dev-course-rust".to_string(),
            promo_code_id: None,
            amount_cents: 250_000,
            discount_cents: 25_000,
            admin_fee_cents: 5_000,
            payment_method: PaymentMethod::Gateway,
            payment_channel: None,
            external_ref: Some("DEV-REF-001".to_string()),
            payment_url: Some("https://pay.example/DEV-REF-001".to_string()),
        },
    )
    .expect("Failed to create dev gateway transaction");

    let cash_tx = queries::create_transaction(
        &conn,
        &CreateTransaction {
            buyer_id: "dev-buyer-2".to_string(),
            course_id: "dev-course-rust".to_string(),
            promo_code_id: None,
            amount_cents: 250_000,
            discount_cents: 0,
            admin_fee_cents: 0,
            payment_method: PaymentMethod::Cash,
            payment_channel: None,
            external_ref: None,
            payment_url: None,
        },
    )
    .expect("Failed to create dev cash transaction");

    tracing::info!("Gateway transaction: {} ({})", gateway_tx.invoice_number, gateway_tx.id);
    tracing::info!("Cash transaction: {} ({})", cash_tx.invoice_number, cash_tx.id);

    // Copy-paste friendly output for manual webhook/approval testing
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  gateway_external_ref: DEV-REF-001");
    println!("  gateway_transaction_id: {}", gateway_tx.id);
    println!("  cash_transaction_id: {}", cash_tx.id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursepay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // Create database connection pool and initialize the schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    // One shared HTTP client for gateway charges and notifications
    let http_client = reqwest::Client::new();

    let state = AppState {
        db: db_pool,
        gateway: GatewayClient::new(
            &GatewayConfig {
                server_key: config.gateway_server_key.clone(),
                base_url: config.gateway_base_url.clone(),
            },
            http_client.clone(),
        ),
        notifier: Notifier::new(http_client, config.notify_webhook_url.clone()),
        admin_api_key: config.admin_api_key.clone(),
        base_url: config.base_url.clone(),
    };

    if config.notify_webhook_url.is_none() {
        tracing::info!("NOTIFY_WEBHOOK_URL not set - payment confirmations will be logged only");
    }

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set COURSEPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Build the application router
    let app = Router::new()
        // Buyer endpoints (checkout, status poll)
        .merge(handlers::public::router())
        // Gateway callback endpoint (signature auth)
        .merge(handlers::webhooks::router())
        // Administrator API (bearer key auth)
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Coursepay server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
