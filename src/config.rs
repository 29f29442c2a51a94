use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Shared secret for verifying gateway callback signatures.
    pub gateway_server_key: String,
    /// Base URL of the payment gateway API (overridable for test doubles).
    pub gateway_base_url: String,
    /// Webhook URL for payment-confirmation notifications. None = log only.
    pub notify_webhook_url: Option<String>,
    /// Bearer token for the administrative approve/reject endpoints.
    pub admin_api_key: String,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("COURSEPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        // Secrets have dev-mode fallbacks so `--seed` workflows need no .env,
        // but a production deployment must provide them explicitly.
        let gateway_server_key = match env::var("GATEWAY_SERVER_KEY") {
            Ok(key) => key,
            Err(_) if dev_mode => "coursepay-dev-server-key".to_string(),
            Err(_) => panic!("GATEWAY_SERVER_KEY must be set (or run with COURSEPAY_ENV=dev)"),
        };

        let admin_api_key = match env::var("ADMIN_API_KEY") {
            Ok(key) => key,
            Err(_) if dev_mode => "coursepay-dev-admin-key".to_string(),
            Err(_) => panic!("ADMIN_API_KEY must be set (or run with COURSEPAY_ENV=dev)"),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "coursepay.db".to_string()),
            base_url,
            gateway_server_key,
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.payment-gateway.example".to_string()),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            admin_api_key,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
