use std::env;

/// Hours the realtor's share is held in escrow after a confirmed charge
/// before the release scheduler will pay it out.
pub const DEFAULT_ESCROW_OFFSET_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub base_url: String,
    pub dev_mode: bool,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub paystack_secret_key: String,
    /// Paystack signs webhooks with the account secret key itself; a separate
    /// value is only needed when terminating webhooks behind a relay.
    pub paystack_webhook_secret: String,

    /// Escrow hold between charge confirmation and payout eligibility.
    pub escrow_offset_hours: i64,
    /// Seconds between escrow release scheduler ticks.
    pub escrow_tick_secs: u64,

    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub email_enabled: bool,

    pub audit_log_enabled: bool,
    /// 0 = keep audit logs forever.
    pub audit_log_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("VILLAPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let paystack_secret_key = env::var("PAYSTACK_SECRET_KEY").unwrap_or_default();
        let paystack_webhook_secret = env::var("PAYSTACK_WEBHOOK_SECRET")
            .unwrap_or_else(|_| paystack_secret_key.clone());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "villapay.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "villapay_audit.db".to_string()),
            base_url,
            dev_mode,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            paystack_secret_key,
            paystack_webhook_secret,
            escrow_offset_hours: env::var("ESCROW_OFFSET_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ESCROW_OFFSET_HOURS),
            escrow_tick_secs: env::var("ESCROW_TICK_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Villapay <no-reply@villapay.app>".to_string()),
            email_enabled: env::var("EMAIL_ENABLED")
                .map(|v| v != "0" && v != "false")
                .unwrap_or(true),
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| v != "0" && v != "false")
                .unwrap_or(true),
            audit_log_retention_days: env::var("AUDIT_LOG_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
