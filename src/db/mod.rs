mod from_row;
pub mod queries;
mod schema;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::email::EmailService;
use crate::gateways::{PaystackGateway, StripeGateway};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools, gateway clients, and configuration.
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (bookings, payments, refunds, realtors).
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth).
    pub audit: DbPool,
    /// Gateway clients behind trait objects so tests can inject doubles.
    pub stripe: Arc<dyn StripeGateway>,
    pub paystack: Arc<dyn PaystackGateway>,
    pub email: EmailService,
    pub audit_log_enabled: bool,
    /// Escrow hold between charge confirmation and payout eligibility.
    pub escrow_offset_hours: i64,
    /// Base URL for connect onboarding redirect links.
    pub base_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
