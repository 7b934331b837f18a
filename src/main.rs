use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use villapay::config::Config;
use villapay::db::{create_pool, init_audit_db, init_db, queries, AppState};
use villapay::email::EmailService;
use villapay::escrow;
use villapay::gateways::{PaymentGateway, PaystackClient, StripeClient};
use villapay::handlers;
use villapay::models::{CreateBooking, CreatePayment, CreateRealtor};

#[derive(Parser, Debug)]
#[command(name = "villapay")]
#[command(about = "Payment reconciliation and escrow release for vacation rentals")]
struct Cli {
    /// Seed the database with dev data (realtor, booking, pending payment)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,

    /// Run one escrow release batch and exit (for external cron)
    #[arg(long)]
    release_payouts: bool,
}

/// Seeds the database with dev data for exercising webhooks locally.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let realtor = queries::create_realtor(
        &conn,
        &CreateRealtor {
            name: "Dev Realtor".to_string(),
            email: "realtor@villapay.local".to_string(),
        },
    )
    .expect("Failed to create dev realtor");

    let now = chrono::Utc::now().timestamp();
    let booking = queries::create_booking(
        &conn,
        &CreateBooking {
            property_id: "prop_dev_villa".to_string(),
            guest_id: "guest_dev".to_string(),
            guest_email: Some("guest@villapay.local".to_string()),
            realtor_id: realtor.id.clone(),
            check_in: now + 7 * 86400,
            check_out: now + 10 * 86400,
            realtor_payout_minor: 42_500,
            currency: "usd".to_string(),
        },
    )
    .expect("Failed to create dev booking");

    let payment = queries::create_payment(
        &conn,
        &CreatePayment {
            booking_id: booking.id.clone(),
            amount_minor: 50_000,
            currency: "usd".to_string(),
            gateway: PaymentGateway::Stripe,
            service_fee_minor: 2_500,
            platform_commission_minor: 5_000,
        },
    )
    .expect("Failed to create dev payment");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("============================================");

    // Copy-paste friendly output for webhook test payload metadata
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  realtor_id: {}", realtor.id);
    println!("  booking_id: {}", booking.id);
    println!("  payment_id: {}", payment.id);
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
                .unwrap_or_else(|_| "villapay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // Create database connection pools
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    // Initialize database schemas
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        stripe: Arc::new(StripeClient::new(
            &config.stripe_secret_key,
            &config.stripe_webhook_secret,
        )),
        paystack: Arc::new(PaystackClient::new(
            &config.paystack_secret_key,
            &config.paystack_webhook_secret,
        )),
        email: EmailService::new(
            config.resend_api_key.clone(),
            config.email_from.clone(),
            config.email_enabled,
        ),
        audit_log_enabled: config.audit_log_enabled,
        escrow_offset_hours: config.escrow_offset_hours,
        base_url: config.base_url.clone(),
    };

    // One-shot batch for external cron, then exit
    if cli.release_payouts {
        let summary = escrow::run_release_batch(&state).await;
        println!(
            "Release batch: {} released, {} failed, {} skipped",
            summary.released, summary.failed, summary.skipped
        );
        return;
    }

    // Purge old audit logs on startup (0 = never purge)
    if config.audit_log_retention_days > 0 {
        let conn = state.audit.get().expect("Failed to get audit connection for purge");
        match queries::purge_old_audit_logs(&conn, config.audit_log_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} audit log entries older than {} days",
                    count,
                    config.audit_log_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old audit logs: {}", e);
            }
        }
    }

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set VILLAPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Start the periodic escrow release scheduler
    escrow::spawn_release_scheduler(state.clone(), Duration::from_secs(config.escrow_tick_secs));

    // Build the application router
    let app = Router::new()
        // Webhook endpoints (signature auth)
        .merge(handlers::webhooks::router())
        // Refund flow
        .merge(handlers::refunds::router())
        // Realtor payout onboarding
        .merge(handlers::realtors::router())
        // Operational endpoints
        .merge(handlers::admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Villapay server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    // Cleanup on exit if ephemeral mode
    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            // Also remove WAL and SHM files if they exist
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
