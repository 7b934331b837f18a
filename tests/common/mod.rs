//! Test utilities and fixtures for Villapay integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub use villapay::db::{init_audit_db, init_db, queries, AppState, DbPool};
pub use villapay::email::EmailService;
pub use villapay::error::{AppError, Result};
pub use villapay::gateways::*;
pub use villapay::handlers;
pub use villapay::models::*;

pub const TEST_STRIPE_WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const TEST_PAYSTACK_WEBHOOK_SECRET: &str = "sk_test_paystack_secret";

/// Default escrow offset used by test states, in hours.
pub const TEST_ESCROW_OFFSET_HOURS: i64 = 24;

/// In-memory pool with a single connection so every checkout sees the same
/// database.
pub fn setup_test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create in-memory pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    pool
}

pub fn setup_test_audit_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create in-memory audit pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_audit_db(&conn).expect("Failed to initialize audit schema");
    }
    pool
}

/// Stripe double: real HMAC verification against the test secret, stubbed
/// remote calls with failure injection for transfer tests.
pub struct MockStripe {
    verifier: StripeClient,
    pub fee_minor: i64,
    pub fee_currency: String,
    /// Account ids whose transfers should fail.
    pub fail_transfers_for: Mutex<HashSet<String>>,
    /// Every transfer the scheduler attempted.
    pub transfers: Mutex<Vec<TransferRequest>>,
    seq: AtomicUsize,
}

impl Default for MockStripe {
    fn default() -> Self {
        Self {
            verifier: StripeClient::new("sk_test_xxx", TEST_STRIPE_WEBHOOK_SECRET),
            fee_minor: 150,
            fee_currency: "usd".to_string(),
            fail_transfers_for: Mutex::new(HashSet::new()),
            transfers: Mutex::new(Vec::new()),
            seq: AtomicUsize::new(0),
        }
    }
}

impl MockStripe {
    pub fn with_fee(fee_minor: i64) -> Self {
        Self {
            fee_minor,
            ..Self::default()
        }
    }

    pub fn fail_transfers_for_account(&self, account_id: &str) {
        self.fail_transfers_for
            .lock()
            .unwrap()
            .insert(account_id.to_string());
    }

    fn next_seq(&self) -> usize {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl StripeGateway for MockStripe {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        self.verifier.verify_signature(payload, signature)
    }

    async fn fetch_charge_fee(&self, _payment_intent_id: &str) -> Result<FeeBreakdown> {
        Ok(FeeBreakdown {
            fee_minor: self.fee_minor,
            currency: self.fee_currency.clone(),
        })
    }

    async fn create_transfer(&self, req: &TransferRequest) -> Result<GatewayTransfer> {
        if self.fail_transfers_for.lock().unwrap().contains(&req.account_id) {
            return Err(AppError::Gateway(format!(
                "Transfer to {} declined by test double",
                req.account_id
            )));
        }
        self.transfers.lock().unwrap().push(req.clone());
        Ok(GatewayTransfer {
            id: format!("tr_test_{}", self.next_seq()),
        })
    }

    async fn fetch_account_status(&self, account_id: &str) -> Result<AccountStatus> {
        Ok(AccountStatus {
            id: account_id.to_string(),
            payouts_enabled: true,
            details_submitted: true,
        })
    }

    async fn create_connect_account(&self, _email: &str) -> Result<String> {
        Ok(format!("acct_test_{}", self.next_seq()))
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> Result<String> {
        Ok(format!("https://connect.stripe.test/onboard/{}", account_id))
    }

    async fn create_dashboard_link(&self, account_id: &str) -> Result<String> {
        Ok(format!("https://connect.stripe.test/dashboard/{}", account_id))
    }

    async fn create_refund(
        &self,
        _payment_intent_id: &str,
        amount_minor: i64,
    ) -> Result<GatewayRefund> {
        Ok(GatewayRefund {
            id: format!("re_test_{}", self.next_seq()),
            amount_minor,
        })
    }
}

/// Paystack double, same shape.
pub struct MockPaystack {
    verifier: PaystackClient,
    pub fee_minor: i64,
    pub fee_currency: String,
    seq: AtomicUsize,
}

impl Default for MockPaystack {
    fn default() -> Self {
        Self {
            verifier: PaystackClient::new("sk_test_xxx", TEST_PAYSTACK_WEBHOOK_SECRET),
            fee_minor: 150,
            fee_currency: "ngn".to_string(),
            seq: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PaystackGateway for MockPaystack {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        self.verifier.verify_signature(payload, signature)
    }

    async fn fetch_transaction_fee(&self, _reference: &str) -> Result<FeeBreakdown> {
        Ok(FeeBreakdown {
            fee_minor: self.fee_minor,
            currency: self.fee_currency.clone(),
        })
    }

    async fn create_refund(&self, _reference: &str, amount_minor: i64) -> Result<GatewayRefund> {
        Ok(GatewayRefund {
            id: format!("{}", 9000 + self.seq.fetch_add(1, Ordering::SeqCst)),
            amount_minor,
        })
    }
}

/// App state wired to in-memory databases and the gateway doubles.
pub fn setup_test_state(stripe: Arc<MockStripe>, paystack: Arc<MockPaystack>) -> AppState {
    AppState {
        db: setup_test_pool(),
        audit: setup_test_audit_pool(),
        stripe,
        paystack,
        email: EmailService::disabled(),
        audit_log_enabled: true,
        escrow_offset_hours: TEST_ESCROW_OFFSET_HOURS,
        base_url: "http://localhost:3000".to_string(),
    }
}

pub fn default_test_state() -> AppState {
    setup_test_state(Arc::new(MockStripe::default()), Arc::new(MockPaystack::default()))
}

/// Full application router over a test state.
pub fn test_router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::webhooks::router())
        .merge(handlers::refunds::router())
        .merge(handlers::realtors::router())
        .merge(handlers::admin::router())
        .with_state(state)
}

// ============ Fixtures ============

pub fn create_test_realtor(state: &AppState) -> Realtor {
    let conn = state.db.get().unwrap();
    queries::create_realtor(
        &conn,
        &CreateRealtor {
            name: "Test Realtor".to_string(),
            email: "realtor@example.test".to_string(),
        },
    )
    .expect("Failed to create test realtor")
}

pub fn connect_test_realtor(state: &AppState, realtor: &Realtor, account_id: &str) {
    let conn = state.db.get().unwrap();
    queries::set_realtor_stripe_account(&conn, &realtor.id, account_id, true)
        .expect("Failed to connect test realtor");
}

pub fn create_test_booking(state: &AppState, realtor_id: &str) -> Booking {
    let conn = state.db.get().unwrap();
    let now = chrono::Utc::now().timestamp();
    queries::create_booking(
        &conn,
        &CreateBooking {
            property_id: "prop_test_villa".to_string(),
            guest_id: "guest_test".to_string(),
            guest_email: Some("guest@example.test".to_string()),
            realtor_id: realtor_id.to_string(),
            check_in: now + 7 * 86400,
            check_out: now + 10 * 86400,
            realtor_payout_minor: 42_500,
            currency: "usd".to_string(),
        },
    )
    .expect("Failed to create test booking")
}

pub fn create_test_payment(
    state: &AppState,
    booking_id: &str,
    gateway: PaymentGateway,
) -> Payment {
    let conn = state.db.get().unwrap();
    queries::create_payment(
        &conn,
        &CreatePayment {
            booking_id: booking_id.to_string(),
            amount_minor: 50_000,
            currency: "usd".to_string(),
            gateway,
            service_fee_minor: 2_500,
            platform_commission_minor: 5_000,
        },
    )
    .expect("Failed to create test payment")
}

/// Booking + payment pair already settled by a successful charge, payout
/// pending with a lapsed release date - the scheduler's prey.
pub fn create_due_booking(state: &AppState, realtor_id: &str, gateway: PaymentGateway) -> Booking {
    let booking = create_test_booking(state, realtor_id);
    let payment = create_test_payment(state, &booking.id, gateway);

    let conn = state.db.get().unwrap();
    queries::transition_booking_status(
        &conn,
        &booking.id,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        TransitionExtras {
            payout_release_at: Some(chrono::Utc::now().timestamp() - 60),
            payout_status: None,
        },
    )
    .expect("Failed to confirm test booking");
    queries::update_payment_charge_result(
        &conn,
        &payment.id,
        PaymentStatus::Completed,
        "pi_test_due",
        None,
    )
    .expect("Failed to settle test payment");

    queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap()
}

pub fn get_booking(state: &AppState, id: &str) -> Booking {
    let conn = state.db.get().unwrap();
    queries::get_booking_by_id(&conn, id).unwrap().expect("booking missing")
}

pub fn get_payment(state: &AppState, booking_id: &str) -> Payment {
    let conn = state.db.get().unwrap();
    queries::get_payment_by_booking(&conn, booking_id)
        .unwrap()
        .expect("payment missing")
}

// ============ Signature helpers ============

pub fn compute_stripe_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Ready-to-send `stripe-signature` header value for a payload.
pub fn stripe_signature_header(payload: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = compute_stripe_signature(payload, TEST_STRIPE_WEBHOOK_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

pub fn compute_paystack_signature(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;

    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Ready-to-send `x-paystack-signature` header value for a payload.
pub fn paystack_signature_header(payload: &[u8]) -> String {
    compute_paystack_signature(payload, TEST_PAYSTACK_WEBHOOK_SECRET)
}
