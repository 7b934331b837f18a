mod paystack;
mod stripe;

pub use paystack::*;
pub use stripe::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::Result;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentGateway {
    Stripe,
    Paystack,
}

impl PaymentGateway {
    /// Minor units per major unit for the currencies each gateway settles in
    /// (cents, kobo). Used when rendering amounts, never for arithmetic.
    pub fn minor_unit_divisor(&self) -> i64 {
        100
    }
}

/// Fee breakdown for a settled charge, as reported by the gateway.
#[derive(Debug, Clone)]
pub struct FeeBreakdown {
    pub fee_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub account_id: String,
    pub amount_minor: i64,
    pub currency: String,
    /// Booking id; doubles as the transfer group so transfer webhooks can be
    /// traced back without a metadata round-trip.
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct GatewayTransfer {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct AccountStatus {
    pub id: String,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub id: String,
    pub amount_minor: i64,
}

/// Stripe surface the reconciler, scheduler, and refund processor consume.
/// Injected so tests can stand in doubles for the remote calls.
#[async_trait]
pub trait StripeGateway: Send + Sync {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool>;

    /// Fee for a settled payment intent, via its charge's balance transaction.
    async fn fetch_charge_fee(&self, payment_intent_id: &str) -> Result<FeeBreakdown>;

    async fn create_transfer(&self, req: &TransferRequest) -> Result<GatewayTransfer>;

    async fn fetch_account_status(&self, account_id: &str) -> Result<AccountStatus>;

    async fn create_connect_account(&self, email: &str) -> Result<String>;

    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String>;

    async fn create_dashboard_link(&self, account_id: &str) -> Result<String>;

    async fn create_refund(&self, payment_intent_id: &str, amount_minor: i64)
        -> Result<GatewayRefund>;
}

/// Paystack surface. Transfers are absent on purpose: charges are split to
/// the realtor's subaccount at capture time, so the scheduler has nothing to
/// move at release time.
#[async_trait]
pub trait PaystackGateway: Send + Sync {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool>;

    /// Fee for a settled charge, via transaction verification by reference.
    async fn fetch_transaction_fee(&self, reference: &str) -> Result<FeeBreakdown>;

    async fn create_refund(&self, reference: &str, amount_minor: i64) -> Result<GatewayRefund>;
}
