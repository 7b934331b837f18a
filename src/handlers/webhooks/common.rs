//! Common webhook handling infrastructure for payment gateways.
//!
//! A trait per gateway covers signature extraction, verification over the
//! raw body bytes, and parsing into a gateway-agnostic event; the shared
//! driver runs verify -> parse -> reconcile and maps outcomes onto the
//! response contract: 2xx whenever the event was verified and attempted,
//! 4xx only for signature problems, 5xx only for critical-path failures
//! (which the gateway answers with a retry).

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
};

use crate::db::AppState;
use crate::gateways::PaymentGateway;
use crate::reconcile::{self, Applied};

/// Result type for webhook operations: status plus a short note for the ack
/// body and logs.
pub type WebhookResult = (StatusCode, &'static str);

/// Data extracted from a charge success/failure event.
#[derive(Debug)]
pub struct ChargeOutcome {
    /// Gateway event id; the idempotency ledger key.
    pub event_id: String,
    /// Booking id from event metadata. Absent means the event is dropped.
    pub booking_id: Option<String>,
    /// Stripe payment intent id / Paystack transaction id.
    pub transaction_id: String,
    /// Paystack charge reference (fee lookups key on it).
    pub reference: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

/// Data extracted from a transfer lifecycle event.
#[derive(Debug)]
pub struct TransferOutcome {
    pub event_id: String,
    pub transfer_id: String,
    /// Booking id when the transfer carries one (Stripe transfer_group).
    pub booking_id: Option<String>,
}

/// Data extracted from a dispute/chargeback event.
#[derive(Debug)]
pub struct DisputeOutcome {
    pub event_id: String,
    /// The disputed charge's transaction id; the booking is resolved
    /// through the payment record.
    pub transaction_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub reason: Option<String>,
}

/// Data extracted from a connect-account update.
#[derive(Debug)]
pub struct AccountOutcome {
    pub event_id: String,
    pub account_id: String,
    /// Realtor id from account metadata, when the platform stamped one.
    pub realtor_id: Option<String>,
    pub payouts_enabled: bool,
}

/// Parsed webhook event with gateway-agnostic data.
#[derive(Debug)]
pub enum GatewayEvent {
    ChargeSucceeded(ChargeOutcome),
    ChargeFailed(ChargeOutcome),
    TransferCreated(TransferOutcome),
    TransferPaid(TransferOutcome),
    TransferFailed(TransferOutcome),
    DisputeCreated(DisputeOutcome),
    AccountUpdated(AccountOutcome),
    /// Event type not relevant to reconciliation.
    Ignored,
}

/// Trait for payment gateway webhook handling.
pub trait WebhookGateway: Send + Sync {
    fn gateway(&self) -> PaymentGateway;

    /// Extract the signature from request headers.
    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult>;

    /// Verify the signature against the raw body bytes. The body must be the
    /// untouched wire payload - a re-serialized parse invalidates the HMAC.
    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult>;

    /// Parse the webhook payload into a gateway-agnostic event.
    fn parse_event(&self, body: &Bytes) -> Result<GatewayEvent, WebhookResult>;
}

/// Generic webhook driver shared by both gateway endpoints.
pub async fn handle_webhook<G: WebhookGateway>(
    gateway: &G,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let signature = match gateway.extract_signature(&headers) {
        Ok(s) => s,
        Err(e) => return e,
    };

    match gateway.verify_signature(state, &body, &signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => return e,
    }

    let event = match gateway.parse_event(&body) {
        Ok(e) => e,
        Err(e) => return e,
    };

    match reconcile::apply_event(state, gateway.gateway(), event).await {
        Ok(Applied::Processed) => (StatusCode::OK, "OK"),
        Ok(Applied::AlreadyProcessed) => (StatusCode::OK, "Already processed"),
        Ok(Applied::Skipped(note)) => (StatusCode::OK, note),
        Err(e) if e.is_critical() => {
            // Non-2xx so the gateway redelivers; a failed write must not be
            // silently acknowledged.
            tracing::error!("{} webhook processing failed: {}", gateway.gateway(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed")
        }
        Err(e) => {
            // Logic-level rejection; retrying would fail identically, so ack.
            tracing::warn!("{} webhook dropped: {}", gateway.gateway(), e);
            (StatusCode::OK, "Event dropped")
        }
    }
}
