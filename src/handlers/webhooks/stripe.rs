use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::db::AppState;
use crate::error::AppError;
use crate::gateways::{
    PaymentGateway, StripeAccount, StripeDispute, StripePaymentIntent, StripeTransfer,
    StripeWebhookEvent,
};

use super::common::{
    handle_webhook, AccountOutcome, ChargeOutcome, DisputeOutcome, GatewayEvent, TransferOutcome,
    WebhookGateway, WebhookResult,
};

/// Stripe webhook gateway implementation.
pub struct StripeWebhook;

impl WebhookGateway for StripeWebhook {
    fn gateway(&self) -> PaymentGateway {
        PaymentGateway::Stripe
    }

    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult> {
        headers
            .get("stripe-signature")
            .ok_or((StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature header")
            })
    }

    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult> {
        state
            .stripe
            .verify_webhook_signature(body, signature)
            .map_err(|e| match e {
                AppError::BadRequest(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid signature header")
                }
                e => {
                    tracing::error!("Signature verification error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Signature verification failed")
                }
            })
    }

    fn parse_event(&self, body: &Bytes) -> Result<GatewayEvent, WebhookResult> {
        let event: StripeWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event_type.as_str() {
            "payment_intent.succeeded" => parse_charge(&event, true),
            "payment_intent.payment_failed" => parse_charge(&event, false),
            "transfer.created" => parse_transfer(&event).map(GatewayEvent::TransferCreated),
            "transfer.paid" => parse_transfer(&event).map(GatewayEvent::TransferPaid),
            "transfer.failed" | "transfer.reversed" => {
                parse_transfer(&event).map(GatewayEvent::TransferFailed)
            }
            "charge.dispute.created" => parse_dispute(&event),
            "account.updated" => parse_account(&event),
            _ => Ok(GatewayEvent::Ignored),
        }
    }
}

fn parse_charge(event: &StripeWebhookEvent, succeeded: bool) -> Result<GatewayEvent, WebhookResult> {
    let intent: StripePaymentIntent =
        serde_json::from_value(event.data.object.clone()).map_err(|e| {
            tracing::error!("Failed to parse payment intent: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid payment intent")
        })?;

    let outcome = ChargeOutcome {
        event_id: event.id.clone(),
        booking_id: intent.metadata.booking_id,
        transaction_id: intent.id,
        reference: None,
        amount_minor: intent.amount,
        currency: intent.currency.to_lowercase(),
    };

    Ok(if succeeded {
        GatewayEvent::ChargeSucceeded(outcome)
    } else {
        GatewayEvent::ChargeFailed(outcome)
    })
}

fn parse_transfer(event: &StripeWebhookEvent) -> Result<TransferOutcome, WebhookResult> {
    let transfer: StripeTransfer =
        serde_json::from_value(event.data.object.clone()).map_err(|e| {
            tracing::error!("Failed to parse transfer: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid transfer")
        })?;

    Ok(TransferOutcome {
        event_id: event.id.clone(),
        transfer_id: transfer.id,
        // The scheduler stamps the booking id as the transfer group.
        booking_id: transfer.transfer_group,
    })
}

fn parse_dispute(event: &StripeWebhookEvent) -> Result<GatewayEvent, WebhookResult> {
    let dispute: StripeDispute =
        serde_json::from_value(event.data.object.clone()).map_err(|e| {
            tracing::error!("Failed to parse dispute: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid dispute")
        })?;

    let transaction_id = dispute
        .payment_intent
        .or(dispute.charge)
        .ok_or_else(|| {
            tracing::error!("Dispute {} has no payment_intent or charge", dispute.id);
            (StatusCode::BAD_REQUEST, "Dispute missing payment reference")
        })?;

    Ok(GatewayEvent::DisputeCreated(DisputeOutcome {
        event_id: event.id.clone(),
        transaction_id,
        amount_minor: dispute.amount,
        currency: dispute.currency.to_lowercase(),
        reason: dispute.reason,
    }))
}

fn parse_account(event: &StripeWebhookEvent) -> Result<GatewayEvent, WebhookResult> {
    let account: StripeAccount =
        serde_json::from_value(event.data.object.clone()).map_err(|e| {
            tracing::error!("Failed to parse account: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid account")
        })?;

    Ok(GatewayEvent::AccountUpdated(AccountOutcome {
        event_id: event.id.clone(),
        account_id: account.id,
        realtor_id: account.metadata.realtor_id,
        payouts_enabled: account.payouts_enabled,
    }))
}

/// Axum handler for Stripe webhooks. Acknowledges with `{"received": true}`.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let (status, note) = handle_webhook(&StripeWebhook, &state, headers, body).await;
    let body = if status.is_success() {
        serde_json::json!({ "received": true, "message": note })
    } else {
        serde_json::json!({ "error": note })
    };
    (status, Json(body))
}
