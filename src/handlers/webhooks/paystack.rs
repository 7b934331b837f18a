use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::db::AppState;
use crate::error::AppError;
use crate::gateways::{PaymentGateway, PaystackCharge, PaystackTransfer, PaystackWebhookEvent};

use super::common::{
    handle_webhook, ChargeOutcome, GatewayEvent, TransferOutcome, WebhookGateway, WebhookResult,
};

/// Paystack webhook gateway implementation.
pub struct PaystackWebhook;

impl WebhookGateway for PaystackWebhook {
    fn gateway(&self) -> PaymentGateway {
        PaymentGateway::Paystack
    }

    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult> {
        headers
            .get("x-paystack-signature")
            .ok_or((StatusCode::BAD_REQUEST, "Missing x-paystack-signature header"))?
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| {
                tracing::debug!("Invalid UTF-8 in Paystack signature header: {}", e);
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
            .paystack
            .verify_webhook_signature(body, signature)
            .map_err(|e| match e {
                AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Invalid signature header"),
                e => {
                    tracing::error!("Signature verification error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Signature verification failed")
                }
            })
    }

    fn parse_event(&self, body: &Bytes) -> Result<GatewayEvent, WebhookResult> {
        let event: PaystackWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Paystack webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event.as_str() {
            "charge.success" => parse_charge(&event, true),
            "charge.failed" => parse_charge(&event, false),
            "transfer.success" => parse_transfer(&event).map(GatewayEvent::TransferPaid),
            "transfer.failed" | "transfer.reversed" => {
                parse_transfer(&event).map(GatewayEvent::TransferFailed)
            }
            _ => Ok(GatewayEvent::Ignored),
        }
    }
}

/// Paystack envelopes carry no event id; the numeric object id scoped by the
/// event name is stable across redeliveries and serves as the ledger key.
fn dedup_key(event: &str, object_id: i64) -> String {
    format!("{}:{}", event, object_id)
}

fn parse_charge(event: &PaystackWebhookEvent, succeeded: bool) -> Result<GatewayEvent, WebhookResult> {
    let charge: PaystackCharge = serde_json::from_value(event.data.clone()).map_err(|e| {
        tracing::error!("Failed to parse Paystack charge: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid charge")
    })?;

    let outcome = ChargeOutcome {
        event_id: dedup_key(&event.event, charge.id),
        booking_id: charge.metadata.booking_id,
        transaction_id: charge.id.to_string(),
        reference: Some(charge.reference),
        amount_minor: charge.amount,
        currency: charge.currency.to_lowercase(),
    };

    Ok(if succeeded {
        GatewayEvent::ChargeSucceeded(outcome)
    } else {
        GatewayEvent::ChargeFailed(outcome)
    })
}

fn parse_transfer(event: &PaystackWebhookEvent) -> Result<TransferOutcome, WebhookResult> {
    let transfer: PaystackTransfer = serde_json::from_value(event.data.clone()).map_err(|e| {
        tracing::error!("Failed to parse Paystack transfer: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid transfer")
    })?;

    Ok(TransferOutcome {
        event_id: dedup_key(&event.event, transfer.id),
        transfer_id: transfer.transfer_code,
        booking_id: transfer.reference,
    })
}

/// Axum handler for Paystack webhooks. Acknowledges with `{"status": true}`.
pub async fn handle_paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let (status, note) = handle_webhook(&PaystackWebhook, &state, headers, body).await;
    let body = if status.is_success() {
        serde_json::json!({ "status": true, "message": note })
    } else {
        serde_json::json!({ "status": false, "error": note })
    };
    (status, Json(body))
}
