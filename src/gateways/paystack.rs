use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

use super::{FeeBreakdown, GatewayRefund, PaystackGateway};

type HmacSha512 = Hmac<Sha512>;

const PAYSTACK_API_BASE: &str = "https://api.paystack.co";

#[derive(Debug, Clone)]
pub struct PaystackClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl PaystackClient {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Verify an `x-paystack-signature` header: HMAC-SHA512 of the raw body,
    /// hex encoded. As with Stripe, the body bytes must be the untouched
    /// wire payload.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        if signature.is_empty() {
            return Err(AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()));
        }

        let mut mac = HmacSha512::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }
        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", PAYSTACK_API_BASE, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Paystack API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("Paystack API error: {}", error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Paystack response: {}", e)))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", PAYSTACK_API_BASE, path))
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Paystack API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("Paystack API error: {}", error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Paystack response: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    data: VerifyData,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    fees: Option<i64>,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    data: RefundData,
}

#[derive(Debug, Deserialize)]
struct RefundData {
    id: i64,
    amount: i64,
}

#[async_trait]
impl PaystackGateway for PaystackClient {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        self.verify_signature(payload, signature)
    }

    async fn fetch_transaction_fee(&self, reference: &str) -> Result<FeeBreakdown> {
        let verified: VerifyResponse = self
            .get_json(&format!("/transaction/verify/{}", reference))
            .await?;

        if verified.data.status != "success" {
            return Err(AppError::Gateway(format!(
                "Transaction {} not settled (status: {})",
                reference, verified.data.status
            )));
        }

        let fee_minor = verified.data.fees.ok_or_else(|| {
            AppError::Gateway(format!("Transaction {} reports no fee breakdown", reference))
        })?;

        Ok(FeeBreakdown {
            fee_minor,
            currency: verified.data.currency.to_lowercase(),
        })
    }

    async fn create_refund(&self, reference: &str, amount_minor: i64) -> Result<GatewayRefund> {
        let refund: RefundResponse = self
            .post_json(
                "/refund",
                &serde_json::json!({
                    "transaction": reference,
                    "amount": amount_minor,
                }),
            )
            .await?;
        Ok(GatewayRefund {
            id: refund.data.id.to_string(),
            amount_minor: refund.data.amount,
        })
    }
}

// ============ Webhook envelope ============

/// Paystack webhook envelope: `event` names the type, `data` is the object.
#[derive(Debug, Deserialize)]
pub struct PaystackWebhookEvent {
    pub event: String,
    pub data: serde_json::Value,
}

// ============ charge.success / charge.failed ============

#[derive(Debug, Deserialize)]
pub struct PaystackCharge {
    /// Numeric transaction id; scoped by event type it forms the dedup key,
    /// since Paystack envelopes carry no event id of their own.
    pub id: i64,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: PaystackMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaystackMetadata {
    pub booking_id: Option<String>,
}

// ============ transfer.success / transfer.failed ============

#[derive(Debug, Deserialize)]
pub struct PaystackTransfer {
    pub id: i64,
    pub transfer_code: String,
    pub reference: Option<String>,
    pub amount: i64,
}
