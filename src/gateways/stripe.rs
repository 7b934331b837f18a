use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

use super::{
    AccountStatus, FeeBreakdown, GatewayRefund, GatewayTransfer, StripeGateway, TransferRequest,
};

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify a `Stripe-Signature` header (`t=<ts>,v1=<hex>`) against the raw
    /// request body. The raw bytes must be used as received; re-serializing a
    /// parsed body changes whitespace and key order and invalidates the HMAC.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in signature.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        // Reject stale and future-dated timestamps to stop replayed captures.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let age = chrono::Utc::now().timestamp() - timestamp;
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }
        if age < -60 {
            tracing::warn!("Stripe webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison; length is not secret (64 hex chars).
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }
        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", STRIPE_API_BASE, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("Stripe API error: {}", error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", STRIPE_API_BASE, path_and_query))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("Stripe API error: {}", error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct PaymentIntentWithFee {
    latest_charge: Option<ChargeWithBalanceTxn>,
}

#[derive(Debug, Deserialize)]
struct ChargeWithBalanceTxn {
    balance_transaction: Option<BalanceTransaction>,
}

#[derive(Debug, Deserialize)]
struct BalanceTransaction {
    fee: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
}

#[derive(Debug, Deserialize)]
struct LinkResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: i64,
}

#[async_trait]
impl StripeGateway for StripeClient {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        self.verify_signature(payload, signature)
    }

    async fn fetch_charge_fee(&self, payment_intent_id: &str) -> Result<FeeBreakdown> {
        let intent: PaymentIntentWithFee = self
            .get_json(&format!(
                "/payment_intents/{}?expand[]=latest_charge.balance_transaction",
                payment_intent_id
            ))
            .await?;

        let txn = intent
            .latest_charge
            .and_then(|c| c.balance_transaction)
            .ok_or_else(|| {
                AppError::Gateway(format!(
                    "Payment intent {} has no settled balance transaction",
                    payment_intent_id
                ))
            })?;

        Ok(FeeBreakdown {
            fee_minor: txn.fee,
            currency: txn.currency.to_lowercase(),
        })
    }

    async fn create_transfer(&self, req: &TransferRequest) -> Result<GatewayTransfer> {
        let amount = req.amount_minor.to_string();
        let transfer: TransferResponse = self
            .post_form(
                "/transfers",
                &[
                    ("amount", amount.as_str()),
                    ("currency", req.currency.as_str()),
                    ("destination", req.account_id.as_str()),
                    ("transfer_group", req.reference.as_str()),
                ],
            )
            .await?;
        Ok(GatewayTransfer { id: transfer.id })
    }

    async fn fetch_account_status(&self, account_id: &str) -> Result<AccountStatus> {
        let account: AccountResponse = self.get_json(&format!("/accounts/{}", account_id)).await?;
        Ok(AccountStatus {
            id: account.id,
            payouts_enabled: account.payouts_enabled,
            details_submitted: account.details_submitted,
        })
    }

    async fn create_connect_account(&self, email: &str) -> Result<String> {
        let account: AccountResponse = self
            .post_form("/accounts", &[("type", "express"), ("email", email)])
            .await?;
        Ok(account.id)
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String> {
        let link: LinkResponse = self
            .post_form(
                "/account_links",
                &[
                    ("account", account_id),
                    ("refresh_url", refresh_url),
                    ("return_url", return_url),
                    ("type", "account_onboarding"),
                ],
            )
            .await?;
        Ok(link.url)
    }

    async fn create_dashboard_link(&self, account_id: &str) -> Result<String> {
        let link: LinkResponse = self
            .post_form(&format!("/accounts/{}/login_links", account_id), &[])
            .await?;
        Ok(link.url)
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_minor: i64,
    ) -> Result<GatewayRefund> {
        let amount = amount_minor.to_string();
        let refund: RefundResponse = self
            .post_form(
                "/refunds",
                &[
                    ("payment_intent", payment_intent_id),
                    ("amount", amount.as_str()),
                ],
            )
            .await?;
        Ok(GatewayRefund {
            id: refund.id,
            amount_minor: refund.amount,
        })
    }
}

// ============ Webhook envelope ============

/// Generic Stripe webhook event - object is parsed based on event_type.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ payment_intent.succeeded / payment_intent.payment_failed ============

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct StripeMetadata {
    pub booking_id: Option<String>,
    pub realtor_id: Option<String>,
}

// ============ transfer.created / transfer.paid / transfer.failed ============

#[derive(Debug, Deserialize)]
pub struct StripeTransfer {
    pub id: String,
    /// Set to the booking id when the scheduler creates the transfer.
    pub transfer_group: Option<String>,
}

// ============ charge.dispute.created ============

#[derive(Debug, Deserialize)]
pub struct StripeDispute {
    pub id: String,
    pub payment_intent: Option<String>,
    pub charge: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub reason: Option<String>,
}

// ============ account.updated ============

#[derive(Debug, Deserialize)]
pub struct StripeAccount {
    pub id: String,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub metadata: StripeMetadata,
}
