//! Email notifications for guests and realtors.
//!
//! Two modes:
//! 1. Send via Resend API (when an API key is configured)
//! 2. Disabled (log only)
//!
//! All sends on the reconciliation and payout paths are fire-and-forget:
//! a gateway must get its acknowledgment whether or not the mail goes out.

use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::util::format_major;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Result of attempting to send a notification email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    /// Email delivery is disabled.
    Disabled,
    /// No API key available.
    NoApiKey,
}

#[derive(Debug, Clone)]
pub struct EmailService {
    client: Client,
    api_key: Option<String>,
    from: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl EmailService {
    pub fn new(api_key: Option<String>, from: String, enabled: bool) -> Self {
        Self {
            client: Client::new(),
            api_key,
            from,
            enabled,
        }
    }

    /// Disabled service for tests and dev environments.
    pub fn disabled() -> Self {
        Self::new(None, "Villapay <no-reply@villapay.test>".to_string(), false)
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<EmailSendResult> {
        if !self.enabled {
            tracing::debug!("Email disabled, skipping send to {}: {}", to, subject);
            return Ok(EmailSendResult::Disabled);
        }

        let Some(api_key) = &self.api_key else {
            tracing::debug!("No email API key, skipping send to {}: {}", to, subject);
            return Ok(EmailSendResult::NoApiKey);
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&ResendRequest {
                from: &self.from,
                to,
                subject,
                html,
            })
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Email send error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!("Email API error: {}", error_text)));
        }

        Ok(EmailSendResult::Sent)
    }

    /// Payment receipt for the guest after a charge confirms.
    pub async fn send_receipt(
        &self,
        to: &str,
        booking_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<EmailSendResult> {
        let amount = format_major(amount_minor, 100);
        let subject = format!("Your booking {} is confirmed", booking_id);
        let html = format!(
            "<p>Thanks for booking with Villapay!</p>\
             <p>We received your payment of <strong>{} {}</strong> and your \
             reservation <strong>{}</strong> is confirmed.</p>\
             <p>Your host will be in touch with check-in details.</p>",
            amount,
            currency.to_uppercase(),
            booking_id,
        );
        self.send(to, &subject, &html).await
    }

    /// Payout notice for the realtor after escrow release.
    pub async fn send_payout_notice(
        &self,
        to: &str,
        booking_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<EmailSendResult> {
        let amount = format_major(amount_minor, 100);
        let subject = format!("Payout released for booking {}", booking_id);
        let html = format!(
            "<p>Good news - the escrow hold on booking <strong>{}</strong> has \
             lapsed and your payout of <strong>{} {}</strong> has been released.</p>\
             <p>Funds typically arrive within a few business days depending on \
             your payout account.</p>",
            booking_id,
            amount,
            currency.to_uppercase(),
        );
        self.send(to, &subject, &html).await
    }
}

/// Fire-and-forget receipt send. Failures are logged, never propagated; the
/// webhook acknowledgment must not wait on or fail with the mail.
pub fn spawn_receipt(
    email: EmailService,
    to: String,
    booking_id: String,
    amount_minor: i64,
    currency: String,
) {
    tokio::spawn(async move {
        if let Err(e) = email
            .send_receipt(&to, &booking_id, amount_minor, &currency)
            .await
        {
            tracing::warn!("Failed to send receipt for booking {}: {}", booking_id, e);
        }
    });
}

/// Fire-and-forget payout notice.
pub fn spawn_payout_notice(
    email: EmailService,
    to: String,
    booking_id: String,
    amount_minor: i64,
    currency: String,
) {
    tokio::spawn(async move {
        if let Err(e) = email
            .send_payout_notice(&to, &booking_id, amount_minor, &currency)
            .await
        {
            tracing::warn!(
                "Failed to send payout notice for booking {}: {}",
                booking_id,
                e
            );
        }
    });
}
