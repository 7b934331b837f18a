//! Gateway fee retrieval and platform-net computation.
//!
//! Runs after a charge is confirmed and is best-effort by design: a fee
//! lookup failure is logged for later reconciliation, it never rolls back
//! the confirmed booking or payment.

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::gateways::{FeeBreakdown, PaymentGateway};
use crate::models::{ActorType, AuditAction};
use crate::util::AuditLogBuilder;

/// Platform's retained revenue: its own fee income minus the processor's cut.
/// Exact minor-unit arithmetic.
pub fn platform_net_minor(
    service_fee_minor: i64,
    platform_commission_minor: i64,
    gateway_fee_minor: i64,
) -> i64 {
    service_fee_minor + platform_commission_minor - gateway_fee_minor
}

/// Fetch the settled fee from the gateway and persist fee + platform net on
/// the payment.
pub async fn compute_and_store_fees(
    state: &AppState,
    gateway: PaymentGateway,
    payment_id: &str,
    fee_ref: &str,
) -> Result<FeeBreakdown> {
    let breakdown = match gateway {
        PaymentGateway::Stripe => state.stripe.fetch_charge_fee(fee_ref).await?,
        PaymentGateway::Paystack => state.paystack.fetch_transaction_fee(fee_ref).await?,
    };

    let conn = state.db.get()?;
    let payment = queries::get_payment_by_id(&conn, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("Payment not found: {}", payment_id)))?;

    if breakdown.currency != payment.currency {
        tracing::warn!(
            "Fee currency {} differs from payment currency {} for payment {}",
            breakdown.currency,
            payment.currency,
            payment_id
        );
    }

    let net = platform_net_minor(
        payment.service_fee_minor,
        payment.platform_commission_minor,
        breakdown.fee_minor,
    );
    queries::update_payment_fees(&conn, payment_id, breakdown.fee_minor, net)?;

    if let Ok(audit_conn) = state.audit.get() {
        if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::System, None)
            .action(AuditAction::RecordFees)
            .entity("payment", payment_id)
            .details(&serde_json::json!({
                "gateway": gateway.as_ref(),
                "gateway_fee_minor": breakdown.fee_minor,
                "platform_net_minor": net,
            }))
            .save()
        {
            tracing::warn!("Failed to write fee audit log: {}", e);
        }
    }

    Ok(breakdown)
}

/// Run the fee computation as a detached task after the webhook commit.
pub fn spawn_fee_computation(
    state: AppState,
    gateway: PaymentGateway,
    payment_id: String,
    fee_ref: String,
) {
    tokio::spawn(async move {
        if let Err(e) = compute_and_store_fees(&state, gateway, &payment_id, &fee_ref).await {
            tracing::warn!(
                "Fee computation failed for payment {} ({} ref {}): {} - \
                 left for manual reconciliation",
                payment_id,
                gateway,
                fee_ref,
                e
            );
        }
    });
}
