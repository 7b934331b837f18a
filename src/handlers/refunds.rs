//! Guest refund flow: request -> realtor decision -> admin processing.
//!
//! The refund ceiling (`amount <= payment.amount - payment.refund_amount`)
//! is enforced at request time and again at processing time, and the
//! payment-side update carries the ceiling in its WHERE clause, so no stage
//! can over-refund even when racing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::gateways::PaymentGateway;
use crate::models::{
    ActorType, AuditAction, CreateRefundRequest, PaymentStatus, RefundRequest,
};
use crate::util::AuditLogBuilder;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings/:booking_id/refund-requests", post(request_refund))
        .route("/refund-requests/:id/realtor-decision", post(realtor_decision))
        .route("/refund-requests/:id/process", post(process_refund))
}

/// Guest files a refund claim against a settled payment.
async fn request_refund(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(input): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<RefundRequest>)> {
    if input.amount_minor <= 0 {
        return Err(AppError::BadRequest("Refund amount must be positive".into()));
    }

    let conn = state.db.get()?;

    let booking = queries::get_booking_by_id(&conn, &booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("Booking not found: {}", booking_id)))?;
    let payment = queries::get_payment_by_booking(&conn, &booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("No payment for booking {}", booking_id)))?;

    if !matches!(payment.status, PaymentStatus::Completed | PaymentStatus::Refunded) {
        return Err(AppError::BadRequest(
            "Only settled payments can be refunded".into(),
        ));
    }

    let available = payment.available_for_refund_minor();
    if input.amount_minor > available {
        return Err(AppError::RefundAmountExceeded {
            requested_minor: input.amount_minor,
            available_minor: available,
        });
    }

    let request =
        queries::create_refund_request(&conn, &booking.id, &payment.id, &payment.currency, &input)?;
    drop(conn);

    if let Ok(audit_conn) = state.audit.get() {
        if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::Guest, Some(&input.requested_by))
            .action(AuditAction::RequestRefund)
            .entity("refund_request", &request.id)
            .details(&serde_json::json!({
                "booking_id": booking.id,
                "amount_minor": input.amount_minor,
                "reason": input.reason,
            }))
            .save()
        {
            tracing::warn!("Failed to write refund-request audit log: {}", e);
        }
    }

    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Deserialize)]
struct RealtorDecision {
    approve: bool,
    #[serde(default)]
    note: Option<String>,
}

/// Realtor rules on a pending claim. The requested amount is fixed at
/// request time, so only the verdict is recorded here.
async fn realtor_decision(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(decision): Json<RealtorDecision>,
) -> Result<Json<RefundRequest>> {
    let conn = state.db.get()?;

    let request = queries::get_refund_request_by_id(&conn, &request_id)?
        .ok_or_else(|| AppError::NotFound(format!("Refund request not found: {}", request_id)))?;

    if !queries::set_refund_realtor_decision(
        &conn,
        &request_id,
        decision.approve,
        decision.note.as_deref(),
    )? {
        return Err(AppError::Conflict(format!(
            "Refund request {} is not awaiting a realtor decision (status: {})",
            request_id, request.status
        )));
    }

    let updated = queries::get_refund_request_by_id(&conn, &request_id)?
        .ok_or_else(|| AppError::Internal(format!("Refund request {} vanished", request_id)))?;
    drop(conn);

    if let Ok(audit_conn) = state.audit.get() {
        if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::Realtor, None)
            .action(AuditAction::DecideRefund)
            .entity("refund_request", &request_id)
            .details(&serde_json::json!({
                "booking_id": updated.booking_id,
                "approve": decision.approve,
                "note": decision.note,
            }))
            .save()
        {
            tracing::warn!("Failed to write refund-decision audit log: {}", e);
        }
    }

    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
struct ProcessRefundInput {
    admin_id: String,
}

/// Admin executes an approved refund against the gateway.
///
/// Three phases: claim + re-validate the ceiling (one transaction, rolled
/// back whole on violation), the gateway refund call, then the payment
/// update + refund entry + request completion (one transaction). A gateway
/// failure releases the claim so the request can be retried.
async fn process_refund(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(input): Json<ProcessRefundInput>,
) -> Result<Json<RefundRequest>> {
    let (request, payment) = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;

        let request = queries::get_refund_request_by_id(&tx, &request_id)?.ok_or_else(|| {
            AppError::NotFound(format!("Refund request not found: {}", request_id))
        })?;

        if !queries::claim_refund_for_processing(&tx, &request_id, &input.admin_id)? {
            return Err(AppError::Conflict(format!(
                "Refund request {} is not approved for processing (status: {})",
                request_id, request.status
            )));
        }

        let payment = queries::get_payment_by_id(&tx, &request.payment_id)?.ok_or_else(|| {
            AppError::Internal(format!("Payment {} vanished", request.payment_id))
        })?;

        let available = payment.available_for_refund_minor();
        if request.amount_minor > available {
            // Dropping the transaction rolls the claim back; nothing mutates.
            return Err(AppError::RefundAmountExceeded {
                requested_minor: request.amount_minor,
                available_minor: available,
            });
        }

        tx.commit()?;
        (request, payment)
    };

    let refund = match payment.gateway {
        PaymentGateway::Stripe => match payment.gateway_transaction_id.as_deref() {
            Some(txn_id) => state.stripe.create_refund(txn_id, request.amount_minor).await,
            None => Err(AppError::Internal(format!(
                "Payment {} has no gateway transaction id",
                payment.id
            ))),
        },
        PaymentGateway::Paystack => match payment.gateway_reference.as_deref() {
            Some(reference) => state.paystack.create_refund(reference, request.amount_minor).await,
            None => Err(AppError::Internal(format!(
                "Payment {} has no gateway reference",
                payment.id
            ))),
        },
    };

    let refund = match refund {
        Ok(r) => r,
        Err(e) => {
            // Put the request back so the admin can retry once the gateway
            // recovers.
            if let Ok(conn) = state.db.get() {
                if let Err(e2) = queries::release_refund_claim(&conn, &request_id) {
                    tracing::error!(
                        "Failed to release refund claim {} after gateway error: {}",
                        request_id,
                        e2
                    );
                }
            }
            return Err(e);
        }
    };

    let updated = {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;

        queries::apply_refund_to_payment(&tx, &payment.id, refund.amount_minor)?;
        queries::create_refund_entry(
            &tx,
            &payment.id,
            Some(&request_id),
            &refund.id,
            refund.amount_minor,
        )?;
        queries::complete_refund_request(&tx, &request_id, refund.amount_minor, &refund.id)?;

        tx.commit()?;

        queries::get_refund_request_by_id(&conn, &request_id)?
            .ok_or_else(|| AppError::Internal(format!("Refund request {} vanished", request_id)))?
    };

    if let Ok(audit_conn) = state.audit.get() {
        if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::Admin, Some(&input.admin_id))
            .action(AuditAction::ProcessRefund)
            .entity("refund_request", &request_id)
            .details(&serde_json::json!({
                "booking_id": updated.booking_id,
                "payment_id": payment.id,
                "provider_refund_id": refund.id,
                "amount_minor": refund.amount_minor,
            }))
            .save()
        {
            tracing::warn!("Failed to write refund-processing audit log: {}", e);
        }
    }

    Ok(Json(updated))
}
