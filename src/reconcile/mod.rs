//! Payment reconciliation: applies verified gateway events to Booking and
//! Payment records.
//!
//! Every handler follows the same two-phase shape. Phase 1 must succeed and
//! runs in a single database transaction: record the event in the
//! idempotency ledger, move the booking through the status guard
//! (`StatusConflict` is tolerated - another event may have raced us there),
//! and update the payment by value. Phase 2 is best-effort and decoupled:
//! fee computation, audit log, notification email. A phase-2 failure is
//! logged and swallowed; a phase-1 failure propagates so the webhook
//! endpoint answers non-2xx and the gateway redelivers.

pub mod fees;

use crate::db::{queries, AppState};
use crate::email;
use crate::error::{AppError, Result};
use crate::gateways::PaymentGateway;
use crate::handlers::webhooks::common::{
    AccountOutcome, ChargeOutcome, DisputeOutcome, GatewayEvent, TransferOutcome,
};
use crate::models::{
    ActorType, AuditAction, BookingStatus, PaymentStatus, PayoutStatus, TransitionExtras,
};
use crate::util::{AuditLogBuilder, SECONDS_PER_HOUR};

/// How a gateway event landed. Everything here is an acknowledgeable
/// outcome; hard failures surface as errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Processed,
    /// Idempotency short-circuit - not an error, a normal skip path.
    AlreadyProcessed,
    /// Dropped as unactionable (no booking reference, unknown records).
    Skipped(&'static str),
}

pub async fn apply_event(
    state: &AppState,
    gateway: PaymentGateway,
    event: GatewayEvent,
) -> Result<Applied> {
    match event {
        GatewayEvent::ChargeSucceeded(data) => apply_charge_succeeded(state, gateway, data).await,
        GatewayEvent::ChargeFailed(data) => apply_charge_failed(state, gateway, data).await,
        GatewayEvent::TransferCreated(data) => apply_transfer_created(state, gateway, data).await,
        GatewayEvent::TransferPaid(data) => apply_transfer_paid(state, gateway, data).await,
        GatewayEvent::TransferFailed(data) => apply_transfer_failed(state, gateway, data).await,
        GatewayEvent::DisputeCreated(data) => apply_dispute_created(state, gateway, data).await,
        GatewayEvent::AccountUpdated(data) => apply_account_updated(state, gateway, data).await,
        GatewayEvent::Ignored => Ok(Applied::Skipped("Event ignored")),
    }
}

/// Charge settled: confirm the booking, stamp the escrow release date,
/// complete the payment, then fees and receipt.
async fn apply_charge_succeeded(
    state: &AppState,
    gateway: PaymentGateway,
    data: ChargeOutcome,
) -> Result<Applied> {
    let Some(booking_id) = data.booking_id.clone() else {
        tracing::warn!(
            "{} event {} carries no booking reference, dropping",
            gateway,
            data.event_id
        );
        return Ok(Applied::Skipped("No booking reference"));
    };

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    if !queries::try_record_processed_event(&tx, gateway, &data.event_id, &booking_id)? {
        return Ok(Applied::AlreadyProcessed);
    }

    let release_at = chrono::Utc::now().timestamp() + state.escrow_offset_hours * SECONDS_PER_HOUR;
    let confirmed = match queries::transition_booking_status(
        &tx,
        &booking_id,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        TransitionExtras {
            payout_release_at: Some(release_at),
            payout_status: None,
        },
    ) {
        Ok(booking) => Some(booking),
        Err(AppError::StatusConflict { expected, actual, .. }) => {
            // Another event already moved the booking; the payment record
            // still has to reflect the settled charge.
            tracing::warn!(
                "Booking {} no longer {} (now {}), continuing with payment update",
                booking_id,
                expected,
                actual
            );
            None
        }
        Err(AppError::NotFound(msg)) => {
            tracing::warn!("{} event {}: {}", gateway, data.event_id, msg);
            return Ok(Applied::Skipped("Booking not found"));
        }
        Err(e) => return Err(e),
    };

    let Some(payment) = queries::get_payment_by_booking(&tx, &booking_id)? else {
        tracing::warn!(
            "No payment record for booking {}, dropping event {}",
            booking_id,
            data.event_id
        );
        return Ok(Applied::Skipped("Payment not found"));
    };

    queries::update_payment_charge_result(
        &tx,
        &payment.id,
        PaymentStatus::Completed,
        &data.transaction_id,
        data.reference.as_deref(),
    )?;

    tx.commit()?;
    drop(conn);

    // Phase 2: best-effort from here on.
    write_audit(
        state,
        AuditAction::ConfirmBooking,
        "booking",
        &booking_id,
        &serde_json::json!({
            "gateway": gateway.as_ref(),
            "event_id": data.event_id,
            "transaction_id": data.transaction_id,
            "payout_release_at": release_at,
        }),
    );

    let fee_ref = match gateway {
        PaymentGateway::Stripe => data.transaction_id.clone(),
        PaymentGateway::Paystack => data
            .reference
            .clone()
            .unwrap_or_else(|| data.transaction_id.clone()),
    };
    fees::spawn_fee_computation(state.clone(), gateway, payment.id.clone(), fee_ref);

    if let Some(booking) = confirmed {
        if let Some(guest_email) = booking.guest_email {
            email::spawn_receipt(
                state.email.clone(),
                guest_email,
                booking.id,
                payment.amount_minor,
                payment.currency,
            );
        }
    }

    Ok(Applied::Processed)
}

/// Charge failed: cancel the booking, fail the payment.
async fn apply_charge_failed(
    state: &AppState,
    gateway: PaymentGateway,
    data: ChargeOutcome,
) -> Result<Applied> {
    let Some(booking_id) = data.booking_id.clone() else {
        tracing::warn!(
            "{} event {} carries no booking reference, dropping",
            gateway,
            data.event_id
        );
        return Ok(Applied::Skipped("No booking reference"));
    };

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    if !queries::try_record_processed_event(&tx, gateway, &data.event_id, &booking_id)? {
        return Ok(Applied::AlreadyProcessed);
    }

    match queries::transition_booking_status(
        &tx,
        &booking_id,
        BookingStatus::Pending,
        BookingStatus::Cancelled,
        TransitionExtras::default(),
    ) {
        Ok(_) => {}
        Err(AppError::StatusConflict { expected, actual, .. }) => {
            // The usual shape of this race: a stale failure event arriving
            // after a success already confirmed the booking. The guard keeps
            // the confirmed state; the failed charge is still recorded below.
            tracing::warn!(
                "Booking {} no longer {} (now {}), stale failure event",
                booking_id,
                expected,
                actual
            );
        }
        Err(AppError::NotFound(msg)) => {
            tracing::warn!("{} event {}: {}", gateway, data.event_id, msg);
            return Ok(Applied::Skipped("Booking not found"));
        }
        Err(e) => return Err(e),
    }

    let Some(payment) = queries::get_payment_by_booking(&tx, &booking_id)? else {
        tracing::warn!(
            "No payment record for booking {}, dropping event {}",
            booking_id,
            data.event_id
        );
        return Ok(Applied::Skipped("Payment not found"));
    };

    // Only fail the payment if nothing settled it; a completed payment must
    // not be clobbered by a stale failure.
    if payment.status == PaymentStatus::Pending {
        queries::update_payment_charge_result(
            &tx,
            &payment.id,
            PaymentStatus::Failed,
            &data.transaction_id,
            data.reference.as_deref(),
        )?;
    }

    tx.commit()?;
    drop(conn);

    write_audit(
        state,
        AuditAction::CancelBooking,
        "booking",
        &booking_id,
        &serde_json::json!({
            "gateway": gateway.as_ref(),
            "event_id": data.event_id,
            "reason": "charge_failed",
        }),
    );

    Ok(Applied::Processed)
}

/// Transfer created: remember the transfer id on the payment. No booking
/// transition.
async fn apply_transfer_created(
    state: &AppState,
    gateway: PaymentGateway,
    data: TransferOutcome,
) -> Result<Applied> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    let Some(payment) = resolve_transfer_payment(&tx, gateway, &data)? else {
        tracing::warn!(
            "{} transfer {} matches no payment, dropping event {}",
            gateway,
            data.transfer_id,
            data.event_id
        );
        return Ok(Applied::Skipped("Unknown transfer"));
    };

    if !queries::try_record_processed_event(&tx, gateway, &data.event_id, &payment.booking_id)? {
        return Ok(Applied::AlreadyProcessed);
    }

    queries::set_payment_transfer_id(&tx, &payment.id, &data.transfer_id)?;
    tx.commit()?;

    Ok(Applied::Processed)
}

/// Transfer settled on the gateway side: confirm the payout as released.
/// Usually the scheduler got there first and this is an idempotent confirm.
async fn apply_transfer_paid(
    state: &AppState,
    gateway: PaymentGateway,
    data: TransferOutcome,
) -> Result<Applied> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    let Some(payment) = resolve_transfer_payment(&tx, gateway, &data)? else {
        tracing::warn!(
            "{} transfer {} matches no payment, dropping event {}",
            gateway,
            data.transfer_id,
            data.event_id
        );
        return Ok(Applied::Skipped("Unknown transfer"));
    };

    if !queries::try_record_processed_event(&tx, gateway, &data.event_id, &payment.booking_id)? {
        return Ok(Applied::AlreadyProcessed);
    }

    let moved = queries::set_booking_payout_status(
        &tx,
        &payment.booking_id,
        PayoutStatus::Pending,
        PayoutStatus::Released,
    )?;
    queries::mark_payment_payout_released(&tx, &payment.id, Some(&data.transfer_id))?;
    tx.commit()?;
    drop(conn);

    if moved {
        write_audit(
            state,
            AuditAction::ReleasePayout,
            "booking",
            &payment.booking_id,
            &serde_json::json!({
                "gateway": gateway.as_ref(),
                "event_id": data.event_id,
                "transfer_id": data.transfer_id,
                "source": "webhook",
            }),
        );
        notify_realtor_of_payout(state, &payment.booking_id);
    }

    Ok(Applied::Processed)
}

/// Transfer died after creation: demote the payout so it is surfaced for
/// manual review rather than silently considered paid.
async fn apply_transfer_failed(
    state: &AppState,
    gateway: PaymentGateway,
    data: TransferOutcome,
) -> Result<Applied> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    let Some(payment) = resolve_transfer_payment(&tx, gateway, &data)? else {
        tracing::warn!(
            "{} transfer {} matches no payment, dropping event {}",
            gateway,
            data.transfer_id,
            data.event_id
        );
        return Ok(Applied::Skipped("Unknown transfer"));
    };

    if !queries::try_record_processed_event(&tx, gateway, &data.event_id, &payment.booking_id)? {
        return Ok(Applied::AlreadyProcessed);
    }

    queries::hold_booking_payout(&tx, &payment.booking_id)?;
    tx.commit()?;
    drop(conn);

    write_audit(
        state,
        AuditAction::FailPayout,
        "booking",
        &payment.booking_id,
        &serde_json::json!({
            "gateway": gateway.as_ref(),
            "event_id": data.event_id,
            "transfer_id": data.transfer_id,
        }),
    );

    Ok(Applied::Processed)
}

/// Chargeback opened: cancel the booking and hold the payout, whatever the
/// release date says.
async fn apply_dispute_created(
    state: &AppState,
    gateway: PaymentGateway,
    data: DisputeOutcome,
) -> Result<Applied> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    let Some(payment) =
        queries::get_payment_by_gateway_transaction(&tx, gateway, &data.transaction_id)?
    else {
        tracing::warn!(
            "{} dispute {} references unknown transaction {}, dropping",
            gateway,
            data.event_id,
            data.transaction_id
        );
        return Ok(Applied::Skipped("Unknown transaction"));
    };
    let booking_id = payment.booking_id.clone();

    if !queries::try_record_processed_event(&tx, gateway, &data.event_id, &booking_id)? {
        return Ok(Applied::AlreadyProcessed);
    }

    match queries::transition_booking_status(
        &tx,
        &booking_id,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        TransitionExtras {
            payout_release_at: None,
            payout_status: Some(PayoutStatus::Failed),
        },
    ) {
        Ok(_) => {}
        Err(AppError::StatusConflict { expected, actual, .. }) => {
            tracing::warn!(
                "Booking {} no longer {} (now {}), still holding payout for dispute",
                booking_id,
                expected,
                actual
            );
            queries::hold_booking_payout(&tx, &booking_id)?;
        }
        Err(e) => return Err(e),
    }

    tx.commit()?;
    drop(conn);

    write_audit(
        state,
        AuditAction::HoldPayout,
        "booking",
        &booking_id,
        &serde_json::json!({
            "gateway": gateway.as_ref(),
            "event_id": data.event_id,
            "transaction_id": data.transaction_id,
            "amount_minor": data.amount_minor,
            "reason": data.reason,
        }),
    );

    Ok(Applied::Processed)
}

/// Connect account changed: mirror the gateway's account id and payout
/// capability onto the realtor. Account-level events are not tied to a
/// booking, so the ledger is skipped - there is no natural idempotency key,
/// and the update is idempotent by value anyway.
async fn apply_account_updated(
    state: &AppState,
    gateway: PaymentGateway,
    data: AccountOutcome,
) -> Result<Applied> {
    let conn = state.db.get()?;

    let realtor = match &data.realtor_id {
        Some(id) => queries::get_realtor_by_id(&conn, id)?,
        None => queries::get_realtor_by_stripe_account(&conn, &data.account_id)?,
    };
    let Some(realtor) = realtor else {
        tracing::warn!(
            "{} account {} matches no realtor, dropping event {}",
            gateway,
            data.account_id,
            data.event_id
        );
        return Ok(Applied::Skipped("Unknown realtor"));
    };

    queries::set_realtor_stripe_account(
        &conn,
        &realtor.id,
        &data.account_id,
        data.payouts_enabled,
    )?;
    drop(conn);

    write_audit(
        state,
        AuditAction::UpdateRealtorAccount,
        "realtor",
        &realtor.id,
        &serde_json::json!({
            "gateway": gateway.as_ref(),
            "event_id": data.event_id,
            "account_id": data.account_id,
            "payouts_enabled": data.payouts_enabled,
        }),
    );

    Ok(Applied::Processed)
}

/// Find the payment a transfer event refers to: by booking id when the
/// transfer carries one (Stripe transfer_group), else by transfer id.
fn resolve_transfer_payment(
    conn: &rusqlite::Connection,
    gateway: PaymentGateway,
    data: &TransferOutcome,
) -> Result<Option<crate::models::Payment>> {
    if let Some(booking_id) = &data.booking_id {
        return queries::get_payment_by_booking(conn, booking_id);
    }
    queries::get_payment_by_transfer(conn, gateway, &data.transfer_id)
}

/// Best-effort audit write; failures are logged and swallowed.
fn write_audit(
    state: &AppState,
    action: AuditAction,
    entity_type: &str,
    entity_id: &str,
    details: &serde_json::Value,
) {
    let audit_conn = match state.audit.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Audit DB connection error: {}", e);
            return;
        }
    };

    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
        .actor(ActorType::Gateway, None)
        .action(action)
        .entity(entity_type, entity_id)
        .details(details)
        .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }
}

/// Best-effort payout notice to the booking's realtor.
fn notify_realtor_of_payout(state: &AppState, booking_id: &str) {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("DB connection error for payout notice: {}", e);
            return;
        }
    };

    let booking = match queries::get_booking_by_id(&conn, booking_id) {
        Ok(Some(b)) => b,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Failed to load booking {} for payout notice: {}", booking_id, e);
            return;
        }
    };

    match queries::get_realtor_by_id(&conn, &booking.realtor_id) {
        Ok(Some(realtor)) => {
            email::spawn_payout_notice(
                state.email.clone(),
                realtor.email,
                booking.id,
                booking.realtor_payout_minor,
                booking.currency,
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Failed to load realtor for payout notice: {}", e);
        }
    }
}
