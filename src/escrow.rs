//! Escrow payout release.
//!
//! A periodic batch scans confirmed bookings whose escrow hold has lapsed
//! and drives their payouts. Each booking is handled independently: one
//! booking's failure marks that payout failed and the batch moves on.
//! The job is re-entrant - released and failed rows drop out of the scan,
//! and failed payouts stay failed until an admin re-queues them, so a
//! transfer is never silently retried into a double payment.

use std::time::Duration;

use crate::db::{queries, AppState};
use crate::email;
use crate::error::{AppError, Result};
use crate::gateways::{PaymentGateway, TransferRequest};
use crate::models::{ActorType, AuditAction, Booking, PayoutStatus};
use crate::util::AuditLogBuilder;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReleaseSummary {
    pub released: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum ReleaseOutcome {
    Released,
    Skipped(&'static str),
}

/// Run one release batch over every due booking.
pub async fn run_release_batch(state: &AppState) -> ReleaseSummary {
    let mut summary = ReleaseSummary::default();

    let due = {
        let conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Escrow batch: failed to get DB connection: {}", e);
                return summary;
            }
        };
        match queries::list_due_payout_bookings(&conn, chrono::Utc::now().timestamp()) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Escrow batch: failed to list due bookings: {}", e);
                return summary;
            }
        }
    };

    if due.is_empty() {
        return summary;
    }

    tracing::info!("Escrow batch: {} booking(s) due for payout release", due.len());

    for booking in due {
        match release_one(state, &booking).await {
            Ok(ReleaseOutcome::Released) => summary.released += 1,
            Ok(ReleaseOutcome::Skipped(reason)) => {
                tracing::debug!("Escrow batch: booking {} skipped: {}", booking.id, reason);
                summary.skipped += 1;
            }
            Err(e) => {
                tracing::error!("Payout release failed for booking {}: {}", booking.id, e);
                mark_payout_failed(state, &booking, &e);
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Escrow batch done: {} released, {} failed, {} skipped",
        summary.released,
        summary.failed,
        summary.skipped
    );

    summary
}

async fn release_one(state: &AppState, booking: &Booking) -> Result<ReleaseOutcome> {
    let (payment, realtor) = {
        let conn = state.db.get()?;
        let payment = queries::get_payment_by_booking(&conn, &booking.id)?.ok_or_else(|| {
            AppError::Internal(format!("Confirmed booking {} has no payment record", booking.id))
        })?;
        let realtor = queries::get_realtor_by_id(&conn, &booking.realtor_id)?.ok_or_else(|| {
            AppError::Internal(format!(
                "Booking {} references unknown realtor {}",
                booking.id, booking.realtor_id
            ))
        })?;
        (payment, realtor)
        // Connection returns to the pool before the gateway round-trip.
    };

    let transfer_id = match payment.gateway {
        PaymentGateway::Stripe => {
            let Some(account_id) = realtor.stripe_account_id.clone() else {
                // Leave the payout pending; the realtor can still connect an
                // account, after which the next tick pays out normally.
                tracing::warn!(
                    "Realtor {} has no connected payout account, booking {} stays pending",
                    realtor.id,
                    booking.id
                );
                return Ok(ReleaseOutcome::Skipped("no connected payout account"));
            };
            if !realtor.payouts_enabled {
                tracing::warn!(
                    "Realtor {} account {} has payouts disabled, booking {} stays pending",
                    realtor.id,
                    account_id,
                    booking.id
                );
                return Ok(ReleaseOutcome::Skipped("payouts disabled on account"));
            }

            let transfer = state
                .stripe
                .create_transfer(&TransferRequest {
                    account_id,
                    amount_minor: booking.realtor_payout_minor,
                    currency: booking.currency.clone(),
                    reference: booking.id.clone(),
                })
                .await?;
            Some(transfer.id)
        }
        // Paystack charges were split to the realtor's subaccount at capture
        // time; there is nothing left to move.
        PaymentGateway::Paystack => None,
    };

    let conn = state.db.get()?;
    let moved = queries::set_booking_payout_status(
        &conn,
        &booking.id,
        PayoutStatus::Pending,
        PayoutStatus::Released,
    )?;
    if !moved {
        // Another run (or a transfer webhook) got here first.
        return Ok(ReleaseOutcome::Skipped("already released"));
    }
    queries::mark_payment_payout_released(&conn, &payment.id, transfer_id.as_deref())?;
    drop(conn);

    if let Ok(audit_conn) = state.audit.get() {
        if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::System, None)
            .action(AuditAction::ReleasePayout)
            .entity("booking", &booking.id)
            .details(&serde_json::json!({
                "gateway": payment.gateway.as_ref(),
                "amount_minor": booking.realtor_payout_minor,
                "currency": booking.currency,
                "transfer_id": transfer_id,
                "source": "scheduler",
            }))
            .save()
        {
            tracing::warn!("Failed to write payout audit log: {}", e);
        }
    }

    email::spawn_payout_notice(
        state.email.clone(),
        realtor.email,
        booking.id.clone(),
        booking.realtor_payout_minor,
        booking.currency.clone(),
    );

    Ok(ReleaseOutcome::Released)
}

/// Failure isolation: mark this booking's payout failed and keep going.
fn mark_payout_failed(state: &AppState, booking: &Booking, err: &AppError) {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(
                "Could not mark payout failed for booking {}: DB connection error: {}",
                booking.id,
                e
            );
            return;
        }
    };

    if let Err(e) = queries::set_booking_payout_status(
        &conn,
        &booking.id,
        PayoutStatus::Pending,
        PayoutStatus::Failed,
    ) {
        tracing::error!("Could not mark payout failed for booking {}: {}", booking.id, e);
        return;
    }

    if let Ok(audit_conn) = state.audit.get() {
        let _ = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::System, None)
            .action(AuditAction::FailPayout)
            .entity("booking", &booking.id)
            .details(&serde_json::json!({
                "error": err.to_string(),
                "source": "scheduler",
            }))
            .save();
    }
}

/// Spawn the periodic release loop. Single flight per tick; ticks run the
/// batch to completion before sleeping again.
pub fn spawn_release_scheduler(state: AppState, tick: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tick).await;
            run_release_batch(&state).await;
        }
    });

    tracing::info!("Escrow release scheduler started (tick every {:?})", tick);
}
