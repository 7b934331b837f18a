//! Operational endpoints: payout re-queue and manual batch trigger.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::escrow;
use crate::models::{ActorType, AuditAction, Booking, PayoutStatus};
use crate::util::AuditLogBuilder;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings/:booking_id/payout/requeue", post(requeue_payout))
        .route("/admin/payouts/release", post(trigger_release))
}

/// Re-queue a failed payout after manual review. The scheduler never retries
/// failed payouts on its own; this is the only path back to pending.
async fn requeue_payout(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>> {
    let conn = state.db.get()?;

    let moved = queries::set_booking_payout_status(
        &conn,
        &booking_id,
        PayoutStatus::Failed,
        PayoutStatus::Pending,
    )?;
    if !moved {
        let booking = queries::get_booking_by_id(&conn, &booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("Booking not found: {}", booking_id)))?;
        return Err(AppError::Conflict(format!(
            "Payout for booking {} is not failed (status: {})",
            booking_id, booking.payout_status
        )));
    }

    let booking = queries::get_booking_by_id(&conn, &booking_id)?
        .ok_or_else(|| AppError::Internal(format!("Booking {} vanished", booking_id)))?;
    drop(conn);

    if let Ok(audit_conn) = state.audit.get() {
        if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::Admin, None)
            .action(AuditAction::RequeuePayout)
            .entity("booking", &booking_id)
            .save()
        {
            tracing::warn!("Failed to write requeue audit log: {}", e);
        }
    }

    Ok(Json(booking))
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    released: usize,
    failed: usize,
    skipped: usize,
}

/// Run one escrow release batch immediately. The same procedure the periodic
/// scheduler runs; exposed for external cron and operational tooling.
async fn trigger_release(State(state): State<AppState>) -> Json<ReleaseResponse> {
    let summary = escrow::run_release_batch(&state).await;
    Json(ReleaseResponse {
        released: summary.released,
        failed: summary.failed,
        skipped: summary.skipped,
    })
}
