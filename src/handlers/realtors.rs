//! Realtor payout-account onboarding against Stripe Connect.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::models::{ActorType, AuditAction, Realtor};
use crate::util::AuditLogBuilder;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/realtors/:id/connect/onboard", post(start_onboarding))
        .route("/realtors/:id/connect/status", get(connect_status))
        .route("/realtors/:id/connect/dashboard", post(dashboard_link))
}

#[derive(Debug, Serialize)]
struct LinkResponse {
    url: String,
}

fn load_realtor(state: &AppState, id: &str) -> Result<Realtor> {
    let conn = state.db.get()?;
    queries::get_realtor_by_id(&conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("Realtor not found: {}", id)))
}

/// Create (if needed) the realtor's connect account and hand back an
/// onboarding link.
async fn start_onboarding(
    State(state): State<AppState>,
    Path(realtor_id): Path<String>,
) -> Result<Json<LinkResponse>> {
    let realtor = load_realtor(&state, &realtor_id)?;

    let account_id = match realtor.stripe_account_id.clone() {
        Some(id) => id,
        None => {
            let account_id = state.stripe.create_connect_account(&realtor.email).await?;
            let conn = state.db.get()?;
            queries::set_realtor_stripe_account(&conn, &realtor.id, &account_id, false)?;
            account_id
        }
    };

    let refresh_url = format!("{}/realtors/{}/connect/onboard", state.base_url, realtor.id);
    let return_url = format!("{}/realtors/{}/connect/status", state.base_url, realtor.id);
    let url = state
        .stripe
        .create_account_link(&account_id, &refresh_url, &return_url)
        .await?;

    Ok(Json(LinkResponse { url }))
}

#[derive(Debug, Serialize)]
struct ConnectStatusResponse {
    account_id: String,
    payouts_enabled: bool,
    details_submitted: bool,
}

/// Refresh the realtor's payout capability from the gateway.
async fn connect_status(
    State(state): State<AppState>,
    Path(realtor_id): Path<String>,
) -> Result<Json<ConnectStatusResponse>> {
    let realtor = load_realtor(&state, &realtor_id)?;
    let account_id = realtor.stripe_account_id.clone().ok_or_else(|| {
        AppError::BadRequest(format!("Realtor {} has no connected account", realtor_id))
    })?;

    let status = state.stripe.fetch_account_status(&account_id).await?;

    let conn = state.db.get()?;
    queries::set_realtor_stripe_account(&conn, &realtor.id, &status.id, status.payouts_enabled)?;
    drop(conn);

    if let Ok(audit_conn) = state.audit.get() {
        if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled)
            .actor(ActorType::Realtor, Some(&realtor.id))
            .action(AuditAction::UpdateRealtorAccount)
            .entity("realtor", &realtor.id)
            .details(&serde_json::json!({
                "account_id": status.id,
                "payouts_enabled": status.payouts_enabled,
                "source": "status_refresh",
            }))
            .save()
        {
            tracing::warn!("Failed to write connect-status audit log: {}", e);
        }
    }

    Ok(Json(ConnectStatusResponse {
        account_id: status.id,
        payouts_enabled: status.payouts_enabled,
        details_submitted: status.details_submitted,
    }))
}

/// Express-dashboard login link for a connected realtor.
async fn dashboard_link(
    State(state): State<AppState>,
    Path(realtor_id): Path<String>,
) -> Result<Json<LinkResponse>> {
    let realtor = load_realtor(&state, &realtor_id)?;
    let account_id = realtor.stripe_account_id.ok_or_else(|| {
        AppError::BadRequest(format!("Realtor {} has no connected account", realtor_id))
    })?;

    let url = state.stripe.create_dashboard_link(&account_id).await?;
    Ok(Json(LinkResponse { url }))
}
