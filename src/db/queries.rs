use rusqlite::{params, Connection};

use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, BOOKING_COLS, PAYMENT_COLS, REALTOR_COLS, REFUND_ENTRY_COLS,
    REFUND_REQUEST_COLS,
};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============ Bookings ============

pub fn create_booking(conn: &Connection, input: &CreateBooking) -> Result<Booking> {
    let id = EntityType::Booking.gen_id();
    let ts = now();

    conn.execute(
        "INSERT INTO bookings (id, property_id, guest_id, guest_email, realtor_id, check_in, \
         check_out, status, payout_status, realtor_payout_minor, currency, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 'pending', ?8, ?9, ?10, ?10)",
        params![
            id,
            input.property_id,
            input.guest_id,
            input.guest_email,
            input.realtor_id,
            input.check_in,
            input.check_out,
            input.realtor_payout_minor,
            input.currency,
            ts,
        ],
    )?;

    get_booking_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal(format!("Booking {} vanished after insert", id)))
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> Result<Option<Booking>> {
    query_one(
        conn,
        &format!("SELECT {} FROM bookings WHERE id = ?1", BOOKING_COLS),
        &[&id],
    )
}

/// Optimistic conditional transition: only applies when the persisted status
/// still equals `expected`. A zero-row update against an existing booking
/// means another event already moved it; that surfaces as `StatusConflict`,
/// which callers treat as "already handled, skip".
///
/// `extras` ride in the same UPDATE so a confirm and its payout-release date
/// cannot be torn apart by a concurrent writer.
pub fn transition_booking_status(
    conn: &Connection,
    booking_id: &str,
    expected: BookingStatus,
    new: BookingStatus,
    extras: TransitionExtras,
) -> Result<Booking> {
    if !expected.can_transition_to(new) {
        return Err(AppError::BadRequest(format!(
            "Illegal booking transition {} -> {}",
            expected, new
        )));
    }

    let affected = conn.execute(
        "UPDATE bookings SET status = ?1, \
             payout_release_at = COALESCE(?2, payout_release_at), \
             payout_status = COALESCE(?3, payout_status), \
             updated_at = ?4 \
         WHERE id = ?5 AND status = ?6",
        params![
            new.as_ref(),
            extras.payout_release_at,
            extras.payout_status.map(|s| s.as_ref().to_string()),
            now(),
            booking_id,
            expected.as_ref(),
        ],
    )?;

    if affected == 0 {
        let current = get_booking_by_id(conn, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("Booking not found: {}", booking_id)))?;
        return Err(AppError::StatusConflict {
            booking_id: booking_id.to_string(),
            expected,
            actual: current.status,
        });
    }

    get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::Internal(format!("Booking {} vanished after update", booking_id)))
}

/// Conditional payout-status move. Returns false when the row was not in the
/// expected state, which callers treat as an idempotent no-op.
pub fn set_booking_payout_status(
    conn: &Connection,
    booking_id: &str,
    expected: PayoutStatus,
    new: PayoutStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE bookings SET payout_status = ?1, updated_at = ?2 \
         WHERE id = ?3 AND payout_status = ?4",
        params![new.as_ref(), now(), booking_id, expected.as_ref()],
    )?;
    Ok(affected > 0)
}

/// Force the payout into `failed` from any non-failed state. Used to hold
/// payouts on disputes and to demote a payout whose transfer died after
/// creation.
pub fn hold_booking_payout(conn: &Connection, booking_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE bookings SET payout_status = 'failed', updated_at = ?1 \
         WHERE id = ?2 AND payout_status != 'failed'",
        params![now(), booking_id],
    )?;
    Ok(affected > 0)
}

/// Bookings whose escrow hold has lapsed: confirmed, payout pending, release
/// date at or before `cutoff`. Released and failed rows never reappear here,
/// which is what makes the scheduler re-entrant.
pub fn list_due_payout_bookings(conn: &Connection, cutoff: i64) -> Result<Vec<Booking>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM bookings \
             WHERE status = 'confirmed' AND payout_status = 'pending' \
               AND payout_release_at IS NOT NULL AND payout_release_at <= ?1 \
             ORDER BY payout_release_at ASC",
            BOOKING_COLS
        ),
        &[&cutoff],
    )
}

// ============ Payments ============

pub fn create_payment(conn: &Connection, input: &CreatePayment) -> Result<Payment> {
    let id = EntityType::Payment.gen_id();
    let ts = now();

    conn.execute(
        "INSERT INTO payments (id, booking_id, amount_minor, currency, status, gateway, \
         service_fee_minor, platform_commission_minor, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            input.booking_id,
            input.amount_minor,
            input.currency,
            input.gateway.as_ref(),
            input.service_fee_minor,
            input.platform_commission_minor,
            ts,
        ],
    )?;

    get_payment_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal(format!("Payment {} vanished after insert", id)))
}

pub fn get_payment_by_id(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLS),
        &[&id],
    )
}

pub fn get_payment_by_booking(conn: &Connection, booking_id: &str) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!("SELECT {} FROM payments WHERE booking_id = ?1", PAYMENT_COLS),
        &[&booking_id],
    )
}

pub fn get_payment_by_gateway_transaction(
    conn: &Connection,
    gateway: crate::gateways::PaymentGateway,
    transaction_id: &str,
) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE gateway = ?1 AND gateway_transaction_id = ?2",
            PAYMENT_COLS
        ),
        &[&gateway.as_ref(), &transaction_id],
    )
}

pub fn get_payment_by_transfer(
    conn: &Connection,
    gateway: crate::gateways::PaymentGateway,
    transfer_id: &str,
) -> Result<Option<Payment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payments WHERE gateway = ?1 AND gateway_transfer_id = ?2",
            PAYMENT_COLS
        ),
        &[&gateway.as_ref(), &transfer_id],
    )
}

/// Record a charge outcome. Idempotent by value: replaying the same outcome
/// writes the same fields again.
pub fn update_payment_charge_result(
    conn: &Connection,
    payment_id: &str,
    status: PaymentStatus,
    gateway_transaction_id: &str,
    gateway_reference: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET status = ?1, gateway_transaction_id = ?2, \
             gateway_reference = COALESCE(?3, gateway_reference), updated_at = ?4 \
         WHERE id = ?5",
        params![status.as_ref(), gateway_transaction_id, gateway_reference, now(), payment_id],
    )?;
    Ok(())
}

pub fn set_payment_transfer_id(
    conn: &Connection,
    payment_id: &str,
    transfer_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET gateway_transfer_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![transfer_id, now(), payment_id],
    )?;
    Ok(())
}

pub fn mark_payment_payout_released(
    conn: &Connection,
    payment_id: &str,
    transfer_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET payout_released = 1, payout_released_at = ?1, \
             gateway_transfer_id = COALESCE(?2, gateway_transfer_id), updated_at = ?1 \
         WHERE id = ?3",
        params![now(), transfer_id, payment_id],
    )?;
    Ok(())
}

/// Persist the settled fee breakdown. Exact minor-unit arithmetic; two-decimal
/// precision holds by construction for the 2-decimal currencies both gateways
/// settle in.
pub fn update_payment_fees(
    conn: &Connection,
    payment_id: &str,
    gateway_fee_minor: i64,
    platform_net_minor: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET gateway_fee_minor = ?1, platform_net_minor = ?2, updated_at = ?3 \
         WHERE id = ?4",
        params![gateway_fee_minor, platform_net_minor, now(), payment_id],
    )?;
    Ok(())
}

/// Bump the refund running total, flipping the payment to `refunded` when it
/// reaches the full amount. The ceiling rides in the WHERE clause so an
/// over-refund can never be persisted, even under concurrent processing.
pub fn apply_refund_to_payment(
    conn: &Connection,
    payment_id: &str,
    amount_minor: i64,
) -> Result<Payment> {
    let affected = conn.execute(
        "UPDATE payments SET \
             refund_amount_minor = refund_amount_minor + ?1, \
             status = CASE WHEN refund_amount_minor + ?1 >= amount_minor \
                           THEN 'refunded' ELSE status END, \
             updated_at = ?2 \
         WHERE id = ?3 AND refund_amount_minor + ?1 <= amount_minor",
        params![amount_minor, now(), payment_id],
    )?;

    if affected == 0 {
        let payment = get_payment_by_id(conn, payment_id)?
            .ok_or_else(|| AppError::NotFound(format!("Payment not found: {}", payment_id)))?;
        return Err(AppError::RefundAmountExceeded {
            requested_minor: amount_minor,
            available_minor: payment.available_for_refund_minor(),
        });
    }

    get_payment_by_id(conn, payment_id)?
        .ok_or_else(|| AppError::Internal(format!("Payment {} vanished after update", payment_id)))
}

// ============ Idempotency ledger ============

/// Atomically record a gateway event, returning true if this is the first
/// delivery. `INSERT OR IGNORE` against the (gateway, event_id) primary key
/// is the whole check-and-mark: run inside the reconciliation transaction,
/// a duplicate either loses this insert or the entire transaction rolls
/// back, so the same event can never apply twice.
pub fn try_record_processed_event(
    conn: &Connection,
    gateway: crate::gateways::PaymentGateway,
    event_id: &str,
    booking_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO processed_events (gateway, event_id, booking_id, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![gateway.as_ref(), event_id, booking_id, now()],
    )?;
    Ok(affected > 0)
}

pub fn event_already_processed(
    conn: &Connection,
    gateway: crate::gateways::PaymentGateway,
    event_id: &str,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM processed_events WHERE gateway = ?1 AND event_id = ?2",
        params![gateway.as_ref(), event_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Purge old ledger rows. Gateways retry for days, not months; the ledger
/// only has to outlive the retry window.
pub fn purge_old_processed_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM processed_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Refund requests ============

pub fn create_refund_request(
    conn: &Connection,
    booking_id: &str,
    payment_id: &str,
    currency: &str,
    input: &CreateRefundRequest,
) -> Result<RefundRequest> {
    let id = EntityType::RefundRequest.gen_id();
    let ts = now();

    let inserted = conn.execute(
        "INSERT INTO refund_requests (id, booking_id, payment_id, requested_by, amount_minor, \
         currency, reason, status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending_realtor_approval', ?8, ?8)",
        params![
            id,
            booking_id,
            payment_id,
            input.requested_by,
            input.amount_minor,
            currency,
            input.reason,
            ts,
        ],
    );

    match inserted {
        Ok(_) => {}
        // The partial unique index on non-terminal requests trips here.
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(AppError::Conflict(format!(
                "A refund request is already open for booking {}",
                booking_id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    get_refund_request_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal(format!("Refund request {} vanished after insert", id)))
}

pub fn get_refund_request_by_id(conn: &Connection, id: &str) -> Result<Option<RefundRequest>> {
    query_one(
        conn,
        &format!("SELECT {} FROM refund_requests WHERE id = ?1", REFUND_REQUEST_COLS),
        &[&id],
    )
}

/// Record the realtor's ruling. Conditional on the request still awaiting it.
pub fn set_refund_realtor_decision(
    conn: &Connection,
    request_id: &str,
    approve: bool,
    note: Option<&str>,
) -> Result<bool> {
    let new_status = if approve {
        RefundRequestStatus::RealtorApproved
    } else {
        RefundRequestStatus::RealtorRejected
    };
    let affected = conn.execute(
        "UPDATE refund_requests SET status = ?1, realtor_decided_at = ?2, realtor_note = ?3, \
             updated_at = ?2 \
         WHERE id = ?4 AND status = 'pending_realtor_approval'",
        params![new_status.as_ref(), now(), note, request_id],
    )?;
    Ok(affected > 0)
}

/// Claim a realtor-approved request for admin processing. The conditional
/// update doubles as a lock: two admins racing on the same request leaves
/// exactly one holding the claim.
pub fn claim_refund_for_processing(
    conn: &Connection,
    request_id: &str,
    admin_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE refund_requests SET status = 'admin_processing', admin_id = ?1, updated_at = ?2 \
         WHERE id = ?3 AND status = 'realtor_approved'",
        params![admin_id, now(), request_id],
    )?;
    Ok(affected > 0)
}

/// Return a claimed request to realtor_approved after a gateway failure so
/// it can be retried.
pub fn release_refund_claim(conn: &Connection, request_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE refund_requests SET status = 'realtor_approved', updated_at = ?1 \
         WHERE id = ?2 AND status = 'admin_processing'",
        params![now(), request_id],
    )?;
    Ok(())
}

pub fn complete_refund_request(
    conn: &Connection,
    request_id: &str,
    actual_amount_minor: i64,
    provider_refund_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE refund_requests SET status = 'completed', admin_processed_at = ?1, \
             actual_amount_minor = ?2, provider_refund_id = ?3, updated_at = ?1 \
         WHERE id = ?4 AND status = 'admin_processing'",
        params![now(), actual_amount_minor, provider_refund_id, request_id],
    )?;
    Ok(())
}

pub fn create_refund_entry(
    conn: &Connection,
    payment_id: &str,
    refund_request_id: Option<&str>,
    provider_refund_id: &str,
    amount_minor: i64,
) -> Result<RefundEntry> {
    let id = EntityType::RefundEntry.gen_id();
    let ts = now();

    conn.execute(
        "INSERT INTO refund_entries (id, payment_id, refund_request_id, provider_refund_id, \
         amount_minor, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, payment_id, refund_request_id, provider_refund_id, amount_minor, ts],
    )?;

    Ok(RefundEntry {
        id,
        payment_id: payment_id.to_string(),
        refund_request_id: refund_request_id.map(String::from),
        provider_refund_id: provider_refund_id.to_string(),
        amount_minor,
        created_at: ts,
    })
}

pub fn list_refund_entries_for_payment(
    conn: &Connection,
    payment_id: &str,
) -> Result<Vec<RefundEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM refund_entries WHERE payment_id = ?1 ORDER BY created_at ASC",
            REFUND_ENTRY_COLS
        ),
        &[&payment_id],
    )
}

// ============ Realtors ============

pub fn create_realtor(conn: &Connection, input: &CreateRealtor) -> Result<Realtor> {
    let id = EntityType::Realtor.gen_id();
    let ts = now();

    conn.execute(
        "INSERT INTO realtors (id, name, email, payouts_enabled, created_at, updated_at) \
         VALUES (?1, ?2, ?3, 0, ?4, ?4)",
        params![id, input.name, input.email, ts],
    )?;

    get_realtor_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal(format!("Realtor {} vanished after insert", id)))
}

pub fn get_realtor_by_id(conn: &Connection, id: &str) -> Result<Option<Realtor>> {
    query_one(
        conn,
        &format!("SELECT {} FROM realtors WHERE id = ?1", REALTOR_COLS),
        &[&id],
    )
}

pub fn get_realtor_by_stripe_account(
    conn: &Connection,
    account_id: &str,
) -> Result<Option<Realtor>> {
    query_one(
        conn,
        &format!("SELECT {} FROM realtors WHERE stripe_account_id = ?1", REALTOR_COLS),
        &[&account_id],
    )
}

pub fn set_realtor_stripe_account(
    conn: &Connection,
    realtor_id: &str,
    account_id: &str,
    payouts_enabled: bool,
) -> Result<()> {
    conn.execute(
        "UPDATE realtors SET stripe_account_id = ?1, payouts_enabled = ?2, updated_at = ?3 \
         WHERE id = ?4",
        params![account_id, payouts_enabled, now(), realtor_id],
    )?;
    Ok(())
}

pub fn set_realtor_paystack_subaccount(
    conn: &Connection,
    realtor_id: &str,
    subaccount_code: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE realtors SET paystack_subaccount_code = ?1, updated_at = ?2 WHERE id = ?3",
        params![subaccount_code, now(), realtor_id],
    )?;
    Ok(())
}

// ============ Audit log ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<AuditLog> {
    let id = EntityType::AuditLog.gen_id();
    let timestamp = now();

    // Skip the insert when audit logging is disabled.
    if enabled {
        conn.execute(
            "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, action, entity_type, \
             entity_id, details) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                timestamp,
                actor_type.as_ref(),
                actor_id,
                action,
                entity_type,
                entity_id,
                details.map(|d| d.to_string()),
            ],
        )?;
    }

    Ok(AuditLog {
        id,
        timestamp,
        actor_type,
        actor_id: actor_id.map(String::from),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        details: details.cloned(),
    })
}

/// Purge audit logs older than the retention window. Returns the number of
/// deleted records. Called on startup when AUDIT_LOG_RETENTION_DAYS > 0.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute("DELETE FROM audit_logs WHERE timestamp < ?1", params![cutoff])?;
    Ok(deleted)
}
