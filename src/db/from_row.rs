//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const BOOKING_COLS: &str = "id, property_id, guest_id, guest_email, realtor_id, check_in, \
     check_out, status, payout_status, payout_release_at, realtor_payout_minor, currency, \
     created_at, updated_at";

pub const PAYMENT_COLS: &str = "id, booking_id, amount_minor, currency, status, \
     refund_amount_minor, gateway, gateway_transaction_id, gateway_reference, \
     gateway_transfer_id, gateway_fee_minor, platform_net_minor, service_fee_minor, \
     platform_commission_minor, payout_released, payout_released_at, created_at, updated_at";

pub const REFUND_REQUEST_COLS: &str = "id, booking_id, payment_id, requested_by, amount_minor, \
     currency, reason, status, realtor_decided_at, realtor_note, admin_id, admin_processed_at, \
     actual_amount_minor, provider_refund_id, created_at, updated_at";

pub const REFUND_ENTRY_COLS: &str =
    "id, payment_id, refund_request_id, provider_refund_id, amount_minor, created_at";

pub const REALTOR_COLS: &str = "id, name, email, stripe_account_id, paystack_subaccount_code, \
     payouts_enabled, created_at, updated_at";

impl FromRow for Booking {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Booking {
            id: row.get(0)?,
            property_id: row.get(1)?,
            guest_id: row.get(2)?,
            guest_email: row.get(3)?,
            realtor_id: row.get(4)?,
            check_in: row.get(5)?,
            check_out: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            payout_status: parse_enum(row, 8, "payout_status")?,
            payout_release_at: row.get(9)?,
            realtor_payout_minor: row.get(10)?,
            currency: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            amount_minor: row.get(2)?,
            currency: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            refund_amount_minor: row.get(5)?,
            gateway: parse_enum(row, 6, "gateway")?,
            gateway_transaction_id: row.get(7)?,
            gateway_reference: row.get(8)?,
            gateway_transfer_id: row.get(9)?,
            gateway_fee_minor: row.get(10)?,
            platform_net_minor: row.get(11)?,
            service_fee_minor: row.get(12)?,
            platform_commission_minor: row.get(13)?,
            payout_released: row.get(14)?,
            payout_released_at: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

impl FromRow for RefundRequest {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RefundRequest {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            payment_id: row.get(2)?,
            requested_by: row.get(3)?,
            amount_minor: row.get(4)?,
            currency: row.get(5)?,
            reason: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            realtor_decided_at: row.get(8)?,
            realtor_note: row.get(9)?,
            admin_id: row.get(10)?,
            admin_processed_at: row.get(11)?,
            actual_amount_minor: row.get(12)?,
            provider_refund_id: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl FromRow for RefundEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RefundEntry {
            id: row.get(0)?,
            payment_id: row.get(1)?,
            refund_request_id: row.get(2)?,
            provider_refund_id: row.get(3)?,
            amount_minor: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Realtor {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Realtor {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            stripe_account_id: row.get(3)?,
            paystack_subaccount_code: row.get(4)?,
            payouts_enabled: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}
