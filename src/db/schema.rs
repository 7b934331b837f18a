use rusqlite::Connection;

/// Initialize the main database schema (everything except audit logs)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Realtors (hosts), reduced to the payout-relevant surface
        CREATE TABLE IF NOT EXISTS realtors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            stripe_account_id TEXT,
            paystack_subaccount_code TEXT,
            payouts_enabled INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_realtors_stripe_account ON realtors(stripe_account_id);

        -- Bookings: reservation + payout lifecycle
        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            property_id TEXT NOT NULL,
            guest_id TEXT NOT NULL,
            guest_email TEXT,
            realtor_id TEXT NOT NULL REFERENCES realtors(id),
            check_in INTEGER NOT NULL,
            check_out INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'confirmed', 'cancelled', 'completed')),
            payout_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (payout_status IN ('pending', 'released', 'failed')),
            payout_release_at INTEGER,
            realtor_payout_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bookings_realtor ON bookings(realtor_id);
        -- Scheduler scan: confirmed bookings with a pending payout past their release date
        CREATE INDEX IF NOT EXISTS idx_bookings_payout_due
            ON bookings(payout_release_at)
            WHERE status = 'confirmed' AND payout_status = 'pending';

        -- Payments: one monetary transaction per booking, amounts in minor units
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL UNIQUE REFERENCES bookings(id),
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'completed', 'failed', 'refunded')),
            refund_amount_minor INTEGER NOT NULL DEFAULT 0
                CHECK (refund_amount_minor <= amount_minor),
            gateway TEXT NOT NULL CHECK (gateway IN ('stripe', 'paystack')),
            gateway_transaction_id TEXT,
            gateway_reference TEXT,
            gateway_transfer_id TEXT,
            gateway_fee_minor INTEGER,
            platform_net_minor INTEGER,
            service_fee_minor INTEGER NOT NULL DEFAULT 0,
            platform_commission_minor INTEGER NOT NULL DEFAULT 0,
            payout_released INTEGER NOT NULL DEFAULT 0,
            payout_released_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_gateway_txn ON payments(gateway, gateway_transaction_id);
        CREATE INDEX IF NOT EXISTS idx_payments_gateway_transfer ON payments(gateway, gateway_transfer_id);

        -- Idempotency ledger: one row per gateway event already applied.
        -- INSERT OR IGNORE against the primary key is the atomic
        -- check-and-mark; there is no separate read/decide/write sequence.
        CREATE TABLE IF NOT EXISTS processed_events (
            gateway TEXT NOT NULL,
            event_id TEXT NOT NULL,
            booking_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (gateway, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_processed_events_booking ON processed_events(booking_id);

        -- Refund requests: two-stage approval (realtor, then admin)
        CREATE TABLE IF NOT EXISTS refund_requests (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL REFERENCES bookings(id),
            payment_id TEXT NOT NULL REFERENCES payments(id),
            requested_by TEXT NOT NULL,
            amount_minor INTEGER NOT NULL CHECK (amount_minor > 0),
            currency TEXT NOT NULL,
            reason TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending_realtor_approval'
                CHECK (status IN ('pending_realtor_approval', 'realtor_approved',
                                  'realtor_rejected', 'admin_processing', 'completed')),
            realtor_decided_at INTEGER,
            realtor_note TEXT,
            admin_id TEXT,
            admin_processed_at INTEGER,
            actual_amount_minor INTEGER,
            provider_refund_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_refund_requests_booking ON refund_requests(booking_id);
        -- At most one non-terminal refund request per booking
        CREATE UNIQUE INDEX IF NOT EXISTS idx_refund_requests_active
            ON refund_requests(booking_id)
            WHERE status IN ('pending_realtor_approval', 'realtor_approved', 'admin_processing');

        -- Refund audit trail: one append-only entry per executed gateway refund
        CREATE TABLE IF NOT EXISTS refund_entries (
            id TEXT PRIMARY KEY,
            payment_id TEXT NOT NULL REFERENCES payments(id),
            refund_request_id TEXT REFERENCES refund_requests(id),
            provider_refund_id TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_refund_entries_payment ON refund_entries(payment_id);
        "#,
    )
}

/// Initialize the audit log schema (separate database file)
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL,
            actor_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            details TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs(entity_type, entity_id);
        "#,
    )
}
