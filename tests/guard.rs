//! Booking status guard, idempotency ledger, and payment-update invariants

mod common;

use common::*;

#[test]
fn test_conditional_transition_applies_with_extras() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_test_booking(&state, &realtor.id);

    let conn = state.db.get().unwrap();
    let release_at = chrono::Utc::now().timestamp() + 86_400;
    let updated = queries::transition_booking_status(
        &conn,
        &booking.id,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        TransitionExtras {
            payout_release_at: Some(release_at),
            payout_status: None,
        },
    )
    .expect("transition should succeed");

    assert_eq!(updated.status, BookingStatus::Confirmed);
    assert_eq!(updated.payout_release_at, Some(release_at));
    assert_eq!(updated.payout_status, PayoutStatus::Pending);
}

#[test]
fn test_conditional_transition_conflict_mutates_nothing() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_test_booking(&state, &realtor.id);

    let conn = state.db.get().unwrap();
    queries::transition_booking_status(
        &conn,
        &booking.id,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        TransitionExtras::default(),
    )
    .unwrap();
    let before = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();

    // Expecting PENDING against a booking already CONFIRMED must fail with
    // a status conflict and leave every field untouched.
    let result = queries::transition_booking_status(
        &conn,
        &booking.id,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        TransitionExtras {
            payout_release_at: Some(12345),
            payout_status: Some(PayoutStatus::Released),
        },
    );

    match result {
        Err(AppError::StatusConflict { expected, actual, .. }) => {
            assert_eq!(expected, BookingStatus::Pending);
            assert_eq!(actual, BookingStatus::Confirmed);
        }
        other => panic!("Expected StatusConflict, got {:?}", other.map(|b| b.status)),
    }

    let after = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.payout_status, before.payout_status);
    assert_eq!(after.payout_release_at, before.payout_release_at);
    assert_eq!(after.updated_at, before.updated_at);
}

#[test]
fn test_terminal_states_have_no_exit() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_test_booking(&state, &realtor.id);

    let conn = state.db.get().unwrap();
    queries::transition_booking_status(
        &conn,
        &booking.id,
        BookingStatus::Pending,
        BookingStatus::Cancelled,
        TransitionExtras::default(),
    )
    .unwrap();

    // The transition table rejects any move out of CANCELLED before the
    // database is even consulted.
    let result = queries::transition_booking_status(
        &conn,
        &booking.id,
        BookingStatus::Cancelled,
        BookingStatus::Confirmed,
        TransitionExtras::default(),
    );
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[test]
fn test_transition_unknown_booking_is_not_found() {
    let state = default_test_state();
    let conn = state.db.get().unwrap();

    let result = queries::transition_booking_status(
        &conn,
        "vp_bkg_00000000000000000000000000000000",
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        TransitionExtras::default(),
    );
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn test_payout_status_conditional_move() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_due_booking(&state, &realtor.id, PaymentGateway::Stripe);

    let conn = state.db.get().unwrap();

    assert!(queries::set_booking_payout_status(
        &conn,
        &booking.id,
        PayoutStatus::Pending,
        PayoutStatus::Released
    )
    .unwrap());

    // Second attempt finds the row already moved.
    assert!(!queries::set_booking_payout_status(
        &conn,
        &booking.id,
        PayoutStatus::Pending,
        PayoutStatus::Released
    )
    .unwrap());
}

#[test]
fn test_hold_booking_payout_from_any_state() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_due_booking(&state, &realtor.id, PaymentGateway::Stripe);

    let conn = state.db.get().unwrap();
    queries::set_booking_payout_status(
        &conn,
        &booking.id,
        PayoutStatus::Pending,
        PayoutStatus::Released,
    )
    .unwrap();

    assert!(queries::hold_booking_payout(&conn, &booking.id).unwrap());
    let after = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(after.payout_status, PayoutStatus::Failed);

    // Already failed: no-op.
    assert!(!queries::hold_booking_payout(&conn, &booking.id).unwrap());
}

// ============ Idempotency ledger ============

#[test]
fn test_ledger_records_once() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_test_booking(&state, &realtor.id);

    let conn = state.db.get().unwrap();

    assert!(queries::try_record_processed_event(
        &conn,
        PaymentGateway::Stripe,
        "evt_1",
        &booking.id
    )
    .unwrap());

    // Same event id again: the insert loses and the caller skips.
    assert!(!queries::try_record_processed_event(
        &conn,
        PaymentGateway::Stripe,
        "evt_1",
        &booking.id
    )
    .unwrap());

    assert!(queries::event_already_processed(&conn, PaymentGateway::Stripe, "evt_1").unwrap());
    assert!(!queries::event_already_processed(&conn, PaymentGateway::Stripe, "evt_2").unwrap());
}

#[test]
fn test_ledger_is_scoped_per_gateway() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_test_booking(&state, &realtor.id);

    let conn = state.db.get().unwrap();
    assert!(queries::try_record_processed_event(
        &conn,
        PaymentGateway::Stripe,
        "shared_id",
        &booking.id
    )
    .unwrap());
    // The same id from the other gateway is a different event.
    assert!(queries::try_record_processed_event(
        &conn,
        PaymentGateway::Paystack,
        "shared_id",
        &booking.id
    )
    .unwrap());
}

// ============ Refund running total ============

#[test]
fn test_refund_ceiling_enforced_in_update() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_due_booking(&state, &realtor.id, PaymentGateway::Stripe);
    let payment = get_payment(&state, &booking.id);

    let conn = state.db.get().unwrap();

    // Partial refund keeps the payment completed.
    let after = queries::apply_refund_to_payment(&conn, &payment.id, 20_000).unwrap();
    assert_eq!(after.refund_amount_minor, 20_000);
    assert_eq!(after.status, PaymentStatus::Completed);

    // Exceeding the remainder is rejected with no mutation.
    let result = queries::apply_refund_to_payment(&conn, &payment.id, 40_000);
    match result {
        Err(AppError::RefundAmountExceeded {
            requested_minor,
            available_minor,
        }) => {
            assert_eq!(requested_minor, 40_000);
            assert_eq!(available_minor, 30_000);
        }
        other => panic!("Expected RefundAmountExceeded, got {:?}", other.map(|p| p.status)),
    }
    let unchanged = queries::get_payment_by_id(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(unchanged.refund_amount_minor, 20_000);

    // Refunding exactly the remainder flips the payment to refunded.
    let full = queries::apply_refund_to_payment(&conn, &payment.id, 30_000).unwrap();
    assert_eq!(full.refund_amount_minor, 50_000);
    assert_eq!(full.status, PaymentStatus::Refunded);
}
