//! Two-stage refund flow: request, realtor decision, admin processing

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use tower::ServiceExt;

async fn post_json(
    router: &axum::Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, parsed)
}

/// Settled booking + payment ready for refund claims.
fn settled_booking(state: &AppState) -> (Booking, Payment) {
    let realtor = create_test_realtor(state);
    let booking = create_due_booking(state, &realtor.id, PaymentGateway::Stripe);
    let payment = get_payment(state, &booking.id);
    (booking, payment)
}

#[tokio::test]
async fn test_request_refund_happy_path() {
    let state = default_test_state();
    let (booking, _) = settled_booking(&state);
    let router = test_router(state.clone());

    let (status, body) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 20_000,
            "reason": "Early checkout"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], serde_json::json!("pending_realtor_approval"));
    assert_eq!(body["amount_minor"], serde_json::json!(20_000));
    assert_eq!(body["currency"], serde_json::json!("usd"));
}

#[tokio::test]
async fn test_request_refund_over_ceiling_rejected() {
    let state = default_test_state();
    let (booking, _) = settled_booking(&state);
    let router = test_router(state.clone());

    // Payment amount is 50_000; anything above is rejected outright.
    let (status, _) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 60_000,
            "reason": "Too much"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // And the remaining-balance ceiling accounts for prior refunds.
    {
        let conn = state.db.get().unwrap();
        let payment = queries::get_payment_by_booking(&conn, &booking.id).unwrap().unwrap();
        queries::apply_refund_to_payment(&conn, &payment.id, 45_000).unwrap();
    }
    let (status, _) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 10_000,
            "reason": "Still too much"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_request_refund_rejects_unsettled_payment() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_test_booking(&state, &realtor.id);
    create_test_payment(&state, &booking.id, PaymentGateway::Stripe);
    let router = test_router(state.clone());

    let (status, _) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 1_000,
            "reason": "Never charged"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_only_one_active_refund_request_per_booking() {
    let state = default_test_state();
    let (booking, _) = settled_booking(&state);
    let router = test_router(state.clone());

    let path = format!("/bookings/{}/refund-requests", booking.id);
    let claim = serde_json::json!({
        "requested_by": "guest_test",
        "amount_minor": 10_000,
        "reason": "First claim"
    });

    let (status, _) = post_json(&router, &path, claim.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = post_json(&router, &path, claim).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_full_refund_flow_to_completion() {
    let state = default_test_state();
    let (booking, payment) = settled_booking(&state);
    let router = test_router(state.clone());

    let (_, body) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 20_000,
            "reason": "Broken hot tub"
        }),
    )
    .await;
    let request_id = body["id"].as_str().unwrap().to_string();

    // Realtor approves.
    let (status, body) = post_json(
        &router,
        &format!("/refund-requests/{}/realtor-decision", request_id),
        serde_json::json!({ "approve": true, "note": "Fair enough" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], serde_json::json!("realtor_approved"));

    // Admin processes: the gateway refund runs and everything lands.
    let (status, body) = post_json(
        &router,
        &format!("/refund-requests/{}/process", request_id),
        serde_json::json!({ "admin_id": "admin_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], serde_json::json!("completed"));
    assert_eq!(body["actual_amount_minor"], serde_json::json!(20_000));
    assert!(body["provider_refund_id"].as_str().unwrap().starts_with("re_test_"));

    let conn = state.db.get().unwrap();
    let updated = queries::get_payment_by_id(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(updated.refund_amount_minor, 20_000);
    assert_eq!(updated.status, PaymentStatus::Completed, "partial refund keeps it settled");

    let entries = queries::list_refund_entries_for_payment(&conn, &payment.id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount_minor, 20_000);
    assert_eq!(entries[0].refund_request_id.as_deref(), Some(request_id.as_str()));

    // A full follow-up refund flips the payment to refunded.
    drop(conn);
    let (_, body) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 30_000,
            "reason": "Remainder"
        }),
    )
    .await;
    let second_id = body["id"].as_str().unwrap().to_string();
    post_json(
        &router,
        &format!("/refund-requests/{}/realtor-decision", second_id),
        serde_json::json!({ "approve": true }),
    )
    .await;
    let (status, _) = post_json(
        &router,
        &format!("/refund-requests/{}/process", second_id),
        serde_json::json!({ "admin_id": "admin_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let final_payment = queries::get_payment_by_id(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(final_payment.refund_amount_minor, 50_000);
    assert_eq!(final_payment.status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_realtor_rejection_is_terminal() {
    let state = default_test_state();
    let (booking, _) = settled_booking(&state);
    let router = test_router(state.clone());

    let (_, body) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 10_000,
            "reason": "Changed my mind"
        }),
    )
    .await;
    let request_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &router,
        &format!("/refund-requests/{}/realtor-decision", request_id),
        serde_json::json!({ "approve": false, "note": "Against policy" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], serde_json::json!("realtor_rejected"));

    // Deciding again conflicts.
    let (status, _) = post_json(
        &router,
        &format!("/refund-requests/{}/realtor-decision", request_id),
        serde_json::json!({ "approve": true }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Processing a rejected request conflicts too.
    let (status, _) = post_json(
        &router,
        &format!("/refund-requests/{}/process", request_id),
        serde_json::json!({ "admin_id": "admin_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_processing_without_approval_conflicts() {
    let state = default_test_state();
    let (booking, _) = settled_booking(&state);
    let router = test_router(state.clone());

    let (_, body) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 10_000,
            "reason": "Waiting"
        }),
    )
    .await;
    let request_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        &router,
        &format!("/refund-requests/{}/process", request_id),
        serde_json::json!({ "admin_id": "admin_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_processing_revalidates_ceiling_without_partial_mutation() {
    let state = default_test_state();
    let (booking, payment) = settled_booking(&state);
    let router = test_router(state.clone());

    let (_, body) = post_json(
        &router,
        &format!("/bookings/{}/refund-requests", booking.id),
        serde_json::json!({
            "requested_by": "guest_test",
            "amount_minor": 30_000,
            "reason": "Approved then overtaken"
        }),
    )
    .await;
    let request_id = body["id"].as_str().unwrap().to_string();

    post_json(
        &router,
        &format!("/refund-requests/{}/realtor-decision", request_id),
        serde_json::json!({ "approve": true }),
    )
    .await;

    // An out-of-band refund (e.g. a dispute settlement) eats the balance
    // between approval and processing.
    {
        let conn = state.db.get().unwrap();
        queries::apply_refund_to_payment(&conn, &payment.id, 40_000).unwrap();
    }

    let (status, _) = post_json(
        &router,
        &format!("/refund-requests/{}/process", request_id),
        serde_json::json!({ "admin_id": "admin_1" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // The claim was rolled back whole: still approved, nothing refunded.
    let conn = state.db.get().unwrap();
    let request = queries::get_refund_request_by_id(&conn, &request_id).unwrap().unwrap();
    assert_eq!(request.status, RefundRequestStatus::RealtorApproved);
    let unchanged = queries::get_payment_by_id(&conn, &payment.id).unwrap().unwrap();
    assert_eq!(unchanged.refund_amount_minor, 40_000);
}

#[tokio::test]
async fn test_requeue_payout_endpoint() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let booking = create_due_booking(&state, &realtor.id, PaymentGateway::Stripe);
    let router = test_router(state.clone());

    // Not failed yet: conflict.
    let (status, _) = post_json(
        &router,
        &format!("/bookings/{}/payout/requeue", booking.id),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    {
        let conn = state.db.get().unwrap();
        queries::hold_booking_payout(&conn, &booking.id).unwrap();
    }

    let (status, body) = post_json(
        &router,
        &format!("/bookings/{}/payout/requeue", booking.id),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payout_status"], serde_json::json!("pending"));
}
