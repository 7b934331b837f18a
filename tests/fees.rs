//! Fee computation precision and the connect onboarding surface

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use tower::ServiceExt;
use villapay::reconcile::fees;
use villapay::util::format_major;

#[tokio::test]
async fn test_fee_computation_precision() {
    // Gateway reports 150 minor units on a 2-decimal currency: stored fee is
    // exactly 150 minor (1.50 major), and
    // platform_net = service_fee + commission - fee.
    let stripe = Arc::new(MockStripe::with_fee(150));
    let state = setup_test_state(stripe, Arc::new(MockPaystack::default()));

    let realtor = create_test_realtor(&state);
    let booking = create_due_booking(&state, &realtor.id, PaymentGateway::Stripe);
    let payment = get_payment(&state, &booking.id);

    let breakdown =
        fees::compute_and_store_fees(&state, PaymentGateway::Stripe, &payment.id, "pi_test_due")
            .await
            .expect("fee computation should succeed");
    assert_eq!(breakdown.fee_minor, 150);

    let stored = get_payment(&state, &booking.id);
    assert_eq!(stored.gateway_fee_minor, Some(150));
    // service_fee 2_500 + commission 5_000 - fee 150
    assert_eq!(stored.platform_net_minor, Some(7_350));

    assert_eq!(format_major(stored.gateway_fee_minor.unwrap(), 100), "1.50");
    assert_eq!(format_major(stored.platform_net_minor.unwrap(), 100), "73.50");
}

#[tokio::test]
async fn test_fee_computation_via_paystack() {
    let paystack = Arc::new(MockPaystack::default());
    let state = setup_test_state(Arc::new(MockStripe::default()), paystack);

    let realtor = create_test_realtor(&state);
    let booking = create_due_booking(&state, &realtor.id, PaymentGateway::Paystack);
    let payment = get_payment(&state, &booking.id);

    fees::compute_and_store_fees(&state, PaymentGateway::Paystack, &payment.id, "ref_test")
        .await
        .expect("fee computation should succeed");

    let stored = get_payment(&state, &booking.id);
    assert_eq!(stored.gateway_fee_minor, Some(150));
}

#[tokio::test]
async fn test_fee_failure_leaves_payment_untouched() {
    let state = default_test_state();

    let result =
        fees::compute_and_store_fees(&state, PaymentGateway::Stripe, "vp_pay_missing", "pi_x")
            .await;
    assert!(result.is_err());
}

// ============ Connect onboarding endpoints ============

async fn send(
    router: &axum::Router,
    method: &str,
    path: &str,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_onboarding_creates_account_and_link() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let router = test_router(state.clone());

    let (status, body) = send(
        &router,
        "POST",
        &format!("/realtors/{}/connect/onboard", realtor.id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().contains("acct_test_"));

    let conn = state.db.get().unwrap();
    let updated = queries::get_realtor_by_id(&conn, &realtor.id).unwrap().unwrap();
    assert!(updated.stripe_account_id.is_some());
    assert!(!updated.payouts_enabled, "payouts stay off until the gateway says otherwise");
}

#[tokio::test]
async fn test_connect_status_refreshes_payout_capability() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    connect_test_realtor(&state, &realtor, "acct_connected");
    {
        // Pretend the gateway had it disabled locally.
        let conn = state.db.get().unwrap();
        queries::set_realtor_stripe_account(&conn, &realtor.id, "acct_connected", false).unwrap();
    }
    let router = test_router(state.clone());

    let (status, body) = send(
        &router,
        "GET",
        &format!("/realtors/{}/connect/status", realtor.id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payouts_enabled"], serde_json::json!(true));

    let conn = state.db.get().unwrap();
    let updated = queries::get_realtor_by_id(&conn, &realtor.id).unwrap().unwrap();
    assert!(updated.payouts_enabled);
}

#[tokio::test]
async fn test_dashboard_link_requires_connected_account() {
    let state = default_test_state();
    let realtor = create_test_realtor(&state);
    let router = test_router(state.clone());

    let (status, _) = send(
        &router,
        "POST",
        &format!("/realtors/{}/connect/dashboard", realtor.id),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    connect_test_realtor(&state, &realtor, "acct_connected");
    let (status, body) = send(
        &router,
        "POST",
        &format!("/realtors/{}/connect/dashboard", realtor.id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().contains("acct_connected"));
}

#[tokio::test]
async fn test_manual_release_trigger_runs_a_batch() {
    let stripe = Arc::new(MockStripe::default());
    let state = setup_test_state(stripe.clone(), Arc::new(MockPaystack::default()));

    let realtor = create_test_realtor(&state);
    connect_test_realtor(&state, &realtor, "acct_ok");
    create_due_booking(&state, &realtor.id, PaymentGateway::Stripe);
    let router = test_router(state.clone());

    let (status, body) = send(&router, "POST", "/admin/payouts/release").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], serde_json::json!(1));
    assert_eq!(stripe.transfers.lock().unwrap().len(), 1);
}
