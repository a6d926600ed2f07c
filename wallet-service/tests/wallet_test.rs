//! Wallet ledger integration tests: deposits, withdrawals, history and
//! reservation binding.

mod common;

use common::{unique_reservation_id, TestApp, TEST_MIN_DEPOSIT};
use serde_json::json;

#[tokio::test]
async fn deposit_then_withdraw_scenario() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let reservation_id = unique_reservation_id();

    assert_eq!(app.balance().await, 0);

    let body = app.deposit(500_000, "bank").await;
    assert_eq!(body["balance"], 500_000);
    assert_eq!(app.balance().await, 500_000);

    // Withdraw against a reservation.
    let response = app
        .post_json(
            "/wallet/withdraw",
            &json!({
                "amount": 200_000,
                "reason": "booking prepayment",
                "reservation_id": reservation_id,
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["balance"], 300_000);

    // A second, too-large withdrawal fails and changes nothing.
    let response = app
        .post_json("/wallet/withdraw", &json!({ "amount": 400_000 }))
        .await;
    assert_eq!(response.status().as_u16(), 402);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["shortfall"], 100_000);
    assert_eq!(app.balance().await, 300_000);

    // History holds the deposit and the one successful payment record.
    let response = app.get("/wallet/transactions").await;
    let body: serde_json::Value = response.json().await.unwrap();
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);

    let payment = records
        .iter()
        .find(|r| r["kind"] == "payment")
        .expect("payment record should exist");
    assert_eq!(payment["amount"], -200_000);
    assert_eq!(payment["reservation_id"], reservation_id);
    assert_eq!(payment["channel"], "wallet");
    assert_eq!(payment["status"], "success");
}

#[tokio::test]
async fn deposit_below_floor_is_rejected() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post_json(
            "/wallet/deposit",
            &json!({ "amount": TEST_MIN_DEPOSIT - 1, "method": "bank" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.balance().await, 0);
}

#[tokio::test]
async fn deposit_with_unknown_method_is_rejected() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post_json(
            "/wallet/deposit",
            &json!({ "amount": 100_000, "method": "carrier-pigeon" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn negative_amounts_fail_validation() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post_json("/wallet/deposit", &json!({ "amount": -5, "method": "bank" }))
        .await;
    assert_eq!(response.status().as_u16(), 422);

    let response = app
        .post_json("/wallet/withdraw", &json!({ "amount": 0 }))
        .await;
    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn missing_account_header_is_unauthorized() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .client
        .get(app.url("/wallet/balance"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn withdrawal_from_empty_account_fails() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post_json("/wallet/withdraw", &json!({ "amount": 50_000 }))
        .await;
    assert_eq!(response.status().as_u16(), 402);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["shortfall"], 50_000);
}

#[tokio::test]
async fn unbound_wallet_payment_is_late_bound_to_reservation() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };
    let reservation_id = unique_reservation_id();

    app.deposit(300_000, "card").await;

    // Pay before the reservation exists.
    let response = app
        .post_json(
            "/wallet/withdraw",
            &json!({ "amount": 120_000, "reason": "booking prepayment" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    // Booking flow's final step binds the reservation.
    let response = app
        .post_json(
            "/wallet/payments/bind-reservation",
            &json!({ "reservation_id": reservation_id }),
        )
        .await;
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["reservation_id"], reservation_id);

    // Binding is one-shot: no unbound payment remains.
    let response = app
        .post_json(
            "/wallet/payments/bind-reservation",
            &json!({ "reservation_id": unique_reservation_id() }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn record_status_transitions_exactly_once() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    // Seed a pending card capture the way a provider-side hold would.
    let record_id = uuid::Uuid::new_v4();
    sqlx::query(
        "INSERT INTO payment_records (record_id, account_id, amount, channel, status, kind) \
         VALUES ($1, $2, $3, 'card', 'pending', 'deposit')",
    )
    .bind(record_id)
    .bind(app.account_id)
    .bind(75_000i64)
    .execute(&app.pool)
    .await
    .expect("Failed to seed pending record");

    let store = wallet_service::services::RecordStore::new(app.pool.clone());

    let record = store
        .mark_status(record_id, wallet_service::models::RecordStatus::Success)
        .await
        .expect("first transition should succeed");
    assert_eq!(record.status, "success");

    // The transition out of pending is one-shot.
    let err = store
        .mark_status(record_id, wallet_service::models::RecordStatus::Failed)
        .await
        .expect_err("second transition must fail");
    assert!(matches!(
        err,
        service_core::error::AppError::Conflict(_)
    ));

    let err = store
        .mark_status(uuid::Uuid::new_v4(), wallet_service::models::RecordStatus::Failed)
        .await
        .expect_err("unknown record must fail");
    assert!(matches!(
        err,
        service_core::error::AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn concurrent_withdrawals_never_overdraw() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    app.deposit(100_000, "bank").await;

    // Ten racing withdrawals of 30k against 100k: at most three can win.
    let body = json!({ "amount": 30_000 });
    let attempts = (0..10).map(|_| app.post_json("/wallet/withdraw", &body));
    let responses = futures::future::join_all(attempts).await;

    let succeeded = responses
        .iter()
        .filter(|r| r.status().as_u16() == 201)
        .count();
    assert_eq!(succeeded, 3, "exactly three 30k withdrawals fit in 100k");

    assert_eq!(app.balance().await, 10_000);
}
