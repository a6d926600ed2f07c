//! Reconciliation integration tests: idempotency across webhook, poll
//! confirm and redelivery, in any interleaving.

mod common;

use common::{TestApp, TEST_MIN_DEPOSIT};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn webhook_credits_intent_once() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (intent_id, intent_ref) = app.create_intent(100_000).await;

    // Status starts pending.
    let response = app.get(&format!("/intents/{}/status", intent_id)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "pending");

    // Webhook reports completion.
    let response = app.deliver_webhook(&intent_ref, 100_000, "txn-1").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["balance"], 100_000);

    assert_eq!(app.balance().await, 100_000);

    // A stale poll re-reports the same completion seconds later.
    let response = app.confirm_intent(&intent_ref, 100_000, "txn-1").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["duplicate"], true);
    assert_eq!(body["balance"], 100_000);

    // Still exactly one credit and one record for the intent.
    assert_eq!(app.balance().await, 100_000);
    let response = app.get("/wallet/transactions").await;
    let body: Value = response.json().await.unwrap();
    let deposits: Vec<_> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["kind"] == "deposit")
        .collect();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0]["channel"], "gateway:velopay");

    // Poll converges to completed.
    let response = app.get(&format!("/intents/{}/status", intent_id)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn concurrent_reconciliations_apply_exactly_one_credit() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (_, intent_ref) = app.create_intent(250_000).await;

    // Webhook, poll confirms and redeliveries all race.
    let calls = (0..8).map(|i| {
        let fut: std::pin::Pin<Box<dyn std::future::Future<Output = reqwest::Response>>> =
            if i % 2 == 0 {
                Box::pin(app.deliver_webhook(&intent_ref, 250_000, "txn-rc"))
            } else {
                Box::pin(app.confirm_intent(&intent_ref, 250_000, "txn-rc"))
            };
        fut
    });
    let responses = futures::future::join_all(calls).await;

    let mut bodies = Vec::new();
    for response in responses {
        assert!(
            response.status().is_success(),
            "every racing channel should converge on success"
        );
        bodies.push(response.json::<Value>().await.unwrap());
    }

    // All callers observe the identical committed outcome.
    let record_ids: Vec<&str> = bodies
        .iter()
        .map(|b| b["record_id"].as_str().unwrap())
        .collect();
    assert!(record_ids.iter().all(|id| *id == record_ids[0]));
    assert!(bodies.iter().all(|b| b["balance"] == 250_000));

    // Exactly one winner.
    let winners = bodies.iter().filter(|b| b["duplicate"] == false).count();
    assert_eq!(winners, 1);

    assert_eq!(app.balance().await, 250_000);
}

#[tokio::test]
async fn conflicting_amount_keeps_first_commit() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (_, intent_ref) = app.create_intent(100_000).await;

    let response = app.deliver_webhook(&intent_ref, 100_000, "txn-a").await;
    assert!(response.status().is_success());

    // A second channel reports a different amount.
    let response = app.confirm_intent(&intent_ref, 999_999, "txn-b").await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["duplicate"], true);
    assert_eq!(body["amount"], 100_000, "first committed amount wins");

    assert_eq!(app.balance().await, 100_000);
}

#[tokio::test]
async fn expired_intent_cannot_be_reconciled() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (intent_id, intent_ref) = app.create_intent(100_000).await;
    app.age_out_intent(intent_id).await;

    let response = app.confirm_intent(&intent_ref, 100_000, "txn-late").await;
    assert_eq!(response.status().as_u16(), 410);
    assert_eq!(app.balance().await, 0);

    let response = app.get(&format!("/intents/{}/status", intent_id)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "expired");

    // The webhook channel is refused the same way.
    let response = app.deliver_webhook(&intent_ref, 100_000, "txn-late").await;
    assert_eq!(response.status().as_u16(), 410);
}

#[tokio::test]
async fn intent_below_deposit_floor_is_rejected() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .post_json(
            "/intents",
            &json!({ "amount": TEST_MIN_DEPOSIT - 1, "method": "velopay" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn foreign_account_cannot_confirm_intent() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (intent_id, intent_ref) = app.create_intent(100_000).await;

    let stranger = Uuid::new_v4();
    let response = app
        .post_json_as(
            stranger,
            "/intents/confirm",
            &json!({
                "intent_ref": intent_ref,
                "amount": 100_000,
                "external_txn_id": "txn-x",
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 401);

    // The stranger cannot poll it either.
    let response = app
        .client
        .get(app.url(&format!("/intents/{}/status", intent_id)))
        .header("X-Account-ID", stranger.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    assert_eq!(app.balance().await, 0);
}

#[tokio::test]
async fn tampered_intent_reference_is_rejected() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (_, intent_ref) = app.create_intent(100_000).await;

    // Flip a character in the signature half.
    let mut tampered = intent_ref.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });

    let response = app.confirm_intent(&tampered, 100_000, "txn-t").await;
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(app.balance().await, 0);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let (_, intent_ref) = app.create_intent(100_000).await;

    let body = json!({
        "event": "deposit.completed",
        "payload": {
            "intent_ref": intent_ref,
            "amount": 100_000,
            "external_txn_id": "txn-f",
        }
    })
    .to_string();

    let response = app
        .client
        .post(app.url("/webhooks/gateway"))
        .header("X-Gateway-Signature", "deadbeef")
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(app.balance().await, 0);
}

#[tokio::test]
async fn unknown_webhook_events_are_acknowledged() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let body = json!({
        "event": "deposit.created",
        "payload": {
            "intent_ref": "irrelevant",
            "amount": 1,
            "external_txn_id": "txn-n",
        }
    })
    .to_string();
    let signature =
        service_core::utils::signature::sign(common::TEST_WEBHOOK_SECRET, &body).unwrap();

    let response = app
        .client
        .post(app.url("/webhooks/gateway"))
        .header("X-Gateway-Signature", signature)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn unknown_intent_reference_is_not_found() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    // Signed with the right secret but for an intent that never existed.
    let ghost = wallet_service::utils::encode_signed(
        common::TEST_TOKEN_SECRET,
        &[
            &Uuid::new_v4().to_string(),
            &app.account_id.to_string(),
            "2000000000",
        ],
    )
    .unwrap();

    let response = app.confirm_intent(&ghost, 100_000, "txn-g").await;
    assert_eq!(response.status().as_u16(), 404);
}
