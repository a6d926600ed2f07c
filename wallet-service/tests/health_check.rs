mod common;

use common::TestApp;

#[tokio::test]
async fn health_check_works() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "wallet-service");
}

#[tokio::test]
async fn readiness_check_works() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    let response = app
        .client
        .get(app.url("/ready"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_text() {
    let Some(app) = TestApp::try_spawn().await else {
        return;
    };

    // Generate at least one tracked request first.
    app.client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    let response = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body = response.text().await.expect("Failed to read metrics body");
    assert!(body.contains("wallet_http_requests_total"));
}
