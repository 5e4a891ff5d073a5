//! HTTP surface driven through the router without a socket.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use bingohall::api::create_app;
use bingohall::{BingoConfig, BingoHall};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

fn app() -> Router {
    let config = BingoConfig::testing();
    let api = config.api.clone();
    let hall = Arc::new(BingoHall::from_config(config).unwrap());
    create_app(hall, Some(ADMIN_KEY.to_string()), &api)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, admin: bool) -> (StatusCode, Value, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    if admin {
        builder = builder.header("x-api-key", ADMIN_KEY);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("every response carries a request id")
        .to_str()
        .unwrap()
        .to_string();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value, request_id)
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app();
    let (status, body, _) = send(&app, "GET", "/health", None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Running");
    assert_eq!(body["tables"], 0);

    let (status, body, _) = send(&app, "GET", "/metrics", None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("bingohall_active_tables"));
}

#[tokio::test]
async fn test_error_envelope_carries_request_id() {
    let app = app();
    let (status, body, request_id) =
        send(&app, "POST", "/players", Some(json!({ "phone": "12345" })), false).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_PHONE");
    assert_eq!(body["request_id"], request_id.as_str());

    let (status, body, _) = send(&app, "GET", "/players/0913000009/wallet", None, false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "WALLET_NOT_FOUND");
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let app = app();
    send(&app, "POST", "/players", Some(json!({ "phone": "0913000001" })), false).await;

    let (status, body, _) = send(&app, "GET", "/admin/summary", None, false).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _, _) = send(
        &app,
        "POST",
        "/admin/players/0913000001/adjust",
        Some(json!({ "delta": 5000 })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body, _) = send(&app, "GET", "/admin/summary", None, true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pending_withdrawals"], 0);
}

#[tokio::test]
async fn test_player_flow() {
    let app = app();
    let (status, wallet, _) = send(&app, "POST", "/players", Some(json!({ "phone": "0913000002" })), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["balance"], 0);

    let (status, body, _) = send(
        &app,
        "POST",
        "/players/0913000002/join",
        Some(json!({ "tier": 1000 })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");
    assert_eq!(body["error"]["details"]["required"], 1000);
    assert_eq!(body["error"]["details"]["available"], 0);

    let (status, wallet, _) = send(
        &app,
        "POST",
        "/admin/players/0913000002/adjust",
        Some(json!({ "delta": 8000, "note": "cash deposit" })),
        true,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["balance"], 8000);

    let (status, ticket, _) = send(
        &app,
        "POST",
        "/players/0913000002/join",
        Some(json!({ "tier": 1000 })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["cards"].as_array().unwrap().len(), 2);
    assert_eq!(ticket["cards"][0]["card"].as_array().unwrap().len(), 25);

    let (status, view, _) = send(&app, "GET", "/players/0913000002/seat", None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["phase"], "waiting");
    assert_eq!(view["auto_mark"], false);
    assert_eq!(view["ticket"]["round_id"], ticket["round_id"]);

    let table_uri = format!("/tables/{}", ticket["table_id"].as_str().unwrap());
    let (status, snapshot, _) = send(&app, "GET", &table_uri, None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["admitted"], 1);

    let (status, body, _) = send(
        &app,
        "POST",
        "/players/0913000002/mark",
        Some(json!({ "card_id": 0, "cell": 30 })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CELL_OUT_OF_RANGE");

    let (status, body, _) = send(
        &app,
        "POST",
        "/players/0913000002/withdrawals",
        Some(json!({ "amount": 1000, "destination": "0913000002" })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BELOW_MINIMUM");

    let (status, withdrawal, _) = send(
        &app,
        "POST",
        "/players/0913000002/withdrawals",
        Some(json!({ "amount": 6000, "destination": "0913000002" })),
        false,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(withdrawal["status"], "pending");

    let paid_uri = format!("/admin/withdrawals/{}/paid", withdrawal["id"].as_str().unwrap());
    let (status, first, _) = send(&app, "POST", &paid_uri, None, true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["already_paid"], false);
    let (status, second, _) = send(&app, "POST", &paid_uri, None, true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["already_paid"], true);

    let (_, wallet, _) = send(&app, "GET", "/players/0913000002/wallet", None, false).await;
    assert_eq!(wallet["balance"], 1000);

    let (status, list, _) = send(&app, "GET", "/admin/withdrawals?status=paid", None, true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}
