mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::Harness;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::str::FromStr;
use tower::ServiceExt;
use transit_ticketing::domain::ticket::PaymentMethod;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

fn get(uri: &str, user_id: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user_id: Option<i64>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn test_health_check() {
    let h = Harness::new();
    let (status, body) = send(&h.runtime.router(), get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_buy_requires_identity() {
    let h = Harness::new();
    let request = post(
        "/tickets",
        None,
        json!({
            "route_id": 1,
            "bus_name": "Harbour Express",
            "start_destination": "Central",
            "end_destination": "Harbour",
            "payment_method": "wallet"
        }),
    );
    let (status, body) = send(&h.runtime.router(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_buy_then_poll_status() {
    let h = Harness::new();
    h.top_up(7, dec!(100)).await;
    let app = h.runtime.router();

    let request = post(
        "/tickets",
        Some(7),
        json!({
            "route_id": 1,
            "bus_name": "Harbour Express",
            "start_destination": "Central",
            "end_destination": "Harbour",
            "payment_method": "wallet",
            "quantity": 2
        }),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let tracking_id = body["data"]["tracking_id"].as_str().unwrap().to_string();

    let uri = format!("/ticket/status?tracking_id={tracking_id}");
    let (_, pending) = send(&app, get(&uri, None)).await;
    assert_eq!(pending["data"]["status"], "pending");

    h.runtime.fulfillment_consumer().process_next().await.unwrap();

    let (_, paid) = send(&app, get(&uri, None)).await;
    assert_eq!(paid["data"]["status"], "paid");
    assert_eq!(paid["data"]["ticket_ids"].as_array().unwrap().len(), 2);

    let (_, balance) = send(&app, get("/wallet/balance", Some(7))).await;
    assert_eq!(decimal(&balance["data"]["balance"]), dec!(20));

    let (status, listed) = send(&app, get("/tickets?limit=1", Some(7))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"]["total"], 2);
    assert_eq!(listed["data"]["tickets"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_buy_ignores_client_batch_id_and_caps_quantity() {
    let h = Harness::new();
    h.top_up(7, dec!(100)).await;
    let app = h.runtime.router();
    let purchase = |quantity: u32| {
        post(
            "/tickets",
            Some(7),
            json!({
                "route_id": 1,
                "bus_name": "Harbour Express",
                "start_destination": "Central",
                "end_destination": "Harbour",
                "payment_method": "wallet",
                "quantity": quantity,
                "batch_id": "seed:7:100"
            }),
        )
    };

    let (status, body) = send(&app, purchase(11)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(&app, purchase(2)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let tracking_id = body["data"]["tracking_id"].as_str().unwrap().to_string();
    h.runtime.fulfillment_consumer().process_next().await.unwrap();

    let uri = format!("/ticket/status?tracking_id={tracking_id}");
    let (_, paid) = send(&app, get(&uri, None)).await;
    assert_eq!(paid["data"]["status"], "paid");
    let (_, balance) = send(&app, get("/wallet/balance", Some(7))).await;
    assert_eq!(decimal(&balance["data"]["balance"]), dec!(20));
}

#[tokio::test]
async fn test_unknown_tracking_id_is_not_found() {
    let h = Harness::new();
    let (status, body) = send(
        &h.runtime.router(),
        get("/ticket/status?tracking_id=nope", None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_ticket_of_another_user_is_forbidden() {
    let h = Harness::new();
    h.top_up(1, dec!(100)).await;
    let purchase = h
        .purchase(1, "Central", "Harbour", PaymentMethod::Wallet, 1)
        .await;
    let id = purchase.ticket_id.unwrap();
    let app = h.runtime.router();

    let (status, _) = send(&app, get(&format!("/tickets/{id}"), Some(2))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, post(&format!("/tickets/{id}/cancel"), Some(2), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, post(&format!("/tickets/{id}/cancel"), Some(1), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["refund"]), dec!(40));
}

#[tokio::test]
async fn test_check_ticket_over_http() {
    let h = Harness::new();
    h.top_up(1, dec!(100)).await;
    let purchase = h
        .purchase(1, "Central", "Harbour", PaymentMethod::Wallet, 1)
        .await;
    let (status, ticket) = send(
        &h.runtime.router(),
        get(&format!("/tickets/{}", purchase.ticket_id.unwrap()), Some(1)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let qr_code = ticket["data"]["qr_code"].as_str().unwrap().to_string();
    let app = h.runtime.router();

    let check = json!({
        "qr_code": qr_code,
        "route_id": 1,
        "current_stoppage": {"name": "Market", "order": 3}
    });
    let (status, body) = send(&app, post("/bus/check-ticket", None, check.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "valid");

    let (status, body) = send(&app, post("/bus/check-ticket", None, check)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "already checked");
}

#[tokio::test]
async fn test_validate_requires_bus_identity() {
    let h = Harness::new();
    let request = post("/bus/validate-ticket", None, json!({"ticket_id": 1}));
    let (status, _) = send(&h.runtime.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_gateway_success_callback_renders_page() {
    let h = Harness::new();
    let purchase = h
        .purchase(3, "Harbour", "Depot", PaymentMethod::Gateway, 1)
        .await;
    let id = purchase.ticket_id.unwrap();
    let app = h.runtime.router();

    let (_, ticket) = send(&app, get(&format!("/tickets/{id}"), Some(3))).await;
    let reference = ticket["data"]["payment_reference"].as_str().unwrap().to_string();
    let session = h.gateway.session(&reference).await.unwrap();

    let (status, page) = send_raw(
        &app,
        get(
            &format!(
                "/ticket/payment/success?id={id}&val_id={}&amount=49",
                session.validation_id
            ),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(page.contains("Payment not processed"));

    let (status, page) = send_raw(
        &app,
        get(
            &format!(
                "/ticket/payment/success?id={id}&val_id={}&amount=50",
                session.validation_id
            ),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("Payment successful"));

    let (_, payment) = send(&app, get(&format!("/ticket/status?id={id}"), None)).await;
    assert_eq!(payment["data"]["status"], "paid");
}

#[tokio::test]
async fn test_empty_check_event_batch_is_rejected() {
    let h = Harness::new();
    let (status, body) = send(
        &h.runtime.router(),
        post("/bus/check-events", None, json!([])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
