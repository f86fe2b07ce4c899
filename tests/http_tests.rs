mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use checkout_api::models::transaction::TransactionStatus;
use checkout_api::models::user::Claims;
use checkout_api::routes;
use common::{stk_success, Harness, JWT_SECRET};

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn bearer(user_id: Uuid) -> String {
    let claims = Claims {
        user_id: user_id.to_string(),
        email: None,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_ref())).unwrap();
    format!("Bearer {}", token)
}

#[tokio::test]
async fn callback_always_acknowledges() {
    let h = Harness::new();
    let app = routes::app(h.state.clone());
    let ack = json!({ "ResultCode": 0, "ResultDesc": "Success" });

    let orphan = stk_success("ws_nobody", "mr_nobody", "QZZ9", 254700000000);
    let (status, body) = send(app.clone(), post_json("/payments/callback", &orphan)).await;
    assert_eq!((status, &body), (StatusCode::OK, &ack));

    let garbage = Request::post("/payments/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app.clone(), garbage).await;
    assert_eq!((status, &body), (StatusCode::OK, &ack));

    let (status, body) = send(app, post_json("/payments/callback", &json!({"foo": 1}))).await;
    assert_eq!((status, &body), (StatusCode::OK, &ack));
}

#[tokio::test]
async fn initiate_then_callback_then_poll() {
    let h = Harness::new();
    let user = h.seed_user("254712345678").await;
    let app = routes::app(h.state.clone());

    let request = Request::post("/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, bearer(user.id))
        .body(Body::from(
            json!({ "phoneNumber": "254712345678", "amount": 500, "accountReference": "Cart" }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["correlationId"], "ws_001");
    assert_eq!(body["merchantRequestId"], "mr_001");
    assert_eq!(body["CheckoutRequestID"], "ws_001");

    let (_, body) = send(app.clone(), get("/transactions/status?correlationId=ws_001")).await;
    assert_eq!(body["status"], "pending");

    let callback = stk_success("ws_001", "mr_001", "QAA1B2C3", 254712345678);
    send(app.clone(), post_json("/payments/callback", &callback)).await;

    let (status, body) = send(app, get("/transactions/status?checkoutRequestId=ws_001")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["mpesaReceipt"], "QAA1B2C3");
    assert_eq!(body["userId"], user.id.to_string());

    let rows = h.store.transactions().await;
    assert_eq!(rows[0].status, TransactionStatus::Completed);
}

#[tokio::test]
async fn status_for_unknown_id_is_pending_and_missing_id_is_rejected() {
    let h = Harness::new();
    let app = routes::app(h.state.clone());

    let (status, body) = send(app.clone(), get("/transactions/status?correlationId=ws_unknown")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (status, body) = send(app, get("/transactions/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn payment_validation_and_availability() {
    let h = Harness::new();
    let app = routes::app(h.state.clone());

    let (status, _) = send(app.clone(), post_json("/payments", &json!({ "amount": 100 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app.clone(), post_json("/payments", &json!({ "phoneNumber": "254712345678" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app,
        post_json("/payments", &json!({ "phoneNumber": "254712345678", "amount": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let disabled = Harness::without_provider();
    let (status, body) = send(
        routes::app(disabled.state.clone()),
        post_json("/payments", &json!({ "phoneNumber": "254712345678", "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn provider_auth_failure_is_a_bad_gateway() {
    let h = Harness::new();
    h.provider.fail_auth.store(true, std::sync::atomic::Ordering::SeqCst);

    let (status, body) = send(
        routes::app(h.state.clone()),
        post_json("/payments", &json!({ "phoneNumber": "254712345678", "amount": 100 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body["message"].as_str().unwrap().contains("401"));
    assert!(h.store.transactions().await.is_empty());
}

#[tokio::test]
async fn order_endpoint_status_codes() {
    let h = Harness::new();
    let user = h.seed_user("254712345678").await;
    let app = routes::app(h.state.clone());
    let tx = h.seed_initiated("ws_001", Some("mr_001"), "254712345678", Some(user.id)).await;

    let body = |transaction_id: String| {
        json!({
            "transactionId": transaction_id,
            "userId": user.id.to_string(),
            "cartItems": [{ "title": "Shea butter", "quantity": 2, "price": "KSh 250" }]
        })
    };

    let (status, _) = send(app.clone(), post_json("/orders", &json!({ "userId": user.id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app.clone(), post_json("/orders", &body("not-a-uuid".into()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app.clone(), post_json("/orders", &body(Uuid::new_v4().to_string()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app.clone(), post_json("/orders", &body(tx.id.to_string()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let callback = stk_success("ws_001", "mr_001", "QAA1B2C3", 254712345678);
    send(app.clone(), post_json("/payments/callback", &callback)).await;

    let (status, created) = send(app.clone(), post_json("/orders", &body(tx.id.to_string()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["order"]["totalAmount"], 500.0);
    assert_eq!(created["order"]["mpesaReceipt"], "QAA1B2C3");

    let (status, again) = send(app, post_json("/orders", &body(tx.id.to_string()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["order"]["orderNumber"], created["order"]["orderNumber"]);
}

#[tokio::test]
async fn oversized_cart_prices_do_not_take_the_server_down() {
    let h = Harness::new();
    let user = h.seed_user("254712345678").await;
    let app = routes::app(h.state.clone());
    let tx = h.seed_initiated("ws_001", Some("mr_001"), "254712345678", Some(user.id)).await;
    send(
        app.clone(),
        post_json("/payments/callback", &stk_success("ws_001", "mr_001", "QAA1B2C3", 254712345678)),
    )
    .await;

    let request = json!({
        "transactionId": tx.id.to_string(),
        "userId": user.id.to_string(),
        "cartItems": [
            { "title": "Huge", "quantity": 2, "price": "79228162514264337593543950335" },
            { "title": "Free sample", "quantity": 0, "price": "KSh 1,000" },
            { "title": "Shea butter", "quantity": 1, "price": "KSh 250" }
        ]
    });
    let (status, created) = send(app, post_json("/orders", &request)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["order"]["totalAmount"], 250.0);
}

#[tokio::test]
async fn operational_endpoints_respond() {
    let h = Harness::new();
    let app = routes::app(h.state.clone());

    let (status, body) = send(app.clone(), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
    assert_eq!(body["payments"], "scripted");

    let (status, body) = send(app, post_json("/ipn/bank-credit", &json!({ "amount": "100.00" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
}
