use actix_web::{http::StatusCode, test::TestRequest};
use midtrans_tools::helpers::notification_signature;
use serde_json::{json, Value};
use vending_engine::{
    db_types::{OrderId, OrderStatusType},
    order_objects::NewOrderRequest,
};

use super::{
    helpers::{order_routes, send, verifier, TestEnv, TestOrderApi, SERVER_KEY},
    mocks::{connected_publisher, disconnected_publisher, settled_gateway, unreachable_gateway},
};

async fn new_order(env: &TestEnv, api: &TestOrderApi) -> OrderId {
    let request = NewOrderRequest { slot_id: env.water_slot, quantity: None, customer_phone: None, payment_method: None };
    api.create_order(request).await.expect("Error creating order").order_id
}

fn notification(order_id: &str, status: &str, key: &str) -> Value {
    let signature = notification_signature(order_id, "200", "5000.00", key);
    json!({
        "order_id": order_id,
        "transaction_status": status,
        "transaction_id": "9aed5972-5b6a-401e-894b-a32c91ed1a3a",
        "payment_type": "qris",
        "status_code": "200",
        "gross_amount": "5000.00",
        "signature_key": signature,
    })
}

#[actix_web::test]
async fn signed_settlement_dispenses_the_order() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let order_id = new_order(&env, &api).await;

    let req = TestRequest::post()
        .uri("/payments/webhook")
        .set_json(notification(order_id.as_str(), "settlement", SERVER_KEY));
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["message"], "Webhook processed successfully");

    let order = api.fetch_order(&order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatusType::Dispensing);
    assert!(order.order.paid_at.is_some());
    env.db.close().await;
}

#[actix_web::test]
async fn webhook_rejects_bad_signatures() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let order_id = new_order(&env, &api).await;

    let req = TestRequest::post()
        .uri("/payments/webhook")
        .set_json(notification(order_id.as_str(), "settlement", "not-the-server-key"));
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid notification signature");

    let order = api.fetch_order(&order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatusType::Pending);
    env.db.close().await;
}

#[actix_web::test]
async fn webhook_needs_an_order_and_a_status() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let req = TestRequest::post().uri("/payments/webhook").set_json(json!({"transaction_status": "settlement"}));
    let (status, _) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post().uri("/payments/webhook").set_json(json!({"order_id": "ORD-20260107-B71EC06F"}));
    let (status, _) = send(req, order_routes(api, verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    env.db.close().await;
}

#[actix_web::test]
async fn webhook_for_unknown_orders_is_acknowledged() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .set_json(notification("ORD-20260107-00000000", "settlement", SERVER_KEY));
    let (status, body) = send(req, order_routes(api, verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Unknown order, notification ignored");
    env.db.close().await;
}

#[actix_web::test]
async fn verify_payment_needs_the_gateway() {
    let env = TestEnv::new().await;
    let api = env.order_api(unreachable_gateway(), connected_publisher());
    let order_id = new_order(&env, &api).await;

    let uri = format!("/payments/verify/{order_id}");
    let (status, body) = send(TestRequest::post().uri(&uri), order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("gateway"));

    let order = api.fetch_order(&order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatusType::Pending);
    env.db.close().await;
}

#[actix_web::test]
async fn verify_payment_parks_the_order_when_messaging_is_down() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), disconnected_publisher());
    let order_id = new_order(&env, &api).await;

    let uri = format!("/payments/verify/{order_id}");
    let (status, body) = send(TestRequest::post().uri(&uri), order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "SUCCESS");
    assert_eq!(body["dispense"]["result"], "deferred");
    assert_eq!(body["order"]["status"], "PENDING_DISPENSE");

    let uri = format!("/payments/{order_id}");
    let (status, body) = send(TestRequest::get().uri(&uri), order_routes(api, verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
    assert_eq!(body["transaction_status"], "settlement");
    assert!(body.get("raw_response").is_none());
    env.db.close().await;
}

#[actix_web::test]
async fn change_payment_method() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let order_id = new_order(&env, &api).await;

    let uri = format!("/payments/method/{order_id}");
    let req = TestRequest::patch().uri(&uri).set_json(json!({"payment_method": "gopay"}));
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_method"], "gopay");
    assert_ne!(body["gateway_order_ref"], order_id.as_str());

    let req = TestRequest::patch().uri(&uri).set_json(json!({"payment_method": "cash"}));
    let (status, _) = send(req, order_routes(api, verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    env.db.close().await;
}
