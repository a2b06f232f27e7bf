use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;
use vending_engine::{
    db_types::{OrderId, OrderStatusType},
    order_objects::NewOrderRequest,
    payment_objects::ConfirmationSource,
    StockLedgerApi,
};

use super::{
    helpers::{order_routes, send, verifier, TestEnv, TestOrderApi},
    mocks::{connected_publisher, disconnected_publisher, settled_gateway},
};

async fn paid_order(env: &TestEnv, api: &TestOrderApi) -> OrderId {
    let request = NewOrderRequest { slot_id: env.water_slot, quantity: None, customer_phone: None, payment_method: None };
    let order_id = api.create_order(request).await.expect("Error creating order").order_id;
    api.confirm_payment(&order_id, ConfirmationSource::ManualVerify).await.expect("Error confirming payment");
    order_id
}

#[actix_web::test]
async fn trigger_dispense_requires_a_paid_order() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let request = NewOrderRequest { slot_id: env.water_slot, quantity: None, customer_phone: None, payment_method: None };
    let order_id = api.create_order(request).await.unwrap().order_id;

    let req = TestRequest::post().uri("/dispense/trigger").set_json(json!({"order_id": order_id}));
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["order_id"], order_id.as_str());

    let req = TestRequest::post().uri("/dispense/trigger").set_json(json!({"order_id": ""}));
    let (status, _) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post().uri("/dispense/trigger").set_json(json!({"order_id": "ORD-20260107-00000000"}));
    let (status, _) = send(req, order_routes(api, verifier())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    env.db.close().await;
}

#[actix_web::test]
async fn trigger_dispense_without_messaging_keeps_the_order_waiting() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), disconnected_publisher());
    let order_id = paid_order(&env, &api).await;

    let req = TestRequest::post().uri("/dispense/trigger").set_json(json!({"order_id": order_id}));
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "PENDING_DISPENSE");
    assert_eq!(body["order_id"], order_id.as_str());

    let order = api.fetch_order(&order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatusType::PendingDispense);
    env.db.close().await;
}

#[actix_web::test]
async fn confirmed_dispense_completes_the_order() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let order_id = paid_order(&env, &api).await;

    let result = json!({"order_id": order_id, "slot_number": 1, "success": true, "drop_detected": true, "duration_ms": 2100});
    let req = TestRequest::post().uri("/dispense/confirm").set_json(result);
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], "COMPLETED");
    assert_eq!(body["dispense_log"]["success"], true);
    assert_eq!(body["stock_entry"]["quantity_before"], 5);
    assert_eq!(body["stock_entry"]["quantity_after"], 4);
    assert_eq!(body["stock_entry"]["change_type"], "DISPENSE");

    let slot = StockLedgerApi::new(env.db.clone()).fetch_slot(env.water_slot).await.unwrap();
    assert_eq!(slot.current_stock, 4);

    let (status, body) =
        send(TestRequest::get().uri("/dispense/logs/VM01?limit=10"), order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["order_id"], order_id.as_str());
    assert_eq!(logs[0]["duration_ms"], 2100);
    env.db.close().await;
}

#[actix_web::test]
async fn confirm_dispense_rejects_malformed_results() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let order_id = paid_order(&env, &api).await;

    let req = TestRequest::post().uri("/dispense/confirm").set_json(json!({"order_id": order_id, "success": true}));
    let (status, _) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let slot = StockLedgerApi::new(env.db.clone()).fetch_slot(env.water_slot).await.unwrap();
    assert_eq!(slot.current_stock, 5);

    let req = TestRequest::post()
        .uri("/dispense/confirm")
        .set_json(json!({"order_id": order_id, "slot_number": 2, "success": true, "drop_detected": true}));
    let (status, _) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = api.fetch_order(&order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatusType::Dispensing);
    env.db.close().await;
}

#[actix_web::test]
async fn results_for_unpaid_orders_are_rejected() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let request = NewOrderRequest { slot_id: env.water_slot, quantity: None, customer_phone: None, payment_method: None };
    let order_id = api.create_order(request).await.unwrap().order_id;

    let result = json!({"order_id": order_id, "slot_number": 1, "success": true, "drop_detected": true});
    let req = TestRequest::post().uri("/dispense/confirm").set_json(result);
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "PENDING");

    let slot = StockLedgerApi::new(env.db.clone()).fetch_slot(env.water_slot).await.unwrap();
    assert_eq!(slot.current_stock, 5);
    env.db.close().await;
}

#[actix_web::test]
async fn dispense_status_reports_the_latest_attempt() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let request = NewOrderRequest { slot_id: env.water_slot, quantity: None, customer_phone: None, payment_method: None };
    let unpaid = api.create_order(request).await.unwrap().order_id;
    let uri = format!("/dispense/status/{unpaid}");
    let (status, body) = send(TestRequest::get().uri(&uri), order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("No dispense"));

    let order_id = paid_order(&env, &api).await;
    let uri = format!("/dispense/status/{order_id}");
    let (status, body) = send(TestRequest::get().uri(&uri), order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], order_id.as_str());
    assert_eq!(body["order_status"], "DISPENSING");
    assert_eq!(body["slot_number"], 1);
    assert!(body["success"].is_null());
    env.db.close().await;
}
