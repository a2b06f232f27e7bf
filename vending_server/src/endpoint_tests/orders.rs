use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;
use vending_engine::{db_types::OrderId, order_objects::NewOrderRequest, test_utils::prepare_env::expire_order};

use super::{
    helpers::{order_routes, send, verifier, TestEnv},
    mocks::{connected_publisher, settled_gateway},
};

#[actix_web::test]
async fn create_order() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let req = TestRequest::post().uri("/orders").set_json(json!({"slot_id": env.water_slot, "quantity": 2}));
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["total_amount"], 10000);
    assert_eq!(body["quantity"], 2);
    let order_id = body["order_id"].as_str().unwrap();
    assert!(order_id.starts_with("ORD-"));
    assert_eq!(body["payment_token"], format!("tok-{order_id}"));
    env.db.close().await;
}

#[actix_web::test]
async fn create_order_rejects_bad_slots_and_quantities() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());

    let req = TestRequest::post().uri("/orders").set_json(json!({"slot_id": 999}));
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"));

    let req = TestRequest::post().uri("/orders").set_json(json!({"slot_id": env.water_slot, "quantity": 6}));
    let (status, _) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post().uri("/orders").set_json(json!({"slot_id": env.water_slot, "quantity": 0}));
    let (status, _) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    env.db.close().await;
}

#[actix_web::test]
async fn create_multi_order() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let items = json!({"items": [
        {"slot_id": env.water_slot, "quantity": 1},
        {"slot_id": env.coffee_slot, "quantity": 2},
    ]});
    let req = TestRequest::post().uri("/orders/multi").set_json(items);
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["total_amount"], 23000);
    assert_eq!(body["quantity"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let req = TestRequest::post().uri("/orders/multi").set_json(json!({"items": []}));
    let (status, _) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    env.db.close().await;
}

#[actix_web::test]
async fn fetch_order_fails_expired_orders() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let request = NewOrderRequest { slot_id: env.water_slot, quantity: None, customer_phone: None, payment_method: None };
    let created = api.create_order(request).await.unwrap();

    let uri = format!("/orders/{}", created.order_id);
    let (status, body) = send(TestRequest::get().uri(&uri), order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], created.order_id.as_str());
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["payment"]["status"], "PENDING");

    expire_order(&env.db, created.order_id.as_str()).await;
    let (status, body) = send(TestRequest::get().uri(&uri), order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILED");

    let (status, _) = send(TestRequest::get().uri("/orders/ORD-20260107-00000000"), order_routes(api, verifier())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    env.db.close().await;
}

#[actix_web::test]
async fn orders_for_machine() {
    let env = TestEnv::new().await;
    let api = env.order_api(settled_gateway(), connected_publisher());
    let mut ids = Vec::<OrderId>::new();
    for slot_id in [env.water_slot, env.coffee_slot] {
        let request = NewOrderRequest { slot_id, quantity: None, customer_phone: None, payment_method: None };
        ids.push(api.create_order(request).await.unwrap().order_id);
    }

    let req = TestRequest::get().uri("/orders/machine/VM01?status=pending");
    let (status, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let req = TestRequest::get().uri("/orders/machine/VM01?limit=1");
    let (_, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let req = TestRequest::get().uri("/orders/machine/VM01?status=completed");
    let (_, body) = send(req, order_routes(api.clone(), verifier())).await;
    assert!(body.as_array().unwrap().is_empty());

    let req = TestRequest::get().uri("/orders/machine/VM01?status=teleported");
    let (status, body) = send(req, order_routes(api, verifier())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid query parameter"));
    env.db.close().await;
}
