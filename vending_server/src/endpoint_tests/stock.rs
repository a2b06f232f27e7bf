use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;

use super::helpers::{send, stock_routes, TestEnv};

#[actix_web::test]
async fn restock_and_read_back() {
    let env = TestEnv::new().await;
    let api = env.stock_api();
    let update = json!({"slot_id": env.water_slot, "quantity": 3, "change_type": "RESTOCK", "performed_by": "budi"});
    let (status, body) = send(TestRequest::post().uri("/stock/update").set_json(update), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_duplicate"], false);
    assert_eq!(body["entry"]["quantity_before"], 5);
    assert_eq!(body["entry"]["quantity_after"], 8);
    assert_eq!(body["entry"]["performed_by"], "budi");
    assert_eq!(body["slot"]["current_stock"], 8);

    let (status, body) = send(TestRequest::get().uri("/stock/VM01"), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots"].as_array().unwrap().len(), 2);

    let req = TestRequest::get().uri("/stock/logs/VM01?change_type=RESTOCK");
    let (status, body) = send(req, stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["change_type"], "RESTOCK");

    let req = TestRequest::get().uri("/stock/logs/VM01?change_type=AUDIT");
    let (_, body) = send(req, stock_routes(api)).await;
    assert!(body.as_array().unwrap().is_empty());
    env.db.close().await;
}

#[actix_web::test]
async fn stale_expectations_conflict() {
    let env = TestEnv::new().await;
    let api = env.stock_api();
    let update =
        json!({"slot_id": env.water_slot, "quantity": 9, "change_type": "AUDIT", "expected_current_stock": 2});
    let (status, body) = send(TestRequest::post().uri("/stock/update").set_json(update), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["slot_id"], env.water_slot);
    assert_eq!(body["expected_current_stock"], 2);
    assert_eq!(body["current_stock"], 5);

    let slot = api.fetch_slot(env.water_slot).await.unwrap();
    assert_eq!(slot.current_stock, 5);
    env.db.close().await;
}

#[actix_web::test]
async fn retried_requests_are_not_applied_twice() {
    let env = TestEnv::new().await;
    let api = env.stock_api();
    let update =
        json!({"slot_id": env.coffee_slot, "quantity": 1, "change_type": "REMOVE", "request_id": "tablet-7f3a-0001"});
    let (status, first) =
        send(TestRequest::post().uri("/stock/update").set_json(update.clone()), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["slot"]["current_stock"], 2);

    let (status, second) = send(TestRequest::post().uri("/stock/update").set_json(update), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["is_duplicate"], true);
    assert_eq!(second["entry"]["id"], first["entry"]["id"]);
    assert_eq!(second["slot"]["current_stock"], 2);
    env.db.close().await;
}

#[actix_web::test]
async fn invalid_stock_updates() {
    let env = TestEnv::new().await;
    let api = env.stock_api();
    let update = json!({"slot_id": 4242, "quantity": 1, "change_type": "RESTOCK"});
    let (status, _) = send(TestRequest::post().uri("/stock/update").set_json(update), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let update = json!({"slot_id": env.water_slot, "quantity": -2, "change_type": "RESTOCK"});
    let (status, _) = send(TestRequest::post().uri("/stock/update").set_json(update), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let update = json!({"slot_id": env.water_slot, "quantity": 1, "change_type": "DISPENSE"});
    let (status, _) = send(TestRequest::post().uri("/stock/update").set_json(update), stock_routes(api)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    env.db.close().await;
}

#[actix_web::test]
async fn machine_stock_report_writes_an_audit_snapshot() {
    let env = TestEnv::new().await;
    let api = env.stock_api();
    let (status, body) = send(TestRequest::post().uri("/stock/report/VM01"), stock_routes(api.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["machine_id"], "VM01");
    assert_eq!(body["stock_count"], 2);
    let snapshot = body["stock_snapshot"].as_array().unwrap();
    assert_eq!(snapshot[0]["current_stock"], 5);
    assert_eq!(snapshot[1]["current_stock"], 3);

    let req = TestRequest::get().uri("/stock/logs/VM01?change_type=AUDIT");
    let (_, body) = send(req, stock_routes(api.clone())).await;
    let logs = body.as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l["quantity_change"] == 0));

    let slot = api.fetch_slot(env.water_slot).await.unwrap();
    assert_eq!(slot.current_stock, 5);

    let (status, _) = send(TestRequest::post().uri("/stock/report/VM99"), stock_routes(api)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    env.db.close().await;
}
