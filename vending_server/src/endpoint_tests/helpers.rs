use std::time::Duration;

use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use log::debug;
use serde_json::Value;
use vending_engine::{
    db_types::Rupiah,
    test_utils::prepare_env::{prepare_test_env, random_db_path, seed_machine, seed_product, seed_slot},
    OrderFlowApi,
    OrderFlowConfig,
    SqliteDatabase,
    StockLedgerApi,
};

use super::mocks::{MockGateway, MockPublisher};
use crate::{
    integrations::midtrans::NotificationVerifier,
    routes::{
        ChangePaymentMethodRoute,
        ConfirmDispenseRoute,
        CreateMultiOrderRoute,
        CreateOrderRoute,
        DispenseLogsRoute,
        DispenseStatusRoute,
        OrderByIdRoute,
        OrdersForMachineRoute,
        PaymentByOrderRoute,
        PaymentWebhookRoute,
        StockLevelsRoute,
        StockLogsRoute,
        StockReportRoute,
        TriggerDispenseRoute,
        UpdateStockRoute,
        VerifyPaymentRoute,
    },
};

pub const SERVER_KEY: &str = "SB-Mid-server-endpoint-tests";

pub type TestOrderApi = OrderFlowApi<SqliteDatabase, MockGateway, MockPublisher>;

/// A fresh database holding machine `VM01` with a stocked water slot (1) and coffee slot (2).
pub struct TestEnv {
    pub db: SqliteDatabase,
    pub water_slot: i64,
    pub coffee_slot: i64,
}

impl TestEnv {
    pub async fn new() -> Self {
        let _ = env_logger::try_init().ok();
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        seed_machine(&db, "VM01").await;
        let water = seed_product(&db, "Mineral Water", Rupiah::from(5000)).await;
        let coffee = seed_product(&db, "Canned Coffee", Rupiah::from(9000)).await;
        let water_slot = seed_slot(&db, "VM01", 1, Some(water), 10, 5).await;
        let coffee_slot = seed_slot(&db, "VM01", 2, Some(coffee), 8, 3).await;
        Self { db, water_slot, coffee_slot }
    }

    pub fn order_api(&self, gateway: MockGateway, publisher: MockPublisher) -> web::Data<TestOrderApi> {
        let config = OrderFlowConfig { inter_item_delay: Duration::ZERO, ..Default::default() };
        web::Data::new(OrderFlowApi::new(self.db.clone(), gateway, publisher, config))
    }

    pub fn stock_api(&self) -> web::Data<StockLedgerApi<SqliteDatabase>> {
        web::Data::new(StockLedgerApi::new(self.db.clone()))
    }
}

pub fn verifier() -> NotificationVerifier {
    NotificationVerifier::new(SERVER_KEY.to_string().into(), true)
}

/// Registers the order, payment and dispense routes against `api`.
pub fn order_routes(api: web::Data<TestOrderApi>, verifier: NotificationVerifier) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(api)
            .app_data(web::Data::new(verifier))
            .service(CreateOrderRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(CreateMultiOrderRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(OrdersForMachineRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(OrderByIdRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(PaymentWebhookRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(VerifyPaymentRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(PaymentByOrderRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(ChangePaymentMethodRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(TriggerDispenseRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(ConfirmDispenseRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(DispenseStatusRoute::<SqliteDatabase, MockGateway, MockPublisher>::new())
            .service(DispenseLogsRoute::<SqliteDatabase, MockGateway, MockPublisher>::new());
    }
}

pub fn stock_routes(api: web::Data<StockLedgerApi<SqliteDatabase>>) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(api)
            .service(UpdateStockRoute::<SqliteDatabase>::new())
            .service(StockLogsRoute::<SqliteDatabase>::new())
            .service(StockReportRoute::<SqliteDatabase>::new())
            .service(StockLevelsRoute::<SqliteDatabase>::new());
    }
}

/// Sends `req` to an app configured by `configure`, and returns the status with the body parsed as JSON (`Null` if
/// the body is not JSON).
pub async fn send(req: TestRequest, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, Value) {
    let app = test::init_service(App::new().configure(configure)).await;
    debug!("Making request");
    let res = test::call_service(&app, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
