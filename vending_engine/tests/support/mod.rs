#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::json;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use vending_engine::{
    db_types::{OrderId, Rupiah},
    dispense_objects::{DispenseCommand, DispenseResultPayload},
    payment_objects::{Checkout, CheckoutRequest, GatewayTransaction},
    test_utils::prepare_env::{prepare_test_env, random_db_path, seed_machine, seed_product, seed_slot},
    traits::{CommandPublisher, GatewayError, PaymentGateway},
    OrderFlowApi,
    OrderFlowConfig,
    SqliteDatabase,
    StockLedgerApi,
};

pub const MACHINE: &str = "VM01";

struct GatewayState {
    available: bool,
    has_transaction: bool,
    transaction_status: String,
    checkouts: Vec<CheckoutRequest>,
}

/// A payment gateway whose answers are set by the test.
#[derive(Clone)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        let state = GatewayState {
            available: true,
            has_transaction: true,
            transaction_status: "pending".into(),
            checkouts: Vec::new(),
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }
}

impl FakeGateway {
    pub fn set_available(&self, available: bool) {
        self.state.lock().unwrap().available = available;
    }

    /// Simulates a customer who never opened the payment page: the gateway knows no transaction for the order.
    pub fn set_has_transaction(&self, has_transaction: bool) {
        self.state.lock().unwrap().has_transaction = has_transaction;
    }

    pub fn set_status(&self, status: &str) {
        self.state.lock().unwrap().transaction_status = status.to_string();
    }

    pub fn settle(&self) {
        self.set_status("settlement");
    }

    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.state.lock().unwrap().checkouts.clone()
    }
}

pub fn notification(order_ref: &str, status: &str) -> GatewayTransaction {
    GatewayTransaction {
        order_ref: order_ref.to_string(),
        transaction_status: status.to_string(),
        fraud_status: Some("accept".into()),
        transaction_id: Some(format!("tx-{order_ref}")),
        payment_type: Some("qris".into()),
        gross_amount: None,
        raw: json!({"order_id": order_ref, "transaction_status": status}),
    }
}

impl PaymentGateway for FakeGateway {
    fn gateway_name(&self) -> String {
        "fake".to_string()
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if !state.available {
            return Err(GatewayError::Unavailable("fake gateway is down".into()));
        }
        state.checkouts.push(request.clone());
        Ok(Checkout {
            token: format!("tok-{}", request.order_ref),
            redirect_url: format!("https://pay.example.com/{}", request.order_ref),
        })
    }

    async fn transaction_status(&self, order_ref: &str) -> Result<GatewayTransaction, GatewayError> {
        let state = self.state.lock().unwrap();
        if !state.available {
            return Err(GatewayError::Unavailable("fake gateway is down".into()));
        }
        if !state.has_transaction {
            return Err(GatewayError::TransactionNotFound(order_ref.to_string()));
        }
        Ok(notification(order_ref, &state.transaction_status))
    }
}

struct PublisherState {
    connected: bool,
    sent: Vec<(String, DispenseCommand)>,
}

/// A messaging bridge that records the commands it is asked to publish.
#[derive(Clone)]
pub struct FakePublisher {
    state: Arc<Mutex<PublisherState>>,
}

impl Default for FakePublisher {
    fn default() -> Self {
        Self { state: Arc::new(Mutex::new(PublisherState { connected: true, sent: Vec::new() })) }
    }
}

impl FakePublisher {
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    pub fn sent(&self) -> Vec<(String, DispenseCommand)> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl CommandPublisher for FakePublisher {
    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn publish_dispense_command(&self, machine_id: &str, command: &DispenseCommand) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return false;
        }
        state.sent.push((machine_id.to_string(), command.clone()));
        true
    }
}

pub type TestFlowApi = OrderFlowApi<SqliteDatabase, FakeGateway, FakePublisher>;

pub struct TestSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: FakeGateway,
    pub publisher: FakePublisher,
    pub api: TestFlowApi,
    pub ledger: StockLedgerApi<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating connection to database");
        seed_machine(&db, MACHINE).await;
        let gateway = FakeGateway::default();
        let publisher = FakePublisher::default();
        let config = OrderFlowConfig {
            machine_id: MACHINE.to_string(),
            inter_item_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let api = OrderFlowApi::new(db.clone(), gateway.clone(), publisher.clone(), config);
        let ledger = StockLedgerApi::new(db.clone());
        Self { db_path, db, gateway, publisher, api, ledger }
    }

    /// Seeds a product at the given price in a new slot and returns the slot id.
    pub async fn stock_slot(&self, slot_number: i64, name: &str, price: i64, capacity: i64, stock: i64) -> i64 {
        let product = seed_product(&self.db, name, Rupiah::from(price)).await;
        seed_slot(&self.db, MACHINE, slot_number, Some(product), capacity, stock).await
    }

    pub async fn tear_down(self) {
        self.db.close().await;
        if let Err(e) = Sqlite::drop_database(&self.db_path).await {
            log::warn!("🚀️ Could not remove test database {}: {e}", self.db_path);
        }
    }
}

pub fn dispense_result(order_id: &OrderId, slot: i64, success: bool, drop_detected: bool) -> DispenseResultPayload {
    DispenseResultPayload {
        order_id: Some(order_id.to_string()),
        slot: Some(slot),
        success: Some(success),
        drop_detected: Some(drop_detected),
        duration_ms: Some(2100),
        error: (!success).then(|| "motor jammed".to_string()),
    }
}
