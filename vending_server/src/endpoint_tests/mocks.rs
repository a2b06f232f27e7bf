use mockall::mock;
use serde_json::json;
use vending_engine::{
    dispense_objects::DispenseCommand,
    payment_objects::{Checkout, CheckoutRequest, GatewayTransaction},
    traits::{CommandPublisher, GatewayError, PaymentGateway},
};

mock! {
    pub Gateway {}
    impl PaymentGateway for Gateway {
        fn gateway_name(&self) -> String;
        async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, GatewayError>;
        async fn transaction_status(&self, order_ref: &str) -> Result<GatewayTransaction, GatewayError>;
    }
}

mock! {
    pub Publisher {}
    impl CommandPublisher for Publisher {
        fn is_connected(&self) -> bool;
        async fn publish_dispense_command(&self, machine_id: &str, command: &DispenseCommand) -> bool;
    }
}

/// A gateway that hands out checkouts and reports every transaction as `status`.
pub fn gateway_reporting(status: &'static str) -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_gateway_name().returning(|| "mock".to_string());
    gateway.expect_create_checkout().returning(|req| {
        Ok(Checkout {
            token: format!("tok-{}", req.order_ref),
            redirect_url: format!("https://pay.example.com/{}", req.order_ref),
        })
    });
    gateway.expect_transaction_status().returning(move |order_ref| {
        Ok(GatewayTransaction {
            order_ref: order_ref.to_string(),
            transaction_status: status.to_string(),
            transaction_id: Some(format!("trx-{order_ref}")),
            payment_type: Some("qris".to_string()),
            raw: json!({ "order_id": order_ref, "transaction_status": status }),
            ..Default::default()
        })
    });
    gateway
}

pub fn settled_gateway() -> MockGateway {
    gateway_reporting("settlement")
}

/// A gateway that accepts checkouts but whose status API is down.
pub fn unreachable_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_gateway_name().returning(|| "mock".to_string());
    gateway.expect_create_checkout().returning(|req| {
        Ok(Checkout { token: format!("tok-{}", req.order_ref), redirect_url: String::new() })
    });
    gateway.expect_transaction_status().returning(|_| Err(GatewayError::Unavailable("connection refused".into())));
    gateway
}

pub fn connected_publisher() -> MockPublisher {
    let mut publisher = MockPublisher::new();
    publisher.expect_is_connected().return_const(true);
    publisher.expect_publish_dispense_command().returning(|_, _| true);
    publisher
}

pub fn disconnected_publisher() -> MockPublisher {
    let mut publisher = MockPublisher::new();
    publisher.expect_is_connected().return_const(false);
    publisher.expect_publish_dispense_command().returning(|_, _| false);
    publisher
}
