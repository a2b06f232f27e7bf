use std::{sync::Arc, time::Duration};

use actix_web::{
    dev::{Server, ServiceResponse},
    http::{header::ContentType, KeepAlive, StatusCode},
    middleware::{Condition, ErrorHandlerResponse, ErrorHandlers, Logger},
    web,
    App,
    HttpResponse,
    HttpServer,
};
use log::info;
use midtrans_tools::MidtransApi;
use serde_json::json;
use vending_engine::{MachineApi, OrderFlowApi, SqliteDatabase, StockLedgerApi};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::midtrans::{MidtransGateway, NotificationVerifier},
    mqtt::{spawn_dispatcher, MessageRouter, MqttBridge},
    routes::{
        health,
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

pub type ServerOrderApi = OrderFlowApi<SqliteDatabase, MidtransGateway, MqttBridge>;

/// Everything the HTTP workers share. Each value is created once, so that every worker sees the same order locks and
/// the same broker connection.
#[derive(Clone)]
pub struct ServerState {
    pub orders: Arc<ServerOrderApi>,
    pub stock: Arc<StockLedgerApi<SqliteDatabase>>,
    pub verifier: Arc<NotificationVerifier>,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    let api = MidtransApi::new(config.midtrans.api.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the Midtrans client. {e}")))?;
    let gateway = MidtransGateway::new(api);
    let verifier = if config.midtrans.verify_signature {
        NotificationVerifier::new(config.midtrans.api.server_key.clone(), true)
    } else {
        NotificationVerifier::disabled()
    };

    let (bridge, inbound) = if config.mqtt.enabled {
        let (bridge, rx) = MqttBridge::start(&config.mqtt, &config.machine_id);
        (bridge, Some(rx))
    } else {
        (MqttBridge::offline(), None)
    };

    let ledger = StockLedgerApi::new(db.clone()).with_dedup_window(config.stock_dedup_window);
    let orders = Arc::new(OrderFlowApi::new(db.clone(), gateway, bridge.clone(), config.order_flow_config()));
    let machines = Arc::new(
        MachineApi::new(db.clone(), ledger.clone()).with_telemetry_stock_sync(config.telemetry_stock_sync),
    );
    let dispatcher = inbound.map(|rx| {
        let router = MessageRouter::new(&config.machine_id, orders.clone(), machines);
        spawn_dispatcher(router, rx)
    });

    let state = ServerState { orders, stock: Arc::new(ledger), verifier: Arc::new(verifier) };
    let srv = create_server_instance(config, state)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));

    info!("🚀️ Server stopped. Shutting down");
    bridge.disconnect().await;
    if let Some(handle) = dispatcher {
        handle.abort();
    }
    db.close().await;
    result
}

pub fn create_server_instance(config: ServerConfig, state: ServerState) -> Result<Server, ServerError> {
    let mask_errors = config.environment.is_production();
    let srv = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into());
        let query_config =
            web::QueryConfig::default().error_handler(|err, _req| ServerError::InvalidQuery(err.to_string()).into());
        let path_config =
            web::PathConfig::default().error_handler(|err, _req| ServerError::InvalidRequestPath(err.to_string()).into());
        App::new()
            .wrap(Condition::new(
                mask_errors,
                ErrorHandlers::new().handler(StatusCode::INTERNAL_SERVER_ERROR, mask_internal_error),
            ))
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vm::access_log"))
            .app_data(json_config)
            .app_data(query_config)
            .app_data(path_config)
            .app_data(web::Data::from(state.orders.clone()))
            .app_data(web::Data::from(state.stock.clone()))
            .app_data(web::Data::from(state.verifier.clone()))
            .service(health)
            .service(CreateOrderRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(CreateMultiOrderRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(OrdersForMachineRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(OrderByIdRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(PaymentWebhookRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(VerifyPaymentRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(PaymentByOrderRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(ChangePaymentMethodRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(TriggerDispenseRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(ConfirmDispenseRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(DispenseStatusRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(DispenseLogsRoute::<SqliteDatabase, MidtransGateway, MqttBridge>::new())
            .service(UpdateStockRoute::<SqliteDatabase>::new())
            .service(StockLogsRoute::<SqliteDatabase>::new())
            .service(StockReportRoute::<SqliteDatabase>::new())
            .service(StockLevelsRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Replaces the body of a 500 response, so that internal details do not leak to clients in production.
fn mask_internal_error<B>(res: ServiceResponse<B>) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let (req, _) = res.into_parts();
    let body = json!({ "error": "Internal server error" }).to_string();
    let res = HttpResponse::InternalServerError().insert_header(ContentType::json()).body(body);
    Ok(ErrorHandlerResponse::Response(ServiceResponse::new(req, res).map_into_right_body()))
}
