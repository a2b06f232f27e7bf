//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use midtrans_tools::TransactionNotification;
use vending_engine::{
    db_types::OrderId,
    order_objects::{NewMultiOrderRequest, NewOrderRequest, Pagination},
    payment_objects::ConfirmationSource,
    traits::{CommandPublisher, DispenseManagement, OrderManagement, PaymentGateway, StockManagement},
    OrderFlowApi,
    OrderFlowError,
    StockLedgerApi,
};

use crate::{
    data_objects::{
        DispenseConfirmParams,
        OrderListParams,
        PaymentMethodParams,
        StockLogParams,
        StockUpdateParams,
        TriggerDispenseParams,
        WebhookResponse,
    },
    errors::ServerError,
    integrations::midtrans::{notification_to_transaction, NotificationVerifier},
};

/// The database backend the order routes need.
pub trait OrderBackend: OrderManagement + DispenseManagement {}

impl<T: OrderManagement + DispenseManagement> OrderBackend for T {}

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Creates a single-item order for the configured machine and registers its checkout with the payment gateway.
///
/// Responds with `201 Created` and the payment handle. A missing or inactive slot is a 404; insufficient stock or an
/// inactive product is a 400.
pub async fn create_order<B, G, P>(
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let request = body.into_inner();
    debug!("💻️ POST create order for slot {}", request.slot_id);
    let created = api.create_order(request).await?;
    Ok(HttpResponse::Created().json(created))
}

route!(create_multi_order => Post "/orders/multi" impl OrderBackend, PaymentGateway, CommandPublisher);
pub async fn create_multi_order<B, G, P>(
    body: web::Json<NewMultiOrderRequest>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let request = body.into_inner();
    debug!("💻️ POST create order with {} items", request.items.len());
    let created = api.create_multi_order(request).await?;
    Ok(HttpResponse::Created().json(created))
}

route!(orders_for_machine => Get "/orders/machine/{machine_id}" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Lists a machine's orders, newest first. Accepts `status`, `limit` and `offset` query parameters.
pub async fn orders_for_machine<B, G, P>(
    path: web::Path<String>,
    query: web::Query<OrderListParams>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let machine_id = path.into_inner();
    let status = query.status().map_err(ServerError::InvalidQuery)?;
    debug!("💻️ GET orders for machine {machine_id}");
    let orders = api.orders_for_machine(&machine_id, status, query.pagination()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_id => Get "/orders/{order_id}" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Fetches an order with its items and payment. An unpaid order past its expiry time is failed on the way out.
pub async fn order_by_id<B, G, P>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET order {order_id}");
    let order = api.fetch_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(payment_webhook => Post "/payments/webhook" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Receives the payment gateway's HTTP notifications.
///
/// The notification is a trigger only: the gateway's status API has the final word on the payment. Once the
/// notification is accepted, the gateway always gets a `200`, even if dispensing fails afterwards, since a retried
/// notification cannot fix a problem on our side. The exceptions are malformed notifications (400), bad signatures
/// (401) and database failures (500).
pub async fn payment_webhook<B, G, P>(
    body: web::Json<TransactionNotification>,
    api: web::Data<OrderFlowApi<B, G, P>>,
    verifier: web::Data<NotificationVerifier>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let notification = body.into_inner();
    let transaction = notification_to_transaction(&notification).ok_or_else(|| {
        ServerError::InvalidRequestBody("The notification must carry order_id and transaction_status".into())
    })?;
    let order_ref = transaction.order_ref.clone();
    info!("💻️ Payment notification for {order_ref}: {}", transaction.transaction_status);
    let signature_verified = verifier.verify(&notification).map_err(|e| {
        warn!("💻️ Rejecting payment notification for {order_ref}. {e}");
        ServerError::InvalidSignature
    })?;
    let Some(order_id) = api.resolve_gateway_ref(&order_ref).await? else {
        warn!("💻️ Payment notification for unknown order {order_ref} ignored");
        return Ok(HttpResponse::Ok().json(WebhookResponse::ok("Unknown order, notification ignored")));
    };
    let source = ConfirmationSource::Webhook { notification: transaction, signature_verified };
    match api.confirm_payment(&order_id, source).await {
        Ok(confirmation) => {
            debug!("💻️ Order {order_id} is {} after the notification", confirmation.order.status);
        },
        Err(OrderFlowError::DatabaseError(e)) => {
            error!("💻️ Database error while processing the notification for {order_id}. {e}");
            return Err(ServerError::BackendError(e));
        },
        Err(e) => {
            warn!("💻️ Payment notification for {order_id} was accepted, but could not be applied. {e}");
        },
    }
    Ok(HttpResponse::Ok().json(WebhookResponse::ok("Webhook processed successfully")))
}

route!(verify_payment => Post "/payments/verify/{order_id}" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Asks the payment gateway for the state of the order's payment and applies it. Nothing the client says about the
/// payment is trusted, so a gateway outage is a 503 and leaves the order untouched.
pub async fn verify_payment<B, G, P>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ POST verify payment for {order_id}");
    let confirmation = api.confirm_payment(&order_id, ConfirmationSource::ManualVerify).await?;
    Ok(HttpResponse::Ok().json(confirmation))
}

route!(payment_by_order => Get "/payments/{order_id}" impl OrderBackend, PaymentGateway, CommandPublisher);
pub async fn payment_by_order<B, G, P>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET payment for {order_id}");
    let payment = api.fetch_payment(&order_id).await?;
    Ok(HttpResponse::Ok().json(payment))
}

route!(change_payment_method => Patch "/payments/method/{order_id}" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Registers a new checkout for an unpaid order with a different payment method.
pub async fn change_payment_method<B, G, P>(
    path: web::Path<String>,
    body: web::Json<PaymentMethodParams>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let order_id = OrderId::from(path.into_inner());
    let method = body.into_inner().payment_method;
    debug!("💻️ PATCH payment method of {order_id} to {method}");
    let change = api.change_payment_method(&order_id, method).await?;
    Ok(HttpResponse::Ok().json(change))
}

//----------------------------------------------   Dispense  ----------------------------------------------------
route!(trigger_dispense => Post "/dispense/trigger" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Sends the dispense commands of a paid order, or re-sends them for an order waiting in `PENDING_DISPENSE`.
pub async fn trigger_dispense<B, G, P>(
    body: web::Json<TriggerDispenseParams>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let order_id = body
        .into_inner()
        .order_id
        .parse::<OrderId>()
        .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    info!("💻️ POST trigger dispense for {order_id}");
    let outcome = api.trigger_dispense(&order_id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(confirm_dispense => Post "/dispense/confirm" impl OrderBackend, PaymentGateway, CommandPublisher);
/// Applies a dispense result delivered over HTTP. The result is attributed to the machine the order belongs to.
pub async fn confirm_dispense<B, G, P>(
    body: web::Json<DispenseConfirmParams>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let params = body.into_inner();
    debug!("💻️ POST dispense result for {:?}, slot {:?}", params.order_id, params.slot_number);
    let outcome = api.confirm_dispense(params.into()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "order": outcome.order,
        "dispense_log": outcome.log,
        "stock_entry": outcome.stock_entry,
    })))
}

route!(dispense_status => Get "/dispense/status/{order_id}" impl OrderBackend, PaymentGateway, CommandPublisher);
/// The latest dispense attempt of an order, with the order's status.
pub async fn dispense_status<B, G, P>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let order_id = OrderId::from(path.into_inner());
    trace!("💻️ GET dispense status for {order_id}");
    let status = api.dispense_status(&order_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

route!(dispense_logs => Get "/dispense/logs/{machine_id}" impl OrderBackend, PaymentGateway, CommandPublisher);
pub async fn dispense_logs<B, G, P>(
    path: web::Path<String>,
    query: web::Query<Pagination>,
    api: web::Data<OrderFlowApi<B, G, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderBackend,
    G: PaymentGateway,
    P: CommandPublisher,
{
    let machine_id = path.into_inner();
    trace!("💻️ GET dispense logs for {machine_id}");
    let logs = api.fetch_dispense_logs(&machine_id, query.into_inner().normalized()).await?;
    Ok(HttpResponse::Ok().json(logs))
}

//----------------------------------------------   Stock  ----------------------------------------------------
route!(update_stock => Post "/stock/update" impl StockManagement);
/// Applies an operator stock change through the ledger.
///
/// A stale `expected_current_stock` is a `409 Conflict` carrying the live value. Retries (same `request_id`, or an
/// identical request within the dedup window) return the original entry with `is_duplicate` set.
pub async fn update_stock<B: StockManagement>(
    body: web::Json<StockUpdateParams>,
    api: web::Data<StockLedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    debug!("💻️ POST stock update for slot {}: {} {}", params.slot_id, params.change_type, params.quantity);
    let outcome = api.update_stock(params.into()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(stock_logs => Get "/stock/logs/{machine_id}" impl StockManagement);
pub async fn stock_logs<B: StockManagement>(
    path: web::Path<String>,
    query: web::Query<StockLogParams>,
    api: web::Data<StockLedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let machine_id = path.into_inner();
    trace!("💻️ GET stock logs for {machine_id}");
    let logs = api.stock_logs(query.into_inner().into_filter(&machine_id)).await?;
    Ok(HttpResponse::Ok().json(logs))
}

route!(stock_report => Post "/stock/report/{machine_id}" impl StockManagement);
/// A machine's periodic stock report. Every slot gets a zero-change `AUDIT` entry and the machine is marked as seen.
pub async fn stock_report<B: StockManagement>(
    path: web::Path<String>,
    api: web::Data<StockLedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let machine_id = path.into_inner();
    debug!("💻️ POST stock report from {machine_id}");
    let receipt = api.record_stock_report(&machine_id).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

route!(stock_levels => Get "/stock/{machine_id}" impl StockManagement);
/// The stock of every slot of a machine, with fill levels and a summary.
pub async fn stock_levels<B: StockManagement>(
    path: web::Path<String>,
    api: web::Data<StockLedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let machine_id = path.into_inner();
    trace!("💻️ GET stock levels for {machine_id}");
    let report = api.stock_levels(&machine_id).await?;
    Ok(HttpResponse::Ok().json(report))
}
