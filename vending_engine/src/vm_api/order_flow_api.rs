use std::{collections::HashSet, fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        DispenseLog,
        NewOrder,
        NewOrderItem,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Payment,
        PaymentMethod,
        PaymentMethodUpdate,
        PaymentStatus,
        PaymentUpdate,
        StatusTransition,
    },
    dispense_objects::{
        DispenseCommand,
        DispensePolicy,
        DispenseResultOutcome,
        DispenseResultPayload,
        DispenseStatus,
        DispenseTarget,
        TriggerOutcome,
    },
    helpers::{gateway_order_ref, is_valid_phone_number, new_order_id},
    order_objects::{
        NewMultiOrderRequest,
        NewOrderRequest,
        OrderCreated,
        OrderDetails,
        OrderQueryFilter,
        Pagination,
        MAX_ITEMS_PER_ORDER,
        MAX_QUANTITY_PER_ITEM,
    },
    payment_objects::{
        CheckoutItem,
        CheckoutRequest,
        ConfirmationSource,
        DispenseAttempt,
        PaymentConfirmation,
        PaymentMethodChange,
    },
    traits::{
        CommandPublisher,
        DispenseManagement,
        GatewayError,
        OrderManagement,
        OrderManagementError,
        PaymentGateway,
    },
    OrderFlowError,
    OrderLocks,
};

pub const EXPIRED_NOTE: &str = "Order expired before payment";
pub const LATE_SETTLEMENT_NOTE: &str = "Payment settled after order failed; refund required";

#[derive(Debug, Clone)]
pub struct OrderFlowConfig {
    /// The machine this backend sells for. Order slots are resolved against it.
    pub machine_id: String,
    /// How long a customer has to pay before a pending order expires.
    pub order_timeout: Duration,
    /// The pause between consecutive dispense commands of a multi-item order.
    pub inter_item_delay: Duration,
    /// The motor run time sent for slots that do not configure their own.
    pub default_motor_duration_ms: i64,
    pub dispense_policy: DispensePolicy,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            machine_id: "VM01".to_string(),
            order_timeout: Duration::from_secs(15 * 60),
            inter_item_delay: Duration::from_millis(1000),
            default_motor_duration_ms: 2150,
            dispense_policy: DispensePolicy::default(),
        }
    }
}

/// `OrderFlowApi` is the order coordinator. It drives an order from creation through payment confirmation and
/// dispensing to completion.
///
/// Every operation that changes an order's status (payment confirmation, dispense triggering, hardware results and
/// lazy expiry) runs under that order's lock, so concurrent webhooks, manual verifications and machine reports for
/// the same order are applied one at a time. The database additionally refuses status changes whose precondition no
/// longer holds.
pub struct OrderFlowApi<B, G, P> {
    db: B,
    gateway: G,
    publisher: P,
    locks: OrderLocks,
    config: OrderFlowConfig,
}

impl<B, G, P> Debug for OrderFlowApi<B, G, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi (machine {}, {:?})", self.config.machine_id, self.locks)
    }
}

impl<B, G, P> OrderFlowApi<B, G, P> {
    pub fn new(db: B, gateway: G, publisher: P, config: OrderFlowConfig) -> Self {
        Self { db, gateway, publisher, locks: OrderLocks::new(), config }
    }

    pub fn config(&self) -> &OrderFlowConfig {
        &self.config
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<B, G, P> OrderFlowApi<B, G, P>
where
    B: OrderManagement + DispenseManagement,
    G: PaymentGateway,
    P: CommandPublisher,
{
    /// Creates a single-item order. See [`Self::create_multi_order`].
    pub async fn create_order(&self, request: NewOrderRequest) -> Result<OrderCreated, OrderFlowError> {
        self.create_multi_order(request.into()).await
    }

    /// Creates a `PENDING` order for one or more slots of this machine.
    ///
    /// Every slot must exist, be active, sell an active, priced product and hold enough stock for the requested
    /// quantity. Stock is not reserved; it is only decremented once the machine confirms the drop.
    ///
    /// A checkout is registered with the payment gateway before anything is stored. If the gateway cannot be reached,
    /// `PaymentGatewayUnavailable` is returned and no order exists.
    pub async fn create_multi_order(&self, request: NewMultiOrderRequest) -> Result<OrderCreated, OrderFlowError> {
        validate_order_request(&request)?;
        let customer_phone = request.customer_phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let payment_method = request.payment_method.unwrap_or_default();
        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            items.push(self.sale_item(item.slot_id, item.quantity).await?);
        }
        let now = Utc::now();
        let order_id = new_order_id(now);
        let checkout_request = CheckoutRequest {
            order_ref: order_id.to_string(),
            amount: items.iter().map(NewOrderItem::total).sum(),
            items: items.iter().map(checkout_item).collect(),
            payment_method,
            customer_phone: customer_phone.map(String::from),
        };
        let checkout = self.gateway.create_checkout(&checkout_request).await.map_err(|e| {
            warn!("🔄️💳️ Could not register a checkout for new order [{order_id}]. {e}");
            OrderFlowError::PaymentGatewayUnavailable(e.to_string())
        })?;
        let order = NewOrder {
            id: order_id.clone(),
            machine_id: self.config.machine_id.clone(),
            items,
            payment_method,
            customer_phone: customer_phone.map(String::from),
            payment_url: Some(checkout.redirect_url),
            payment_token: Some(checkout.token),
            gateway_name: self.gateway.gateway_name(),
            gateway_order_ref: order_id.to_string(),
            created_at: now,
            expires_at: now + self.order_timeout(),
        };
        let order = self.db.insert_order(order).await?;
        let items = self.db.fetch_order_items(&order.id).await?;
        info!(
            "🔄️ Order [{}] created for {} item(s) totalling {} via {}. Expires at {}",
            order.id, order.quantity, order.total_amount, order.payment_method, order.expires_at
        );
        Ok(OrderCreated::new(order, items))
    }

    /// Fetches an order with its items and payment. A `PENDING` order past its expiry is marked `FAILED` first.
    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<OrderDetails, OrderFlowError> {
        let order = self.expire_if_due(order_id).await?;
        let items = self.db.fetch_order_items(order_id).await?;
        let payment = self.db.fetch_payment(order_id).await?;
        Ok(OrderDetails { order, items, payment })
    }

    /// Fetches orders matching the filter, newest first. Expired pending orders in the result are marked `FAILED`.
    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let orders = self.db.search_orders(query).await?;
        let now = Utc::now();
        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            if order.is_expired(now) {
                result.push(self.expire_if_due(&order.id).await?);
            } else {
                result.push(order);
            }
        }
        Ok(result)
    }

    /// Fetches the orders placed on the given machine, optionally only those with the given status.
    pub async fn orders_for_machine(
        &self,
        machine_id: &str,
        status: Option<OrderStatusType>,
        pagination: Pagination,
    ) -> Result<Vec<Order>, OrderFlowError> {
        let mut query = OrderQueryFilter::default().with_machine_id(machine_id).with_pagination(pagination);
        if let Some(status) = status {
            query = query.with_status(status);
        }
        self.search_orders(query).await
    }

    pub async fn fetch_payment(&self, order_id: &OrderId) -> Result<Payment, OrderFlowError> {
        self.db.fetch_payment(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    /// Resolves a gateway order reference (the original order id, or a reference issued by a payment method change)
    /// back to the order id.
    pub async fn resolve_gateway_ref(&self, gateway_ref: &str) -> Result<Option<OrderId>, OrderFlowError> {
        Ok(self.db.fetch_order_id_for_gateway_ref(gateway_ref).await?)
    }

    /// Confirms an order's payment against the payment gateway, and dispenses the order if it is paid.
    ///
    /// The gateway's status API is always asked first; a notification's own claim only counts if the gateway cannot
    /// be reached and the notification's signature was verified. The payment record is updated with the gateway's
    /// verdict and the order status follows it:
    /// * a pending order becomes `PAID` on a successful payment and `FAILED` on a failed one,
    /// * a pending order whose payment is still open after the expiry time becomes `FAILED`,
    /// * a settlement for an order that already failed leaves it `FAILED`, but flags it for a refund.
    ///
    /// If the gateway has no transaction for the order yet (the customer has not opened the payment page), the
    /// payment is still open: the order is only failed if it has expired.
    ///
    /// Confirming an order that is already paid is idempotent, apart from re-attempting its dispense. A dispense that
    /// cannot be started never rolls back the payment; the order waits in `PENDING_DISPENSE` instead.
    pub async fn confirm_payment(
        &self,
        order_id: &OrderId,
        source: ConfirmationSource,
    ) -> Result<PaymentConfirmation, OrderFlowError> {
        let _guard = self.locks.lock(order_id).await;
        let source_name = source.name();
        let order = self.fetch_order_record(order_id).await?;
        let payment = self.fetch_payment(order_id).await?;
        let transaction = match self.gateway.transaction_status(&payment.gateway_order_ref).await {
            Ok(tx) => tx,
            Err(GatewayError::TransactionNotFound(_)) => {
                debug!("🔄️💳️ The gateway has no transaction for order [{order_id}] yet. Payment is still open.");
                let order = self.expire_locked(order_id).await?;
                let payment_status = payment.status;
                let dispense = DispenseAttempt::NotAttempted;
                return Ok(PaymentConfirmation { order, payment, payment_status, dispense });
            },
            Err(e) => match source {
                ConfirmationSource::Webhook { notification, signature_verified: true } => {
                    warn!(
                        "🔄️💳️ Could not re-check payment for order [{order_id}] with the gateway ({e}). Using the \
                         signed notification instead."
                    );
                    notification
                },
                _ => {
                    warn!("🔄️💳️ Could not check payment for order [{order_id}] with the gateway. {e}");
                    return Err(OrderFlowError::PaymentGatewayUnavailable(e.to_string()));
                },
            },
        };
        let payment_status = transaction.payment_status();
        let now = Utc::now();
        let (transition, note) = payment_transition(&order, payment_status, &transaction.transaction_status, now);
        if order.status == OrderStatusType::Failed && payment_status == PaymentStatus::Success {
            warn!("🔄️💳️ Payment for order [{order_id}] settled after the order failed. The customer must be refunded.");
        }
        let update = PaymentUpdate {
            status: payment_status,
            gateway_transaction_id: transaction.transaction_id.clone(),
            payment_type: transaction.payment_type.clone(),
            transaction_status: transaction.transaction_status.clone(),
            raw_response: transaction.raw.to_string(),
            processed_at: now,
        };
        let (order, payment) = self.db.record_payment_result(order_id, update, transition, note).await?;
        info!(
            "🔄️💳️ Payment for order [{order_id}] is {payment_status} ({}) after {}. Order is {}",
            transaction.transaction_status,
            source_name,
            order.status
        );
        if payment_status != PaymentStatus::Success || !order.status.is_dispensable() {
            return Ok(PaymentConfirmation { order, payment, payment_status, dispense: DispenseAttempt::NotAttempted });
        }
        let dispense = match self.trigger_dispense_locked(&order).await {
            Ok(outcome) => DispenseAttempt::Sent { commands: outcome.commands_sent },
            Err(e) => {
                warn!("🔄️📡️ Order [{order_id}] is paid but could not be dispensed. {e}");
                let reason = format!("Payment successful but dispense failed: {e}");
                self.park_order(order_id, &reason).await?;
                DispenseAttempt::Deferred { reason }
            },
        };
        let order = self.fetch_order_record(order_id).await?;
        Ok(PaymentConfirmation { order, payment, payment_status, dispense })
    }

    /// Sends the dispense commands for a `PAID` or `PENDING_DISPENSE` order.
    ///
    /// Items that the machine already delivered are skipped. For every remaining item a dispense log is written and
    /// the order moves to `DISPENSING` before any command is published. The commands go out in slot order, one at a
    /// time, with a pause between them. If the messaging bridge refuses a command, the order is parked in
    /// `PENDING_DISPENSE` and `MessagingUnavailable` is returned.
    pub async fn trigger_dispense(&self, order_id: &OrderId) -> Result<TriggerOutcome, OrderFlowError> {
        let _guard = self.locks.lock(order_id).await;
        let order = self.fetch_order_record(order_id).await?;
        self.trigger_dispense_locked(&order).await
    }

    /// Applies a dispense result reported by `machine_id`. Malformed payloads, results from the wrong machine and
    /// results for slots that are not part of the order are rejected without side effects.
    pub async fn handle_dispense_result(
        &self,
        machine_id: &str,
        payload: DispenseResultPayload,
    ) -> Result<DispenseResultOutcome, OrderFlowError> {
        let result = payload.validate(Utc::now()).map_err(|e| {
            warn!("🔄️📡️ Ignoring dispense result from machine {machine_id}. {e}");
            e
        })?;
        let _guard = self.locks.lock(&result.order_id).await;
        let outcome = self.db.record_dispense_result(machine_id, &result, self.config.dispense_policy).await?;
        if let Some(entry) = &outcome.stock_entry {
            info!(
                "🔄️📦️ Slot {} stock {} -> {} after dispense for order [{}]",
                result.slot_number, entry.quantity_before, entry.quantity_after, result.order_id
            );
        }
        match outcome.transition {
            Some(t) => info!("🔄️ Order [{}] moved from {} to {} after dispense result", result.order_id, t.from, t.to),
            None => debug!("🔄️ Order [{}] is still {} after dispense result", result.order_id, outcome.order.status),
        }
        Ok(outcome)
    }

    /// Applies a dispense result reported out of band (e.g. over HTTP). The reporting machine is taken to be the one
    /// the order was placed on.
    pub async fn confirm_dispense(
        &self,
        payload: DispenseResultPayload,
    ) -> Result<DispenseResultOutcome, OrderFlowError> {
        let order_id = payload
            .order_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(OrderId::from)
            .ok_or_else(|| OrderFlowError::MalformedDispenseResult("orderId is required".into()))?;
        let order = self.fetch_order_record(&order_id).await?;
        self.handle_dispense_result(&order.machine_id, payload).await
    }

    /// Switches a pending order to a different payment method. The order is registered with the gateway again under
    /// a fresh reference, which replaces the payment's reference and the order's payment handle.
    pub async fn change_payment_method(
        &self,
        order_id: &OrderId,
        payment_method: PaymentMethod,
    ) -> Result<PaymentMethodChange, OrderFlowError> {
        let _guard = self.locks.lock(order_id).await;
        let order = self.fetch_order_record(order_id).await?;
        let now = Utc::now();
        if order.is_expired(now) {
            let order = self.expire_locked(order_id).await?;
            return Err(OrderFlowError::invalid_status(order_id, order.status, "switched to a new payment method"));
        }
        if order.status != OrderStatusType::Pending {
            return Err(OrderFlowError::invalid_status(order_id, order.status, "switched to a new payment method"));
        }
        let items = self.db.fetch_order_items(order_id).await?;
        let gateway_ref = gateway_order_ref(order_id, now);
        let checkout_request = CheckoutRequest {
            order_ref: gateway_ref.clone(),
            amount: order.total_amount,
            items: items.iter().map(order_checkout_item).collect(),
            payment_method,
            customer_phone: order.customer_phone.clone(),
        };
        let checkout = self.gateway.create_checkout(&checkout_request).await.map_err(|e| {
            warn!("🔄️💳️ Could not register order [{order_id}] for {payment_method}. {e}");
            OrderFlowError::PaymentGatewayUnavailable(e.to_string())
        })?;
        let update = PaymentMethodUpdate {
            payment_method,
            gateway_order_ref: gateway_ref,
            payment_url: checkout.redirect_url,
            payment_token: checkout.token,
            updated_at: now,
        };
        let (order, payment) = self.db.update_payment_method(order_id, update).await?;
        info!("🔄️💳️ Order [{order_id}] now pays via {payment_method} under {}", payment.gateway_order_ref);
        Ok(PaymentMethodChange {
            order_id: order.id,
            payment_method: order.payment_method,
            gateway_order_ref: payment.gateway_order_ref,
            payment_url: order.payment_url,
            payment_token: order.payment_token,
            expires_at: order.expires_at,
        })
    }

    /// The latest dispense log of the order together with the order's status.
    pub async fn dispense_status(&self, order_id: &OrderId) -> Result<DispenseStatus, OrderFlowError> {
        let order = self.fetch_order_record(order_id).await?;
        let log = self
            .db
            .fetch_latest_dispense_log(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::DispenseStatusNotFound(order_id.clone()))?;
        Ok(DispenseStatus { log, order_status: order.status })
    }

    pub async fn fetch_dispense_logs(
        &self,
        machine_id: &str,
        pagination: Pagination,
    ) -> Result<Vec<DispenseLog>, OrderFlowError> {
        Ok(self.db.fetch_dispense_logs(machine_id, pagination.normalized()).await?)
    }

    // --------------------------------------------------------------------------------------------------------------

    async fn sale_item(&self, slot_id: i64, quantity: i64) -> Result<NewOrderItem, OrderFlowError> {
        let slot = self
            .db
            .fetch_sale_slot(&self.config.machine_id, slot_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or(OrderFlowError::SlotNotFound(slot_id))?;
        let unit_price = slot.unit_price();
        let (product_id, product_name, unit_price) = match (slot.product_id, slot.product_name, unit_price) {
            (Some(id), Some(name), Some(price)) if slot.product_active == Some(true) => (id, name, price),
            _ => return Err(OrderFlowError::ProductUnavailable(slot_id)),
        };
        if slot.current_stock < quantity {
            return Err(OrderFlowError::InsufficientStock {
                product: product_name,
                available: slot.current_stock,
                requested: quantity,
            });
        }
        Ok(NewOrderItem { slot_id, slot_number: slot.slot_number, product_id, product_name, quantity, unit_price })
    }

    async fn fetch_order_record(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    async fn expire_if_due(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order_record(order_id).await?;
        if !order.is_expired(Utc::now()) {
            return Ok(order);
        }
        let _guard = self.locks.lock(order_id).await;
        self.expire_locked(order_id).await
    }

    /// Marks a pending order past its expiry time as `FAILED`. The caller must hold the order's lock.
    async fn expire_locked(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order_record(order_id).await?;
        if !order.is_expired(Utc::now()) {
            return Ok(order);
        }
        let transition = StatusTransition::new(OrderStatusType::Pending, OrderStatusType::Failed);
        match self.db.transition_order_status(order_id, transition, Some(EXPIRED_NOTE.to_string())).await {
            Ok(order) => {
                info!("🔄️ Order [{order_id}] expired at {} without payment", order.expires_at);
                Ok(order)
            },
            Err(OrderManagementError::StatusConflict { .. }) => self.fetch_order_record(order_id).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Moves a paid order that could not be dispensed to `PENDING_DISPENSE`, recording why. Orders in any other
    /// state are left alone.
    async fn park_order(&self, order_id: &OrderId, reason: &str) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order_record(order_id).await?;
        match order.status {
            OrderStatusType::Paid | OrderStatusType::Dispensing => {
                let transition = StatusTransition::new(order.status, OrderStatusType::PendingDispense);
                let order = self.db.transition_order_status(order_id, transition, Some(reason.to_string())).await?;
                info!("🔄️ Order [{order_id}] is waiting to be dispensed. {reason}");
                Ok(order)
            },
            _ => Ok(order),
        }
    }

    /// The caller must hold the order's lock.
    async fn trigger_dispense_locked(&self, order: &Order) -> Result<TriggerOutcome, OrderFlowError> {
        let order_id = &order.id;
        if !order.status.is_dispensable() {
            return Err(OrderFlowError::invalid_status(order_id, order.status, "dispensed"));
        }
        let items = self.db.fetch_order_items(order_id).await?;
        let logs = self.db.fetch_dispense_logs_for_order(order_id).await?;
        let policy = self.config.dispense_policy;
        let total = items.len() as i64;
        let pending = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !logs.iter().any(|l| l.slot_number == item.slot_number && policy.log_delivered(l)))
            .map(|(i, item)| (i as i64, item))
            .collect::<Vec<_>>();
        if pending.is_empty() {
            let transition = StatusTransition::new(order.status, OrderStatusType::Completed);
            let order = self.db.transition_order_status(order_id, transition, None).await?;
            info!("🔄️ Every item of order [{order_id}] was already delivered. Order is {}", order.status);
            return Ok(TriggerOutcome { order_id: order_id.clone(), status: order.status, commands_sent: 0 });
        }
        let item_index = |i: i64| (total > 1).then_some(i);
        let targets = pending
            .iter()
            .map(|(i, item)| DispenseTarget { slot_number: item.slot_number, item_index: item_index(*i) })
            .collect::<Vec<_>>();
        let (order, _) = self.db.prepare_dispense(order_id, order.status, &targets, Utc::now()).await?;
        let mut commands_sent = 0;
        for (n, (i, item)) in pending.iter().enumerate() {
            if n > 0 {
                tokio::time::sleep(self.config.inter_item_delay).await;
            }
            let command = self.dispense_command(&order, item, item_index(*i), total);
            if !self.publisher.publish_dispense_command(&order.machine_id, &command).await {
                warn!(
                    "🔄️📡️ Dispense command for slot {} of order [{order_id}] could not be sent. {commands_sent} of {} \
                     command(s) went out.",
                    item.slot_number,
                    pending.len()
                );
                self.park_order(order_id, "Dispense command could not be sent: messaging bridge is not connected")
                    .await?;
                return Err(OrderFlowError::MessagingUnavailable(order_id.clone()));
            }
            debug!("🔄️📡️ Dispense command for slot {} of order [{order_id}] sent", item.slot_number);
            commands_sent += 1;
        }
        info!("🔄️📡️ Sent {commands_sent} dispense command(s) for order [{order_id}] to {}", order.machine_id);
        Ok(TriggerOutcome { order_id: order_id.clone(), status: order.status, commands_sent })
    }

    fn dispense_command(&self, order: &Order, item: &OrderItem, item_index: Option<i64>, total: i64) -> DispenseCommand {
        let timeout_ms = item.motor_duration_ms.unwrap_or(self.config.default_motor_duration_ms);
        let command = DispenseCommand::new(order.id.clone(), item.slot_number, timeout_ms);
        match item_index {
            Some(i) => command.in_sequence(i, total),
            None => command,
        }
    }

    fn order_timeout(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.order_timeout).unwrap_or_else(|_| chrono::Duration::minutes(15))
    }
}

/// Works out how a payment verdict moves the order. Returns the status transition to apply, if any, and the note to
/// record on the order.
fn payment_transition(
    order: &Order,
    payment_status: PaymentStatus,
    gateway_status: &str,
    now: DateTime<Utc>,
) -> (Option<StatusTransition>, Option<String>) {
    use OrderStatusType::*;
    match (order.status, payment_status) {
        (Pending, PaymentStatus::Success) => (Some(StatusTransition::new(Pending, Paid)), None),
        (Pending, PaymentStatus::Failed) => {
            (Some(StatusTransition::new(Pending, Failed)), Some(format!("Payment {gateway_status}")))
        },
        (Pending, _) if order.is_expired(now) => {
            (Some(StatusTransition::new(Pending, Failed)), Some(EXPIRED_NOTE.to_string()))
        },
        (Failed, PaymentStatus::Success) => (None, Some(LATE_SETTLEMENT_NOTE.to_string())),
        _ => (None, None),
    }
}

fn validate_order_request(request: &NewMultiOrderRequest) -> Result<(), OrderFlowError> {
    let n = request.items.len();
    if n == 0 || n > MAX_ITEMS_PER_ORDER {
        return Err(OrderFlowError::ValidationError(format!(
            "An order must contain between 1 and {MAX_ITEMS_PER_ORDER} items, not {n}"
        )));
    }
    let mut slots = HashSet::with_capacity(n);
    for item in &request.items {
        if !(1..=MAX_QUANTITY_PER_ITEM).contains(&item.quantity) {
            return Err(OrderFlowError::ValidationError(format!(
                "Quantity for slot {} must be between 1 and {MAX_QUANTITY_PER_ITEM}",
                item.slot_id
            )));
        }
        if !slots.insert(item.slot_id) {
            return Err(OrderFlowError::ValidationError(format!("Slot {} appears more than once", item.slot_id)));
        }
    }
    match request.customer_phone.as_deref().map(str::trim) {
        Some(phone) if !phone.is_empty() && !is_valid_phone_number(phone) => {
            Err(OrderFlowError::ValidationError(format!("{phone} is not a valid phone number")))
        },
        _ => Ok(()),
    }
}

fn checkout_item(item: &NewOrderItem) -> CheckoutItem {
    CheckoutItem {
        id: format!("SLOT-{}", item.slot_number),
        name: item.product_name.clone(),
        price: item.unit_price,
        quantity: item.quantity,
    }
}

fn order_checkout_item(item: &OrderItem) -> CheckoutItem {
    CheckoutItem {
        id: format!("SLOT-{}", item.slot_number),
        name: item.product_name.clone(),
        price: item.unit_price,
        quantity: item.quantity,
    }
}
