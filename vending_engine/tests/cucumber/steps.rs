use cucumber::{given, then, when};
use vending_engine::{
    db_types::{OrderStatusType, StockChangeType},
    order_objects::{NewMultiOrderRequest, NewOrderRequest, OrderItemRequest},
    payment_objects::ConfirmationSource,
    stock_objects::StockLogFilter,
    OrderFlowError,
};

use crate::{
    cucumber::VendingWorld,
    support::{dispense_result, TestSystem, MACHINE},
};

#[given("a fresh vending machine")]
async fn fresh_machine(world: &mut VendingWorld) {
    world.system = Some(TestSystem::new().await);
}

#[given(expr = "slot {int} sells {string} for {int} rupiah with {int} of {int} units")]
async fn stock_slot(world: &mut VendingWorld, slot: i64, product: String, price: i64, stock: i64, capacity: i64) {
    let slot_id = world.system().stock_slot(slot, &product, price, capacity, stock).await;
    world.slots.insert(slot, slot_id);
}

#[given("the messaging bridge is down")]
async fn bridge_down(world: &mut VendingWorld) {
    world.system().publisher.set_connected(false);
}

#[when("the messaging bridge comes back")]
async fn bridge_up(world: &mut VendingWorld) {
    world.system().publisher.set_connected(true);
}

#[when(expr = "a customer orders {int} unit(s) from slot {int}")]
async fn order_single(world: &mut VendingWorld, quantity: i64, slot: i64) {
    let request = NewOrderRequest {
        slot_id: world.slot_id(slot),
        quantity: Some(quantity),
        customer_phone: None,
        payment_method: None,
    };
    let result = world.api().create_order(request).await;
    match result {
        Ok(created) => world.order_id = Some(created.order_id),
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "a customer orders one unit each from slots {string}")]
async fn order_multi(world: &mut VendingWorld, slots: String) {
    let items = slots
        .split(',')
        .map(|s| s.trim().parse::<i64>().expect("Not a slot number"))
        .map(|n| OrderItemRequest { slot_id: world.slot_id(n), quantity: 1 })
        .collect();
    let request = NewMultiOrderRequest { items, customer_phone: None, payment_method: None };
    let result = world.api().create_multi_order(request).await;
    match result {
        Ok(created) => world.order_id = Some(created.order_id),
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "the payment gateway reports the payment as {word}")]
async fn gateway_status(world: &mut VendingWorld, status: String) {
    world.system().gateway.set_status(&status);
}

#[when("the payment is verified")]
async fn verify_payment(world: &mut VendingWorld) {
    let order_id = world.order_id();
    world.api().confirm_payment(&order_id, ConfirmationSource::ManualVerify).await.expect("Error verifying payment");
}

#[when("the order is dispensed again")]
async fn retrigger(world: &mut VendingWorld) {
    let order_id = world.order_id();
    let result = world.api().trigger_dispense(&order_id).await;
    if let Err(e) = result {
        world.last_error = Some(e);
    }
}

#[when(expr = "the machine reports slot {int} as {word}")]
async fn machine_reports(world: &mut VendingWorld, slot: i64, outcome: String) {
    let order_id = world.order_id();
    let payload = match outcome.as_str() {
        "delivered" => dispense_result(&order_id, slot, true, true),
        "jammed" => dispense_result(&order_id, slot, false, false),
        _ => panic!("Unknown dispense outcome {outcome}"),
    };
    let result = world.api().handle_dispense_result(MACHINE, payload).await;
    if let Err(e) = result {
        world.last_error = Some(e);
    }
}

#[then(expr = "the order is {word}")]
async fn order_status(world: &mut VendingWorld, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    let details = world.api().fetch_order(&world.order_id()).await.expect("Error fetching order");
    assert_eq!(details.order.status, expected, "Order status is incorrect");
}

#[then(expr = "slot {int} holds {int} units")]
async fn slot_stock(world: &mut VendingWorld, slot: i64, units: i64) {
    let slot = world.system().ledger.fetch_slot(world.slot_id(slot)).await.expect("Error fetching slot");
    assert_eq!(slot.current_stock, units, "Stock level is incorrect");
}

#[then(expr = "{int} dispense command(s) was/were sent")]
async fn commands_sent(world: &mut VendingWorld, count: usize) {
    assert_eq!(world.system().publisher.sent().len(), count, "Wrong number of dispense commands");
}

#[then(expr = "the stock log holds {int} dispense entry/entries")]
async fn dispense_entries(world: &mut VendingWorld, count: usize) {
    let filter = StockLogFilter::for_machine(MACHINE).with_change_type(StockChangeType::Dispense);
    let logs = world.system().ledger.stock_logs(filter).await.expect("Error fetching stock logs");
    assert_eq!(logs.len(), count, "Wrong number of dispense entries");
}

#[then(expr = "the request failed with {word}")]
async fn request_failed(world: &mut VendingWorld, kind: String) {
    let err = world.last_error.as_ref().expect("No request failed");
    let matches = match kind.as_str() {
        "InsufficientStock" => matches!(err, OrderFlowError::InsufficientStock { .. }),
        "MessagingUnavailable" => matches!(err, OrderFlowError::MessagingUnavailable(_)),
        "SlotNotInOrder" => matches!(err, OrderFlowError::SlotNotInOrder { .. }),
        "InvalidOrderStatus" => matches!(err, OrderFlowError::InvalidOrderStatus { .. }),
        _ => panic!("Unknown error kind {kind}"),
    };
    assert!(matches, "Expected {kind}, got {err:?}");
}
