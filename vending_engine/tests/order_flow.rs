use log::*;
use vending_engine::{
    db_types::{OrderId, OrderStatusType, PaymentMethod, PaymentStatus, Rupiah, StockChangeType},
    order_objects::{NewMultiOrderRequest, NewOrderRequest, OrderItemRequest, OrderQueryFilter},
    payment_objects::{ConfirmationSource, DispenseAttempt},
    stock_objects::StockLogFilter,
    test_utils::prepare_env::{deactivate_slot, expire_order, seed_slot},
    traits::DispenseManagement,
    OrderFlowError,
};

mod support;

use support::{dispense_result, notification, TestSystem, MACHINE};

fn single(slot_id: i64, quantity: i64) -> NewOrderRequest {
    NewOrderRequest { slot_id, quantity: Some(quantity), customer_phone: None, payment_method: None }
}

fn multi(slots: &[i64]) -> NewMultiOrderRequest {
    NewMultiOrderRequest {
        items: slots.iter().map(|&slot_id| OrderItemRequest { slot_id, quantity: 1 }).collect(),
        customer_phone: Some("081234567890".into()),
        payment_method: Some(PaymentMethod::Gopay),
    }
}

async fn stock_of(sys: &TestSystem, slot_id: i64) -> i64 {
    sys.ledger.fetch_slot(slot_id).await.expect("Slot does not exist").current_stock
}

#[tokio::test]
async fn single_item_order_runs_to_completion() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;

    let created = sys.api.create_order(single(slot, 1)).await.expect("Error creating order");
    assert_eq!(created.status, OrderStatusType::Pending);
    assert_eq!(created.total_amount, Rupiah::from(5000));
    assert!(created.order_id.as_str().starts_with("ORD-"));
    assert!(created.payment_url.is_some());
    let checkouts = sys.gateway.checkouts();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].order_ref, created.order_id.to_string());
    assert_eq!(checkouts[0].payment_method, PaymentMethod::Qris);
    // Nothing is reserved before the machine confirms the drop
    assert_eq!(stock_of(&sys, slot).await, 5);

    sys.gateway.settle();
    let confirmation =
        sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.expect("Error confirming");
    assert_eq!(confirmation.payment_status, PaymentStatus::Success);
    assert_eq!(confirmation.payment.status, PaymentStatus::Success);
    assert_eq!(confirmation.dispense, DispenseAttempt::Sent { commands: 1 });
    assert_eq!(confirmation.order.status, OrderStatusType::Dispensing);
    assert!(confirmation.order.paid_at.is_some());

    let sent = sys.publisher.sent();
    assert_eq!(sent.len(), 1);
    let (machine, command) = &sent[0];
    assert_eq!(machine, MACHINE);
    assert_eq!(command.slot, 1);
    assert_eq!(command.order_id, created.order_id);
    assert_eq!(command.timeout_ms, 2150);
    assert_eq!(command.item_index, None);

    let outcome = sys
        .api
        .handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, true, true))
        .await
        .expect("Error handling dispense result");
    assert_eq!(outcome.order.status, OrderStatusType::Completed);
    assert!(outcome.order.dispensed_at.is_some());
    let entry = outcome.stock_entry.expect("Stock was not decremented");
    assert_eq!((entry.quantity_before, entry.quantity_after, entry.quantity_change), (5, 4, -1));
    assert_eq!(stock_of(&sys, slot).await, 4);

    let logs = sys.ledger.stock_logs(StockLogFilter::for_machine(MACHINE)).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].change_type, StockChangeType::Dispense);
    info!("🚀️ Single item order complete");
    sys.tear_down().await;
}

#[tokio::test]
async fn multi_item_order_dispenses_in_slot_order() {
    let sys = TestSystem::new().await;
    let s3 = sys.stock_slot(3, "Iced Tea", 7000, 10, 3).await;
    let s1 = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let s2 = sys.stock_slot(2, "Coffee", 9000, 10, 4).await;

    let created = sys.api.create_multi_order(multi(&[s3, s1, s2])).await.expect("Error creating order");
    assert_eq!(created.total_amount, Rupiah::from(21_000));
    assert_eq!(created.quantity, 3);
    assert_eq!(created.items.len(), 3);

    sys.gateway.settle();
    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(confirmation.dispense, DispenseAttempt::Sent { commands: 3 });

    let sent = sys.publisher.sent();
    let slots = sent.iter().map(|(_, c)| c.slot).collect::<Vec<_>>();
    let indices = sent.iter().map(|(_, c)| c.item_index).collect::<Vec<_>>();
    assert_eq!(slots, vec![1, 2, 3]);
    assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);
    assert!(sent.iter().all(|(_, c)| c.total_items == Some(3)));

    let logs = sys.db.fetch_dispense_logs_for_order(&created.order_id).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.command_sent_at.is_some() && l.success.is_none()));

    for slot in [1, 2] {
        let outcome =
            sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, slot, true, true)).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatusType::Dispensing);
    }
    let outcome = sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 3, true, true)).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatusType::Completed);
    assert_eq!(stock_of(&sys, s1).await, 4);
    assert_eq!(stock_of(&sys, s2).await, 3);
    assert_eq!(stock_of(&sys, s3).await, 2);
    sys.tear_down().await;
}

#[tokio::test]
async fn messaging_outage_parks_paid_order() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.publisher.set_connected(false);
    sys.gateway.settle();

    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert!(matches!(confirmation.dispense, DispenseAttempt::Deferred { .. }));
    assert_eq!(confirmation.payment.status, PaymentStatus::Success);
    assert_eq!(confirmation.order.status, OrderStatusType::PendingDispense);
    assert!(confirmation.order.notes.is_some());

    let err = sys.api.trigger_dispense(&created.order_id).await.expect_err("Dispense should fail while offline");
    assert!(matches!(err, OrderFlowError::MessagingUnavailable(_)));
    let details = sys.api.fetch_order(&created.order_id).await.unwrap();
    assert_eq!(details.order.status, OrderStatusType::PendingDispense);

    sys.publisher.set_connected(true);
    let outcome = sys.api.trigger_dispense(&created.order_id).await.expect("Retry should dispense");
    assert_eq!(outcome.status, OrderStatusType::Dispensing);
    assert_eq!(outcome.commands_sent, 1);
    let logs = sys.db.fetch_dispense_logs_for_order(&created.order_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].retry_count >= 1);
    assert_eq!(stock_of(&sys, slot).await, 5);
    sys.tear_down().await;
}

#[tokio::test]
async fn results_for_unknown_orders_or_slots_change_nothing() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    sys.stock_slot(2, "Coffee", 9000, 10, 5).await;

    let unknown = OrderId::from("ORD-20260107-B71EC06F");
    let err = sys.api.handle_dispense_result(MACHINE, dispense_result(&unknown, 1, true, true)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::OrderNotFound(_)));

    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.gateway.settle();
    sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    let err =
        sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 2, true, true)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::SlotNotInOrder { slot_number: 2, .. }));
    let err =
        sys.api.handle_dispense_result("VM99", dispense_result(&created.order_id, 1, true, true)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::MachineMismatch { .. }));
    let mut malformed = dispense_result(&created.order_id, 1, true, true);
    malformed.success = None;
    let err = sys.api.handle_dispense_result(MACHINE, malformed).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::MalformedDispenseResult(_)));

    assert_eq!(stock_of(&sys, slot).await, 5);
    let logs = sys.ledger.stock_logs(StockLogFilter::for_machine(MACHINE)).await.unwrap();
    assert!(logs.is_empty());
    let order = sys.api.fetch_order(&created.order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatusType::Dispensing);
    sys.tear_down().await;
}

#[tokio::test]
async fn repeated_results_decrement_stock_once() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 2)).await.unwrap();
    sys.gateway.settle();
    sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();

    let first = sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, true, true)).await.unwrap();
    assert!(first.stock_entry.is_some());
    let again = sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, true, true)).await.unwrap();
    assert!(again.stock_entry.is_none());
    assert_eq!(again.order.status, OrderStatusType::Completed);
    assert_eq!(stock_of(&sys, slot).await, 3);

    // A late failure report cannot move a completed order backwards, nor rewrite the delivered item's record
    let late = sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, false, false)).await.unwrap();
    assert_eq!(late.order.status, OrderStatusType::Completed);
    assert!(late.transition.is_none());
    assert!(late.stock_entry.is_none());
    assert_eq!(late.log.success, Some(true));
    assert_eq!(late.log.error_message, None);
    assert_eq!(stock_of(&sys, slot).await, 3);
    let logs = sys.db.fetch_dispense_logs_for_order(&created.order_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].success, Some(true));
    assert_eq!(logs[0].drop_detected, Some(true));
    sys.tear_down().await;
}

#[tokio::test]
async fn failed_dispense_fails_order_without_touching_stock() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.gateway.settle();
    sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();

    let outcome =
        sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, false, false)).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatusType::Failed);
    assert!(outcome.order.notes.as_deref().unwrap_or_default().contains("motor jammed"));
    assert!(outcome.stock_entry.is_none());
    assert_eq!(stock_of(&sys, slot).await, 5);
    sys.tear_down().await;
}

#[tokio::test]
async fn failed_orders_still_account_for_commanded_items() {
    let sys = TestSystem::new().await;
    let s1 = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let s2 = sys.stock_slot(2, "Coffee", 9000, 10, 4).await;
    let created = sys.api.create_multi_order(multi(&[s1, s2])).await.unwrap();
    sys.gateway.settle();
    sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();

    let failed =
        sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, false, false)).await.unwrap();
    assert_eq!(failed.order.status, OrderStatusType::Failed);
    // The second item was already commanded, and the machine reports it dropped
    let late = sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 2, true, true)).await.unwrap();
    assert_eq!(late.order.status, OrderStatusType::Failed);
    assert!(late.transition.is_none());
    assert!(late.stock_entry.is_some());
    assert_eq!(stock_of(&sys, s1).await, 5);
    assert_eq!(stock_of(&sys, s2).await, 3);

    // An order that expired before payment never commanded anything, so a stray result is only logged
    let expired = sys.api.create_order(single(s1, 1)).await.unwrap();
    expire_order(&sys.db, expired.order_id.as_str()).await;
    assert_eq!(sys.api.fetch_order(&expired.order_id).await.unwrap().order.status, OrderStatusType::Failed);
    let stray = sys.api.handle_dispense_result(MACHINE, dispense_result(&expired.order_id, 1, true, true)).await.unwrap();
    assert_eq!(stray.order.status, OrderStatusType::Failed);
    assert!(stray.stock_entry.is_none());
    assert_eq!(stray.log.success, Some(true));
    assert_eq!(stock_of(&sys, s1).await, 5);
    sys.tear_down().await;
}

#[tokio::test]
async fn order_creation_is_validated_against_the_slot() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 2).await;
    let inactive = sys.stock_slot(2, "Coffee", 9000, 10, 5).await;
    deactivate_slot(&sys.db, inactive).await;
    let empty = seed_slot(&sys.db, MACHINE, 3, None, 10, 5).await;

    let err = sys.api.create_order(single(slot, 3)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InsufficientStock { available: 2, requested: 3, .. }));
    let err = sys.api.create_order(single(inactive, 1)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::SlotNotFound(_)));
    let err = sys.api.create_order(single(9999, 1)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::SlotNotFound(9999)));
    let err = sys.api.create_order(single(empty, 1)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ProductUnavailable(_)));
    let err = sys.api.create_order(single(slot, 0)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ValidationError(_)));
    let mut bad_phone = single(slot, 1);
    bad_phone.customer_phone = Some("555-1234".into());
    let err = sys.api.create_order(bad_phone).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ValidationError(_)));

    sys.gateway.set_available(false);
    let err = sys.api.create_order(single(slot, 1)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::PaymentGatewayUnavailable(_)));

    let orders = sys.api.search_orders(OrderQueryFilter::default()).await.unwrap();
    assert!(orders.is_empty(), "No order should have been stored");
    sys.tear_down().await;
}

#[tokio::test]
async fn expired_orders_fail_and_late_settlements_are_flagged() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    expire_order(&sys.db, created.order_id.as_str()).await;

    let details = sys.api.fetch_order(&created.order_id).await.unwrap();
    assert_eq!(details.order.status, OrderStatusType::Failed);
    assert_eq!(details.order.notes.as_deref(), Some("Order expired before payment"));
    assert_eq!(details.items.len(), 1);

    sys.gateway.settle();
    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(confirmation.order.status, OrderStatusType::Failed);
    assert_eq!(confirmation.payment.status, PaymentStatus::Success);
    assert_eq!(confirmation.dispense, DispenseAttempt::NotAttempted);
    assert_eq!(confirmation.order.notes.as_deref(), Some("Payment settled after order failed; refund required"));
    assert!(sys.publisher.sent().is_empty());
    sys.tear_down().await;
}

#[tokio::test]
async fn confirmations_are_idempotent() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();

    let pending = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(pending.order.status, OrderStatusType::Pending);
    assert_eq!(pending.dispense, DispenseAttempt::NotAttempted);

    sys.gateway.settle();
    sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    let again = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(again.order.status, OrderStatusType::Dispensing);
    assert_eq!(again.dispense, DispenseAttempt::NotAttempted);
    assert_eq!(sys.publisher.sent().len(), 1);

    let err = sys.api.change_payment_method(&created.order_id, PaymentMethod::Va).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidOrderStatus { .. }));
    sys.tear_down().await;
}

#[tokio::test]
async fn signed_notifications_stand_in_for_an_unreachable_gateway() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.gateway.set_available(false);
    let order_ref = created.order_id.to_string();

    let unsigned = ConfirmationSource::Webhook {
        notification: notification(&order_ref, "settlement"),
        signature_verified: false,
    };
    let err = sys.api.confirm_payment(&created.order_id, unsigned).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::PaymentGatewayUnavailable(_)));
    let err = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::PaymentGatewayUnavailable(_)));
    assert_eq!(sys.api.fetch_order(&created.order_id).await.unwrap().order.status, OrderStatusType::Pending);

    let signed = ConfirmationSource::Webhook {
        notification: notification(&order_ref, "settlement"),
        signature_verified: true,
    };
    let confirmation = sys.api.confirm_payment(&created.order_id, signed).await.unwrap();
    assert_eq!(confirmation.order.status, OrderStatusType::Dispensing);
    assert_eq!(confirmation.payment.gateway_transaction_id.as_deref(), Some(format!("tx-{order_ref}").as_str()));
    sys.tear_down().await;
}

#[tokio::test]
async fn denied_payment_fails_order() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.gateway.set_status("deny");
    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(confirmation.payment_status, PaymentStatus::Failed);
    assert_eq!(confirmation.order.status, OrderStatusType::Failed);

    let err = sys.api.trigger_dispense(&created.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidOrderStatus { status: OrderStatusType::Failed, .. }));
    assert!(sys.publisher.sent().is_empty());
    sys.tear_down().await;
}

#[tokio::test]
async fn payment_method_change_issues_a_new_gateway_reference() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();

    let err = sys.api.trigger_dispense(&created.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidOrderStatus { status: OrderStatusType::Pending, .. }));

    let change = sys.api.change_payment_method(&created.order_id, PaymentMethod::Shopeepay).await.unwrap();
    assert_eq!(change.payment_method, PaymentMethod::Shopeepay);
    assert_ne!(change.gateway_order_ref, created.order_id.to_string());
    assert!(change.gateway_order_ref.starts_with(created.order_id.as_str()));
    assert_eq!(sys.gateway.checkouts().len(), 2);

    let by_new_ref = sys.api.resolve_gateway_ref(&change.gateway_order_ref).await.unwrap();
    assert_eq!(by_new_ref, Some(created.order_id.clone()));
    let by_order_id = sys.api.resolve_gateway_ref(created.order_id.as_str()).await.unwrap();
    assert_eq!(by_order_id, Some(created.order_id.clone()));
    assert_eq!(sys.api.resolve_gateway_ref("ORD-19990101-00000000").await.unwrap(), None);

    // Payment confirmation follows the new reference
    sys.gateway.settle();
    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(confirmation.payment.gateway_order_ref, change.gateway_order_ref);
    assert_eq!(confirmation.order.payment_method, PaymentMethod::Shopeepay);
    sys.tear_down().await;
}

#[tokio::test]
async fn machine_order_listing_filters_by_status() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let paid = sys.api.create_order(single(slot, 1)).await.unwrap();
    let _open = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.gateway.settle();
    sys.api.confirm_payment(&paid.order_id, ConfirmationSource::ManualVerify).await.unwrap();

    let all = sys.api.orders_for_machine(MACHINE, None, Default::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    let pending = sys.api.orders_for_machine(MACHINE, Some(OrderStatusType::Pending), Default::default()).await.unwrap();
    assert_eq!(pending.len(), 1);
    let other = sys.api.orders_for_machine("VM02", None, Default::default()).await.unwrap();
    assert!(other.is_empty());
    let logs = sys.api.fetch_dispense_logs(MACHINE, Default::default()).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].order_id, paid.order_id);
    sys.tear_down().await;
}

#[tokio::test]
async fn results_for_unpaid_orders_are_refused() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();

    let err =
        sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, true, true)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidOrderStatus { status: OrderStatusType::Pending, .. }));

    assert_eq!(stock_of(&sys, slot).await, 5);
    let logs = sys.ledger.stock_logs(StockLogFilter::for_machine(MACHINE)).await.unwrap();
    assert!(logs.is_empty());
    assert!(sys.db.fetch_dispense_logs_for_order(&created.order_id).await.unwrap().is_empty());
    let order = sys.api.fetch_order(&created.order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatusType::Pending);
    sys.tear_down().await;
}

#[tokio::test]
async fn result_without_slot_leaves_a_dispensing_order_alone() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.gateway.settle();
    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(confirmation.order.status, OrderStatusType::Dispensing);

    let mut no_slot = dispense_result(&created.order_id, 1, true, true);
    no_slot.slot = None;
    let err = sys.api.handle_dispense_result(MACHINE, no_slot).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::MalformedDispenseResult(_)));

    assert_eq!(stock_of(&sys, slot).await, 5);
    let logs = sys.ledger.stock_logs(StockLogFilter::for_machine(MACHINE)).await.unwrap();
    assert!(logs.is_empty());
    let order = sys.api.fetch_order(&created.order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatusType::Dispensing);
    let dispense_logs = sys.db.fetch_dispense_logs_for_order(&created.order_id).await.unwrap();
    assert_eq!(dispense_logs.len(), 1);
    assert_eq!(dispense_logs[0].success, None);
    sys.tear_down().await;
}

#[tokio::test]
async fn verify_before_the_payment_page_is_opened_reports_pending() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();
    sys.gateway.set_has_transaction(false);

    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(confirmation.order.status, OrderStatusType::Pending);
    assert_eq!(confirmation.payment_status, PaymentStatus::Pending);
    assert_eq!(confirmation.dispense, DispenseAttempt::NotAttempted);

    expire_order(&sys.db, created.order_id.as_str()).await;
    let confirmation = sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    assert_eq!(confirmation.order.status, OrderStatusType::Failed);
    assert_eq!(confirmation.order.notes.as_deref(), Some("Order expired before payment"));
    assert!(sys.publisher.sent().is_empty());
    sys.tear_down().await;
}

#[tokio::test]
async fn dispense_status_follows_the_latest_attempt() {
    let sys = TestSystem::new().await;
    let slot = sys.stock_slot(1, "Mineral Water", 5000, 10, 5).await;
    let created = sys.api.create_order(single(slot, 1)).await.unwrap();

    let err = sys.api.dispense_status(&created.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::DispenseStatusNotFound(_)));
    let err = sys.api.dispense_status(&OrderId::from("ORD-20260107-00000000")).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::OrderNotFound(_)));

    sys.gateway.settle();
    sys.api.confirm_payment(&created.order_id, ConfirmationSource::ManualVerify).await.unwrap();
    let status = sys.api.dispense_status(&created.order_id).await.unwrap();
    assert_eq!(status.order_status, OrderStatusType::Dispensing);
    assert_eq!(status.log.slot_number, 1);
    assert!(status.log.command_sent_at.is_some());
    assert_eq!(status.log.success, None);

    sys.api.handle_dispense_result(MACHINE, dispense_result(&created.order_id, 1, true, true)).await.unwrap();
    let status = sys.api.dispense_status(&created.order_id).await.unwrap();
    assert_eq!(status.order_status, OrderStatusType::Completed);
    assert_eq!(status.log.success, Some(true));
    assert_eq!(status.log.duration_ms, Some(2100));
    sys.tear_down().await;
}
