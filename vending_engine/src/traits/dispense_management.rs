use chrono::{DateTime, Utc};

use crate::{
    db_types::{DispenseLog, Order, OrderId, OrderStatusType},
    dispense_objects::{DispensePolicy, DispenseResult, DispenseResultOutcome, DispenseTarget},
    order_objects::Pagination,
    traits::OrderManagementError,
};

/// Storage for dispense attempts and their reconciliation.
#[allow(async_fn_in_trait)]
pub trait DispenseManagement {
    /// In a single atomic transaction, writes a pending dispense log (stamped with `now` as the command time) for
    /// every target and moves the order from `from` to `DISPENSING`. Re-triggering an order resets the result fields
    /// of its existing logs and increments their retry count.
    async fn prepare_dispense(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        targets: &[DispenseTarget],
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<DispenseLog>), OrderManagementError>;

    /// Reconciles a hardware result in a single atomic transaction:
    /// * the dispense log for `(order, machine, slot)` is updated, or inserted if no command was tracked. A slot that
    ///   already reported a result keeps it, and the later result changes nothing,
    /// * if the item was commanded and delivered, that item's stock is decremented (once,
    ///   no matter how often the result is reported),
    /// * the order status is derived from all its items' logs and applied if the state machine allows it.
    ///
    /// Results for a `PENDING` order (`DispenseNotExpected`), for a machine other than the order's, or for a slot that
    /// is not part of the order, are rejected without side effects. Results for a `COMPLETED` order are logged but
    /// touch neither stock nor status. A `FAILED` order still reconciles the stock of items that were commanded before
    /// it failed, but its status stays `FAILED`.
    async fn record_dispense_result(
        &self,
        machine_id: &str,
        result: &DispenseResult,
        policy: DispensePolicy,
    ) -> Result<DispenseResultOutcome, OrderManagementError>;

    async fn fetch_dispense_logs_for_order(&self, order_id: &OrderId) -> Result<Vec<DispenseLog>, OrderManagementError>;

    /// The most recently written dispense log of the order.
    async fn fetch_latest_dispense_log(&self, order_id: &OrderId) -> Result<Option<DispenseLog>, OrderManagementError>;

    /// Fetches the dispense logs of a machine, newest first.
    async fn fetch_dispense_logs(
        &self,
        machine_id: &str,
        pagination: Pagination,
    ) -> Result<Vec<DispenseLog>, OrderManagementError>;
}
