//! `SqliteDatabase` is a concrete implementation of a vending engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the database traits defined in the [`traits`]
//! module.
use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqliteConnection, SqlitePool};

use super::{
    db::{
        db_url,
        dispense_logs,
        machines,
        new_pool,
        order_items,
        orders,
        payments,
        slots,
        stock_logs::{self, StockUpdateResult},
    },
    SqliteDatabaseError,
};
use crate::{
    db_types::{
        DispenseLog,
        Machine,
        MachineStatus,
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Payment,
        PaymentMethodUpdate,
        PaymentUpdate,
        SaleSlot,
        Slot,
        StatusTransition,
        StockLogEntry,
    },
    dispense_objects::{resolve_order_status, DispensePolicy, DispenseResult, DispenseResultOutcome, DispenseTarget},
    machine_objects::StatusReport,
    order_objects::{OrderQueryFilter, Pagination},
    stock_objects::{SlotStockRow, StockLogFilter, StockUpdateOutcome, StockUpdateRequest},
    traits::{
        DispenseManagement,
        MachineManagement,
        MachineManagementError,
        OrderManagement,
        OrderManagementError,
        StockLedgerError,
        StockManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `VM_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Explains why a compare-and-set on the order status did not apply.
async fn status_conflict(
    order_id: &OrderId,
    expected: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<OrderManagementError, sqlx::Error> {
    let err = match orders::fetch_order(order_id, conn).await? {
        Some(order) => OrderManagementError::StatusConflict { order_id: order_id.clone(), expected, actual: order.status },
        None => OrderManagementError::OrderNotFound(order_id.clone()),
    };
    Ok(err)
}

fn checked(transition: StatusTransition) -> Result<StatusTransition, OrderManagementError> {
    if transition.is_valid() {
        Ok(transition)
    } else {
        Err(OrderManagementError::InvalidTransition { from: transition.from, to: transition.to })
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_sale_slot(&self, machine_id: &str, slot_id: i64) -> Result<Option<SaleSlot>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let slot = slots::fetch_sale_slot(machine_id, slot_id, &mut conn).await?;
        Ok(slot)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderManagementError> {
        let mut tx = self.pool.begin().await?;
        let inserted = match orders::insert_order(&order, &mut tx).await {
            Ok(o) => o,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(OrderManagementError::OrderAlreadyExists(order.id));
            },
            Err(e) => return Err(e.into()),
        };
        order_items::insert_items(&inserted.id, &order.items, &mut tx).await?;
        let payment = payments::insert_payment(&order, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order [{}] saved with {} item(s) and payment stub #{} (ref {})",
            inserted.id,
            order.items.len(),
            payment.id,
            payment.gateway_order_ref
        );
        Ok(inserted)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let items = order_items::fetch_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(order_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_order_id_for_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<OrderId>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order_id = payments::fetch_order_id_for_gateway_ref(gateway_ref, &mut conn).await?;
        Ok(order_id)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn transition_order_status(
        &self,
        order_id: &OrderId,
        transition: StatusTransition,
        note: Option<String>,
    ) -> Result<Order, OrderManagementError> {
        let transition = checked(transition)?;
        let mut tx = self.pool.begin().await?;
        match orders::update_order_status(order_id, transition, note, Utc::now(), &mut tx).await? {
            Some(order) => {
                tx.commit().await?;
                debug!("🗃️ Order [{order_id}] is now {}", order.status);
                Ok(order)
            },
            None => Err(status_conflict(order_id, transition.from, &mut tx).await?),
        }
    }

    async fn record_payment_result(
        &self,
        order_id: &OrderId,
        update: PaymentUpdate,
        transition: Option<StatusTransition>,
        note: Option<String>,
    ) -> Result<(Order, Payment), OrderManagementError> {
        let transition = transition.map(checked).transpose()?;
        let now = update.processed_at;
        let mut tx = self.pool.begin().await?;
        if !orders::lock_order(order_id, &mut tx).await? {
            return Err(OrderManagementError::OrderNotFound(order_id.clone()));
        }
        let payment = payments::update_payment_result(order_id, &update, &mut tx)
            .await?
            .ok_or_else(|| OrderManagementError::PaymentNotFound(order_id.clone()))?;
        let order = match (transition, note) {
            (Some(t), note) => match orders::update_order_status(order_id, t, note, now, &mut tx).await? {
                Some(order) => Some(order),
                None => return Err(status_conflict(order_id, t.from, &mut tx).await?),
            },
            (None, Some(note)) => orders::set_order_note(order_id, &note, now, &mut tx).await?,
            (None, None) => orders::fetch_order(order_id, &mut tx).await?,
        }
        .ok_or_else(|| OrderManagementError::OrderNotFound(order_id.clone()))?;
        tx.commit().await?;
        debug!("🗃️ Payment for order [{order_id}] is {}. Order is {}", payment.status, order.status);
        Ok((order, payment))
    }

    async fn update_payment_method(
        &self,
        order_id: &OrderId,
        update: PaymentMethodUpdate,
    ) -> Result<(Order, Payment), OrderManagementError> {
        let mut tx = self.pool.begin().await?;
        if !orders::lock_order(order_id, &mut tx).await? {
            return Err(OrderManagementError::OrderNotFound(order_id.clone()));
        }
        let order = match orders::update_payment_fields(order_id, &update, &mut tx).await? {
            Some(order) => order,
            None => return Err(status_conflict(order_id, OrderStatusType::Pending, &mut tx).await?),
        };
        let payment = payments::update_gateway_ref(order_id, &update, &mut tx)
            .await?
            .ok_or_else(|| OrderManagementError::PaymentNotFound(order_id.clone()))?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] will be paid with {} under ref {}", order.payment_method, payment.gateway_order_ref);
        Ok((order, payment))
    }
}

impl DispenseManagement for SqliteDatabase {
    async fn prepare_dispense(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        targets: &[DispenseTarget],
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<DispenseLog>), OrderManagementError> {
        let transition = checked(StatusTransition::new(from, OrderStatusType::Dispensing))?;
        let mut tx = self.pool.begin().await?;
        if !orders::lock_order(order_id, &mut tx).await? {
            return Err(OrderManagementError::OrderNotFound(order_id.clone()));
        }
        let order = orders::fetch_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderManagementError::OrderNotFound(order_id.clone()))?;
        if order.status != from {
            return Err(OrderManagementError::StatusConflict {
                order_id: order_id.clone(),
                expected: from,
                actual: order.status,
            });
        }
        let mut logs = Vec::with_capacity(targets.len());
        for target in targets {
            let log = dispense_logs::upsert_pending(order_id, &order.machine_id, target, now, &mut tx).await?;
            logs.push(log);
        }
        let order = match orders::update_order_status(order_id, transition, None, now, &mut tx).await? {
            Some(order) => order,
            None => return Err(status_conflict(order_id, from, &mut tx).await?),
        };
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] is DISPENSING. {} dispense log(s) written", logs.len());
        Ok((order, logs))
    }

    async fn record_dispense_result(
        &self,
        machine_id: &str,
        result: &DispenseResult,
        policy: DispensePolicy,
    ) -> Result<DispenseResultOutcome, OrderManagementError> {
        let order_id = &result.order_id;
        let mut tx = self.pool.begin().await?;
        if !orders::lock_order(order_id, &mut tx).await? {
            return Err(OrderManagementError::OrderNotFound(order_id.clone()));
        }
        let order = orders::fetch_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderManagementError::OrderNotFound(order_id.clone()))?;
        if order.machine_id != machine_id {
            return Err(OrderManagementError::MachineMismatch {
                order_id: order_id.clone(),
                expected: order.machine_id,
                actual: machine_id.to_string(),
            });
        }
        if order.status == OrderStatusType::Pending {
            return Err(OrderManagementError::DispenseNotExpected { order_id: order_id.clone(), status: order.status });
        }
        let items = order_items::fetch_items(order_id, &mut tx).await?;
        let item = items.iter().find(|i| i.slot_number == result.slot_number).ok_or_else(|| {
            OrderManagementError::SlotNotInOrder { order_id: order_id.clone(), slot_number: result.slot_number }
        })?;
        let prior = dispense_logs::fetch_for_slot(order_id, machine_id, result.slot_number, &mut tx).await?;
        if let Some(log) = prior.as_ref().filter(|l| l.success.is_some()) {
            warn!(
                "🗃️ Slot {} of order [{order_id}] already reported {:?}. Later result ignored.",
                result.slot_number, log.success
            );
            let log = log.clone();
            tx.rollback().await?;
            return Ok(DispenseResultOutcome { order, log, stock_entry: None, transition: None });
        }
        let log =
            dispense_logs::upsert_result(machine_id, result, &mut tx).await?.ok_or(sqlx::Error::RowNotFound)?;
        // A failed order still reconciles items that were commanded before it failed
        let reconciles_stock = match order.status {
            OrderStatusType::Completed => false,
            OrderStatusType::Failed => prior.is_some(),
            _ => true,
        };
        if !reconciles_stock {
            warn!("🗃️ Order [{order_id}] is already {}. Dispense result logged, stock left alone.", order.status);
            tx.commit().await?;
            return Ok(DispenseResultOutcome { order, log, stock_entry: None, transition: None });
        }
        let stock_entry = if policy.is_delivered(Some(result.success), Some(result.drop_detected)) {
            stock_logs::decrement_item_for_dispense(order_id, item, result.reported_at, &mut tx).await?
        } else {
            None
        };
        let logs = dispense_logs::fetch_for_order(order_id, &mut tx).await?;
        let mut order = order;
        let mut transition = None;
        if let Some(next) = resolve_order_status(&items, &logs, policy) {
            if next == order.status {
                trace!("🗃️ Order [{order_id}] is already {next}");
            } else if order.status.can_transition_to(next) {
                let t = StatusTransition::new(order.status, next);
                let note = (next == OrderStatusType::Failed).then(|| {
                    let reason = result.error_message.as_deref().unwrap_or("product was not delivered");
                    format!("Dispense failed on slot {}: {reason}", result.slot_number)
                });
                order = match orders::update_order_status(order_id, t, note, result.reported_at, &mut tx).await? {
                    Some(order) => order,
                    None => return Err(status_conflict(order_id, t.from, &mut tx).await?),
                };
                transition = Some(t);
            } else {
                warn!(
                    "🗃️ Dispense result for order [{order_id}] implies {next}, but the order is {}. Status left alone.",
                    order.status
                );
            }
        }
        tx.commit().await?;
        Ok(DispenseResultOutcome { order, log, stock_entry, transition })
    }

    async fn fetch_dispense_logs_for_order(&self, order_id: &OrderId) -> Result<Vec<DispenseLog>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let logs = dispense_logs::fetch_for_order(order_id, &mut conn).await?;
        Ok(logs)
    }

    async fn fetch_latest_dispense_log(&self, order_id: &OrderId) -> Result<Option<DispenseLog>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let log = dispense_logs::fetch_latest_for_order(order_id, &mut conn).await?;
        Ok(log)
    }

    async fn fetch_dispense_logs(
        &self,
        machine_id: &str,
        pagination: Pagination,
    ) -> Result<Vec<DispenseLog>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let logs = dispense_logs::fetch_for_machine(machine_id, pagination, &mut conn).await?;
        Ok(logs)
    }
}

impl StockManagement for SqliteDatabase {
    async fn fetch_slot(&self, slot_id: i64) -> Result<Option<Slot>, StockLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let slot = slots::fetch_slot(slot_id, &mut conn).await?;
        Ok(slot)
    }

    async fn fetch_slot_by_number(&self, machine_id: &str, slot_number: i64) -> Result<Option<Slot>, StockLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let slot = slots::fetch_slot_by_number(machine_id, slot_number, &mut conn).await?;
        Ok(slot)
    }

    async fn apply_stock_update(
        &self,
        request: &StockUpdateRequest,
        dedup_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<StockUpdateOutcome, StockLedgerError> {
        request.validate().map_err(StockLedgerError::ValidationError)?;
        let mut tx = self.pool.begin().await?;
        match stock_logs::update_stock(request, dedup_window, now, &mut tx).await? {
            StockUpdateResult::Applied(entry, slot) => {
                tx.commit().await?;
                Ok(StockUpdateOutcome { entry, slot, is_duplicate: false })
            },
            StockUpdateResult::Duplicate(entry, slot) => {
                tx.rollback().await?;
                Ok(StockUpdateOutcome { entry, slot, is_duplicate: true })
            },
            StockUpdateResult::Conflict { expected, actual } => {
                tx.rollback().await?;
                Err(StockLedgerError::StockConflict { slot_id: request.slot_id, expected, actual })
            },
            StockUpdateResult::SlotNotFound => Err(StockLedgerError::SlotNotFound(request.slot_id)),
        }
    }

    async fn record_stock_report(
        &self,
        machine_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlotStockRow>, StockLedgerError> {
        let mut tx = self.pool.begin().await?;
        if !machines::mark_seen(machine_id, now, &mut tx).await? {
            return Err(StockLedgerError::MachineNotFound(machine_id.to_string()));
        }
        let rows = slots::fetch_stock_levels(machine_id, &mut tx).await?;
        for row in &rows {
            stock_logs::insert_audit_snapshot(machine_id, row, now, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Stock report for {machine_id} stored for {} slot(s)", rows.len());
        Ok(rows)
    }

    async fn fetch_stock_levels(&self, machine_id: &str) -> Result<Vec<SlotStockRow>, StockLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = slots::fetch_stock_levels(machine_id, &mut conn).await?;
        Ok(rows)
    }

    async fn fetch_stock_logs(&self, filter: StockLogFilter) -> Result<Vec<StockLogEntry>, StockLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = stock_logs::fetch_logs(filter, &mut conn).await?;
        Ok(entries)
    }
}

impl MachineManagement for SqliteDatabase {
    async fn fetch_machine(&self, machine_id: &str) -> Result<Option<Machine>, MachineManagementError> {
        let mut conn = self.pool.acquire().await?;
        let machine = machines::fetch_machine(machine_id, &mut conn).await?;
        Ok(machine)
    }

    async fn record_telemetry(
        &self,
        machine_id: &str,
        data: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), MachineManagementError> {
        let mut tx = self.pool.begin().await?;
        if !machines::mark_seen(machine_id, now, &mut tx).await? {
            return Err(MachineManagementError::MachineNotFound(machine_id.to_string()));
        }
        machines::insert_telemetry(machine_id, &data.to_string(), now, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_temperature(
        &self,
        machine_id: &str,
        value: f64,
        humidity: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<(), MachineManagementError> {
        let mut tx = self.pool.begin().await?;
        machines::insert_temperature(machine_id, value, humidity, now, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_machine_status(
        &self,
        machine_id: &str,
        status: MachineStatus,
        report: &StatusReport,
        now: DateTime<Utc>,
    ) -> Result<Machine, MachineManagementError> {
        let mut tx = self.pool.begin().await?;
        if !machines::mark_seen(machine_id, now, &mut tx).await? {
            return Err(MachineManagementError::MachineNotFound(machine_id.to_string()));
        }
        let machine = machines::fetch_machine(machine_id, &mut tx)
            .await?
            .ok_or_else(|| MachineManagementError::MachineNotFound(machine_id.to_string()))?;
        let mut config = machine.config_json();
        report.merge_into(&mut config);
        let config = serde_json::Value::Object(config).to_string();
        let machine = machines::update_status(machine_id, status, Some(config), now, &mut tx)
            .await?
            .ok_or_else(|| MachineManagementError::MachineNotFound(machine_id.to_string()))?;
        tx.commit().await?;
        Ok(machine)
    }
}
