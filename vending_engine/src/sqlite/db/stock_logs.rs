use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use super::slots;
use crate::{
    db_types::{NewStockLogEntry, OrderId, OrderItem, Slot, StockChangeType, StockLogEntry},
    stock_objects::{dispense_idempotency_key, SlotStockRow, StockChange, StockLogFilter, StockUpdateRequest},
};

/// The number of recent entries inspected when looking for a duplicate inside the time window.
const DEDUP_LOOKBACK_ROWS: i64 = 20;

#[derive(Debug, Clone)]
pub enum StockUpdateResult {
    Applied(StockLogEntry, Slot),
    /// The request repeats an earlier one. Carries the earlier entry.
    Duplicate(StockLogEntry, Slot),
    Conflict { expected: i64, actual: i64 },
    SlotNotFound,
}

pub async fn insert_log(entry: NewStockLogEntry, conn: &mut SqliteConnection) -> Result<StockLogEntry, sqlx::Error> {
    let quantity_change = entry.quantity_change();
    let log: StockLogEntry = sqlx::query_as(
        r#"
            INSERT INTO stock_logs (
                machine_id,
                slot_id,
                change_type,
                quantity_before,
                quantity_after,
                quantity_change,
                reason,
                performed_by,
                requested_type,
                requested_quantity,
                idempotency_key,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *;
        "#,
    )
    .bind(entry.machine_id)
    .bind(entry.slot_id)
    .bind(entry.change_type)
    .bind(entry.quantity_before)
    .bind(entry.quantity_after)
    .bind(quantity_change)
    .bind(entry.reason)
    .bind(entry.performed_by)
    .bind(entry.requested_type)
    .bind(entry.requested_quantity)
    .bind(entry.idempotency_key)
    .bind(entry.created_at)
    .fetch_one(conn)
    .await?;
    trace!(
        "🗃️ Stock log #{} for slot {}: {} -> {} ({})",
        log.id,
        log.slot_id,
        log.quantity_before,
        log.quantity_after,
        log.change_type
    );
    Ok(log)
}

pub async fn fetch_by_idempotency_key(
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<StockLogEntry>, sqlx::Error> {
    let entry = sqlx::query_as("SELECT * FROM stock_logs WHERE idempotency_key = $1")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

/// Fetches the most recent entries for a slot, newest first.
pub async fn fetch_recent_for_slot(
    slot_id: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<StockLogEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM stock_logs WHERE slot_id = $1 ORDER BY id DESC LIMIT $2")
        .bind(slot_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// Fetches stock log entries according to the filter, newest first.
pub async fn fetch_logs(filter: StockLogFilter, conn: &mut SqliteConnection) -> Result<Vec<StockLogEntry>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM stock_logs WHERE machine_id = ");
    builder.push_bind(filter.machine_id);
    if let Some(slot_id) = filter.slot_id {
        builder.push(" AND slot_id = ");
        builder.push_bind(slot_id);
    }
    if let Some(change_type) = filter.change_type {
        builder.push(" AND change_type = ");
        builder.push_bind(change_type);
    }
    let page = filter.pagination.normalized();
    builder.push(" ORDER BY id DESC LIMIT ");
    builder.push_bind(page.limit);
    builder.push(" OFFSET ");
    builder.push_bind(page.offset);
    let entries = builder.build_query_as::<StockLogEntry>().fetch_all(conn).await?;
    Ok(entries)
}

/// Looks for an earlier entry that this request repeats.
///
/// A request id is authoritative: a recorded key is a duplicate however long ago it was written, and a new key never
/// is. Without one, an entry for the same slot with the same requested change type and quantity, written within
/// `window` of `now`, is taken to be an earlier attempt of the same request.
async fn find_duplicate(
    request: &StockUpdateRequest,
    window: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<StockLogEntry>, sqlx::Error> {
    if let Some(key) = request.idempotency_key() {
        return fetch_by_idempotency_key(&key, conn).await;
    }
    let window = match chrono::Duration::from_std(window) {
        Ok(w) if w > chrono::Duration::zero() => w,
        _ => return Ok(None),
    };
    let cutoff = now - window;
    let recent = fetch_recent_for_slot(request.slot_id, DEDUP_LOOKBACK_ROWS, conn).await?;
    let duplicate = recent.into_iter().find(|e| {
        e.created_at >= cutoff &&
            e.requested_type == Some(request.change_type) &&
            e.requested_quantity == Some(request.quantity)
    });
    Ok(duplicate)
}

/// The single update path for slot stock. This must be called inside a transaction, which the caller commits only
/// if the result is [`StockUpdateResult::Applied`].
pub async fn update_stock(
    request: &StockUpdateRequest,
    window: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StockUpdateResult, sqlx::Error> {
    if !slots::lock_slot(request.slot_id, conn).await? {
        return Ok(StockUpdateResult::SlotNotFound);
    }
    let slot = match slots::fetch_slot(request.slot_id, conn).await? {
        Some(slot) => slot,
        None => return Ok(StockUpdateResult::SlotNotFound),
    };
    if let Some(entry) = find_duplicate(request, window, now, conn).await? {
        debug!("🗃️ Stock update for slot {} repeats log #{}. Ignoring it.", slot.id, entry.id);
        return Ok(StockUpdateResult::Duplicate(entry, slot));
    }
    if let Some(expected) = request.expected_current_stock {
        if expected != slot.current_stock {
            return Ok(StockUpdateResult::Conflict { expected, actual: slot.current_stock });
        }
    }
    let change = StockChange::compute(request.change_type, request.quantity, slot.current_stock, slot.capacity);
    let updated = slots::set_current_stock(slot.id, change.after, now, conn).await?;
    let entry = NewStockLogEntry {
        machine_id: slot.machine_id.clone(),
        slot_id: slot.id,
        change_type: request.change_type.audit_type(),
        quantity_before: change.before,
        quantity_after: change.after,
        reason: request.reason.clone(),
        performed_by: request.performed_by.clone(),
        requested_type: Some(request.change_type),
        requested_quantity: Some(request.quantity),
        idempotency_key: request.idempotency_key(),
        created_at: now,
    };
    let entry = insert_log(entry, conn).await?;
    Ok(StockUpdateResult::Applied(entry, updated))
}

/// Decrements the stock of one delivered order item and logs a `DISPENSE` entry, keyed by
/// [`dispense_idempotency_key`]. Returns `None` without touching anything if this item's dispense was already
/// recorded.
pub async fn decrement_item_for_dispense(
    order_id: &OrderId,
    item: &OrderItem,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<StockLogEntry>, sqlx::Error> {
    let key = dispense_idempotency_key(order_id, item.slot_id);
    if let Some(entry) = fetch_by_idempotency_key(&key, conn).await? {
        debug!("🗃️ Stock for {key} was already decremented in log #{}", entry.id);
        return Ok(None);
    }
    if !slots::lock_slot(item.slot_id, conn).await? {
        return Err(sqlx::Error::RowNotFound);
    }
    let slot = slots::fetch_slot(item.slot_id, conn).await?.ok_or(sqlx::Error::RowNotFound)?;
    let change = StockChange::dispense(slot.current_stock, item.quantity, slot.capacity);
    slots::set_current_stock(slot.id, change.after, now, conn).await?;
    let entry = NewStockLogEntry {
        machine_id: slot.machine_id,
        slot_id: slot.id,
        change_type: StockChangeType::Dispense,
        quantity_before: change.before,
        quantity_after: change.after,
        reason: Some(format!("Dispensed for order {order_id}")),
        performed_by: "system".to_string(),
        requested_type: None,
        requested_quantity: Some(item.quantity),
        idempotency_key: Some(key),
        created_at: now,
    };
    let entry = insert_log(entry, conn).await?;
    Ok(Some(entry))
}

/// Logs the slot's current stock as a zero-change `AUDIT` entry.
pub async fn insert_audit_snapshot(
    machine_id: &str,
    row: &SlotStockRow,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StockLogEntry, sqlx::Error> {
    let entry = NewStockLogEntry {
        machine_id: machine_id.to_string(),
        slot_id: row.slot_id,
        change_type: StockChangeType::Audit,
        quantity_before: row.current_stock,
        quantity_after: row.current_stock,
        reason: Some("Automated stock report".to_string()),
        performed_by: "system".to_string(),
        requested_type: None,
        requested_quantity: None,
        idempotency_key: None,
        created_at: now,
    };
    insert_log(entry, conn).await
}
