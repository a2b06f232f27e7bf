use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{DispenseLog, OrderId},
    dispense_objects::{DispenseResult, DispenseTarget},
    order_objects::Pagination,
};

/// Records that a dispense command is about to be sent. If the item was dispensed before, the previous result is
/// cleared and the retry count goes up.
pub async fn upsert_pending(
    order_id: &OrderId,
    machine_id: &str,
    target: &DispenseTarget,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DispenseLog, sqlx::Error> {
    let log = sqlx::query_as(
        r#"
            INSERT INTO dispense_logs (order_id, machine_id, slot_number, item_index, command_sent_at, retry_count)
            VALUES ($1, $2, $3, $4, $5, 0)
            ON CONFLICT (order_id, machine_id, slot_number) DO UPDATE SET
                item_index = excluded.item_index,
                command_sent_at = excluded.command_sent_at,
                completed_at = NULL,
                duration_ms = NULL,
                success = NULL,
                drop_detected = NULL,
                error_message = NULL,
                retry_count = dispense_logs.retry_count + 1
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(machine_id)
    .bind(target.slot_number)
    .bind(target.item_index)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(log)
}

/// Stores a hardware result. A result with no tracked command (the machine started the dispense itself) gets a new
/// row without a command time.
///
/// Completion fields are only filled while the row has no result yet. Returns `None` if the slot already has a
/// reported result, in which case nothing is written.
pub async fn upsert_result(
    machine_id: &str,
    result: &DispenseResult,
    conn: &mut SqliteConnection,
) -> Result<Option<DispenseLog>, sqlx::Error> {
    let log = sqlx::query_as(
        r#"
            INSERT INTO dispense_logs (
                order_id,
                machine_id,
                slot_number,
                completed_at,
                duration_ms,
                success,
                drop_detected,
                error_message,
                retry_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)
            ON CONFLICT (order_id, machine_id, slot_number) DO UPDATE SET
                completed_at = excluded.completed_at,
                duration_ms = excluded.duration_ms,
                success = excluded.success,
                drop_detected = excluded.drop_detected,
                error_message = excluded.error_message
            WHERE dispense_logs.success IS NULL
            RETURNING *;
        "#,
    )
    .bind(result.order_id.as_str())
    .bind(machine_id)
    .bind(result.slot_number)
    .bind(result.reported_at)
    .bind(result.duration_ms)
    .bind(result.success)
    .bind(result.drop_detected)
    .bind(&result.error_message)
    .fetch_optional(conn)
    .await?;
    Ok(log)
}

pub async fn fetch_for_slot(
    order_id: &OrderId,
    machine_id: &str,
    slot_number: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<DispenseLog>, sqlx::Error> {
    let log = sqlx::query_as(
        "SELECT * FROM dispense_logs WHERE order_id = $1 AND machine_id = $2 AND slot_number = $3",
    )
    .bind(order_id.as_str())
    .bind(machine_id)
    .bind(slot_number)
    .fetch_optional(conn)
    .await?;
    Ok(log)
}

/// The most recent dispense log of an order, if any command or result was recorded.
pub async fn fetch_latest_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<DispenseLog>, sqlx::Error> {
    let log = sqlx::query_as("SELECT * FROM dispense_logs WHERE order_id = $1 ORDER BY id DESC LIMIT 1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(log)
}

pub async fn fetch_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<DispenseLog>, sqlx::Error> {
    let logs = sqlx::query_as("SELECT * FROM dispense_logs WHERE order_id = $1 ORDER BY slot_number ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(logs)
}

pub async fn fetch_for_machine(
    machine_id: &str,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<DispenseLog>, sqlx::Error> {
    let page = pagination.normalized();
    let logs = sqlx::query_as("SELECT * FROM dispense_logs WHERE machine_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3")
        .bind(machine_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(conn)
        .await?;
    Ok(logs)
}
