use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{SaleSlot, Slot},
    stock_objects::SlotStockRow,
};

pub async fn fetch_slot(slot_id: i64, conn: &mut SqliteConnection) -> Result<Option<Slot>, sqlx::Error> {
    let slot = sqlx::query_as("SELECT * FROM slots WHERE id = $1").bind(slot_id).fetch_optional(conn).await?;
    Ok(slot)
}

pub async fn fetch_slot_by_number(
    machine_id: &str,
    slot_number: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Slot>, sqlx::Error> {
    let slot = sqlx::query_as("SELECT * FROM slots WHERE machine_id = $1 AND slot_number = $2")
        .bind(machine_id)
        .bind(slot_number)
        .fetch_optional(conn)
        .await?;
    Ok(slot)
}

/// Fetches a slot of the given machine, joined with the product it sells.
pub async fn fetch_sale_slot(
    machine_id: &str,
    slot_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SaleSlot>, sqlx::Error> {
    let slot = sqlx::query_as(
        r#"
        SELECT
            s.id AS slot_id,
            s.machine_id,
            s.slot_number,
            s.capacity,
            s.current_stock,
            s.is_active,
            s.price_override,
            p.id AS product_id,
            p.name AS product_name,
            p.price AS product_price,
            p.is_active AS product_active
        FROM slots s LEFT JOIN products p ON p.id = s.product_id
        WHERE s.id = $1 AND s.machine_id = $2
        "#,
    )
    .bind(slot_id)
    .bind(machine_id)
    .fetch_optional(conn)
    .await?;
    Ok(slot)
}

/// Takes the write lock for the slot row. Returns `false` if the slot does not exist.
pub async fn lock_slot(slot_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE slots SET current_stock = current_stock WHERE id = $1").bind(slot_id).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

/// Writes a new stock value. Only the stock ledger calls this, always together with a stock log entry.
pub async fn set_current_stock(
    slot_id: i64,
    current_stock: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Slot, sqlx::Error> {
    let slot = sqlx::query_as("UPDATE slots SET current_stock = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(current_stock)
        .bind(now)
        .bind(slot_id)
        .fetch_one(conn)
        .await?;
    Ok(slot)
}

pub async fn fetch_stock_levels(machine_id: &str, conn: &mut SqliteConnection) -> Result<Vec<SlotStockRow>, sqlx::Error> {
    let rows = sqlx::query_as(
        r#"
        SELECT
            s.id AS slot_id,
            s.slot_number,
            s.product_id,
            p.name AS product_name,
            s.current_stock,
            s.capacity,
            s.is_active
        FROM slots s LEFT JOIN products p ON p.id = s.product_id
        WHERE s.machine_id = $1
        ORDER BY s.slot_number ASC
        "#,
    )
    .bind(machine_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
