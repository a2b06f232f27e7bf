use sqlx::SqliteConnection;

use crate::db_types::{NewOrderItem, OrderId, OrderItem};

pub async fn insert_items(
    order_id: &OrderId,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, slot_id, product_id, product_name, quantity, unit_price, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7);
            "#,
        )
        .bind(order_id.as_str())
        .bind(item.slot_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Fetches the line items of an order, joined with their slots, in slot number order.
pub async fn fetch_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as(
        r#"
        SELECT
            oi.id,
            oi.order_id,
            oi.slot_id,
            s.slot_number,
            oi.product_id,
            oi.product_name,
            oi.quantity,
            oi.unit_price,
            oi.total,
            s.motor_duration_ms
        FROM order_items oi JOIN slots s ON s.id = oi.slot_id
        WHERE oi.order_id = $1
        ORDER BY s.slot_number ASC
        "#,
    )
    .bind(order_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(items)
}
