use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentMethodUpdate, StatusTransition},
    order_objects::OrderQueryFilter,
};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// The order row records the first line item's slot and product, and the total quantity over all items.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let first = order.items.first().ok_or_else(|| sqlx::Error::Protocol(format!("Order {} has no items", order.id)))?;
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                id,
                machine_id,
                slot_id,
                product_id,
                quantity,
                total_amount,
                status,
                payment_method,
                payment_url,
                payment_token,
                customer_phone,
                created_at,
                expires_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $8, $9, $10, $11, $12, $11)
            RETURNING *;
        "#,
    )
    .bind(order.id.as_str())
    .bind(&order.machine_id)
    .bind(first.slot_id)
    .bind(first.product_id)
    .bind(order.total_quantity())
    .bind(order.total_amount())
    .bind(order.payment_method)
    .bind(&order.payment_url)
    .bind(&order.payment_token)
    .bind(&order.customer_phone)
    .bind(order.created_at)
    .bind(order.expires_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted for {}", order.id, order.total_amount);
    Ok(order)
}

pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Takes the write lock for the order row. Returns `false` if the order does not exist.
pub async fn lock_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE orders SET updated_at = updated_at WHERE id = $1").bind(order_id.as_str()).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

/// Conditionally moves the order to a new status. The update only applies if the order's current status is
/// `transition.from`. Returns the updated order, or `None` if the order does not exist or is in another status.
///
/// `paid_at` and `dispensed_at` are stamped the first time the order becomes `PAID` or `COMPLETED`. If `note` is
/// given, it replaces the order's notes.
pub async fn update_order_status(
    order_id: &OrderId,
    transition: StatusTransition,
    note: Option<String>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                notes = COALESCE($2, notes),
                updated_at = $3,
                paid_at = CASE WHEN $1 = 'PAID' AND paid_at IS NULL THEN $3 ELSE paid_at END,
                dispensed_at = CASE WHEN $1 = 'COMPLETED' AND dispensed_at IS NULL THEN $3 ELSE dispensed_at END
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(transition.to)
    .bind(note)
    .bind(now)
    .bind(order_id.as_str())
    .bind(transition.from)
    .fetch_optional(conn)
    .await?;
    if order.is_some() {
        trace!("🗃️ Order [{order_id}] moved from {} to {}", transition.from, transition.to);
    }
    Ok(order)
}

/// Replaces the notes of an order without touching its status.
pub async fn set_order_note(
    order_id: &OrderId,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("UPDATE orders SET notes = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(note)
        .bind(now)
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Stores a new payment handle on a `PENDING` order. Returns `None` if the order is not (or no longer) pending.
pub async fn update_payment_fields(
    order_id: &OrderId,
    update: &PaymentMethodUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                payment_method = $1,
                payment_url = $2,
                payment_token = $3,
                updated_at = $4
            WHERE id = $5 AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(update.payment_method)
    .bind(&update.payment_url)
    .bind(&update.payment_token)
    .bind(update.updated_at)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in descending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(machine_id) = query.machine_id {
        where_clause.push("machine_id = ");
        where_clause.push_bind_unseparated(machine_id);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        let status_clause = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    let page = query.pagination.normalized();
    builder.push(" ORDER BY created_at DESC LIMIT ");
    builder.push_bind(page.limit);
    builder.push(" OFFSET ");
    builder.push_bind(page.offset);
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {} rows", orders.len());
    Ok(orders)
}
