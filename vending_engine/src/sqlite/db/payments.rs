use sqlx::SqliteConnection;

use crate::db_types::{NewOrder, OrderId, Payment, PaymentMethodUpdate, PaymentUpdate};

/// Inserts the `PENDING` payment stub that accompanies a new order.
pub async fn insert_payment(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, gateway_name, gateway_order_ref, amount, status, payment_type, created_at)
            VALUES ($1, $2, $3, $4, 'PENDING', $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order.id.as_str())
    .bind(&order.gateway_name)
    .bind(&order.gateway_order_ref)
    .bind(order.total_amount())
    .bind(order.payment_method.as_str())
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

pub async fn fetch_payment(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(payment)
}

/// Resolves a gateway reference to the order it belongs to. Notifications for a reference that was replaced by a
/// payment method change still carry the bare order id, so that is tried as well.
pub async fn fetch_order_id_for_gateway_ref(
    gateway_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderId>, sqlx::Error> {
    let order_id: Option<String> = sqlx::query_scalar("SELECT order_id FROM payments WHERE gateway_order_ref = $1")
        .bind(gateway_ref)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = order_id {
        return Ok(Some(OrderId(id)));
    }
    let order_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM orders WHERE id = $1").bind(gateway_ref).fetch_optional(conn).await?;
    Ok(order_id.map(OrderId))
}

/// Stores the gateway's verdict on a payment. Returns `None` if the order has no payment record.
pub async fn update_payment_result(
    order_id: &OrderId,
    update: &PaymentUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments SET
                status = $1,
                gateway_transaction_id = COALESCE($2, gateway_transaction_id),
                payment_type = COALESCE($3, payment_type),
                transaction_status = $4,
                raw_response = $5,
                processed_at = $6
            WHERE order_id = $7
            RETURNING *;
        "#,
    )
    .bind(update.status)
    .bind(&update.gateway_transaction_id)
    .bind(&update.payment_type)
    .bind(&update.transaction_status)
    .bind(&update.raw_response)
    .bind(update.processed_at)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Points the payment at a newly registered gateway reference and clears the previous transaction's state.
pub async fn update_gateway_ref(
    order_id: &OrderId,
    update: &PaymentMethodUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments SET
                gateway_order_ref = $1,
                payment_type = $2,
                status = 'PENDING',
                gateway_transaction_id = NULL,
                transaction_status = NULL,
                raw_response = NULL,
                processed_at = NULL
            WHERE order_id = $3
            RETURNING *;
        "#,
    )
    .bind(&update.gateway_order_ref)
    .bind(update.payment_method.as_str())
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}
