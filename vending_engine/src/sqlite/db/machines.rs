use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{Machine, MachineStatus};

pub async fn fetch_machine(machine_id: &str, conn: &mut SqliteConnection) -> Result<Option<Machine>, sqlx::Error> {
    let machine = sqlx::query_as("SELECT * FROM machines WHERE id = $1").bind(machine_id).fetch_optional(conn).await?;
    Ok(machine)
}

/// Stamps `last_seen`. Returns `false` if the machine does not exist.
pub async fn mark_seen(machine_id: &str, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE machines SET last_seen = $1 WHERE id = $2").bind(now).bind(machine_id).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert_telemetry(
    machine_id: &str,
    data: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO telemetry (machine_id, data, received_at) VALUES ($1, $2, $3)")
        .bind(machine_id)
        .bind(data)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_temperature(
    machine_id: &str,
    value: f64,
    humidity: Option<f64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO temperature_logs (machine_id, value, humidity, created_at) VALUES ($1, $2, $3, $4)")
        .bind(machine_id)
        .bind(value)
        .bind(humidity)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_status(
    machine_id: &str,
    status: MachineStatus,
    config: Option<String>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Machine>, sqlx::Error> {
    let machine = sqlx::query_as(
        r#"
            UPDATE machines SET
                status = $1,
                config = COALESCE($2, config),
                last_seen = $3,
                updated_at = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(config)
    .bind(now)
    .bind(machine_id)
    .fetch_optional(conn)
    .await?;
    Ok(machine)
}
