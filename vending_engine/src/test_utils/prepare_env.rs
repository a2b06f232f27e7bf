use std::path::Path;

use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{db_types::Rupiah, SqliteDatabase};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/vending_test_{}.db", dir.display(), rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 1).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    db.close().await;
    info!("🚀️ Migrations complete");
}

pub async fn create_database<P: AsRef<Path>>(path: P) {
    let p = path.as_ref().as_os_str().to_str().expect("Database path is not valid UTF-8");
    if Sqlite::database_exists(p).await.unwrap_or(false) {
        if let Err(e) = Sqlite::drop_database(p).await {
            warn!("🚀️ Error dropping database {p}: {e:?}");
        }
    }
    Sqlite::create_database(p).await.expect("Error creating database");
    info!("🚀️ Created Sqlite database {p}");
}

pub async fn seed_machine(db: &SqliteDatabase, machine_id: &str) {
    sqlx::query("INSERT INTO machines (id, name, location, status) VALUES ($1, $2, 'Test lobby', 'ONLINE')")
        .bind(machine_id)
        .bind(format!("Test machine {machine_id}"))
        .execute(db.pool())
        .await
        .expect("Error seeding machine");
}

/// Inserts an active product and returns its id.
pub async fn seed_product(db: &SqliteDatabase, name: &str, price: Rupiah) -> i64 {
    let mut tx = db.pool().begin().await.expect("Error starting transaction");
    let (id,): (i64,) = sqlx::query_as("INSERT INTO products (name, price) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(price)
        .fetch_one(&mut *tx)
        .await
        .expect("Error seeding product");
    tx.commit().await.expect("Error committing product");
    id
}

/// Inserts an active slot stocked with `stock` units of the product and returns its id.
pub async fn seed_slot(
    db: &SqliteDatabase,
    machine_id: &str,
    slot_number: i64,
    product_id: Option<i64>,
    capacity: i64,
    stock: i64,
) -> i64 {
    let mut tx = db.pool().begin().await.expect("Error starting transaction");
    let (id,): (i64,) = sqlx::query_as(
        r#"
            INSERT INTO slots (machine_id, slot_number, product_id, capacity, current_stock)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
        "#,
    )
    .bind(machine_id)
    .bind(slot_number)
    .bind(product_id)
    .bind(capacity)
    .bind(stock)
    .fetch_one(&mut *tx)
    .await
    .expect("Error seeding slot");
    tx.commit().await.expect("Error committing slot");
    id
}

pub async fn deactivate_slot(db: &SqliteDatabase, slot_id: i64) {
    sqlx::query("UPDATE slots SET is_active = FALSE WHERE id = $1")
        .bind(slot_id)
        .execute(db.pool())
        .await
        .expect("Error deactivating slot");
}

/// Moves an order's expiry into the past.
pub async fn expire_order(db: &SqliteDatabase, order_id: &str) {
    let past = chrono::Utc::now() - chrono::Duration::minutes(1);
    sqlx::query("UPDATE orders SET expires_at = $1 WHERE id = $2")
        .bind(past)
        .bind(order_id)
        .execute(db.pool())
        .await
        .expect("Error expiring order");
}
