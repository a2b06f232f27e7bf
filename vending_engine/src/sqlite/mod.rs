//! SQLite backend for the vending engine.
//!
//! Migrations are embedded from `src/sqlite/migrations` and can be applied with [`SqliteDatabase::migrate`].
mod errors;
mod sqlite_impl;

pub mod db;
pub use errors::SqliteDatabaseError;
pub use sqlite_impl::SqliteDatabase;
