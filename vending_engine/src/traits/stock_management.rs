use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Slot, StockLogEntry},
    stock_objects::{SlotStockRow, StockLogFilter, StockUpdateOutcome, StockUpdateRequest},
};

#[derive(Debug, Clone, Error)]
pub enum StockLedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Slot {0} does not exist")]
    SlotNotFound(i64),
    #[error("Machine {0} does not exist")]
    MachineNotFound(String),
    #[error("Stock of slot {slot_id} is {actual}, but {expected} was expected")]
    StockConflict { slot_id: i64, expected: i64, actual: i64 },
    #[error("Invalid stock update. {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for StockLedgerError {
    fn from(e: sqlx::Error) -> Self {
        StockLedgerError::DatabaseError(e.to_string())
    }
}

/// The stock ledger backend. This is the only path through which `slots.current_stock` changes, and every change
/// writes exactly one stock log entry in the same transaction.
#[allow(async_fn_in_trait)]
pub trait StockManagement {
    async fn fetch_slot(&self, slot_id: i64) -> Result<Option<Slot>, StockLedgerError>;

    async fn fetch_slot_by_number(&self, machine_id: &str, slot_number: i64) -> Result<Option<Slot>, StockLedgerError>;

    /// Applies a stock update in a single atomic transaction. In order:
    /// 1. The slot row is locked.
    /// 2. Duplicate detection. A request carrying a request id that was already recorded, or (without a request id)
    ///    a request matching an entry for the same slot with the same requested change type and quantity written
    ///    within `dedup_window` of `now`, returns that entry with `is_duplicate` set and changes nothing.
    /// 3. If `expected_current_stock` is given and differs from the live value, `StockConflict` is returned.
    /// 4. The new value is computed and clamped to `[0, capacity]`, written, and logged.
    async fn apply_stock_update(
        &self,
        request: &StockUpdateRequest,
        dedup_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<StockUpdateOutcome, StockLedgerError>;

    /// Records a zero-change `AUDIT` entry for every slot of the machine and marks the machine as seen, in one
    /// transaction. Returns the slots as they were recorded, in slot number order.
    async fn record_stock_report(
        &self,
        machine_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlotStockRow>, StockLedgerError>;

    /// Fetches every slot of the machine with its product name, in slot number order.
    async fn fetch_stock_levels(&self, machine_id: &str) -> Result<Vec<SlotStockRow>, StockLedgerError>;

    /// Fetches stock log entries matching the filter, newest first.
    async fn fetch_stock_logs(&self, filter: StockLogFilter) -> Result<Vec<StockLogEntry>, StockLedgerError>;
}
