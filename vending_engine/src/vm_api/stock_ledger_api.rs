use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Slot, StockLogEntry},
    stock_objects::{
        MachineStockReport,
        SlotStock,
        StockLogFilter,
        StockReportReceipt,
        StockUpdateOutcome,
        StockUpdateRequest,
    },
    traits::{StockLedgerError, StockManagement},
};

/// The window in which two identical stock updates without a request id are treated as one.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// `StockLedgerApi` is the only way stock levels change. Every change is clamped to the slot's capacity and recorded
/// in the stock log together with the value before and after it.
pub struct StockLedgerApi<B> {
    db: B,
    dedup_window: Duration,
}

impl<B> Debug for StockLedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StockLedgerApi (dedup window {:?})", self.dedup_window)
    }
}

impl<B: Clone> Clone for StockLedgerApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), dedup_window: self.dedup_window }
    }
}

impl<B> StockLedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, dedup_window: DEFAULT_DEDUP_WINDOW }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }
}

impl<B> StockLedgerApi<B>
where B: StockManagement
{
    /// Applies an operator or telemetry stock change.
    ///
    /// Retries are absorbed: a request whose request id was already applied, or an identical request (same slot,
    /// type and quantity) arriving within the dedup window, returns the original log entry unchanged. If the request
    /// names the stock level it expects and the slot holds something else, `StockConflict` is returned and the client
    /// should re-read the slot before trying again.
    pub async fn update_stock(&self, request: StockUpdateRequest) -> Result<StockUpdateOutcome, StockLedgerError> {
        request.validate().map_err(StockLedgerError::ValidationError)?;
        let outcome = self.db.apply_stock_update(&request, self.dedup_window, Utc::now()).await.map_err(|e| {
            if let StockLedgerError::StockConflict { slot_id, expected, actual } = &e {
                warn!("📦️ Stock update for slot {slot_id} rejected. Expected {expected} units, found {actual}");
            }
            e
        })?;
        let entry = &outcome.entry;
        if outcome.is_duplicate {
            info!(
                "📦️ Duplicate {} update for slot {} ignored. Original entry #{} stands",
                request.change_type, request.slot_id, entry.id
            );
        } else {
            info!(
                "📦️ Slot {} {}: {} -> {} by {}",
                request.slot_id, entry.change_type, entry.quantity_before, entry.quantity_after, entry.performed_by
            );
        }
        Ok(outcome)
    }

    /// Reports the stock of every slot of the machine, with fill levels and a summary.
    pub async fn stock_levels(&self, machine_id: &str) -> Result<MachineStockReport, StockLedgerError> {
        let rows = self.db.fetch_stock_levels(machine_id).await?;
        let slots = rows.into_iter().map(SlotStock::from).collect();
        Ok(MachineStockReport::new(machine_id.to_string(), slots))
    }

    /// Stores the machine's current stock as an audit snapshot. No stock level changes.
    pub async fn record_stock_report(&self, machine_id: &str) -> Result<StockReportReceipt, StockLedgerError> {
        let reported_at = Utc::now();
        let rows = self.db.record_stock_report(machine_id, reported_at).await?;
        info!("📦️ Stock report from {machine_id}: {} slot(s) audited", rows.len());
        let stock_snapshot: Vec<SlotStock> = rows.into_iter().map(SlotStock::from).collect();
        Ok(StockReportReceipt {
            machine_id: machine_id.to_string(),
            reported_at,
            stock_count: stock_snapshot.len(),
            stock_snapshot,
        })
    }

    pub async fn stock_logs(&self, filter: StockLogFilter) -> Result<Vec<StockLogEntry>, StockLedgerError> {
        self.db.fetch_stock_logs(filter).await
    }

    pub async fn fetch_slot(&self, slot_id: i64) -> Result<Slot, StockLedgerError> {
        self.db.fetch_slot(slot_id).await?.ok_or(StockLedgerError::SlotNotFound(slot_id))
    }

    pub async fn fetch_slot_by_number(
        &self,
        machine_id: &str,
        slot_number: i64,
    ) -> Result<Option<Slot>, StockLedgerError> {
        self.db.fetch_slot_by_number(machine_id, slot_number).await
    }
}
