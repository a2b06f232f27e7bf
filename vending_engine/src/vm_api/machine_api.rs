use std::{fmt::Debug, str::FromStr};

use chrono::Utc;
use log::*;
use serde_json::Value;

use crate::{
    db_types::{Machine, MachineStatus, StockUpdateType},
    machine_objects::{StatusReport, TelemetryReport},
    stock_objects::{StockUpdateRequest, TelemetryLevel},
    traits::{MachineManagement, StockManagement},
    MachineApiError,
    StockLedgerApi,
};

pub const TELEMETRY_PERFORMER: &str = "telemetry";

/// Handles what the machines report on their own: telemetry batches and status changes.
///
/// When telemetry stock sync is switched on, sensor fill levels are turned into `AUDIT` entries on the stock ledger.
/// The sensors are coarse, so this is off by default and stock is otherwise only moved by dispenses and operators.
pub struct MachineApi<B> {
    db: B,
    ledger: StockLedgerApi<B>,
    telemetry_stock_sync: bool,
}

impl<B> Debug for MachineApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MachineApi (telemetry stock sync: {})", self.telemetry_stock_sync)
    }
}

impl<B> MachineApi<B> {
    pub fn new(db: B, ledger: StockLedgerApi<B>) -> Self {
        Self { db, ledger, telemetry_stock_sync: false }
    }

    pub fn with_telemetry_stock_sync(mut self, enabled: bool) -> Self {
        self.telemetry_stock_sync = enabled;
        self
    }
}

impl<B> MachineApi<B>
where B: MachineManagement + StockManagement
{
    pub async fn fetch_machine(&self, machine_id: &str) -> Result<Machine, MachineApiError> {
        self.db.fetch_machine(machine_id).await?.ok_or_else(|| MachineApiError::MachineNotFound(machine_id.to_string()))
    }

    /// Stores a telemetry batch verbatim and records its temperature reading, if any. With stock sync switched on,
    /// every reported slot level that disagrees with the ledger is written as an audit.
    pub async fn record_telemetry(&self, machine_id: &str, payload: Value) -> Result<(), MachineApiError> {
        let now = Utc::now();
        self.db.record_telemetry(machine_id, &payload, now).await?;
        let report = serde_json::from_value::<TelemetryReport>(payload)
            .map_err(|e| MachineApiError::InvalidReport(e.to_string()))?;
        if let Some(value) = report.temperature_reading() {
            self.db.record_temperature(machine_id, value, report.humidity, now).await?;
            trace!("📡️ Machine {machine_id} reads {value}°C");
        }
        if !self.telemetry_stock_sync || report.slots.is_empty() {
            return Ok(());
        }
        for slot_report in &report.slots {
            let (Some(slot_number), Some(level)) = (slot_report.id, slot_report.level.as_deref()) else {
                warn!("📡️ Skipping incomplete slot level from machine {machine_id}: {slot_report:?}");
                continue;
            };
            let level = match TelemetryLevel::from_str(level) {
                Ok(l) => l,
                Err(e) => {
                    warn!("📡️ Skipping slot {slot_number} of machine {machine_id}. {e}");
                    continue;
                },
            };
            let Some(slot) = self.ledger.fetch_slot_by_number(machine_id, slot_number).await? else {
                warn!("📡️ Machine {machine_id} reported a level for unknown slot {slot_number}");
                continue;
            };
            let estimate = level.estimated_units().min(slot.capacity);
            if estimate == slot.current_stock {
                continue;
            }
            let request = StockUpdateRequest::new(slot.id, estimate, StockUpdateType::Audit)
                .with_reason(format!("Telemetry level {level:?}"))
                .performed_by(TELEMETRY_PERFORMER);
            self.ledger.update_stock(request).await?;
        }
        Ok(())
    }

    /// Applies a status report. Unrecognised statuses count as `online`, since the machine evidently is.
    pub async fn update_status(&self, machine_id: &str, report: StatusReport) -> Result<Machine, MachineApiError> {
        let status = MachineStatus::from_report(report.status.as_deref());
        let machine = self.db.update_machine_status(machine_id, status, &report, Utc::now()).await?;
        info!("📡️ Machine {machine_id} is {status}");
        Ok(machine)
    }
}
