use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Machine, MachineStatus},
    machine_objects::StatusReport,
};

#[derive(Debug, Clone, Error)]
pub enum MachineManagementError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Machine {0} does not exist")]
    MachineNotFound(String),
}

impl From<sqlx::Error> for MachineManagementError {
    fn from(e: sqlx::Error) -> Self {
        MachineManagementError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait MachineManagement {
    async fn fetch_machine(&self, machine_id: &str) -> Result<Option<Machine>, MachineManagementError>;

    /// Stores a raw telemetry payload and marks the machine as seen at `now`.
    async fn record_telemetry(
        &self,
        machine_id: &str,
        data: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), MachineManagementError>;

    async fn record_temperature(
        &self,
        machine_id: &str,
        value: f64,
        humidity: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<(), MachineManagementError>;

    /// Sets the machine status, marks it as seen at `now` and merges the reported diagnostics into its config.
    async fn update_machine_status(
        &self,
        machine_id: &str,
        status: MachineStatus,
        report: &StatusReport,
        now: DateTime<Utc>,
    ) -> Result<Machine, MachineManagementError>;
}
