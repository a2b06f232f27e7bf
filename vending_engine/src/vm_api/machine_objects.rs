use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A slot fill level reported by the machine's sensors. `id` is the slot number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotLevelReport {
    #[serde(alias = "slot")]
    pub id: Option<i64>,
    pub level: Option<String>,
}

/// A telemetry batch. Unknown fields are kept in the raw payload that is stored alongside.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryReport {
    #[serde(default)]
    pub slots: Vec<SlotLevelReport>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
}

impl TelemetryReport {
    /// Machines name the temperature reading `temperature`, `temp` or `value`, depending on firmware.
    pub fn temperature_reading(&self) -> Option<f64> {
        self.temperature.or(self.temp).or(self.value)
    }
}

/// A status report published by a machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rssi: Option<i64>,
    #[serde(default)]
    pub fw: Option<String>,
    #[serde(default)]
    pub door: Option<String>,
}

impl StatusReport {
    /// Merges the reported diagnostics into an existing machine config object.
    pub fn merge_into(&self, config: &mut Map<String, Value>) {
        if let Some(rssi) = self.rssi {
            config.insert("rssi".into(), Value::from(rssi));
        }
        if let Some(fw) = &self.fw {
            config.insert("firmware".into(), Value::from(fw.clone()));
        }
        if let Some(door) = &self.door {
            config.insert("door".into(), Value::from(door.clone()));
        }
    }
}
