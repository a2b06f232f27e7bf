use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use midtrans_tools::MidtransConfig;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use vending_engine::{dispense_objects::DispensePolicy, OrderFlowConfig};
use vm_common::{parse_env_flag, Secret};

const DEFAULT_VM_HOST: &str = "127.0.0.1";
const DEFAULT_VM_PORT: u16 = 3001;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/vending.db";
const DEFAULT_MACHINE_ID: &str = "VM01";
const DEFAULT_ORDER_TIMEOUT_MINS: u64 = 15;
const DEFAULT_INTER_ITEM_DELAY_MS: u64 = 1000;
const DEFAULT_MOTOR_DURATION_MS: i64 = 2150;
const DEFAULT_STOCK_DEDUP_WINDOW_SECS: u64 = 5;
const DEFAULT_MQTT_HOST: &str = "broker.emqx.io";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_KEEP_ALIVE_SECS: u64 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "test" => Ok(Self::Development),
            _ => Err(format!("{s} is not a known environment")),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Run the embedded migrations against the database at startup.
    pub run_migrations: bool,
    /// In production, the messages of internal errors are not sent to clients.
    pub environment: Environment,
    /// The machine this backend serves. Orders are created for it, and its MQTT topics are subscribed to.
    pub machine_id: String,
    /// The time before an unpaid order is considered expired.
    pub order_timeout: Duration,
    /// When true, a dispense only counts as delivered if the drop sensor saw the product fall.
    pub require_drop_detection: bool,
    /// The pause between consecutive dispense commands of a multi-item order.
    pub inter_item_delay: Duration,
    /// The motor run time sent to the machine for slots that do not define their own.
    pub default_motor_duration_ms: i64,
    /// Identical stock updates (without a request id) arriving within this window are treated as one.
    pub stock_dedup_window: Duration,
    /// Apply the coarse slot levels of telemetry reports to the stock ledger.
    pub telemetry_stock_sync: bool,
    pub mqtt: MqttConfig,
    pub midtrans: MidtransSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VM_HOST.to_string(),
            port: DEFAULT_VM_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            run_migrations: true,
            environment: Environment::default(),
            machine_id: DEFAULT_MACHINE_ID.to_string(),
            order_timeout: Duration::from_secs(DEFAULT_ORDER_TIMEOUT_MINS * 60),
            require_drop_detection: false,
            inter_item_delay: Duration::from_millis(DEFAULT_INTER_ITEM_DELAY_MS),
            default_motor_duration_ms: DEFAULT_MOTOR_DURATION_MS,
            stock_dedup_window: Duration::from_secs(DEFAULT_STOCK_DEDUP_WINDOW_SECS),
            telemetry_stock_sync: true,
            mqtt: MqttConfig::default(),
            midtrans: MidtransSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("VM_HOST").ok().unwrap_or_else(|| DEFAULT_VM_HOST.into());
        let port = env_or_default("VM_PORT", DEFAULT_VM_PORT);
        let database_url = env::var("VM_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ VM_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let run_migrations = parse_env_flag("VM_RUN_MIGRATIONS", true);
        let environment = env::var("VM_ENVIRONMENT")
            .ok()
            .and_then(|s| {
                s.parse::<Environment>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for VM_ENVIRONMENT. {e}"))
                    .ok()
            })
            .unwrap_or_default();
        let machine_id = env::var("VM_MACHINE_ID").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
            info!("🪛️ VM_MACHINE_ID is not set. Serving machine {DEFAULT_MACHINE_ID}.");
            DEFAULT_MACHINE_ID.to_string()
        });
        let order_timeout =
            Duration::from_secs(env_or_default("VM_ORDER_TIMEOUT_MINS", DEFAULT_ORDER_TIMEOUT_MINS) * 60);
        let require_drop_detection = parse_env_flag("VM_REQUIRE_DROP_DETECTION", false);
        let inter_item_delay =
            Duration::from_millis(env_or_default("VM_INTER_ITEM_DELAY_MS", DEFAULT_INTER_ITEM_DELAY_MS));
        let default_motor_duration_ms = env_or_default("VM_DEFAULT_MOTOR_DURATION_MS", DEFAULT_MOTOR_DURATION_MS);
        let stock_dedup_window =
            Duration::from_secs(env_or_default("VM_STOCK_DEDUP_WINDOW_SECS", DEFAULT_STOCK_DEDUP_WINDOW_SECS));
        let telemetry_stock_sync = parse_env_flag("VM_TELEMETRY_STOCK_SYNC", true);
        let mqtt = MqttConfig::from_env_or_default();
        let midtrans = MidtransSettings::from_env_or_default();
        if environment.is_production() && !midtrans.verify_signature {
            warn!("🚨️ Webhook signature verification is switched off in production. Anyone can confirm payments.");
        }
        Self {
            host,
            port,
            database_url,
            run_migrations,
            environment,
            machine_id,
            order_timeout,
            require_drop_detection,
            inter_item_delay,
            default_motor_duration_ms,
            stock_dedup_window,
            telemetry_stock_sync,
            mqtt,
            midtrans,
        }
    }

    pub fn order_flow_config(&self) -> OrderFlowConfig {
        OrderFlowConfig {
            machine_id: self.machine_id.clone(),
            order_timeout: self.order_timeout,
            inter_item_delay: self.inter_item_delay,
            default_motor_duration_ms: self.default_motor_duration_ms,
            dispense_policy: DispensePolicy { require_drop_detection: self.require_drop_detection },
        }
    }
}

//-------------------------------------------------  MqttConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct MqttConfig {
    /// When false, no broker connection is made and every dispense is parked in `PENDING_DISPENSE`.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_MQTT_HOST.to_string(),
            port: DEFAULT_MQTT_PORT,
            username: None,
            password: None,
            client_id: random_client_id(),
            keep_alive: Duration::from_secs(DEFAULT_MQTT_KEEP_ALIVE_SECS),
        }
    }
}

impl MqttConfig {
    pub fn from_env_or_default() -> Self {
        let enabled = parse_env_flag("VM_MQTT_ENABLED", true);
        if !enabled {
            warn!("🪛️ The MQTT bridge is disabled. Paid orders will wait in PENDING_DISPENSE.");
        }
        let host = env::var("VM_MQTT_HOST").ok().unwrap_or_else(|| DEFAULT_MQTT_HOST.into());
        let port = env_or_default("VM_MQTT_PORT", DEFAULT_MQTT_PORT);
        let username = env::var("VM_MQTT_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("VM_MQTT_PASSWORD").ok().filter(|s| !s.is_empty()).map(Secret::new);
        let client_id = env::var("VM_MQTT_CLIENT_ID").ok().filter(|s| !s.is_empty()).unwrap_or_else(random_client_id);
        let keep_alive = Duration::from_secs(env_or_default("VM_MQTT_KEEP_ALIVE_SECS", DEFAULT_MQTT_KEEP_ALIVE_SECS));
        Self { enabled, host, port, username, password, client_id, keep_alive }
    }
}

fn random_client_id() -> String {
    let suffix = thread_rng().sample_iter(&Alphanumeric).take(8).map(char::from).collect::<String>();
    format!("vending-backend-{}", suffix.to_ascii_lowercase())
}

//-------------------------------------------------  MidtransSettings  -------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct MidtransSettings {
    pub api: MidtransConfig,
    /// Reject webhook notifications whose `signature_key` does not match.
    pub verify_signature: bool,
}

impl MidtransSettings {
    pub fn from_env_or_default() -> Self {
        let api = MidtransConfig::new_from_env_or_default();
        let verify_signature = parse_env_flag("VM_MIDTRANS_VERIFY_SIGNATURE", true);
        if !verify_signature {
            warn!("🪛️ Midtrans notification signatures will NOT be verified.");
        }
        Self { api, verify_signature }
    }
}

/// Reads and parses `name`, logging and falling back to `default` if the value is missing or invalid.
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
    }
}
