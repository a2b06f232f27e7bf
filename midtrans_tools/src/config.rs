use std::time::Duration;

use log::*;
use vm_common::{parse_env_flag, Secret};

const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com";
const SANDBOX_CORE_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_CORE_URL: &str = "https://api.midtrans.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MidtransConfig {
    pub server_key: Secret<String>,
    pub client_key: String,
    /// Use the production endpoints. When false, the sandbox is used.
    pub is_production: bool,
    pub request_timeout: Duration,
}

impl Default for MidtransConfig {
    fn default() -> Self {
        Self {
            server_key: Secret::default(),
            client_key: String::default(),
            is_production: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MidtransConfig {
    pub fn new_from_env_or_default() -> Self {
        let server_key = Secret::new(std::env::var("VM_MIDTRANS_SERVER_KEY").unwrap_or_else(|_| {
            warn!("VM_MIDTRANS_SERVER_KEY not set, using (probably useless) default");
            "SB-Mid-server-00000000000000".to_string()
        }));
        let client_key = std::env::var("VM_MIDTRANS_CLIENT_KEY").unwrap_or_else(|_| {
            warn!("VM_MIDTRANS_CLIENT_KEY not set. Front-end checkout widgets will not work.");
            String::default()
        });
        let is_production = parse_env_flag("VM_MIDTRANS_PRODUCTION", false);
        if is_production {
            info!("Midtrans is configured for PRODUCTION");
        } else {
            info!("Midtrans is configured for the sandbox");
        }
        Self { server_key, client_key, is_production, request_timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    pub fn snap_url(&self) -> &'static str {
        if self.is_production {
            PRODUCTION_SNAP_URL
        } else {
            SANDBOX_SNAP_URL
        }
    }

    pub fn core_api_url(&self) -> &'static str {
        if self.is_production {
            PRODUCTION_CORE_URL
        } else {
            SANDBOX_CORE_URL
        }
    }
}
