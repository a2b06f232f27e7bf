use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 20] = [
        "RUST_LOG",
        "VM_HOST",
        "VM_PORT",
        "VM_DATABASE_URL",
        "VM_RUN_MIGRATIONS",
        "VM_ENVIRONMENT",
        "VM_MACHINE_ID",
        "VM_ORDER_TIMEOUT_MINS",
        "VM_REQUIRE_DROP_DETECTION",
        "VM_INTER_ITEM_DELAY_MS",
        "VM_DEFAULT_MOTOR_DURATION_MS",
        "VM_STOCK_DEDUP_WINDOW_SECS",
        "VM_TELEMETRY_STOCK_SYNC",
        "VM_MQTT_ENABLED",
        "VM_MQTT_HOST",
        "VM_MQTT_PORT",
        "VM_MQTT_USERNAME",
        "VM_MQTT_CLIENT_ID",
        "VM_MIDTRANS_PRODUCTION",
        "VM_MIDTRANS_VERIFY_SIGNATURE",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
