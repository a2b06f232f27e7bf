//! # Vending machine backend server
//! This crate hosts the HTTP and MQTT front end of the vending machine backend. It is responsible for:
//! * Taking orders from the machine's touch screen and registering their checkout with Midtrans.
//! * Receiving Midtrans payment notifications, and confirming payments against the Midtrans status API.
//! * Sending dispense commands to the machine over MQTT, and applying the results it reports back.
//! * Operator stock updates, machine telemetry and status reports.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/orders`, `/orders/multi`, `/orders/{order_id}`, `/orders/machine/{machine_id}`: Order creation and lookup.
//! * `/payments/webhook`: The Midtrans notification endpoint.
//! * `/payments/verify/{order_id}`, `/payments/{order_id}`, `/payments/method/{order_id}`: Payment checks and changes.
//! * `/dispense/trigger`, `/dispense/confirm`, `/dispense/status/{order_id}`, `/dispense/logs/{machine_id}`: Dispense
//!   control and history.
//! * `/stock/update`, `/stock/{machine_id}`, `/stock/logs/{machine_id}`, `/stock/report/{machine_id}`: The stock
//!   ledger.
//!
//! ## MQTT
//! See [mqtt](mqtt/index.html) for the topic layout.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod mqtt;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
