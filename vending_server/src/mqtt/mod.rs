//! # Messaging bridge
//!
//! The machine is reached over MQTT. Every machine `M` owns four topics:
//! * `vm/M/command`: outbound dispense (and configuration) commands.
//! * `vm/M/dispense_result`: the hardware's report on a dispense.
//! * `vm/M/telemetry`: sensor batches (temperature, coarse slot levels).
//! * `vm/M/status`: online/offline/maintenance and diagnostics.
//!
//! [`MqttBridge`] owns the broker connection and publishes commands. Inbound messages are handed over a bounded
//! channel to the [`MessageRouter`], which runs them through the engine one at a time, so a slow database call never
//! stalls the network loop.
mod bridge;
mod router;
mod topics;

pub use bridge::{InboundMessage, MqttBridge};
pub use router::{spawn_dispatcher, MessageRouter, RoutingError};
pub use topics::{command_topic, subscription_topics, TopicKind, VmTopic};
