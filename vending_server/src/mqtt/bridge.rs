use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use log::*;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use vending_engine::{dispense_objects::DispenseCommand, traits::CommandPublisher};

use crate::{
    config::MqttConfig,
    mqtt::topics::{command_topic, subscription_topics},
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const REQUEST_CHANNEL_CAPACITY: usize = 64;
/// Inbound messages waiting for the dispatcher. The network loop only waits once this many are queued.
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// A message received on one of the subscribed topics.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// The broker connection.
///
/// Cloning the bridge shares the connection. A bridge built with [`MqttBridge::offline`] never connects; every
/// publish on it returns `false`.
#[derive(Clone)]
pub struct MqttBridge {
    client: Option<AsyncClient>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for MqttBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MqttBridge(connected: {})", self.is_connected())
    }
}

impl MqttBridge {
    /// A bridge with no broker behind it.
    pub fn offline() -> Self {
        Self { client: None, connected: Arc::new(AtomicBool::new(false)), shutdown: Arc::new(AtomicBool::new(true)) }
    }

    /// Connects to the broker and subscribes to the inbound topics of `machine_id`.
    ///
    /// The connection is driven by a background task that reconnects with exponential backoff and re-subscribes on
    /// every new session. Inbound messages are delivered on the returned channel.
    pub fn start(config: &MqttConfig, machine_id: &str) -> (Self, mpsc::Receiver<InboundMessage>) {
        let mut options = MqttOptions::new(config.client_id.as_str(), config.host.as_str(), config.port);
        options.set_keep_alive(config.keep_alive);
        if let Some(username) = &config.username {
            let password = config.password.as_ref().map(|p| p.reveal().clone()).unwrap_or_default();
            options.set_credentials(username.as_str(), password);
        }
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let bridge = Self {
            client: Some(client.clone()),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        let topics = subscription_topics(machine_id);
        info!("📡️ Connecting to MQTT broker at {}:{} as {}", config.host, config.port, config.client_id);
        tokio::spawn(run_event_loop(event_loop, client, topics, tx, bridge.connected.clone(), bridge.shutdown.clone()));
        (bridge, rx)
    }

    /// Closes the broker connection and stops the network loop.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(client) = &self.client {
            if let Err(e) = client.disconnect().await {
                debug!("📡️ MQTT disconnect request failed. {e}");
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("📡️ MQTT bridge disconnected");
    }
}

impl CommandPublisher for MqttBridge {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish_dispense_command(&self, machine_id: &str, command: &DispenseCommand) -> bool {
        let Some(client) = &self.client else {
            warn!("📡️ MQTT is disabled. Dispense command for order {} was not sent", command.order_id);
            return false;
        };
        if !self.is_connected() {
            warn!("📡️ MQTT is not connected. Dispense command for order {} was not sent", command.order_id);
            return false;
        }
        let payload = match serde_json::to_vec(command) {
            Ok(p) => p,
            Err(e) => {
                error!("📡️ Could not serialize dispense command for order {}. {e}", command.order_id);
                return false;
            },
        };
        let topic = command_topic(machine_id);
        match client.try_publish(topic.as_str(), QoS::AtLeastOnce, false, payload) {
            Ok(()) => {
                info!("📡️ Dispense command sent to {topic}: slot {} of order {}", command.slot, command.order_id);
                true
            },
            Err(e) => {
                warn!("📡️ Could not publish dispense command for order {}. {e}", command.order_id);
                false
            },
        }
    }
}

/// The next reconnect delay: doubled, up to [`MAX_BACKOFF`].
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    topics: Vec<String>,
    tx: mpsc::Sender<InboundMessage>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("📡️ Connected to MQTT broker");
                connected.store(true, Ordering::SeqCst);
                backoff = INITIAL_BACKOFF;
                for topic in &topics {
                    match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        Ok(()) => debug!("📡️ Subscribed to {topic}"),
                        Err(e) => error!("📡️ Could not subscribe to {topic}. {e}"),
                    }
                }
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                trace!("📡️ Message on {}", publish.topic);
                let message = InboundMessage { topic: publish.topic, payload: publish.payload };
                if tx.send(message).await.is_err() {
                    warn!("📡️ The message dispatcher has stopped. Closing the MQTT loop");
                    break;
                }
            },
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("📡️ The broker closed the connection");
                connected.store(false, Ordering::SeqCst);
            },
            Ok(_) => {},
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                warn!("📡️ MQTT connection error. {e}. Reconnecting in {}s", backoff.as_secs());
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            },
        }
    }
    connected.store(false, Ordering::SeqCst);
    debug!("📡️ MQTT network loop stopped");
}
