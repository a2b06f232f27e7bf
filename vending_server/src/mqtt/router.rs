use std::sync::Arc;

use log::*;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use vending_engine::{
    dispense_objects::DispenseResultPayload,
    machine_objects::StatusReport,
    traits::{CommandPublisher, DispenseManagement, MachineManagement, OrderManagement, PaymentGateway, StockManagement},
    MachineApi,
    OrderFlowApi,
};

use crate::mqtt::{
    bridge::InboundMessage,
    topics::{TopicKind, VmTopic},
};

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("{0}")]
    UnknownTopic(String),
    #[error("Message from machine {0} ignored. This backend serves {1}")]
    ForeignMachine(String, String),
    #[error("Malformed {kind} payload. {reason}")]
    MalformedPayload { kind: TopicKind, reason: String },
    #[error("{0}")]
    HandlerError(String),
}

/// Routes inbound machine messages to the engine, by the kind segment of the topic.
pub struct MessageRouter<B, G, P> {
    machine_id: String,
    orders: Arc<OrderFlowApi<B, G, P>>,
    machines: Arc<MachineApi<B>>,
}

impl<B, G, P> MessageRouter<B, G, P> {
    pub fn new(machine_id: &str, orders: Arc<OrderFlowApi<B, G, P>>, machines: Arc<MachineApi<B>>) -> Self {
        Self { machine_id: machine_id.to_string(), orders, machines }
    }
}

impl<B, G, P> MessageRouter<B, G, P>
where
    B: OrderManagement + DispenseManagement + MachineManagement + StockManagement,
    G: PaymentGateway,
    P: CommandPublisher,
{
    pub async fn route(&self, message: &InboundMessage) -> Result<TopicKind, RoutingError> {
        let topic = message.topic.parse::<VmTopic>().map_err(RoutingError::UnknownTopic)?;
        if topic.machine_id != self.machine_id {
            return Err(RoutingError::ForeignMachine(topic.machine_id, self.machine_id.clone()));
        }
        let machine_id = topic.machine_id.as_str();
        match topic.kind {
            TopicKind::DispenseResult => {
                let payload = parse::<DispenseResultPayload>(topic.kind, &message.payload)?;
                let outcome = self
                    .orders
                    .handle_dispense_result(machine_id, payload)
                    .await
                    .map_err(|e| RoutingError::HandlerError(e.to_string()))?;
                debug!("📡️ Dispense result for order {} applied. Order is {}", outcome.order.id, outcome.order.status);
            },
            TopicKind::Telemetry => {
                let payload = parse::<Value>(topic.kind, &message.payload)?;
                self.machines
                    .record_telemetry(machine_id, payload)
                    .await
                    .map_err(|e| RoutingError::HandlerError(e.to_string()))?;
            },
            TopicKind::Status => {
                let report = parse::<StatusReport>(topic.kind, &message.payload)?;
                self.machines
                    .update_status(machine_id, report)
                    .await
                    .map_err(|e| RoutingError::HandlerError(e.to_string()))?;
            },
            TopicKind::Command => {
                trace!("📡️ Ignoring echo of our own command on {}", message.topic);
            },
        }
        Ok(topic.kind)
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: TopicKind, payload: &[u8]) -> Result<T, RoutingError> {
    serde_json::from_slice(payload).map_err(|e| RoutingError::MalformedPayload { kind, reason: e.to_string() })
}

/// Processes inbound messages one at a time until the bridge's channel closes. A message that fails is logged and
/// dropped; it never stops the loop.
pub fn spawn_dispatcher<B, G, P>(
    router: MessageRouter<B, G, P>,
    mut rx: mpsc::Receiver<InboundMessage>,
) -> actix_web::rt::task::JoinHandle<()>
where
    B: OrderManagement + DispenseManagement + MachineManagement + StockManagement + 'static,
    G: PaymentGateway + 'static,
    P: CommandPublisher + 'static,
{
    actix_web::rt::spawn(async move {
        info!("📡️ Message dispatcher started");
        while let Some(message) = rx.recv().await {
            match router.route(&message).await {
                Ok(kind) => trace!("📡️ {kind} message on {} handled", message.topic),
                Err(e @ RoutingError::ForeignMachine(..)) => debug!("📡️ {e}"),
                Err(e) => warn!("📡️ Could not handle message on {}. {e}", message.topic),
            }
        }
        info!("📡️ Message dispatcher stopped");
    })
}
