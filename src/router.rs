//! Bidirectional message routing between the control protocol and the
//! broker.
//!
//! Two independent pipelines, one task each:
//! - control→broker: wrap a received address/value message into a
//!   status topic + JSON payload and publish it (QoS 2, no retain).
//! - broker→control: unwrap a command topic + JSON payload into an
//!   address/value message and broadcast it to every connected device.
//!
//! The pipelines share no state and give no ordering guarantee relative
//! to each other; within a pipeline, messages flow in queue order. A
//! publish rejected by the broker is logged and the message dropped -
//! there is no retry beyond the client's own QoS handling.
//!
//! The broker→control pipeline also implements the momentary
//! convention: a payload of exactly `1.0` is followed, 100 ms later, by
//! a synthetic `0.0` to the same address. The follow-up is fire-and-
//! forget and never blocks the pipeline.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broker::BrokerConnection;
use crate::codec::{ControlCodec, SharedCodec};
use crate::config::TopicConfig;
use crate::protocol::{
    build_frame, is_momentary_trigger, payload_from_values, values_from_payload, BrokerMessage,
    ControlMessage, Value,
};
use crate::relay::ConnectionRegistry;
use crate::supervisor::TaskSupervisor;

/// Delay before the synthetic reset message of the momentary convention.
const MOMENTARY_RESET_DELAY: Duration = Duration::from_millis(100);

/// Translate a control message into its broker form.
///
/// `topic = status_prefix + address`; a single value becomes the bare
/// scalar payload, several become a JSON array.
pub fn translate_control(status_prefix: &str, message: &ControlMessage) -> BrokerMessage {
    BrokerMessage::new(
        format!("{status_prefix}{}", message.address),
        payload_from_values(&message.values),
    )
}

/// Translate a broker message into its control form.
///
/// Returns `None` for topics outside the command prefix. The payload is
/// normalized into a value sequence (a bare scalar is wrapped).
pub fn translate_broker(command_prefix: &str, message: &BrokerMessage) -> Option<ControlMessage> {
    let address = message.topic.strip_prefix(command_prefix)?;
    Some(ControlMessage::new(
        address,
        values_from_payload(&message.payload),
    ))
}

/// The two routing pipelines.
pub struct MessageRouter {
    status_prefix: String,
    command_prefix: String,
    broker: BrokerConnection,
    registry: Arc<ConnectionRegistry>,
    codec: SharedCodec,
}

impl MessageRouter {
    /// Create a router over the given broker session and device registry.
    pub fn new(
        topics: &TopicConfig,
        broker: BrokerConnection,
        registry: Arc<ConnectionRegistry>,
        codec: SharedCodec,
    ) -> Arc<Self> {
        Arc::new(Self {
            status_prefix: topics.publish.clone(),
            command_prefix: topics.subscribe.clone(),
            broker,
            registry,
            codec,
        })
    }

    /// Start both pipelines under the supervisor.
    pub fn start(
        self: &Arc<Self>,
        supervisor: &TaskSupervisor,
        ingress: mpsc::Receiver<ControlMessage>,
        egress: mpsc::Receiver<BrokerMessage>,
    ) {
        let router = self.clone();
        let token = supervisor.token();
        supervisor.spawn(async move { router.control_to_broker_loop(ingress, token).await });

        let router = self.clone();
        let token = supervisor.token();
        supervisor.spawn(async move { router.broker_to_control_loop(egress, token).await });
    }

    async fn control_to_broker_loop(
        self: Arc<Self>,
        mut ingress: mpsc::Receiver<ControlMessage>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = ingress.recv() => match received {
                    None => break,
                    Some(message) => {
                        let outgoing = translate_control(&self.status_prefix, &message);
                        info!(
                            topic = %outgoing.topic,
                            payload = %outgoing.payload,
                            "control -> broker"
                        );
                        if let Err(e) = self
                            .broker
                            .publish(&outgoing.topic, &outgoing.payload, QoS::ExactlyOnce, false)
                            .await
                        {
                            error!(topic = %outgoing.topic, error = %e, "publish failed, message dropped");
                        }
                    }
                },
            }
        }
    }

    async fn broker_to_control_loop(
        self: Arc<Self>,
        mut egress: mpsc::Receiver<BrokerMessage>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = egress.recv() => match received {
                    None => break,
                    Some(message) => self.handle_broker_message(message),
                },
            }
        }
    }

    fn handle_broker_message(self: &Arc<Self>, message: BrokerMessage) {
        // The trigger check looks at the payload before normalization:
        // the array [1.0] does not count.
        let momentary = is_momentary_trigger(&message.payload);
        let Some(control) = translate_broker(&self.command_prefix, &message) else {
            debug!(topic = %message.topic, "ignoring topic outside command prefix");
            return;
        };
        info!(
            topic = %message.topic,
            address = %control.address,
            "broker -> control"
        );
        self.broadcast(&control);

        if momentary {
            let router = self.clone();
            let address = control.address.clone();
            tokio::spawn(async move {
                tokio::time::sleep(MOMENTARY_RESET_DELAY).await;
                let reset = ControlMessage::new(address, vec![Value::Float(0.0)]);
                router.broadcast(&reset);
            });
        }
    }

    fn broadcast(&self, message: &ControlMessage) {
        match self.codec.encode(message) {
            Ok(encoded) => {
                let delivered = self.registry.broadcast(&build_frame(&encoded));
                debug!(address = %message.address, delivered, "broadcast to devices");
            }
            Err(e) => error!(address = %message.address, error = %e, "encode failed"),
        }
    }
}
