//! Bridge wiring and lifecycle.
//!
//! [`Bridge::start`] assembles the whole data path:
//!
//! ```text
//! device ──TCP──► relay ──frames──► decoder ──ControlMessage──► router ──► broker
//! device ◄──TCP── registry ◄──ControlMessage── router ◄──BrokerMessage── broker
//! ```
//!
//! Startup order matters: the relay binds first (bind failure is fatal
//! and synchronous), then the broker session is established (also fatal
//! on failure), then the command subscription and the router pipelines.
//! `stop` tears everything down and returns only after every worker has
//! exited.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::BrokerConnection;
use crate::codec::{ControlCodec, OscCodec, SharedCodec};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::ControlMessage;
use crate::relay::{ConnectionRegistry, TcpFrameRelay};
use crate::router::MessageRouter;
use crate::supervisor::TaskSupervisor;

/// Capacity of the frame, ingress and egress queues.
const QUEUE_CAPACITY: usize = 256;

/// The assembled bridge.
pub struct Bridge {
    supervisor: TaskSupervisor,
    relay: TcpFrameRelay,
    broker: BrokerConnection,
    registry: Arc<ConnectionRegistry>,
    fatal_rx: mpsc::Receiver<BridgeError>,
}

impl Bridge {
    /// Validate the configuration, bind the relay, connect the broker
    /// and start all pipelines.
    pub async fn start(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;

        let supervisor = TaskSupervisor::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let codec: SharedCodec = Arc::new(OscCodec::new());

        let (delivery_tx, delivery_rx) = mpsc::channel::<Bytes>(QUEUE_CAPACITY);
        let (ingress_tx, ingress_rx) = mpsc::channel::<ControlMessage>(QUEUE_CAPACITY);
        let (egress_tx, egress_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        let relay = TcpFrameRelay::start(&config.tcp, registry.clone(), delivery_tx).await?;

        {
            let codec = codec.clone();
            let token = supervisor.token();
            supervisor
                .spawn(async move { decode_loop(delivery_rx, codec, ingress_tx, token).await });
        }

        let broker =
            BrokerConnection::connect(&config.mqtt.connection, egress_tx, &supervisor, fatal_tx)
                .await?;
        broker
            .subscribe(&format!("{}/#", config.mqtt.topics.subscribe))
            .await?;

        let router = MessageRouter::new(
            &config.mqtt.topics,
            broker.clone(),
            registry.clone(),
            codec,
        );
        router.start(&supervisor, ingress_rx, egress_rx);

        info!("bridge started");
        Ok(Self {
            supervisor,
            relay,
            broker,
            registry,
            fatal_rx,
        })
    }

    /// Registry of connected devices.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Broker session handle.
    pub fn broker(&self) -> &BrokerConnection {
        &self.broker
    }

    /// Address the relay listener is bound to.
    pub fn relay_addr(&self) -> SocketAddr {
        self.relay.local_addr()
    }

    /// Wait for a fatal, unrecoverable condition.
    ///
    /// Resolves when the broker session gives up reconnecting. The
    /// caller must stop the bridge and exit non-zero.
    pub async fn wait_fatal(&mut self) -> BridgeError {
        match self.fatal_rx.recv().await {
            Some(error) => error,
            None => BridgeError::ChannelClosed,
        }
    }

    /// Stop every worker and wait for them to exit.
    pub async fn stop(&self) {
        self.relay.stop().await;
        self.supervisor.shutdown().await;
        info!("bridge stopped");
    }
}

/// Turn complete frames into control messages on the ingress queue.
///
/// A frame the codec rejects is logged and dropped; the loop keeps
/// running.
async fn decode_loop(
    mut frames: mpsc::Receiver<Bytes>,
    codec: SharedCodec,
    ingress: mpsc::Sender<ControlMessage>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            received = frames.recv() => match received {
                None => break,
                Some(frame) => match codec.decode(&frame) {
                    Ok(message) => {
                        if ingress.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, len = frame.len(), "dropping undecodable frame"),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ControlCodec;
    use crate::protocol::Value;

    #[tokio::test]
    async fn test_decode_loop_forwards_control_messages() {
        let codec: SharedCodec = Arc::new(OscCodec::new());
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let (ingress_tx, mut ingress_rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let task = tokio::spawn(decode_loop(frame_rx, codec.clone(), ingress_tx, token.clone()));

        let message = ControlMessage::new("/fader1", vec![Value::Float(0.75)]);
        frame_tx.send(codec.encode(&message).unwrap()).await.unwrap();

        assert_eq!(ingress_rx.recv().await.unwrap(), message);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_loop_survives_garbage_frames() {
        let codec: SharedCodec = Arc::new(OscCodec::new());
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let (ingress_tx, mut ingress_rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let task = tokio::spawn(decode_loop(frame_rx, codec.clone(), ingress_tx, token.clone()));

        frame_tx
            .send(Bytes::from_static(b"definitely not osc"))
            .await
            .unwrap();
        let message = ControlMessage::new("/ok", vec![Value::Int(1)]);
        frame_tx.send(codec.encode(&message).unwrap()).await.unwrap();

        // The garbage frame was dropped; the next one still arrives.
        assert_eq!(ingress_rx.recv().await.unwrap(), message);

        token.cancel();
        task.await.unwrap();
    }
}
