//! Broker session ownership and the reconnection state machine.
//!
//! The session is driven by a single supervising task that owns the
//! rumqttc event loop; `connect`, `subscribe` and `publish` are explicit
//! calls on the handle, and incoming publishes flow out through the
//! egress queue. Disconnects are observed by the supervising task as
//! poll errors - there are no re-entrant callbacks.
//!
//! Reconnection waits the [`ReconnectState`] delay between attempts and
//! re-establishes prior subscriptions on success. Once the attempt
//! allowance is used up the session enters [`SessionState::Failed`] and a
//! fatal error is signalled to the owning bridge, which must shut the
//! whole process down.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration,
    Transport,
};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::{ReconnectState, MAX_RECONNECT_ATTEMPTS};
use crate::config::MqttConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::BrokerMessage;
use crate::supervisor::TaskSupervisor;

/// Event loop request queue capacity.
const REQUEST_CAPACITY: usize = 64;

/// Broker session lifecycle.
///
/// `Connected` is entered only after the broker acknowledges the
/// connection; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

struct SessionShared {
    state: Mutex<SessionState>,
    subscriptions: Mutex<Vec<String>>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().expect("session state lock poisoned");
        if *state != next {
            info!(from = ?*state, to = ?next, "broker session state");
            *state = next;
        }
    }

    fn remember_subscription(&self, filter: &str) {
        self.subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .push(filter.to_string());
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .clone()
    }
}

/// Handle to the publish/subscribe session.
///
/// Cheap to clone; the session itself lives in the supervising task.
#[derive(Clone)]
pub struct BrokerConnection {
    client: AsyncClient,
    shared: Arc<SessionShared>,
}

impl BrokerConnection {
    /// Connect to the broker and start the supervising task.
    ///
    /// Fatal on failure: the bridge must not start relaying without a
    /// broker session. Incoming publishes are JSON-decoded and sent to
    /// `egress`; reconnect exhaustion is reported through `fatal`.
    pub async fn connect(
        config: &MqttConfig,
        egress: mpsc::Sender<BrokerMessage>,
        supervisor: &TaskSupervisor,
        fatal: mpsc::Sender<BridgeError>,
    ) -> Result<Self> {
        let shared = Arc::new(SessionShared::new());
        shared.set_state(SessionState::Connecting);

        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }
        if let Some(ca_path) = &config.ca_certs {
            let ca = std::fs::read(ca_path)?;
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        wait_for_connack(&mut event_loop).await?;
        shared.set_state(SessionState::Connected);
        info!(
            broker = %config.broker,
            port = config.port,
            client_id = %config.client_id,
            "connected to broker"
        );

        let connection = Self {
            client: client.clone(),
            shared: shared.clone(),
        };
        let token = supervisor.token();
        supervisor.spawn(session_loop(event_loop, client, shared, egress, fatal, token));

        Ok(connection)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Register interest in a topic filter at QoS 2.
    ///
    /// Fails unless the session is connected. The filter is remembered
    /// and re-established on every successful reconnect.
    pub async fn subscribe(&self, filter: &str) -> Result<()> {
        if self.state() != SessionState::Connected {
            return Err(BridgeError::NotConnected);
        }
        self.client.subscribe(filter, QoS::ExactlyOnce).await?;
        self.shared.remember_subscription(filter);
        info!(filter, "subscribed to broker topic");
        Ok(())
    }

    /// Publish a JSON payload.
    ///
    /// Byte-valued control data has already been rendered to text by the
    /// payload shaping step. A rejection by the broker client surfaces
    /// as an error carrying the reason.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &JsonValue,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        if self.state() != SessionState::Connected {
            return Err(BridgeError::NotConnected);
        }
        let body = serde_json::to_vec(payload)?;
        self.client.publish(topic, qos, retain, body).await?;
        info!(topic, payload = %payload, "published to broker");
        Ok(())
    }
}

#[cfg(test)]
impl BrokerConnection {
    /// Handle with no live session: publish and subscribe report
    /// `NotConnected`. For exercising pipelines that never publish.
    pub(crate) fn stub_for_tests() -> Self {
        let options = MqttOptions::new("stub", "localhost", 1883);
        let (client, _event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        Self {
            client,
            shared: Arc::new(SessionShared::new()),
        }
    }
}

/// Drive the event loop until the broker acknowledges the connection.
async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<()> {
    loop {
        match event_loop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(BridgeError::Connection(
                    rumqttc::ConnectionError::ConnectionRefused(ack.code),
                ));
            }
            _ => continue,
        }
    }
}

/// Supervising task: owns the event loop for the session's lifetime.
async fn session_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    shared: Arc<SessionShared>,
    egress: mpsc::Sender<BrokerMessage>,
    fatal: mpsc::Sender<BridgeError>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = client.disconnect().await;
                shared.set_state(SessionState::Disconnected);
                break;
            }
            polled = event_loop.poll() => match polled {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match parse_payload(&publish.payload) {
                        Some(payload) => {
                            let message = BrokerMessage::new(publish.topic.clone(), payload);
                            if egress.send(message).await.is_err() {
                                warn!("egress queue closed, stopping broker session");
                                break;
                            }
                        }
                        None => {
                            warn!(topic = %publish.topic, "dropping non-JSON broker payload")
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "broker connection lost");
                    shared.set_state(SessionState::Reconnecting);
                    match recover(&mut event_loop, &client, &shared, &token).await {
                        Recovery::Recovered => {}
                        Recovery::Cancelled => {
                            shared.set_state(SessionState::Disconnected);
                            break;
                        }
                        Recovery::Exhausted => {
                            shared.set_state(SessionState::Failed);
                            error!(
                                attempts = MAX_RECONNECT_ATTEMPTS,
                                "broker reconnect attempts exhausted"
                            );
                            let _ = fatal
                                .send(BridgeError::ReconnectExhausted {
                                    attempts: MAX_RECONNECT_ATTEMPTS,
                                })
                                .await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

enum Recovery {
    Recovered,
    Cancelled,
    Exhausted,
}

/// Reconnect with bounded exponential backoff.
async fn recover(
    event_loop: &mut EventLoop,
    client: &AsyncClient,
    shared: &SessionShared,
    token: &CancellationToken,
) -> Recovery {
    let mut backoff = ReconnectState::new();
    loop {
        let Some(delay) = backoff.next_delay() else {
            return Recovery::Exhausted;
        };
        info!(
            attempt = backoff.attempt(),
            delay_secs = delay.as_secs(),
            "reconnecting to broker"
        );
        tokio::select! {
            _ = token.cancelled() => return Recovery::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
        tokio::select! {
            _ = token.cancelled() => return Recovery::Cancelled,
            result = wait_for_connack(event_loop) => match result {
                Ok(()) => {
                    info!("reconnected to broker");
                    shared.set_state(SessionState::Connected);
                    resubscribe(client, shared).await;
                    return Recovery::Recovered;
                }
                Err(e) => warn!(error = %e, "reconnect attempt failed"),
            }
        }
    }
}

/// Re-establish every remembered subscription after a reconnect.
async fn resubscribe(client: &AsyncClient, shared: &SessionShared) {
    for filter in shared.subscriptions() {
        match client.subscribe(&filter, QoS::ExactlyOnce).await {
            Ok(()) => info!(filter = %filter, "re-subscribed after reconnect"),
            Err(e) => error!(filter = %filter, error = %e, "re-subscribe failed"),
        }
    }
}

fn parse_payload(payload: &[u8]) -> Option<JsonValue> {
    serde_json::from_slice(payload).ok()
}
