//! TCP frame relay - accept loop and per-connection handlers.
//!
//! Each accepted connection gets its own handler task: bytes are read in
//! up to 1 MiB chunks, run through the [`FrameBuffer`], and every
//! complete frame is forwarded in arrival order to the local delivery
//! channel. The same handler drains the connection's outbound queue and
//! writes broadcast frames back to the device.
//!
//! Per-connection failures are isolated: a read or write error ends that
//! handler (and releases its registry entry via the guard) without
//! touching the listener or the other connections. Bind failures are
//! fatal and surface synchronously from [`TcpFrameRelay::start`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::TcpConfig;
use crate::error::Result;
use crate::protocol::{FrameBuffer, READ_BUFFER_SIZE};
use crate::relay::ConnectionRegistry;
use crate::supervisor::TaskSupervisor;

/// Capacity of each connection's outbound frame queue.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Accepts device connections and relays delimited frames both ways.
pub struct TcpFrameRelay {
    supervisor: TaskSupervisor,
    local_addr: SocketAddr,
}

impl TcpFrameRelay {
    /// Bind the listener and start the accept loop.
    ///
    /// A bind failure is returned synchronously and is fatal to the
    /// bridge. Complete inbound frames are sent to `delivery`; outbound
    /// frames reach devices via [`ConnectionRegistry::broadcast`].
    pub async fn start(
        config: &TcpConfig,
        registry: Arc<ConnectionRegistry>,
        delivery: mpsc::Sender<Bytes>,
    ) -> Result<Self> {
        let bind_addr = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "frame relay listening");

        let supervisor = TaskSupervisor::new();
        let max_connections = config.max_connections;
        let accept_supervisor = supervisor.clone();
        supervisor.spawn(async move {
            accept_loop(
                listener,
                registry,
                delivery,
                max_connections,
                accept_supervisor,
            )
            .await;
        });

        Ok(Self {
            supervisor,
            local_addr,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the accept loop and every connection handler.
    ///
    /// Returns only after all workers have exited and their sockets are
    /// closed. Safe to call before any connection was accepted.
    pub async fn stop(&self) {
        self.supervisor.shutdown().await;
        info!("frame relay stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    delivery: mpsc::Sender<Bytes>,
    max_connections: usize,
    supervisor: TaskSupervisor,
) {
    let token = supervisor.token();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if registry.len() >= max_connections {
                        warn!(%peer, max_connections, "connection refused: at capacity");
                        continue;
                    }
                    let registry = registry.clone();
                    let delivery = delivery.clone();
                    let token = token.clone();
                    supervisor.spawn(async move {
                        handle_connection(stream, peer, registry, delivery, token).await;
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
}

/// One worker per accepted connection.
///
/// Exits on peer close, any I/O error, a closed delivery point, or
/// shutdown; the registration guard removes the endpoint on every path,
/// and dropping the socket halves closes the connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    delivery: mpsc::Sender<Bytes>,
    token: CancellationToken,
) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_CAPACITY);
    let _guard = registry.register(peer, outbound_tx);
    let (mut reader, mut writer) = stream.into_split();
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    info!(%peer, "connection accepted");

    'conn: loop {
        tokio::select! {
            _ = token.cancelled() => break 'conn,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!(%peer, "peer closed connection");
                    break 'conn;
                }
                Ok(n) => {
                    for frame in frames.feed(&buf[..n]) {
                        if delivery.send(frame).await.is_err() {
                            warn!(%peer, "local delivery point closed");
                            break 'conn;
                        }
                    }
                }
                Err(e) => {
                    warn!(%peer, error = %e, "read failed");
                    break 'conn;
                }
            },
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!(%peer, error = %e, "write failed");
                        break 'conn;
                    }
                }
                None => break 'conn,
            },
        }
    }

    info!(%peer, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;
    use std::time::Duration;

    fn test_config() -> TcpConfig {
        TcpConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            max_connections: 4,
        }
    }

    async fn wait_for_connections(registry: &ConnectionRegistry, n: usize) {
        for _ in 0..100 {
            if registry.len() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {n} registered connections");
    }

    #[tokio::test]
    async fn test_stop_before_any_accept_does_not_hang() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (delivery_tx, _delivery_rx) = mpsc::channel(16);

        let relay = TcpFrameRelay::start(&test_config(), registry, delivery_tx)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), relay.stop())
            .await
            .expect("stop hung");
    }

    #[tokio::test]
    async fn test_bind_failure_is_synchronous() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (delivery_tx, _delivery_rx) = mpsc::channel(16);
        let first = TcpFrameRelay::start(&test_config(), registry.clone(), delivery_tx.clone())
            .await
            .unwrap();

        // Binding the exact same port again must fail at start.
        let taken = TcpConfig {
            bind: "127.0.0.1".to_string(),
            port: first.local_addr().port(),
            max_connections: 4,
        };
        assert!(TcpFrameRelay::start(&taken, registry, delivery_tx)
            .await
            .is_err());

        first.stop().await;
    }

    #[tokio::test]
    async fn test_frames_relayed_across_chunk_boundaries() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (delivery_tx, mut delivery_rx) = mpsc::channel(16);
        let relay = TcpFrameRelay::start(&test_config(), registry.clone(), delivery_tx)
            .await
            .unwrap();

        let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
        // Two frames, split mid-frame across writes.
        client.write_all(b"\xC0hel").await.unwrap();
        client.flush().await.unwrap();
        client.write_all(b"lo\xC0world\xC0").await.unwrap();

        assert_eq!(delivery_rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(delivery_rx.recv().await.unwrap(), Bytes::from_static(b"world"));

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_connected_client() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (delivery_tx, _delivery_rx) = mpsc::channel(16);
        let relay = TcpFrameRelay::start(&test_config(), registry.clone(), delivery_tx)
            .await
            .unwrap();

        let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
        wait_for_connections(&registry, 1).await;

        let frame = build_frame(b"ping");
        assert_eq!(registry.broadcast(&frame), 1);

        let mut received = vec![0u8; frame.len()];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(received, frame);

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_removes_endpoint() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (delivery_tx, _delivery_rx) = mpsc::channel(16);
        let relay = TcpFrameRelay::start(&test_config(), registry.clone(), delivery_tx)
            .await
            .unwrap();

        let client = TcpStream::connect(relay.local_addr()).await.unwrap();
        wait_for_connections(&registry, 1).await;

        drop(client);
        wait_for_connections(&registry, 0).await;

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_live_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (delivery_tx, _delivery_rx) = mpsc::channel(16);
        let relay = TcpFrameRelay::start(&test_config(), registry.clone(), delivery_tx)
            .await
            .unwrap();

        let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
        wait_for_connections(&registry, 1).await;

        tokio::time::timeout(Duration::from_secs(1), relay.stop())
            .await
            .expect("stop hung with live connection");
        assert!(registry.is_empty());

        // The relay side is gone: the client sees EOF.
        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_connections_beyond_capacity_are_refused() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (delivery_tx, _delivery_rx) = mpsc::channel(16);
        let config = TcpConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            max_connections: 1,
        };
        let relay = TcpFrameRelay::start(&config, registry.clone(), delivery_tx)
            .await
            .unwrap();

        let _first = TcpStream::connect(relay.local_addr()).await.unwrap();
        wait_for_connections(&registry, 1).await;

        let _second = TcpStream::connect(relay.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.len(), 1);

        relay.stop().await;
    }
}
