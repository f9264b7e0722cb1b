//! Registry of live outbound delivery endpoints.
//!
//! One endpoint per accepted connection. Handlers insert on accept and
//! remove on close (via [`RegistrationGuard`], so early error paths
//! cannot leak an entry); the broker→control pipeline iterates the table
//! to broadcast. Insert, remove and the broadcast snapshot are atomic
//! with respect to each other: the lock is held only to copy the sender
//! handles, never across a send.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One live outbound endpoint.
struct ConnectionEndpoint {
    peer: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
}

/// Concurrency-safe table of connected clients.
///
/// Mutated by connection handlers, read by the broadcast path - all
/// access goes through one mutex.
#[derive(Default)]
pub struct ConnectionRegistry {
    endpoints: Mutex<HashMap<u64, ConnectionEndpoint>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint; the returned guard removes it on drop.
    pub fn register(
        self: &Arc<Self>,
        peer: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
    ) -> RegistrationGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.endpoints
            .lock()
            .expect("registry lock poisoned")
            .insert(id, ConnectionEndpoint { peer, outbound });
        debug!(id, %peer, "endpoint registered");
        RegistrationGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Number of currently registered endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.lock().expect("registry lock poisoned").len()
    }

    /// Check if no endpoint is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a pre-framed message to every registered endpoint.
    ///
    /// A failing endpoint (full or closed outbound channel) is logged
    /// and skipped - it never prevents delivery to the others, and it is
    /// not deregistered here; tearing down is its own handler's job.
    /// Returns the number of endpoints the frame was handed to.
    pub fn broadcast(&self, frame: &Bytes) -> usize {
        let targets: Vec<(u64, SocketAddr, mpsc::Sender<Bytes>)> = self
            .endpoints
            .lock()
            .expect("registry lock poisoned")
            .iter()
            .map(|(id, ep)| (*id, ep.peer, ep.outbound.clone()))
            .collect();

        let mut delivered = 0;
        for (id, peer, outbound) in targets {
            match outbound.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(id, %peer, error = %e, "broadcast delivery failed"),
            }
        }
        delivered
    }

    fn deregister(&self, id: u64) {
        if self
            .endpoints
            .lock()
            .expect("registry lock poisoned")
            .remove(&id)
            .is_some()
        {
            debug!(id, "endpoint removed");
        }
    }
}

/// Removes the registered endpoint when dropped.
///
/// Held by the connection handler for its whole lifetime so that every
/// exit path - peer close, read error, write error, shutdown - releases
/// the registry entry.
pub struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    id: u64,
}

impl RegistrationGuard {
    /// The registered connection id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
