//! Live driver and rider connections.
//!
//! Each socket is represented by the sending half of a bounded queue; a
//! writer task owned by the socket drains it. Nothing here ever awaits a
//! peer, so a slow or dead client can only lose its own messages.

use dashmap::DashMap;
use serde::Serialize;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Serialized event text, shared between every recipient of a broadcast
pub type OutboundMessage = Arc<str>;

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Driver,
    Rider,
}

impl PeerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Rider => "rider",
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<OutboundMessage>,
}

/// Outcome of a broadcast: how many queues accepted the message
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl AddAssign for BroadcastReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Queued,
    Full,
    Closed,
}

fn deliver(tx: &mpsc::Sender<OutboundMessage>, message: OutboundMessage) -> Delivery {
    match tx.try_send(message) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(_)) => Delivery::Full,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

/// Driver and rider connection maps keyed by the client-chosen key.
#[derive(Debug)]
pub struct ConnectionRegistry {
    drivers: DashMap<String, Connection>,
    riders: DashMap<String, Connection>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            drivers: DashMap::new(),
            riders: DashMap::new(),
            next_id: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    fn map(&self, role: PeerRole) -> &DashMap<String, Connection> {
        match role {
            PeerRole::Driver => &self.drivers,
            PeerRole::Rider => &self.riders,
        }
    }

    /// Store `tx` under `key`, replacing any previous connection for it.
    pub fn register(
        &self,
        role: PeerRole,
        key: impl Into<String>,
        tx: mpsc::Sender<OutboundMessage>,
    ) -> ConnectionId {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = self.map(role).insert(key.clone(), Connection { id, tx }) {
            debug!(%role, key = %key, replaced = previous.id, connection = id, "Connection replaced");
        }
        id
    }

    /// Create a queue sized by the registry and register its sending half.
    pub fn connect(
        &self,
        role: PeerRole,
        key: impl Into<String>,
    ) -> (ConnectionId, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let id = self.register(role, key, tx);
        (id, rx)
    }

    /// Remove whatever is registered under `key`. Absent keys are a no-op.
    pub fn deregister(&self, role: PeerRole, key: &str) -> bool {
        self.map(role).remove(key).is_some()
    }

    /// Remove `key` only while it still points at connection `id`.
    pub fn deregister_connection(&self, role: PeerRole, key: &str, id: ConnectionId) -> bool {
        self.map(role)
            .remove_if(key, |_, conn| conn.id == id)
            .is_some()
    }

    /// Best-effort send to one peer. Returns whether the message was queued.
    pub fn send(&self, role: PeerRole, key: &str, message: OutboundMessage) -> bool {
        // Clone the sender so the shard lock is not held while sending
        let (id, tx) = match self.map(role).get(key) {
            Some(conn) => (conn.id, conn.tx.clone()),
            None => return false,
        };

        match deliver(&tx, message) {
            Delivery::Queued => true,
            Delivery::Full => false,
            Delivery::Closed => {
                self.deregister_connection(role, key, id);
                false
            }
        }
    }

    /// Queue `message` for every connection of `role`.
    ///
    /// Works on a snapshot of the map so registrations racing with the
    /// broadcast neither block it nor corrupt it. Failures are counted and
    /// skipped; closed queues are pruned.
    pub fn broadcast_all(&self, role: PeerRole, message: OutboundMessage) -> BroadcastReport {
        let map = self.map(role);
        let snapshot: Vec<(String, ConnectionId, mpsc::Sender<OutboundMessage>)> = map
            .iter()
            .map(|entry| (entry.key().clone(), entry.id, entry.tx.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        for (key, id, tx) in snapshot {
            match deliver(&tx, message.clone()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Full => {
                    debug!(%role, key = %key, "Outbound queue full, dropping message");
                    report.dropped += 1;
                }
                Delivery::Closed => {
                    report.dropped += 1;
                    map.remove_if(&key, |_, conn| conn.id == id);
                }
            }
        }
        report
    }

    pub fn len(&self, role: PeerRole) -> usize {
        self.map(role).len()
    }

    pub fn is_empty(&self, role: PeerRole) -> bool {
        self.map(role).is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}
