//! Table of peer connections owned by the sync engine, with fan-out.
//!
//! Fixed topology: a message is sent directly to every open connection.
//! Nothing received is ever relayed.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::transport::{ConnectionHandle, ConnectionState};

/// Counters for monitoring fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    /// Sends that found the connection's writer already gone.
    pub messages_dropped: u64,
    pub open_peers: usize,
}

#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub handle: ConnectionHandle,
    pub state: ConnectionState,
    pub opened_at: Instant,
}

#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: HashMap<u64, PeerConnection>,
    /// Outbound dials that have not opened yet.
    dialing: HashSet<String>,
    messages_sent: u64,
    bytes_sent: u64,
    messages_dropped: u64,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_dial(&mut self, peer: &str) {
        self.dialing.insert(peer.to_string());
    }

    pub fn dial_failed(&mut self, peer: &str) {
        self.dialing.remove(peer);
    }

    /// Register a connection that finished its handshake.
    pub fn open(&mut self, handle: ConnectionHandle) {
        self.dialing.remove(handle.peer());
        self.connections.insert(
            handle.id(),
            PeerConnection {
                handle,
                state: ConnectionState::Open,
                opened_at: Instant::now(),
            },
        );
    }

    /// Deregister a connection. Returns it in the `Closed` state.
    pub fn close(&mut self, id: u64) -> Option<PeerConnection> {
        self.connections.remove(&id).map(|mut conn| {
            conn.state = ConnectionState::Closed;
            conn
        })
    }

    /// Drop every connection; their writers close the sockets.
    pub fn close_all(&mut self) -> usize {
        let n = self.connections.len();
        self.connections.clear();
        self.dialing.clear();
        n
    }

    pub fn get(&self, id: u64) -> Option<&PeerConnection> {
        self.connections.get(&id)
    }

    /// Lifecycle state of the best connection to `peer`.
    pub fn state_of(&self, peer: &str) -> ConnectionState {
        if self
            .connections
            .values()
            .any(|c| c.handle.peer() == peer && c.state == ConnectionState::Open)
        {
            ConnectionState::Open
        } else if self.dialing.contains(peer) {
            ConnectionState::Connecting
        } else {
            ConnectionState::Closed
        }
    }

    pub fn open_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.state == ConnectionState::Open)
            .count()
    }

    /// Remote endpoint names of open connections, sorted.
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self
            .connections
            .values()
            .filter(|c| c.state == ConnectionState::Open)
            .map(|c| c.handle.peer().to_string())
            .collect();
        peers.sort();
        peers
    }

    pub fn send_to(&mut self, id: u64, text: String) -> bool {
        let Some(conn) = self.connections.get(&id) else {
            return false;
        };
        let len = text.len() as u64;
        let delivered = conn.handle.send(text);
        self.record(delivered, len);
        delivered
    }

    /// Send `text` to every open connection. Returns how many accepted it.
    pub fn broadcast(&mut self, text: &str) -> usize {
        let mut delivered = 0;
        let mut dropped = 0;
        for conn in self.connections.values() {
            if conn.state != ConnectionState::Open {
                continue;
            }
            if conn.handle.send(text.to_string()) {
                delivered += 1;
            } else {
                dropped += 1;
            }
        }
        self.messages_sent += delivered as u64;
        self.bytes_sent += delivered as u64 * text.len() as u64;
        self.messages_dropped += dropped;
        delivered
    }

    fn record(&mut self, delivered: bool, len: u64) {
        if delivered {
            self.messages_sent += 1;
            self.bytes_sent += len;
        } else {
            self.messages_dropped += 1;
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent,
            bytes_sent: self.bytes_sent,
            messages_dropped: self.messages_dropped,
            open_peers: self.open_count(),
        }
    }
}
