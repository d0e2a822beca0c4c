//! Synchronization engine: full-state last-write-wins replication plus
//! presence, over a fixed host/guest topology.
//!
//! ```text
//!  local "graph changed" ──► broadcast_state ──► state_update to every
//!                                                open connection
//!
//!  TransportEvent ──► handle_event(&mut GraphStore)
//!      Opened   → register; host sends full_state
//!      Message  → full_state/state_update: replace graph wholesale
//!                 cursor: upsert presence
//!      Closed   → deregister
//!      Failed   → status only
//! ```
//!
//! The engine never holds the graph. The event loop that owns the
//! [`GraphStore`] passes it in for each event, so applying a remote
//! snapshot is atomic with respect to local mutations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nexus_core::{GraphStore, Point};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::connections::{BroadcastStats, ConnectionTable};
use crate::directory::{Directory, DirectoryError};
use crate::presence::{PeerIdentity, PresenceRoom, LIVENESS_WINDOW, SWEEP_INTERVAL};
use crate::protocol::WireMessage;
use crate::room::{guest_endpoint_name, RoomCode};
use crate::transport::{PeerTransport, TransportError, TransportEvent};

/// Attempts at finding an unregistered room code before giving up.
const HOST_CODE_ATTEMPTS: usize = 8;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address the peer's listener binds to
    pub bind_addr: String,
    /// How long a silent peer's cursor stays visible
    pub liveness: Duration,
    /// How often the session sweeps presence
    pub sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            liveness: LIVENESS_WINDOW,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// Session status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Offline,
    Hosting { code: RoomCode },
    Joining { code: RoomCode },
    Connected { peers: usize },
    Error(String),
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Offline => write!(f, "Offline"),
            SyncStatus::Hosting { code } => write!(f, "Room created: {code}"),
            SyncStatus::Joining { code } => write!(f, "Joining room {code}"),
            SyncStatus::Connected { peers } => write!(f, "Connected ({} users)", peers + 1),
            SyncStatus::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Already in a collaboration session")]
    AlreadyActive,
}

/// What handling one transport event changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handled {
    pub status: Option<SyncStatus>,
    pub graph_replaced: bool,
    pub presence_changed: bool,
}

pub struct SyncEngine {
    config: SyncConfig,
    identity: PeerIdentity,
    role: Option<Role>,
    room: Option<RoomCode>,
    transport: Option<PeerTransport>,
    connections: ConnectionTable,
    presence: PresenceRoom,
    status: SyncStatus,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("identity", &self.identity)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("open_peers", &self.connections.open_count())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_identity(config, PeerIdentity::generate())
    }

    pub fn with_identity(config: SyncConfig, identity: PeerIdentity) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let presence = PresenceRoom::with_window(identity.id.clone(), config.liveness);
        Self {
            config,
            identity,
            role: None,
            room: None,
            transport: None,
            connections: ConnectionTable::new(),
            presence,
            status: SyncStatus::Offline,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the transport event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.event_rx.take()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Become the host of a fresh room.
    pub async fn host(&mut self, directory: Arc<dyn Directory>) -> Result<RoomCode, SyncError> {
        if self.transport.is_some() {
            return Err(SyncError::AlreadyActive);
        }

        let mut attempt = 0;
        let (code, transport) = loop {
            attempt += 1;
            let code = RoomCode::generate();
            match PeerTransport::bind(
                code.endpoint_name(),
                &self.config.bind_addr,
                directory.clone(),
                self.event_tx.clone(),
            )
            .await
            {
                Ok(transport) => break (code, transport),
                Err(TransportError::Directory(DirectoryError::Taken(name)))
                    if attempt < HOST_CODE_ATTEMPTS =>
                {
                    log::debug!("Room endpoint {name} taken, picking another code");
                }
                Err(e) => {
                    self.set_status(SyncStatus::Error(e.to_string()));
                    return Err(e.into());
                }
            }
        };

        log::info!("Hosting room {code} as {}", self.identity.id);
        self.role = Some(Role::Host);
        self.room = Some(code.clone());
        self.transport = Some(transport);
        self.set_status(SyncStatus::Hosting { code: code.clone() });
        Ok(code)
    }

    /// Join an existing room. Returns once the local endpoint is listening;
    /// the dial to the host completes in the background.
    pub async fn join(&mut self, code: RoomCode, directory: Arc<dyn Directory>) -> Result<(), SyncError> {
        if self.transport.is_some() {
            return Err(SyncError::AlreadyActive);
        }

        let endpoint = guest_endpoint_name(&self.identity.id);
        let transport = match PeerTransport::bind(
            endpoint,
            &self.config.bind_addr,
            directory,
            self.event_tx.clone(),
        )
        .await
        {
            Ok(transport) => transport,
            Err(e) => {
                self.set_status(SyncStatus::Error(e.to_string()));
                return Err(e.into());
            }
        };

        let target = code.endpoint_name();
        log::info!("Joining room {code} as {}", self.identity.id);
        self.connections.begin_dial(&target);
        transport.dial(&target);

        self.role = Some(Role::Guest);
        self.room = Some(code.clone());
        self.transport = Some(transport);
        self.set_status(SyncStatus::Joining { code });
        Ok(())
    }

    /// Close every connection, stop listening and forget presence.
    pub fn leave(&mut self) {
        let closed = self.connections.close_all();
        self.transport = None;
        self.role = None;
        self.room = None;
        self.presence.clear();
        if closed > 0 {
            log::info!("Left session, closed {closed} connections");
        }
        self.set_status(SyncStatus::Offline);
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Apply one transport event.
    pub fn handle_event(&mut self, store: &mut GraphStore, event: TransportEvent, now: Instant) -> Handled {
        let mut handled = Handled::default();
        match event {
            TransportEvent::Opened(handle) => {
                if self.role.is_none() {
                    // Dropping the handle closes the late connection.
                    log::debug!("Ignoring connection from {} after leaving", handle.peer());
                    return handled;
                }
                let id = handle.id();
                log::info!("Peer {} connected", handle.peer());
                self.connections.open(handle);
                if self.role == Some(Role::Host) {
                    self.send_full_state(store, id);
                }
                handled.status = self.set_status(SyncStatus::Connected {
                    peers: self.connections.open_count(),
                });
            }
            TransportEvent::Message { connection, peer, .. }
                if self.connections.get(connection).is_none() =>
            {
                log::debug!("Dropping frame from {peer} on closed connection {connection}");
            }
            TransportEvent::Message { peer, message, .. } => match message {
                WireMessage::FullState { data } | WireMessage::StateUpdate { data } => {
                    log::debug!(
                        "Applying snapshot from {peer}: {} nodes, {} links",
                        data.nodes.len(),
                        data.links.len()
                    );
                    store.apply_remote_snapshot(data);
                    handled.graph_replaced = true;
                }
                WireMessage::Cursor { id, color, x, y } => {
                    handled.presence_changed =
                        self.presence.handle_cursor(&id, &color, Point::new(x, y), now);
                }
            },
            TransportEvent::Closed { connection, peer } => {
                if self.connections.close(connection).is_some() {
                    log::info!("Peer {peer} disconnected");
                    let peers = self.connections.open_count();
                    let status = match (&self.room, self.role, peers) {
                        (Some(code), Some(Role::Host), 0) => SyncStatus::Hosting { code: code.clone() },
                        _ => SyncStatus::Connected { peers },
                    };
                    handled.status = self.set_status(status);
                }
            }
            TransportEvent::Failed { peer, error } if self.role.is_none() => {
                log::debug!("Ignoring failure after leaving ({}): {error}", peer.as_deref().unwrap_or("listener"));
            }
            TransportEvent::Failed { peer, error } => {
                if let Some(peer) = &peer {
                    self.connections.dial_failed(peer);
                }
                log::warn!("Transport failure ({}): {error}", peer.as_deref().unwrap_or("listener"));
                handled.status = self.set_status(SyncStatus::Error(error));
            }
        }
        handled
    }

    fn send_full_state(&mut self, store: &GraphStore, connection: u64) {
        match WireMessage::full_state(store.serialize()).encode() {
            Ok(text) => {
                self.connections.send_to(connection, text);
            }
            Err(e) => log::error!("Failed to encode full_state: {e}"),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Send the whole graph as `state_update` to every open connection.
    /// Returns how many connections it was queued on.
    pub fn broadcast_state(&mut self, store: &GraphStore) -> usize {
        if self.connections.open_count() == 0 {
            return 0;
        }
        match WireMessage::state_update(store.serialize()).encode() {
            Ok(text) => self.connections.broadcast(&text),
            Err(e) => {
                log::error!("Failed to encode state_update: {e}");
                0
            }
        }
    }

    /// Send our cursor (world coordinates) to every open connection.
    pub fn broadcast_cursor(&mut self, world: Point) -> usize {
        if self.connections.open_count() == 0 {
            return 0;
        }
        let message = WireMessage::cursor(&self.identity.id, &self.identity.color, world.x, world.y);
        match message.encode() {
            Ok(text) => self.connections.broadcast(&text),
            Err(e) => {
                log::error!("Failed to encode cursor: {e}");
                0
            }
        }
    }

    /// Evict stale presence entries.
    pub fn sweep_presence(&mut self, now: Instant) -> Vec<String> {
        self.presence.sweep(now)
    }

    // ── State ────────────────────────────────────────────────────

    fn set_status(&mut self, status: SyncStatus) -> Option<SyncStatus> {
        if status == self.status {
            return None;
        }
        log::info!("Collaboration status: {status}");
        self.status = status.clone();
        Some(status)
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn room(&self) -> Option<&RoomCode> {
        self.room.as_ref()
    }

    pub fn presence(&self) -> &PresenceRoom {
        &self.presence
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn connection_stats(&self) -> BroadcastStats {
        self.connections.stats()
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.transport.as_ref().map(PeerTransport::local_addr)
    }

    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep_interval
    }

    pub fn is_active(&self) -> bool {
        self.transport.is_some()
    }
}
