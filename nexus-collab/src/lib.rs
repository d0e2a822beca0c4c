//! # nexus-collab — peer-to-peer collaboration for Nexus
//!
//! Keeps several editors' graphs in step by shipping the whole graph on
//! every change (last write wins) and streams cursors as presence.
//!
//! ## Architecture
//!
//! ```text
//!        Directory ("nexus-ABC123" → 127.0.0.1:port)
//!             ▲ register          ▲ resolve
//!             │                   │
//! ┌───────────┴──┐   WebSocket   ┌┴─────────────┐
//! │ Host         │ ◄───────────► │ Guest        │
//! │ SyncEngine   │  JSON frames  │ SyncEngine   │
//! └──────┬───────┘               └──────┬───────┘
//!        │ &mut GraphStore              │ &mut GraphStore
//!        ▼                              ▼
//!   full_state on open            replace graph wholesale
//!   state_update on change        state_update on change
//!   cursor on pointer move        cursor on pointer move
//! ```
//!
//! There is no relay: each peer sends only to its own open connections.
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire messages
//! - [`room`] — room codes and endpoint names
//! - [`directory`] — rendezvous name → address lookup
//! - [`transport`] — WebSocket listener/dialer and per-connection tasks
//! - [`connections`] — open connection table with fan-out
//! - [`presence`] — remote cursors with time-based eviction
//! - [`engine`] — the synchronization engine tying it together

pub mod connections;
pub mod directory;
pub mod engine;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod transport;

// Re-exports for convenience
pub use connections::{BroadcastStats, ConnectionTable, PeerConnection};
pub use directory::{Directory, DirectoryError, MemoryDirectory};
pub use engine::{Handled, Role, SyncConfig, SyncEngine, SyncError, SyncStatus};
pub use presence::{PeerIdentity, PresenceEntry, PresenceRoom, LIVENESS_WINDOW, SWEEP_INTERVAL};
pub use protocol::{ProtocolError, WireMessage};
pub use room::{RoomCode, RoomError, ROOM_ALPHABET};
pub use transport::{
    ConnectionHandle, ConnectionState, PeerTransport, TransportError, TransportEvent,
};
