//! Presence: ephemeral per-peer cursor and liveness data.
//!
//! ```text
//! local pointer move ──► WireMessage::Cursor ──► every open connection
//!
//! inbound cursor ──► PresenceRoom::handle_cursor ──► upsert entry
//!                                                   (last_seen = now)
//! sweep every 2s ──► evict entries silent for more than 5s
//! ```
//!
//! Presence never touches the graph, and entries are reclaimed purely by
//! time: a peer that disconnects without notice simply stops refreshing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nexus_core::{Point, PALETTE};
use rand::Rng;
use uuid::Uuid;

pub const LIVENESS_WINDOW: Duration = Duration::from_millis(5000);
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(2000);

// ─── Identity ──────────────────────────────────────────────────────

/// This process's peer id and presence colour, fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub id: String,
    pub color: String,
}

impl PeerIdentity {
    pub fn generate() -> Self {
        let color = PALETTE[rand::rng().random_range(0..PALETTE.len())];
        Self {
            id: Uuid::new_v4().simple().to_string(),
            color: color.to_string(),
        }
    }

    pub fn with_id(id: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            color: color.into(),
        }
    }
}

// ─── Entries ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub peer_id: String,
    pub color: String,
    /// Last reported pointer position, world coordinates.
    pub position: Point,
    pub last_seen: Instant,
}

impl PresenceEntry {
    pub fn is_stale(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > window
    }
}

/// All remote cursors known to this peer.
#[derive(Debug)]
pub struct PresenceRoom {
    local_id: String,
    liveness: Duration,
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceRoom {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self::with_window(local_id, LIVENESS_WINDOW)
    }

    pub fn with_window(local_id: impl Into<String>, liveness: Duration) -> Self {
        Self {
            local_id: local_id.into(),
            liveness,
            entries: HashMap::new(),
        }
    }

    /// Upsert the sender's entry. Returns false for our own id, which is
    /// ignored.
    pub fn handle_cursor(&mut self, peer_id: &str, color: &str, position: Point, now: Instant) -> bool {
        if peer_id == self.local_id {
            return false;
        }
        match self.entries.get_mut(peer_id) {
            Some(entry) => {
                entry.color = color.to_string();
                entry.position = position;
                entry.last_seen = now;
            }
            None => {
                log::debug!("Presence: new peer {peer_id}");
                self.entries.insert(
                    peer_id.to_string(),
                    PresenceEntry {
                        peer_id: peer_id.to_string(),
                        color: color.to_string(),
                        position,
                        last_seen: now,
                    },
                );
            }
        }
        true
    }

    /// Evict entries older than the liveness window. Returns evicted ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let liveness = self.liveness;
        let mut evicted = Vec::new();
        self.entries.retain(|id, entry| {
            let stale = entry.is_stale(now, liveness);
            if stale {
                evicted.push(id.clone());
            }
            !stale
        });
        if !evicted.is_empty() {
            evicted.sort();
            log::debug!("Presence: evicted {evicted:?}");
        }
        evicted
    }

    pub fn get(&self, peer_id: &str) -> Option<&PresenceEntry> {
        self.entries.get(peer_id)
    }

    /// Entries sorted by peer id, for stable rendering.
    pub fn cursors(&self) -> Vec<&PresenceEntry> {
        let mut cursors: Vec<_> = self.entries.values().collect();
        cursors.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        cursors
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }
}
