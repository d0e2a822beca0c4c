//! # nexus-core — graph model for the Nexus worldbuilding editor
//!
//! Owns everything that does not need a network or a screen:
//!
//! - [`graph`] — node/link store with its structural invariants and
//!   change notifications
//! - [`camera`] — world ⇄ viewport coordinate transform
//! - [`snapshot`] — the serialized world (wire payload, import/export file)
//! - [`persist`] — whole-world save/load adapters
//!
//! ```text
//!  gesture ──► GraphStore mutation ──► GraphEvent ──┬─► re-render
//!                                                   ├─► sync broadcast
//!                                                   └─► autosave
//! ```

use serde::{Deserialize, Serialize};

pub mod camera;
pub mod graph;
pub mod persist;
pub mod snapshot;

pub use camera::{screen_to_world, world_to_screen, Camera, MAX_ZOOM, MIN_ZOOM};
pub use graph::{
    EntityId, GraphEvent, GraphStore, Link, ListenerId, Node, NodeType, NodeUpdate, PALETTE,
};
pub use persist::{JsonFileStore, MemoryStore, PersistError, Persistence};
pub use snapshot::{
    export_world, import_world, EditorOptions, GraphSnapshot, ImportError, SavedWorld,
    StatePayload, DEFAULT_WORLD_NAME,
};

/// 2D point. Used for both world and viewport coordinates; which space a
/// value lives in is up to the caller.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_offset() {
        let p = Point::new(10.0, 20.0).offset(40.0, -5.0);
        assert_eq!(p, Point::new(50.0, 15.0));
    }

    #[test]
    fn test_point_distance() {
        let a = Point::ZERO;
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-9);
    }
}
