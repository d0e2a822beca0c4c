//! Graph store: the node and link collections and their invariants.
//!
//! Invariants held between any two calls:
//! - every link's `from` and `to` name an existing node;
//! - at most one link joins any unordered pair of nodes;
//! - iteration order of nodes and links is insertion order.
//!
//! Every mutating call that changes something emits exactly one
//! [`GraphEvent`] to the registered listeners once the mutation is done.
//! Calls that turn out to be no-ops (unknown id, duplicate link) emit
//! nothing.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::{import_world, GraphSnapshot, ImportError, StatePayload, DEFAULT_WORLD_NAME};
use crate::Point;

/// Swatch palette offered by the edit form and used for presence colours.
pub const PALETTE: [&str; 16] = [
    "#d4557a", "#c82d2d", "#d46a28", "#c8920a",
    "#1a9464", "#0098b5", "#2870c8", "#7f3bbf",
    "#e85a8a", "#20b870", "#40a8e8", "#9255d4",
    "#d87530", "#80a820", "#50b8c8", "#c040a0",
];

/// Offset applied to both axes of a duplicated node.
pub const DUPLICATE_OFFSET: f64 = 40.0;

// ───────────────────────────────────────────────────────────────────
// Identifiers
// ───────────────────────────────────────────────────────────────────

/// Opaque identifier for nodes and links.
///
/// Fresh ids are UUIDv7 strings (millisecond timestamp + random bits), so
/// ids minted later sort after earlier ones. Deserialization also accepts
/// JSON numbers, which older exports used.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
    Null(()),
}

impl From<RawId> for EntityId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => Self(s),
            RawId::Number(n) => Self(n.to_string()),
            RawId::Null(()) => Self(String::new()),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Node types
// ───────────────────────────────────────────────────────────────────

/// Fixed set of node categories. Colour and icon are cosmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    #[default]
    Character,
    Location,
    Item,
    Event,
    Faction,
    Concept,
    Lore,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::Character,
        NodeType::Location,
        NodeType::Item,
        NodeType::Event,
        NodeType::Faction,
        NodeType::Concept,
        NodeType::Lore,
    ];

    /// Stable identifier used in files and on the wire.
    pub fn id(self) -> &'static str {
        match self {
            NodeType::Character => "character",
            NodeType::Location => "location",
            NodeType::Item => "item",
            NodeType::Event => "event",
            NodeType::Faction => "faction",
            NodeType::Concept => "concept",
            NodeType::Lore => "lore",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            NodeType::Character => "Character",
            NodeType::Location => "Location",
            NodeType::Item => "Item",
            NodeType::Event => "Event",
            NodeType::Faction => "Faction",
            NodeType::Concept => "Concept",
            NodeType::Lore => "Lore",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            NodeType::Character => "◈",
            NodeType::Location => "◉",
            NodeType::Item => "◆",
            NodeType::Event => "◎",
            NodeType::Faction => "⬡",
            NodeType::Concept => "◇",
            NodeType::Lore => "◐",
        }
    }

    pub fn default_color(self) -> &'static str {
        match self {
            NodeType::Character => "#d4557a",
            NodeType::Location => "#0098b5",
            NodeType::Item => "#d46a28",
            NodeType::Event => "#c82d2d",
            NodeType::Faction => "#7f3bbf",
            NodeType::Concept => "#1a9464",
            NodeType::Lore => "#2870c8",
        }
    }

    /// Resolve a type id. Unknown ids fall back to the first type.
    pub fn from_id(id: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .unwrap_or(Self::ALL[0])
    }
}

impl From<String> for NodeType {
    fn from(id: String) -> Self {
        Self::from_id(&id)
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.id().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ───────────────────────────────────────────────────────────────────
// Entities
// ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default = "EntityId::generate")]
    pub id: EntityId,
    #[serde(rename = "type", default)]
    pub kind: NodeType,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "desc", default)]
    pub description: String,
    /// Override colour; `None` means the type's default colour.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Node {
    pub fn new(kind: NodeType, x: f64, y: f64) -> Self {
        Self {
            id: EntityId::generate(),
            kind,
            name: Self::default_name(kind),
            description: String::new(),
            color: None,
            x,
            y,
            tags: Vec::new(),
        }
    }

    pub fn default_name(kind: NodeType) -> String {
        format!("New {}", kind.display_name())
    }

    pub fn display_color(&self) -> &str {
        self.color.as_deref().unwrap_or(self.kind.default_color())
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default = "EntityId::generate")]
    pub id: EntityId,
    pub from: EntityId,
    pub to: EntityId,
    #[serde(default)]
    pub label: String,
}

impl Link {
    pub fn new(from: EntityId, to: EntityId) -> Self {
        Self {
            id: EntityId::generate(),
            from,
            to,
            label: String::new(),
        }
    }

    pub fn touches(&self, node: &EntityId) -> bool {
        &self.from == node || &self.to == node
    }

    /// True if this link joins `a` and `b`, in either direction.
    pub fn joins(&self, a: &EntityId, b: &EntityId) -> bool {
        (&self.from == a && &self.to == b) || (&self.from == b && &self.to == a)
    }

    fn pair_key(&self) -> (EntityId, EntityId) {
        if self.from <= self.to {
            (self.from.clone(), self.to.clone())
        } else {
            (self.to.clone(), self.from.clone())
        }
    }
}

/// Field changes for [`GraphStore::update_node`]. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub kind: Option<NodeType>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    /// `Some(None)` clears the override colour.
    pub color: Option<Option<String>>,
}

impl NodeUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: NodeType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn color(mut self, color: Option<String>) -> Self {
        self.color = Some(color);
        self
    }
}

// ───────────────────────────────────────────────────────────────────
// Notifications
// ───────────────────────────────────────────────────────────────────

/// Emitted once per effective mutation.
///
/// Every event is a render notification. [`GraphEvent::marks_change`]
/// says whether it is also a "graph changed" notification, the one that
/// drives sync broadcast and autosave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    NodeCreated(EntityId),
    NodeUpdated(EntityId),
    /// Durable position change (keyboard nudge, programmatic move).
    NodeMoved(EntityId),
    /// Position change in the middle of a drag gesture.
    NodeDragged(EntityId),
    NodeDeleted { id: EntityId, links_removed: usize },
    LinkCreated(EntityId),
    LinkUpdated(EntityId),
    LinkDeleted(EntityId),
    WorldRenamed,
    /// Local wholesale replacement (import, load, `replace_all`).
    Replaced,
    /// Wholesale replacement from a peer's snapshot.
    RemoteReplaced,
    Cleared,
    /// A drag gesture finished; its moves are now durable.
    GestureEnded,
}

impl GraphEvent {
    pub fn marks_change(&self) -> bool {
        !matches!(self, GraphEvent::NodeDragged(_) | GraphEvent::RemoteReplaced)
    }
}

/// Handle returned by [`GraphStore::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&GraphEvent) + Send>;

// ───────────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────────

pub struct GraphStore {
    world_name: String,
    nodes: IndexMap<EntityId, Node>,
    links: IndexMap<EntityId, Link>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("world_name", &self.world_name)
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            world_name: DEFAULT_WORLD_NAME.to_string(),
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Build a store from a snapshot without notifying anyone.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut store = Self::new();
        store.world_name = snapshot.world_name;
        store.install(snapshot.nodes, snapshot.links);
        store
    }

    // ── Observers ────────────────────────────────────────────────

    /// Register a listener called synchronously after every effective
    /// mutation.
    pub fn subscribe(&mut self, listener: impl FnMut(&GraphEvent) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: GraphEvent) {
        log::trace!("graph event: {event:?}");
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    // ── Nodes ────────────────────────────────────────────────────

    /// Create a node named `"New <Type>"` at a world position.
    pub fn create_node(&mut self, kind: NodeType, x: f64, y: f64) -> Node {
        let node = Node::new(kind, x, y);
        self.nodes.insert(node.id.clone(), node.clone());
        log::debug!("Created {} node {}", kind, node.id);
        self.emit(GraphEvent::NodeCreated(node.id.clone()));
        node
    }

    /// Apply field changes. Callers validate the name before calling.
    pub fn update_node(&mut self, id: &EntityId, update: NodeUpdate) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if let Some(name) = update.name {
            node.name = name;
        }
        if let Some(kind) = update.kind {
            node.kind = kind;
        }
        if let Some(description) = update.description {
            node.description = description;
        }
        if let Some(tags) = update.tags {
            node.tags = tags;
        }
        if let Some(color) = update.color {
            node.color = color;
        }
        self.emit(GraphEvent::NodeUpdated(id.clone()));
        true
    }

    /// Remove a node and every link touching it.
    pub fn delete_node(&mut self, id: &EntityId) -> bool {
        if self.nodes.shift_remove(id).is_none() {
            return false;
        }
        let before = self.links.len();
        self.links.retain(|_, link| !link.touches(id));
        let links_removed = before - self.links.len();
        log::debug!("Deleted node {id} ({links_removed} links cascaded)");
        self.emit(GraphEvent::NodeDeleted {
            id: id.clone(),
            links_removed,
        });
        true
    }

    /// Copy a node's fields under a fresh id, offset by
    /// [`DUPLICATE_OFFSET`]. Links are not copied.
    pub fn duplicate_node(&mut self, id: &EntityId) -> Option<Node> {
        let source = self.nodes.get(id)?;
        let copy = Node {
            id: EntityId::generate(),
            name: format!("{} (copy)", source.name),
            x: source.x + DUPLICATE_OFFSET,
            y: source.y + DUPLICATE_OFFSET,
            ..source.clone()
        };
        self.nodes.insert(copy.id.clone(), copy.clone());
        self.emit(GraphEvent::NodeCreated(copy.id.clone()));
        Some(copy)
    }

    pub fn move_node(&mut self, id: &EntityId, x: f64, y: f64) -> bool {
        if !self.set_position(id, x, y) {
            return false;
        }
        self.emit(GraphEvent::NodeMoved(id.clone()));
        true
    }

    /// Move a node as part of an ongoing drag. Only a render notification
    /// is emitted; call [`GraphStore::end_gesture`] when the drag ends.
    pub fn drag_node(&mut self, id: &EntityId, x: f64, y: f64) -> bool {
        if !self.set_position(id, x, y) {
            return false;
        }
        self.emit(GraphEvent::NodeDragged(id.clone()));
        true
    }

    pub fn end_gesture(&mut self) {
        self.emit(GraphEvent::GestureEnded);
    }

    fn set_position(&mut self, id: &EntityId, x: f64, y: f64) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.x = x;
                node.y = y;
                true
            }
            None => false,
        }
    }

    // ── Links ────────────────────────────────────────────────────

    /// Link two distinct existing nodes. Returns `None` without touching
    /// the store if the pair is already linked in either direction.
    pub fn create_link(&mut self, from: &EntityId, to: &EntityId) -> Option<Link> {
        if from == to || !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return None;
        }
        if self.link_between(from, to).is_some() {
            return None;
        }
        let link = Link::new(from.clone(), to.clone());
        self.links.insert(link.id.clone(), link.clone());
        log::debug!("Linked {from} -> {to}");
        self.emit(GraphEvent::LinkCreated(link.id.clone()));
        Some(link)
    }

    pub fn delete_link(&mut self, id: &EntityId) -> bool {
        if self.links.shift_remove(id).is_none() {
            return false;
        }
        self.emit(GraphEvent::LinkDeleted(id.clone()));
        true
    }

    pub fn set_link_label(&mut self, id: &EntityId, label: impl Into<String>) -> bool {
        let Some(link) = self.links.get_mut(id) else {
            return false;
        };
        link.label = label.into();
        self.emit(GraphEvent::LinkUpdated(id.clone()));
        true
    }

    // ── Whole graph ──────────────────────────────────────────────

    /// Substitute both collections at once, dropping links that would
    /// dangle or duplicate an already-linked pair.
    pub fn replace_all(&mut self, nodes: Vec<Node>, links: Vec<Link>) {
        self.install(nodes, links);
        self.emit(GraphEvent::Replaced);
    }

    /// Replace the whole world (name included) with a local snapshot.
    pub fn apply_snapshot(&mut self, snapshot: GraphSnapshot) {
        self.world_name = snapshot.world_name;
        self.install(snapshot.nodes, snapshot.links);
        self.emit(GraphEvent::Replaced);
    }

    /// Replace the whole world with state received from a peer. The world
    /// name is kept when the payload carries none.
    pub fn apply_remote_snapshot(&mut self, payload: impl Into<StatePayload>) {
        let payload = payload.into().normalized();
        if let Some(name) = payload.world_name {
            self.world_name = name;
        }
        self.install(payload.nodes, payload.links);
        self.emit(GraphEvent::RemoteReplaced);
    }

    /// Parse an exported world and replace the graph with it. On error the
    /// store is left untouched.
    pub fn import_json(&mut self, json: &str) -> Result<(), ImportError> {
        let snapshot = import_world(json)?;
        log::info!(
            "Importing world '{}' ({} nodes, {} links)",
            snapshot.world_name,
            snapshot.nodes.len(),
            snapshot.links.len()
        );
        self.apply_snapshot(snapshot);
        Ok(())
    }

    fn install(&mut self, nodes: Vec<Node>, links: Vec<Link>) {
        let nodes: IndexMap<EntityId, Node> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        let mut pairs = HashSet::with_capacity(links.len());
        let mut kept = IndexMap::with_capacity(links.len());
        let mut dropped = 0usize;
        for link in links {
            let valid = link.from != link.to
                && nodes.contains_key(&link.from)
                && nodes.contains_key(&link.to)
                && pairs.insert(link.pair_key());
            if valid {
                kept.insert(link.id.clone(), link);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::debug!("Dropped {dropped} dangling or duplicate links during replacement");
        }

        self.nodes = nodes;
        self.links = kept;
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.emit(GraphEvent::Cleared);
    }

    pub fn set_world_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name == self.world_name {
            return;
        }
        self.world_name = name;
        self.emit(GraphEvent::WorldRenamed);
    }

    /// Deep copy of the current world.
    pub fn serialize(&self) -> GraphSnapshot {
        GraphSnapshot {
            world_name: self.world_name.clone(),
            nodes: self.nodes.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn node(&self, id: &EntityId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn link(&self, id: &EntityId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn link_between(&self, a: &EntityId, b: &EntityId) -> Option<&Link> {
        self.links.values().find(|l| l.joins(a, b))
    }

    pub fn links_touching<'a>(&'a self, node: &'a EntityId) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.values().filter(move |l| l.touches(node))
    }

    /// Number of links touching a node.
    pub fn degree(&self, node: &EntityId) -> usize {
        self.links_touching(node).count()
    }

    /// Position of a node in insertion order.
    pub fn node_index(&self, id: &EntityId) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    pub fn node_at(&self, index: usize) -> Option<&Node> {
        self.nodes.get_index(index).map(|(_, n)| n)
    }

    /// Nodes whose name, type id or any tag contains `query`
    /// (case-insensitive). An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&Node> {
        let q = query.trim().to_lowercase();
        self.nodes
            .values()
            .filter(|n| {
                q.is_empty()
                    || n.name.to_lowercase().contains(&q)
                    || n.kind.id().contains(&q)
                    || n.tags.iter().any(|t| t.to_lowercase().contains(&q))
            })
            .collect()
    }

    /// True if no link references a missing node and no pair is linked twice.
    pub fn is_consistent(&self) -> bool {
        let mut pairs = HashSet::new();
        self.links.values().all(|l| {
            self.nodes.contains_key(&l.from)
                && self.nodes.contains_key(&l.to)
                && pairs.insert(l.pair_key())
        })
    }
}

// ===================================================================
// Tests
// ===================================================================
