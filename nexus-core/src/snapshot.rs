//! Serialized world: the payload of `full_state`/`state_update`, the
//! import/export file, and (with camera and options) the autosave record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::Camera;
use crate::graph::{EntityId, Link, Node};

pub const DEFAULT_WORLD_NAME: &str = "New World";

fn default_world_name() -> String {
    DEFAULT_WORLD_NAME.to_string()
}

/// Complete node + link collections plus the world name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    #[serde(default = "default_world_name")]
    pub world_name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Default for GraphSnapshot {
    fn default() -> Self {
        Self {
            world_name: default_world_name(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl GraphSnapshot {
    /// Give every entity with a blank id a fresh one.
    pub fn normalized(mut self) -> Self {
        fill_blank_ids(&mut self.nodes, &mut self.links);
        self
    }
}

/// State as exchanged between peers. Unlike [`GraphSnapshot`], a missing
/// `worldName` stays missing so the receiver keeps its own name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl From<GraphSnapshot> for StatePayload {
    fn from(snapshot: GraphSnapshot) -> Self {
        Self {
            world_name: Some(snapshot.world_name),
            nodes: snapshot.nodes,
            links: snapshot.links,
        }
    }
}

impl StatePayload {
    /// Give every entity with a blank id a fresh one.
    pub fn normalized(mut self) -> Self {
        fill_blank_ids(&mut self.nodes, &mut self.links);
        self
    }
}

fn fill_blank_ids(nodes: &mut [Node], links: &mut [Link]) {
    for node in nodes {
        if node.id.is_blank() {
            node.id = EntityId::generate();
        }
    }
    for link in links {
        if link.id.is_blank() {
            link.id = EntityId::generate();
        }
    }
}

/// Display preferences persisted next to the world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorOptions {
    pub theme: String,
    pub scale: String,
    pub grid: bool,
    pub motion: bool,
    pub focus: bool,
    /// Remote cursors visible.
    pub cc: bool,
    /// Tag chips visible on nodes.
    pub tags: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            scale: "normal".to_string(),
            grid: true,
            motion: false,
            focus: false,
            cc: true,
            tags: true,
        }
    }
}

/// Autosave record: the world plus this viewer's camera and options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedWorld {
    #[serde(flatten)]
    pub graph: GraphSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cam: Option<Camera>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<EditorOptions>,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid file: {0}")]
    Syntax(#[from] serde_json::Error),
}

/// Parse an exported world. Missing fields take their defaults and missing
/// ids are synthesized.
pub fn import_world(json: &str) -> Result<GraphSnapshot, ImportError> {
    let snapshot: GraphSnapshot = serde_json::from_str(json)?;
    Ok(snapshot.normalized())
}

/// Pretty-printed export file contents.
pub fn export_world(snapshot: &GraphSnapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;

    #[test]
    fn test_state_payload_keeps_missing_world_name() {
        let payload: StatePayload = serde_json::from_str(r#"{"nodes":[],"links":[{"id":null,"from":"a","to":"b"}]}"#).unwrap();
        assert_eq!(payload.world_name, None);
        let payload = payload.normalized();
        assert!(!payload.links[0].id.is_blank());

        let full = StatePayload::from(GraphSnapshot::default());
        assert_eq!(full.world_name.as_deref(), Some(DEFAULT_WORLD_NAME));
    }

    #[test]
    fn test_import_defaults_missing_fields() {
        let json = r#"{
            "nodes": [
                { "id": "a", "type": "location", "name": "Harbor", "x": 10, "y": 20 },
                { "id": 1712345678901, "name": "Old id" }
            ],
            "links": [ { "from": "a", "to": "1712345678901" } ]
        }"#;
        let snap = import_world(json).unwrap();
        assert_eq!(snap.world_name, DEFAULT_WORLD_NAME);
        assert_eq!(snap.nodes[0].kind, NodeType::Location);
        assert_eq!(snap.nodes[0].description, "");
        assert!(snap.nodes[0].tags.is_empty());
        assert_eq!(snap.nodes[1].id.as_str(), "1712345678901");
        assert_eq!(snap.nodes[1].kind, NodeType::Character);
        assert!(!snap.links[0].id.is_blank());
        assert_eq!(snap.links[0].label, "");
    }

    #[test]
    fn test_import_unknown_type_falls_back() {
        let snap = import_world(r#"{ "nodes": [ { "id": "x", "type": "spaceship" } ] }"#).unwrap();
        assert_eq!(snap.nodes[0].kind, NodeType::Character);
    }

    #[test]
    fn test_import_null_link_id_is_replaced() {
        let snap =
            import_world(r#"{ "links": [ { "id": null, "from": "a", "to": "b" } ] }"#).unwrap();
        assert!(!snap.links[0].id.is_blank());
    }

    #[test]
    fn test_import_rejects_malformed() {
        assert!(matches!(import_world("not json"), Err(ImportError::Syntax(_))));
        assert!(import_world("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_export_uses_wire_field_names() {
        let mut node = Node::new(NodeType::Item, 1.0, 2.0);
        node.description = "A sword".into();
        let snap = GraphSnapshot {
            world_name: "Eldoria".into(),
            nodes: vec![node],
            links: Vec::new(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&export_world(&snap).unwrap()).unwrap();
        assert_eq!(value["worldName"], "Eldoria");
        assert_eq!(value["nodes"][0]["type"], "item");
        assert_eq!(value["nodes"][0]["desc"], "A sword");
        assert!(value["nodes"][0]["color"].is_null());
    }

    #[test]
    fn test_export_import_preserves_world() {
        let a = Node::new(NodeType::Faction, 0.0, 0.0);
        let b = Node::new(NodeType::Event, 5.0, 5.0);
        let mut link = Link::new(a.id.clone(), b.id.clone());
        link.label = "caused".into();
        let snap = GraphSnapshot {
            world_name: "Round".into(),
            nodes: vec![a, b],
            links: vec![link],
        };
        let back = import_world(&export_world(&snap).unwrap()).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_saved_world_is_flat() {
        let saved = SavedWorld {
            graph: GraphSnapshot::default(),
            cam: Some(Camera::new()),
            opts: Some(EditorOptions::default()),
        };
        let value = serde_json::to_value(&saved).unwrap();
        assert_eq!(value["worldName"], DEFAULT_WORLD_NAME);
        assert_eq!(value["cam"]["z"], 1.0);
        assert_eq!(value["opts"]["theme"], "light");
        assert!(value.get("graph").is_none());
    }

    #[test]
    fn test_partial_options_take_defaults() {
        let opts: EditorOptions = serde_json::from_str(r#"{ "grid": false }"#).unwrap();
        assert!(!opts.grid);
        assert!(opts.cc);
        assert_eq!(opts.scale, "normal");
    }
}
