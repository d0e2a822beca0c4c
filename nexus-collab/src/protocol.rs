//! JSON text-frame protocol for full-state replication and presence.
//!
//! Wire format (one WebSocket text frame per message):
//! ```text
//! { "type": "full_state",   "data": { "worldName", "nodes", "links" } }
//! { "type": "state_update", "data": { "worldName", "nodes", "links" } }
//! { "type": "cursor", "id": "<peer>", "color": "#rrggbb", "x": 0.0, "y": 0.0 }
//! ```
//!
//! There is no version field and no sequence number: the receiver replaces
//! its graph with whichever state message it applied last.

use nexus_core::StatePayload;
use serde::{Deserialize, Serialize};

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Sent by the host to a peer as soon as its connection opens.
    FullState { data: StatePayload },
    /// Sent to every open connection after each local graph change.
    StateUpdate { data: StatePayload },
    /// Sender's pointer position in world coordinates.
    Cursor {
        id: String,
        color: String,
        x: f64,
        y: f64,
    },
}

impl WireMessage {
    pub fn full_state(data: impl Into<StatePayload>) -> Self {
        Self::FullState { data: data.into() }
    }

    pub fn state_update(data: impl Into<StatePayload>) -> Self {
        Self::StateUpdate { data: data.into() }
    }

    pub fn cursor(id: impl Into<String>, color: impl Into<String>, x: f64, y: f64) -> Self {
        Self::Cursor {
            id: id.into(),
            color: color.into(),
            x,
            y,
        }
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FullState { .. } => "full_state",
            Self::StateUpdate { .. } => "state_update",
            Self::Cursor { .. } => "cursor",
        }
    }

    /// Serialize to a text frame payload.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from a text frame payload.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    /// A binary frame arrived where only text frames are expected.
    UnexpectedBinary(usize),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::UnexpectedBinary(len) => write!(f, "Unexpected binary frame ({len} bytes)"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{GraphSnapshot, GraphStore, NodeType};

    fn sample_snapshot() -> GraphSnapshot {
        let mut store = GraphStore::new();
        store.set_world_name("Eldoria");
        let a = store.create_node(NodeType::Character, 0.0, 0.0);
        let b = store.create_node(NodeType::Faction, 120.0, 40.0);
        store.create_link(&a.id, &b.id);
        store.serialize()
    }

    #[test]
    fn test_full_state_shape() {
        let msg = WireMessage::full_state(sample_snapshot());
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "full_state");
        assert_eq!(value["data"]["worldName"], "Eldoria");
        assert_eq!(value["data"]["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(value["data"]["links"][0]["label"], "");
    }

    #[test]
    fn test_state_update_decodes() {
        let snapshot = sample_snapshot();
        let text = WireMessage::state_update(snapshot.clone()).encode().unwrap();
        match WireMessage::decode(&text).unwrap() {
            WireMessage::StateUpdate { data } => assert_eq!(data, StatePayload::from(snapshot)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cursor_is_flat() {
        let msg = WireMessage::cursor("peer-1", "#9255d4", 10.5, -3.0);
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "type": "cursor", "id": "peer-1", "color": "#9255d4", "x": 10.5, "y": -3.0 })
        );
    }

    #[test]
    fn test_decode_accepts_loose_payloads() {
        // Missing worldName and link ids, numeric node ids.
        let text = r#"{"type":"state_update","data":{"nodes":[{"id":1,"type":"item","name":"Key"},{"id":2,"name":"Door"}],"links":[{"from":1,"to":2}]}}"#;
        let WireMessage::StateUpdate { data } = WireMessage::decode(text).unwrap() else {
            panic!("expected state_update");
        };
        assert_eq!(data.world_name, None);
        assert_eq!(data.nodes[0].id.as_str(), "1");
        assert_eq!(data.links[0].to.as_str(), "2");
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = WireMessage::decode(r#"{"type":"ping"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::DeserializationError(_)));
        assert!(WireMessage::decode("{").is_err());
    }

    #[test]
    fn test_kind() {
        assert_eq!(WireMessage::cursor("a", "#fff", 0.0, 0.0).kind(), "cursor");
        assert_eq!(WireMessage::full_state(GraphSnapshot::default()).kind(), "full_state");
    }
}
