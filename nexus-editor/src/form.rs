//! Node edit form: a detached copy of a node's editable fields that is
//! validated before it touches the store.

use nexus_core::{Node, NodeType, NodeUpdate};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Name cannot be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditForm {
    pub name: String,
    pub kind: NodeType,
    pub description: String,
    pub tags: Vec<String>,
    /// `None` follows the type's default colour.
    pub color: Option<String>,
}

impl EditForm {
    pub fn from_node(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            kind: node.kind,
            description: node.description.clone(),
            tags: node.tags.clone(),
            color: node.color.clone(),
        }
    }

    /// Add a trimmed tag. Blank and duplicate tags are ignored.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    pub fn into_update(self) -> Result<NodeUpdate, EditError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(EditError::EmptyName);
        }
        Ok(NodeUpdate::default()
            .name(name)
            .kind(self.kind)
            .description(self.description)
            .tags(self.tags)
            .color(self.color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::GraphStore;

    #[test]
    fn test_tags_trimmed_and_unique() {
        let mut form = EditForm::from_node(&Node::new(NodeType::Lore, 0.0, 0.0));
        assert!(form.add_tag("  ancient "));
        assert!(!form.add_tag("ancient"));
        assert!(!form.add_tag("   "));
        assert_eq!(form.tags, vec!["ancient".to_string()]);
        assert!(form.remove_tag("ancient"));
        assert!(!form.remove_tag("ancient"));
    }

    #[test]
    fn test_update_applies_all_fields() {
        let mut store = GraphStore::new();
        let id = store.create_node(NodeType::Character, 0.0, 0.0).id;
        let mut form = EditForm::from_node(store.node(&id).unwrap());
        form.name = "  Aria  ".into();
        form.kind = NodeType::Faction;
        form.description = "Leader of the guild".into();
        form.add_tag("hero");
        form.color = Some("#123456".into());

        assert!(store.update_node(&id, form.into_update().unwrap()));
        let node = store.node(&id).unwrap();
        assert_eq!(node.name, "Aria");
        assert_eq!(node.kind, NodeType::Faction);
        assert_eq!(node.description, "Leader of the guild");
        assert_eq!(node.tags, vec!["hero".to_string()]);
        assert_eq!(node.display_color(), "#123456");
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut form = EditForm::from_node(&Node::new(NodeType::Item, 0.0, 0.0));
        form.name = "\t".into();
        assert_eq!(form.into_update(), Err(EditError::EmptyName));
    }
}
