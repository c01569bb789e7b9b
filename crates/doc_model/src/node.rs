//! Node identity, node kinds and the containment grammar of the tree

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::FieldType;

/// Unique identifier for a node in the document tree.
///
/// Nodes refer to their parent and children through ids only, so the tree
/// never holds owning back references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields are identified by the id of their start marker.
pub type FieldId = NodeId;

/// Enumeration of all node types in the document tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Document,
    Section,
    Body,
    Paragraph,
    Run,
    FieldStart,
    FieldSeparator,
    FieldEnd,
    BookmarkStart,
    BookmarkEnd,
    Shape,
    Table,
    Row,
    Cell,
}

impl NodeType {
    /// Whether nodes of this type own children
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            NodeType::Document
                | NodeType::Section
                | NodeType::Body
                | NodeType::Paragraph
                | NodeType::Table
                | NodeType::Row
                | NodeType::Cell
        )
    }

    /// Whether nodes of this type live inside a paragraph
    pub fn is_inline(&self) -> bool {
        !self.is_composite()
    }

    /// Field and bookmark markers carry no content of their own
    pub fn is_marker(&self) -> bool {
        matches!(
            self,
            NodeType::FieldStart
                | NodeType::FieldSeparator
                | NodeType::FieldEnd
                | NodeType::BookmarkStart
                | NodeType::BookmarkEnd
        )
    }

    /// Check the containment grammar: can `child` be placed under `self`?
    pub fn accepts_child(&self, child: NodeType) -> bool {
        match self {
            NodeType::Document => child == NodeType::Section,
            NodeType::Section => child == NodeType::Body,
            NodeType::Body | NodeType::Cell => {
                matches!(child, NodeType::Paragraph | NodeType::Table)
            }
            NodeType::Table => child == NodeType::Row,
            NodeType::Row => child == NodeType::Cell,
            NodeType::Paragraph => child.is_inline(),
            _ => false,
        }
    }
}

/// Kind of inline drawing object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeType {
    #[default]
    Rectangle,
    Ellipse,
    Line,
    TextBox,
    Image,
}

/// An inline shape. Only its identity and extent are modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub shape_type: ShapeType,
    /// Width in points
    pub width: f64,
    /// Height in points
    pub height: f64,
    #[serde(default)]
    pub alt_text: String,
}

/// Payload of a node, one variant per [`NodeType`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Document,
    Section,
    Body,
    Paragraph {
        #[serde(default)]
        style: Option<String>,
    },
    Run {
        text: String,
    },
    /// Opens a field. The field type is refreshed whenever the code changes.
    FieldStart {
        field_type: FieldType,
    },
    FieldSeparator {
        field: FieldId,
    },
    FieldEnd {
        field: FieldId,
    },
    BookmarkStart {
        name: String,
    },
    BookmarkEnd {
        name: String,
    },
    Shape(Shape),
    Table,
    Row,
    Cell,
}

impl NodeKind {
    /// Convenience constructor for a text run
    pub fn run(text: impl Into<String>) -> Self {
        NodeKind::Run { text: text.into() }
    }

    /// Convenience constructor for an unstyled paragraph
    pub fn paragraph() -> Self {
        NodeKind::Paragraph { style: None }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Document => NodeType::Document,
            NodeKind::Section => NodeType::Section,
            NodeKind::Body => NodeType::Body,
            NodeKind::Paragraph { .. } => NodeType::Paragraph,
            NodeKind::Run { .. } => NodeType::Run,
            NodeKind::FieldStart { .. } => NodeType::FieldStart,
            NodeKind::FieldSeparator { .. } => NodeType::FieldSeparator,
            NodeKind::FieldEnd { .. } => NodeType::FieldEnd,
            NodeKind::BookmarkStart { .. } => NodeType::BookmarkStart,
            NodeKind::BookmarkEnd { .. } => NodeType::BookmarkEnd,
            NodeKind::Shape(_) => NodeType::Shape,
            NodeKind::Table => NodeType::Table,
            NodeKind::Row => NodeType::Row,
            NodeKind::Cell => NodeType::Cell,
        }
    }
}

/// A node of the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    pub(crate) fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            kind,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Parent id; `None` only for the document root and detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.children
    }

    /// Text of a run, `None` for every other node
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Run { text } => Some(text),
            _ => None,
        }
    }

    /// The field a marker belongs to
    pub fn field_id(&self) -> Option<FieldId> {
        match &self.kind {
            NodeKind::FieldStart { .. } => Some(self.id),
            NodeKind::FieldSeparator { field } | NodeKind::FieldEnd { field } => Some(*field),
            _ => None,
        }
    }

    /// The bookmark name carried by a bookmark marker
    pub fn bookmark_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::BookmarkStart { name } | NodeKind::BookmarkEnd { name } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment_grammar() {
        assert!(NodeType::Document.accepts_child(NodeType::Section));
        assert!(NodeType::Body.accepts_child(NodeType::Table));
        assert!(NodeType::Cell.accepts_child(NodeType::Paragraph));
        assert!(NodeType::Paragraph.accepts_child(NodeType::FieldStart));
        assert!(!NodeType::Paragraph.accepts_child(NodeType::Paragraph));
        assert!(!NodeType::Body.accepts_child(NodeType::Run));
        assert!(!NodeType::Run.accepts_child(NodeType::Run));
    }

    #[test]
    fn test_marker_field_ids() {
        let start = Node::new(NodeKind::FieldStart {
            field_type: FieldType::Page,
        });
        let sep = Node::new(NodeKind::FieldSeparator { field: start.id() });
        assert_eq!(start.field_id(), Some(start.id()));
        assert_eq!(sep.field_id(), Some(start.id()));
        assert!(sep.node_type().is_marker());
        assert_eq!(Node::new(NodeKind::run("x")).field_id(), None);
    }
}
