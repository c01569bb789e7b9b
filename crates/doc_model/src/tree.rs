//! Document tree storage and structural operations

use crate::{
    DocModelError, Document, FieldEvent, FieldRegistry, Node, NodeId, NodeKind, NodeType, Result,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub(crate) const FIELD_START_CHAR: char = '\u{13}';
pub(crate) const FIELD_SEPARATOR_CHAR: char = '\u{14}';
pub(crate) const FIELD_END_CHAR: char = '\u{15}';
pub(crate) const PARAGRAPH_END_CHAR: char = '\r';
pub(crate) const SECTION_END_CHAR: char = '\u{0c}';
pub(crate) const CELL_END_CHAR: char = '\u{07}';

/// The complete document tree: an arena of nodes rooted at a document node.
///
/// A parent exclusively owns its children. Removing a node removes its
/// subtree and keeps the field registry in step with the markers that
/// disappeared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTree {
    root: NodeId,
    /// Document properties and variables
    pub document: Document,
    nodes: HashMap<NodeId, Node>,
    fields: FieldRegistry,
}

impl DocumentTree {
    /// Create a document holding one section with one empty paragraph
    pub fn new() -> Self {
        let root = Node::new(NodeKind::Document);
        let mut tree = Self {
            root: root.id(),
            document: Document::new(),
            nodes: HashMap::new(),
            fields: FieldRegistry::new(),
        };
        tree.nodes.insert(root.id(), root);
        tree.append_section();
        tree
    }

    /// Append a new section with an empty body paragraph, returning the section id
    pub fn append_section(&mut self) -> NodeId {
        let section = self.attach(self.root, None, NodeKind::Section);
        let body = self.attach(section, None, NodeKind::Body);
        self.attach(body, None, NodeKind::paragraph());
        section
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.get(id).map(Node::node_type)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Children of a node; empty for leaves and unknown ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }

    /// Number of nodes in the tree, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldRegistry {
        &mut self.fields
    }

    fn require(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(DocModelError::NodeNotFound(id))
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Append a new node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        self.insert_node(parent, None, kind)
    }

    /// Insert a new node at `index` among the children of `parent`
    pub fn insert_child(&mut self, parent: NodeId, index: usize, kind: NodeKind) -> Result<NodeId> {
        self.insert_node(parent, Some(index), kind)
    }

    /// Insert a new node as the previous sibling of `reference`
    pub fn insert_before(&mut self, reference: NodeId, kind: NodeKind) -> Result<NodeId> {
        let (parent, index) = self.position_of(reference)?;
        self.insert_node(parent, Some(index), kind)
    }

    /// Insert a new node as the next sibling of `reference`
    pub fn insert_after(&mut self, reference: NodeId, kind: NodeKind) -> Result<NodeId> {
        let (parent, index) = self.position_of(reference)?;
        self.insert_node(parent, Some(index + 1), kind)
    }

    fn position_of(&self, id: NodeId) -> Result<(NodeId, usize)> {
        let parent = self.require(id)?.parent().ok_or_else(|| {
            DocModelError::InvalidOperation("the document root has no siblings".into())
        })?;
        let index = self
            .index_in_parent(id)
            .ok_or(DocModelError::NodeNotFound(id))?;
        Ok((parent, index))
    }

    fn insert_node(&mut self, parent: NodeId, index: Option<usize>, kind: NodeKind) -> Result<NodeId> {
        let parent_node = self.require(parent)?;
        let parent_type = parent_node.node_type();
        let child_type = kind.node_type();
        if !parent_type.accepts_child(child_type) {
            return Err(DocModelError::InvalidChild {
                parent: parent_type,
                child: child_type,
            });
        }
        if let Some(index) = index {
            if index > parent_node.children().len() {
                return Err(DocModelError::InvalidOperation(format!(
                    "child index {} out of bounds for {} children",
                    index,
                    parent_node.children().len()
                )));
            }
        }
        self.check_marker_transition(&kind)?;

        let id = self.attach(parent, index, kind);
        if let Err(err) = self.register_marker(id) {
            self.detach_subtree(id);
            return Err(err);
        }
        tracing::trace!(node = %id, ?child_type, "inserted node");
        Ok(id)
    }

    /// Raw attachment without grammar or registry checks
    pub(crate) fn attach(&mut self, parent: NodeId, index: Option<usize>, kind: NodeKind) -> NodeId {
        let mut node = Node::new(kind);
        let id = node.id();
        node.set_parent(Some(parent));
        self.nodes.insert(id, node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let children = parent_node.children_mut();
            match index {
                Some(i) if i <= children.len() => children.insert(i, id),
                _ => children.push(id),
            }
        }
        id
    }

    // ------------------------------------------------------------------
    // Field registry maintenance
    // ------------------------------------------------------------------

    fn check_marker_transition(&self, kind: &NodeKind) -> Result<()> {
        let (field, event) = match kind {
            NodeKind::FieldSeparator { field } => (*field, FieldEvent::SeparatorInserted),
            NodeKind::FieldEnd { field } => (*field, FieldEvent::EndInserted),
            _ => return Ok(()),
        };
        match self.fields.get(field) {
            Some(existing) => existing.state().advance(event).map(|_| ()),
            // Markers of unknown fields are tolerated as dangling nodes
            None => Ok(()),
        }
    }

    fn register_marker(&mut self, id: NodeId) -> Result<()> {
        let kind = match self.get(id) {
            Some(node) => node.kind.clone(),
            None => return Ok(()),
        };
        match kind {
            NodeKind::FieldStart { field_type } => {
                self.fields.insert(crate::Field::new(id, field_type));
            }
            NodeKind::FieldSeparator { field } => {
                let Some(start) = self.fields.get(field).map(|f| f.start()) else {
                    return Ok(());
                };
                self.require_order(start, id, "field separator must follow its start")?;
                if let Some(f) = self.fields.get_mut(field) {
                    f.attach_separator(id)?;
                }
            }
            NodeKind::FieldEnd { field } => {
                let Some((start, separator)) =
                    self.fields.get(field).map(|f| (f.start(), f.separator()))
                else {
                    return Ok(());
                };
                self.require_order(separator.unwrap_or(start), id, "field end must follow its start and separator")?;
                if let Some(f) = self.fields.get_mut(field) {
                    f.attach_end(id)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn require_order(&self, before: NodeId, after: NodeId, message: &str) -> Result<()> {
        if !self.contains(before) || self.compare_order(before, after) == Some(Ordering::Less) {
            Ok(())
        } else {
            Err(DocModelError::InvalidOperation(message.to_string()))
        }
    }

    fn unregister_marker(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::FieldStart { .. } => {
                self.fields.remove(node.id());
            }
            NodeKind::FieldSeparator { field } => {
                if let Some(f) = self.fields.get_mut(*field) {
                    f.detach_marker(node.id());
                }
            }
            NodeKind::FieldEnd { field } => {
                let detached = self
                    .fields
                    .get_mut(*field)
                    .map_or(false, |f| f.detach_marker(node.id()));
                if detached {
                    tracing::warn!(field = %field, "field end removed, field is no longer closed");
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Removal and moves
    // ------------------------------------------------------------------

    /// Remove a node together with its subtree
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(DocModelError::InvalidOperation(
                "the document root cannot be removed".into(),
            ));
        }
        self.require(id)?;
        self.detach_subtree(id);
        Ok(())
    }

    /// Remove every child of a node
    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children = self.require(id)?.children().to_vec();
        for child in children {
            self.detach_subtree(child);
        }
        Ok(())
    }

    fn detach_subtree(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children_mut().retain(|&c| c != id);
            }
        }
        for node_id in self.subtree(id) {
            if let Some(node) = self.nodes.remove(&node_id) {
                self.unregister_marker(&node);
            }
        }
    }

    /// Move an existing node under `new_parent` at `index` (append when `None`)
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, index: Option<usize>) -> Result<()> {
        let node_type = self.require(id)?.node_type();
        let parent_type = self.require(new_parent)?.node_type();
        if !parent_type.accepts_child(node_type) {
            return Err(DocModelError::InvalidChild {
                parent: parent_type,
                child: node_type,
            });
        }
        if self.is_ancestor_or_self(id, new_parent) {
            return Err(DocModelError::InvalidOperation(
                "a node cannot be moved into its own subtree".into(),
            ));
        }
        if let Some(old_parent) = self.parent(id) {
            if let Some(parent_node) = self.nodes.get_mut(&old_parent) {
                parent_node.children_mut().retain(|&c| c != id);
            }
        }
        if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
            let children = parent_node.children_mut();
            match index {
                Some(i) if i <= children.len() => children.insert(i, id),
                _ => children.push(id),
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.set_parent(Some(new_parent));
        }
        Ok(())
    }

    /// Split a paragraph before child `at`, moving the tail into a new
    /// paragraph placed right after it. Returns the new paragraph.
    pub fn split_paragraph(&mut self, paragraph: NodeId, at: usize) -> Result<NodeId> {
        let node = self.require(paragraph)?;
        let NodeKind::Paragraph { style } = node.kind.clone() else {
            return Err(DocModelError::InvalidOperation(format!(
                "{} is not a paragraph",
                paragraph
            )));
        };
        let tail: Vec<NodeId> = node.children().iter().skip(at).copied().collect();
        let new_paragraph = self.insert_after(paragraph, NodeKind::Paragraph { style })?;
        for child in tail {
            self.move_node(child, new_paragraph, None)?;
        }
        Ok(new_paragraph)
    }

    /// Move every child of `next` to the end of `into` and remove `next`
    pub fn merge_paragraphs(&mut self, into: NodeId, next: NodeId) -> Result<()> {
        let children = self.require(next)?.children().to_vec();
        for child in children {
            self.move_node(child, into, None)?;
        }
        self.remove(next)
    }

    /// Replace the text of a run
    pub fn set_run_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<()> {
        match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Run { text: current }) => {
                *current = text.into();
                Ok(())
            }
            Some(_) => Err(DocModelError::InvalidOperation(format!("{} is not a run", id))),
            None => Err(DocModelError::NodeNotFound(id)),
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// The node and all of its descendants in pre-order
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Descendants of a node in pre-order, excluding the node itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut nodes = self.subtree(id);
        if !nodes.is_empty() {
            nodes.remove(0);
        }
        nodes
    }

    /// Every node in document order
    pub fn document_order(&self) -> Vec<NodeId> {
        self.subtree(self.root)
    }

    /// The node following `id` in document order
    pub fn next_node(&self, id: NodeId) -> Option<NodeId> {
        if let Some(&first) = self.children(id).first() {
            return Some(first);
        }
        let mut current = id;
        loop {
            if let Some(sibling) = self.next_sibling(current) {
                return Some(sibling);
            }
            current = self.parent(current)?;
        }
    }

    /// The node preceding `id` in document order
    pub fn previous_node(&self, id: NodeId) -> Option<NodeId> {
        match self.previous_sibling(id) {
            Some(mut current) => {
                while let Some(&last) = self.children(current).last() {
                    current = last;
                }
                Some(current)
            }
            None => self.parent(id),
        }
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index.checked_sub(1).map(|i| self.children(parent)[i])
    }

    fn path(&self, id: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = id;
        while current != self.root {
            path.push(self.index_in_parent(current)?);
            current = self.parent(current)?;
        }
        path.reverse();
        Some(path)
    }

    /// Compare two nodes by document order; ancestors precede descendants.
    /// `None` when either node is not attached to the tree.
    pub fn compare_order(&self, a: NodeId, b: NodeId) -> Option<Ordering> {
        Some(self.path(a)?.cmp(&self.path(b)?))
    }

    pub(crate) fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// The closest node of `node_type` containing `id`, including `id` itself
    pub fn enclosing(&self, id: NodeId, node_type: NodeType) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.node_type(node)? == node_type {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    fn of_type_in(&self, id: NodeId, node_type: NodeType) -> Vec<NodeId> {
        self.subtree(id)
            .into_iter()
            .filter(|&n| self.node_type(n) == Some(node_type))
            .collect()
    }

    /// All paragraphs in document order
    pub fn paragraphs(&self) -> Vec<NodeId> {
        self.of_type_in(self.root, NodeType::Paragraph)
    }

    /// All sections in document order
    pub fn sections(&self) -> Vec<NodeId> {
        self.children(self.root).to_vec()
    }

    /// First paragraph inside `id`, or `id` itself when it is a paragraph
    pub fn first_paragraph(&self, id: NodeId) -> Option<NodeId> {
        self.of_type_in(id, NodeType::Paragraph).into_iter().next()
    }

    /// Last paragraph inside `id`, or `id` itself when it is a paragraph
    pub fn last_paragraph(&self, id: NodeId) -> Option<NodeId> {
        self.of_type_in(id, NodeType::Paragraph).into_iter().last()
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Plain text of the whole document with field characters and
    /// paragraph, cell and section terminators
    pub fn text(&self) -> String {
        self.node_text(self.root)
    }

    /// Plain text of one node's subtree, rendered like [`DocumentTree::text`]
    pub fn node_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render(id, &mut out);
        out
    }

    fn render(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Run { text } => out.push_str(text),
            NodeKind::FieldStart { .. } => out.push(FIELD_START_CHAR),
            NodeKind::FieldSeparator { .. } => out.push(FIELD_SEPARATOR_CHAR),
            NodeKind::FieldEnd { .. } => out.push(FIELD_END_CHAR),
            NodeKind::BookmarkStart { .. } | NodeKind::BookmarkEnd { .. } | NodeKind::Shape(_) => {}
            NodeKind::Paragraph { .. } => {
                for &child in node.children() {
                    self.render(child, out);
                }
                out.push(self.paragraph_terminator(id));
            }
            NodeKind::Row => {
                for &child in node.children() {
                    self.render(child, out);
                }
                out.push(CELL_END_CHAR);
            }
            _ => {
                for &child in node.children() {
                    self.render(child, out);
                }
            }
        }
    }

    fn paragraph_terminator(&self, paragraph: NodeId) -> char {
        let is_last = self.next_sibling(paragraph).is_none();
        match self.parent(paragraph).and_then(|p| self.node_type(p)) {
            Some(NodeType::Cell) if is_last => CELL_END_CHAR,
            Some(NodeType::Body) if is_last => SECTION_END_CHAR,
            _ => PARAGRAPH_END_CHAR,
        }
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}
