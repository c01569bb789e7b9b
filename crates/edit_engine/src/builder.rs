//! Document builder - a single insertion point over a document tree
//!
//! Content is always inserted immediately before the cursor's current
//! node. A cursor without a current node sits at the end of its paragraph.

use crate::{EditError, FieldEvaluator, Result};
use doc_model::{
    validate_bookmark_name, DocModelError, DocumentTree, FieldCode, FieldEvent, FieldId,
    FieldState, FieldType, NodeId, NodeKind, NodeType, Shape, ShapeType,
};
use std::cmp::Ordering;

/// Line break character inside a run
pub const LINE_BREAK_CHAR: char = '\u{0b}';
/// Column break character inside a run
pub const COLUMN_BREAK_CHAR: char = '\u{0e}';

/// Insertion point: before `node`, or at the end of `paragraph`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub paragraph: NodeId,
    pub node: Option<NodeId>,
}

/// Kinds of break `insert_break` understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakType {
    Line,
    Column,
    Page,
    Paragraph,
    /// New section starting on a new page
    SectionNewPage,
}

#[derive(Debug, Clone, Copy)]
struct TableFrame {
    table: NodeId,
    row: Option<NodeId>,
    /// Where the cursor goes once the table is finished
    resume: Cursor,
}

/// Cursor-based document construction
#[derive(Debug)]
pub struct DocumentBuilder<'a> {
    tree: &'a mut DocumentTree,
    cursor: Cursor,
    evaluator: FieldEvaluator,
    open_fields: Vec<FieldId>,
    tables: Vec<TableFrame>,
}

impl<'a> DocumentBuilder<'a> {
    /// Create a builder positioned at the start of the document
    pub fn new(tree: &'a mut DocumentTree) -> Self {
        Self::with_evaluator(tree, FieldEvaluator::default())
    }

    pub fn with_evaluator(tree: &'a mut DocumentTree, evaluator: FieldEvaluator) -> Self {
        let paragraph = tree.root_id();
        let mut builder = Self {
            tree,
            cursor: Cursor {
                paragraph,
                node: None,
            },
            evaluator,
            open_fields: Vec::new(),
            tables: Vec::new(),
        };
        builder.move_to_document_start();
        builder
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn tree(&self) -> &DocumentTree {
        &*self.tree
    }

    pub fn tree_mut(&mut self) -> &mut DocumentTree {
        &mut *self.tree
    }

    pub fn evaluator(&self) -> &FieldEvaluator {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut FieldEvaluator {
        &mut self.evaluator
    }

    pub fn set_evaluator(&mut self, evaluator: FieldEvaluator) {
        self.evaluator = evaluator;
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// The node content is inserted before; `None` at the end of a paragraph
    pub fn current_node(&self) -> Option<NodeId> {
        self.cursor.node
    }

    pub fn current_paragraph(&self) -> NodeId {
        self.cursor.paragraph
    }

    /// Field currently being built with `start_field`
    pub fn open_field(&self) -> Option<FieldId> {
        self.open_fields.last().copied()
    }

    // ------------------------------------------------------------------
    // Cursor resolution
    // ------------------------------------------------------------------

    /// Repair a cursor invalidated by edits made directly on the tree
    fn resolve(&mut self) -> Result<Cursor> {
        let paragraph_ok = self.tree.node_type(self.cursor.paragraph) == Some(NodeType::Paragraph);
        if !paragraph_ok {
            tracing::debug!("cursor paragraph is gone, moving to document end");
            if !self.move_to_document_end() {
                let body = self.last_body()?;
                let paragraph = self.tree.append_child(body, NodeKind::paragraph())?;
                self.cursor = Cursor {
                    paragraph,
                    node: None,
                };
            }
        } else if let Some(node) = self.cursor.node {
            if self.tree.parent(node) != Some(self.cursor.paragraph) {
                self.cursor.node = None;
            }
        }
        Ok(self.cursor)
    }

    fn last_body(&mut self) -> Result<NodeId> {
        let section = match self.tree.sections().last().copied() {
            Some(section) => section,
            None => self.tree.append_section(),
        };
        self.tree
            .children(section)
            .iter()
            .copied()
            .find(|&child| self.tree.node_type(child) == Some(NodeType::Body))
            .ok_or_else(|| EditError::InvalidCursor("section has no body".into()))
    }

    fn place_before(&mut self, node: NodeId) -> bool {
        match self.tree.parent(node) {
            Some(paragraph) if self.tree.node_type(paragraph) == Some(NodeType::Paragraph) => {
                self.cursor = Cursor {
                    paragraph,
                    node: Some(node),
                };
                true
            }
            _ => false,
        }
    }

    fn place_after(&mut self, node: NodeId) -> bool {
        match self.tree.parent(node) {
            Some(paragraph) if self.tree.node_type(paragraph) == Some(NodeType::Paragraph) => {
                self.cursor = Cursor {
                    paragraph,
                    node: self.tree.next_sibling(node),
                };
                true
            }
            _ => false,
        }
    }

    fn place_at_paragraph_start(&mut self, paragraph: NodeId) {
        self.cursor = Cursor {
            paragraph,
            node: self.tree.children(paragraph).first().copied(),
        };
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    /// Move before an inline node, or to the start of a paragraph or of
    /// the first paragraph inside a composite node. Returns `false` and
    /// leaves the cursor alone for nodes outside the tree.
    pub fn move_to(&mut self, node: NodeId) -> bool {
        match self.tree.node_type(node) {
            None => false,
            Some(NodeType::Paragraph) => {
                self.place_at_paragraph_start(node);
                true
            }
            Some(node_type) if node_type.is_inline() => self.place_before(node),
            Some(_) => match self.tree.first_paragraph(node) {
                Some(paragraph) => {
                    self.place_at_paragraph_start(paragraph);
                    true
                }
                None => false,
            },
        }
    }

    pub fn move_to_document_start(&mut self) -> bool {
        match self.tree.first_paragraph(self.tree.root_id()) {
            Some(paragraph) => {
                self.place_at_paragraph_start(paragraph);
                true
            }
            None => false,
        }
    }

    /// Move to the end of the last paragraph of the last section
    pub fn move_to_document_end(&mut self) -> bool {
        let last_body_paragraph = self.tree.sections().last().and_then(|&section| {
            self.tree
                .children(section)
                .iter()
                .flat_map(|&body| self.tree.children(body).iter().copied())
                .filter(|&child| self.tree.node_type(child) == Some(NodeType::Paragraph))
                .last()
        });
        match last_body_paragraph.or_else(|| self.tree.last_paragraph(self.tree.root_id())) {
            Some(paragraph) => {
                self.cursor = Cursor {
                    paragraph,
                    node: None,
                };
                true
            }
            None => false,
        }
    }

    /// Move to the start of the paragraph at `index` in document order
    pub fn move_to_paragraph(&mut self, index: usize) -> bool {
        match self.tree.paragraphs().get(index) {
            Some(&paragraph) => {
                self.place_at_paragraph_start(paragraph);
                true
            }
            None => false,
        }
    }

    /// Move to the start of the section at `index`
    pub fn move_to_section(&mut self, index: usize) -> bool {
        match self.tree.sections().get(index) {
            Some(&section) => self.move_to(section),
            None => false,
        }
    }

    /// Move before a field's start marker, or after its end marker
    pub fn move_to_field(&mut self, field: FieldId, is_after: bool) -> Result<()> {
        let field = self.tree.field(field)?;
        let moved = if is_after {
            let end = field
                .end()
                .ok_or_else(|| EditError::InvalidCursor("field has no end marker".into()))?;
            self.place_after(end)
        } else {
            let start = field.start();
            self.place_before(start)
        };
        if moved {
            Ok(())
        } else {
            Err(EditError::InvalidCursor("field marker is not inside a paragraph".into()))
        }
    }

    /// Move before or after the start or end marker of a bookmark.
    ///
    /// Returns `false` for unknown, duplicated or unterminated bookmarks.
    pub fn move_to_bookmark(&mut self, name: &str, is_start: bool, is_after: bool) -> bool {
        let bookmark = match self.tree.bookmark(name) {
            Ok(bookmark) => bookmark,
            Err(err) => {
                tracing::debug!(bookmark = name, %err, "cannot move to bookmark");
                return false;
            }
        };
        let marker = if is_start { bookmark.start } else { bookmark.end };
        if is_after {
            self.place_after(marker)
        } else {
            self.place_before(marker)
        }
    }

    /// Move to the first MERGEFIELD named `name`. With `is_delete_field`
    /// the field is removed and the cursor takes its place.
    pub fn move_to_merge_field(&mut self, name: &str, is_after: bool, is_delete_field: bool) -> bool {
        let Some(field) = self.find_merge_field(name) else {
            return false;
        };
        let Ok((start, end)) = self
            .tree
            .field(field)
            .map(|f| (f.start(), f.end()))
        else {
            return false;
        };

        if is_delete_field {
            let Some(paragraph) = self.tree.parent(start) else {
                return false;
            };
            let following = end.and_then(|end| self.tree.next_sibling(end));
            if let Err(err) = self.tree.remove_field(field) {
                tracing::warn!(field = %field, %err, "failed to remove merge field");
                return false;
            }
            self.cursor = Cursor {
                paragraph,
                node: following.filter(|&n| self.tree.parent(n) == Some(paragraph)),
            };
            return true;
        }

        match (is_after, end) {
            (true, Some(end)) => self.place_after(end),
            (true, None) => false,
            (false, _) => self.place_before(start),
        }
    }

    fn find_merge_field(&self, name: &str) -> Option<FieldId> {
        self.tree.fields_in_document_order().into_iter().find(|&id| {
            let Ok(code) = self.tree.field_code(id, false) else {
                return false;
            };
            let code = FieldCode::parse(&code);
            code.field_type == FieldType::MergeField
                && code.argument(0).map_or(false, |n| n.eq_ignore_ascii_case(name))
        })
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    /// Insert any inline node before the cursor
    pub fn insert_node(&mut self, kind: NodeKind) -> Result<NodeId> {
        let cursor = self.resolve()?;
        let id = match cursor.node {
            Some(node) => self.tree.insert_before(node, kind)?,
            None => self.tree.append_child(cursor.paragraph, kind)?,
        };
        tracing::trace!(node = %id, "builder inserted node");
        Ok(id)
    }

    /// Record that content went into the field under construction
    fn note_field_content(&mut self) -> Result<()> {
        while let Some(&field) = self.open_fields.last() {
            match self.tree.fields().get(field).map(|f| f.state()) {
                Some(FieldState::Closed) | None => {
                    self.open_fields.pop();
                }
                Some(_) if !self.cursor_follows(field)? => {
                    tracing::trace!(field = %field, "write outside the open field");
                    return Ok(());
                }
                Some(state) => {
                    let event = if state.accepts_code() {
                        FieldEvent::CodeWritten
                    } else {
                        FieldEvent::ResultWritten
                    };
                    self.tree.field_mut(field)?.apply(event)?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Whether content inserted at the cursor lands after `marker`
    fn cursor_follows(&mut self, marker: NodeId) -> Result<bool> {
        let cursor = self.resolve()?;
        Ok(match cursor.node {
            Some(node) => self.tree.compare_order(marker, node) == Some(Ordering::Less),
            None => {
                self.tree.enclosing(marker, NodeType::Paragraph) == Some(cursor.paragraph)
                    || self.tree.compare_order(marker, cursor.paragraph) == Some(Ordering::Less)
            }
        })
    }

    /// Insert text at the cursor. `\r`, `\n` and `\r\n` start new paragraphs.
    pub fn write(&mut self, text: &str) -> Result<()> {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        for (i, segment) in normalized.split('\n').enumerate() {
            if i > 0 {
                self.insert_paragraph()?;
            }
            if !segment.is_empty() {
                self.note_field_content()?;
                self.insert_node(NodeKind::run(segment))?;
            }
        }
        Ok(())
    }

    /// Write text followed by a paragraph break
    pub fn writeln(&mut self, text: &str) -> Result<()> {
        self.write(text)?;
        self.insert_paragraph()?;
        Ok(())
    }

    /// Split the current paragraph at the cursor. Returns the paragraph
    /// that now ends at the break; the cursor moves into the new one.
    pub fn insert_paragraph(&mut self) -> Result<NodeId> {
        let cursor = self.resolve()?;
        let index = match cursor.node {
            Some(node) => self
                .tree
                .index_in_parent(node)
                .ok_or(DocModelError::NodeNotFound(node))?,
            None => self.tree.children(cursor.paragraph).len(),
        };
        let next = self.tree.split_paragraph(cursor.paragraph, index)?;
        self.cursor = Cursor {
            paragraph: next,
            node: cursor.node,
        };
        Ok(cursor.paragraph)
    }

    pub fn insert_break(&mut self, break_type: BreakType) -> Result<()> {
        match break_type {
            BreakType::Line => self.write(&LINE_BREAK_CHAR.to_string()),
            BreakType::Column => self.write(&COLUMN_BREAK_CHAR.to_string()),
            BreakType::Page => self.write(&doc_model::PAGE_BREAK_CHAR.to_string()),
            BreakType::Paragraph => self.insert_paragraph().map(|_| ()),
            BreakType::SectionNewPage => self.insert_section_break(),
        }
    }

    /// Move everything after the cursor into a new section
    fn insert_section_break(&mut self) -> Result<()> {
        let cursor = self.resolve()?;
        let body = self
            .tree
            .parent(cursor.paragraph)
            .filter(|&p| self.tree.node_type(p) == Some(NodeType::Body))
            .ok_or_else(|| {
                EditError::InvalidCursor("section breaks cannot be inserted inside a table".into())
            })?;
        let section = self
            .tree
            .parent(body)
            .ok_or(DocModelError::NodeNotFound(body))?;

        self.insert_paragraph()?;
        let tail_start = self.cursor.paragraph;
        let index = self
            .tree
            .index_in_parent(tail_start)
            .ok_or(DocModelError::NodeNotFound(tail_start))?;
        let tail: Vec<NodeId> = self.tree.children(body)[index..].to_vec();

        let new_section = self.tree.insert_after(section, NodeKind::Section)?;
        let new_body = self.tree.append_child(new_section, NodeKind::Body)?;
        for block in tail {
            self.tree.move_node(block, new_body, None)?;
        }
        tracing::trace!(section = %new_section, "section break inserted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Insert a complete field and evaluate it. The cursor ends up after
    /// the field's end marker.
    pub fn insert_field(&mut self, code: &str) -> Result<FieldId> {
        let field = self.insert_field_nodes(code, "")?;
        self.evaluator.update_field(&mut *self.tree, field)?;
        Ok(field)
    }

    /// Insert a complete field with `value` as its cached result, without
    /// evaluating it
    pub fn insert_field_with_value(&mut self, code: &str, value: &str) -> Result<FieldId> {
        self.insert_field_nodes(code, value)
    }

    fn insert_field_nodes(&mut self, code: &str, value: &str) -> Result<FieldId> {
        self.note_field_content()?;
        let field_type = FieldCode::parse(code).field_type;
        let field = self.insert_node(NodeKind::FieldStart { field_type })?;
        if !code.is_empty() {
            self.insert_node(NodeKind::run(code))?;
            self.tree.field_mut(field)?.apply(FieldEvent::CodeWritten)?;
        }
        self.insert_node(NodeKind::FieldSeparator { field })?;
        if !value.is_empty() {
            self.insert_node(NodeKind::run(value))?;
            self.tree.field_mut(field)?.apply(FieldEvent::ResultWritten)?;
        }
        self.insert_node(NodeKind::FieldEnd { field })?;
        tracing::trace!(field = %field, code, "field inserted");
        Ok(field)
    }

    /// Begin a field; text written next becomes its code
    pub fn start_field(&mut self) -> Result<FieldId> {
        self.note_field_content()?;
        let field = self.insert_node(NodeKind::FieldStart {
            field_type: FieldType::None,
        })?;
        self.open_fields.push(field);
        Ok(field)
    }

    /// Switch the open field from code to result
    pub fn insert_field_separator(&mut self) -> Result<NodeId> {
        let field = self.open_field().ok_or(EditError::NoOpenField)?;
        let separator = self.insert_node(NodeKind::FieldSeparator { field })?;
        Ok(separator)
    }

    /// Close the open field. Its type is taken from the code written so far;
    /// the result is left as written.
    pub fn end_field(&mut self) -> Result<FieldId> {
        let field = self.open_field().ok_or(EditError::NoOpenField)?;
        self.insert_node(NodeKind::FieldEnd { field })?;
        self.open_fields.pop();
        let code = FieldCode::parse(&self.tree.field_code(field, false)?);
        self.tree.set_field_type(field, code.field_type)?;
        Ok(field)
    }

    /// Evaluate one field with the builder's evaluator
    pub fn update_field(&mut self, field: FieldId) -> Result<bool> {
        self.evaluator.update_field(&mut *self.tree, field)
    }

    /// Evaluate every field in the document
    pub fn update_fields(&mut self) -> Result<usize> {
        self.evaluator.update_fields(&mut *self.tree)
    }

    // ------------------------------------------------------------------
    // Bookmarks
    // ------------------------------------------------------------------

    pub fn start_bookmark(&mut self, name: &str) -> Result<NodeId> {
        validate_bookmark_name(name)?;
        match self.tree.bookmark(name) {
            Err(DocModelError::BookmarkNotFound(_)) => {}
            _ => return Err(DocModelError::DuplicateBookmark(name.to_string()).into()),
        }
        self.insert_node(NodeKind::BookmarkStart {
            name: name.to_string(),
        })
    }

    pub fn end_bookmark(&mut self, name: &str) -> Result<NodeId> {
        match self.tree.bookmark(name) {
            Err(DocModelError::UnterminatedBookmark(_)) => {}
            Ok(_) => {
                return Err(DocModelError::InvalidOperation(format!(
                    "bookmark {} is already closed",
                    name
                ))
                .into())
            }
            Err(err) => return Err(err.into()),
        }
        self.insert_node(NodeKind::BookmarkEnd {
            name: name.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Begin a table right before the current paragraph
    pub fn start_table(&mut self) -> Result<NodeId> {
        let cursor = self.resolve()?;
        let table = self.tree.insert_before(cursor.paragraph, NodeKind::Table)?;
        self.tables.push(TableFrame {
            table,
            row: None,
            resume: cursor,
        });
        tracing::trace!(table = %table, "table started");
        Ok(table)
    }

    /// Add a cell to the current row (starting a row if needed) and move
    /// into its paragraph
    pub fn insert_cell(&mut self) -> Result<NodeId> {
        let frame = self.tables.last().copied().ok_or(EditError::NoOpenTable)?;
        let row = match frame.row {
            Some(row) => row,
            None => {
                let row = self.tree.append_child(frame.table, NodeKind::Row)?;
                if let Some(current) = self.tables.last_mut() {
                    current.row = Some(row);
                }
                row
            }
        };
        let cell = self.tree.append_child(row, NodeKind::Cell)?;
        let paragraph = self.tree.append_child(cell, NodeKind::paragraph())?;
        self.cursor = Cursor {
            paragraph,
            node: None,
        };
        Ok(cell)
    }

    pub fn end_row(&mut self) -> Result<NodeId> {
        let frame = self.tables.last_mut().ok_or(EditError::NoOpenTable)?;
        frame
            .row
            .take()
            .ok_or_else(|| DocModelError::InvalidOperation("no row is open".into()).into())
    }

    /// Finish the table and return to the paragraph that follows it
    pub fn end_table(&mut self) -> Result<NodeId> {
        let frame = self.tables.pop().ok_or(EditError::NoOpenTable)?;
        self.cursor = frame.resume;
        self.resolve()?;
        Ok(frame.table)
    }

    // ------------------------------------------------------------------
    // Shapes
    // ------------------------------------------------------------------

    pub fn insert_shape(&mut self, shape_type: ShapeType, width: f64, height: f64) -> Result<NodeId> {
        self.note_field_content()?;
        self.insert_node(NodeKind::Shape(Shape {
            shape_type,
            width,
            height,
            alt_text: String::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_starts_at_document_start() {
        let mut tree = DocumentTree::new();
        let first = tree.paragraphs()[0];
        let builder = DocumentBuilder::new(&mut tree);
        assert_eq!(builder.current_paragraph(), first);
        assert_eq!(builder.current_node(), None);
    }

    #[test]
    fn test_write_inserts_before_current_node() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.write("world").unwrap();
        assert!(builder.move_to_document_start());
        builder.write("Hello ").unwrap();
        assert_eq!(tree.text(), "Hello world\u{0c}");
    }

    #[test]
    fn test_line_endings_start_paragraphs() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.write("a\nb\r\nc\rd").unwrap();
        builder.writeln("").unwrap();
        assert_eq!(tree.text(), "a\rb\rc\rd\r\u{0c}");
        assert_eq!(tree.paragraphs().len(), 5);
    }

    #[test]
    fn test_insert_paragraph_splits_at_cursor() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.write("left").unwrap();
        builder.write("right").unwrap();
        let right = builder.tree().children(builder.current_paragraph())[1];
        assert!(builder.move_to(right));

        let previous = builder.insert_paragraph().unwrap();
        assert_ne!(previous, builder.current_paragraph());
        assert_eq!(builder.current_node(), Some(right));
        assert_eq!(tree.text(), "left\rright\u{0c}");
    }

    #[test]
    fn test_insert_field_evaluates_and_moves_past_end() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let field = builder.insert_field("= 2 + 3").unwrap();
        builder.write(" done").unwrap();

        assert_eq!(builder.tree().field_result(field).unwrap(), "5");
        assert!(builder.tree().field(field).unwrap().is_closed());
        assert_eq!(tree.text(), "\u{13}= 2 + 3\u{14}5\u{15} done\u{0c}");
    }

    #[test]
    fn test_insert_field_with_value_is_not_evaluated() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let field = builder.insert_field_with_value("PAGE", "42").unwrap();
        assert_eq!(builder.tree().field_result(field).unwrap(), "42");

        assert!(builder.update_field(field).unwrap());
        assert_eq!(builder.tree().field_result(field).unwrap(), "1");
    }

    #[test]
    fn test_field_built_piece_by_piece() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let field = builder.start_field().unwrap();
        assert_eq!(builder.open_field(), Some(field));
        builder.write("PAGE").unwrap();
        assert_eq!(builder.tree().field(field).unwrap().state(), FieldState::InCode);

        builder.insert_field_separator().unwrap();
        builder.write("99").unwrap();
        builder.end_field().unwrap();

        assert_eq!(builder.open_field(), None);
        let recorded = builder.tree().field(field).unwrap();
        assert!(recorded.is_closed());
        assert_eq!(recorded.field_type, FieldType::Page);
        assert_eq!(builder.tree().field_result(field).unwrap(), "99");
    }

    #[test]
    fn test_write_outside_open_field_leaves_its_state() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let field = builder.start_field().unwrap();

        builder.move_to_document_start();
        builder.write("before ").unwrap();
        assert_eq!(builder.tree().field(field).unwrap().state(), FieldState::Started);

        builder.move_to_document_end();
        builder.write("PAGE").unwrap();
        assert_eq!(builder.tree().field(field).unwrap().state(), FieldState::InCode);
        builder.insert_field_separator().unwrap();
        builder.end_field().unwrap();
        assert_eq!(builder.tree().field_code(field, false).unwrap(), "PAGE");
        assert_eq!(tree.text(), "before \u{13}PAGE\u{14}\u{15}\u{0c}");
    }

    #[test]
    fn test_field_markers_require_an_open_field() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        assert!(matches!(builder.end_field(), Err(EditError::NoOpenField)));
        assert!(matches!(builder.insert_field_separator(), Err(EditError::NoOpenField)));
    }

    #[test]
    fn test_nested_field_inside_code() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let outer = builder.start_field().unwrap();
        builder.write("IF ").unwrap();
        let inner = builder.insert_field("= 1 + 1").unwrap();
        builder.write(" = 2 \"yes\" \"no\"").unwrap();
        builder.insert_field_separator().unwrap();
        builder.end_field().unwrap();

        assert_eq!(builder.tree().parent_field(inner).unwrap(), Some(outer));
        assert!(builder.update_field(outer).unwrap());
        assert_eq!(builder.tree().field_result(outer).unwrap(), "yes");
    }

    #[test]
    fn test_bookmarks_and_bookmark_moves() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.start_bookmark("Intro").unwrap();
        builder.write("Hello").unwrap();
        builder.end_bookmark("Intro").unwrap();
        assert_eq!(builder.tree().bookmark_text("Intro").unwrap(), "Hello");

        assert!(builder.move_to_bookmark("intro", true, true));
        builder.write("Say ").unwrap();
        assert!(builder.move_to_bookmark("Intro", false, false));
        builder.write("!").unwrap();
        assert_eq!(builder.tree().bookmark_text("Intro").unwrap(), "Say Hello!");

        assert!(!builder.move_to_bookmark("missing", true, false));
    }

    #[test]
    fn test_bookmark_names_are_checked() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        assert!(builder.start_bookmark("has space").is_err());
        builder.start_bookmark("Mark").unwrap();
        assert!(matches!(
            builder.start_bookmark("MARK"),
            Err(EditError::DocModel(DocModelError::DuplicateBookmark(_)))
        ));
        assert!(builder.end_bookmark("Other").is_err());
        builder.end_bookmark("Mark").unwrap();
        assert!(builder.end_bookmark("Mark").is_err());
    }

    #[test]
    fn test_table_construction() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.start_table().unwrap();
        builder.insert_cell().unwrap();
        builder.write("A").unwrap();
        builder.insert_cell().unwrap();
        builder.write("B").unwrap();
        builder.end_row().unwrap();
        builder.insert_cell().unwrap();
        builder.write("C").unwrap();
        builder.end_row().unwrap();
        builder.end_table().unwrap();
        builder.write("After").unwrap();

        assert_eq!(tree.text(), "A\u{07}B\u{07}\u{07}C\u{07}\u{07}After\u{0c}");
    }

    #[test]
    fn test_table_operations_need_an_open_table() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        assert!(matches!(builder.insert_cell(), Err(EditError::NoOpenTable)));
        assert!(matches!(builder.end_table(), Err(EditError::NoOpenTable)));
        builder.start_table().unwrap();
        assert!(builder.end_row().is_err());
    }

    #[test]
    fn test_section_break_moves_tail_into_new_section() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.write("One").unwrap();
        builder.insert_break(BreakType::SectionNewPage).unwrap();
        builder.write("Two").unwrap();
        let page = builder.insert_field("PAGE").unwrap();

        assert_eq!(builder.tree().sections().len(), 2);
        assert_eq!(builder.tree().field_result(page).unwrap(), "2");
        assert_eq!(builder.tree().total_pages(), 2);
    }

    #[test]
    fn test_section_break_is_rejected_inside_table() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.start_table().unwrap();
        builder.insert_cell().unwrap();
        assert!(matches!(
            builder.insert_break(BreakType::SectionNewPage),
            Err(EditError::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_inline_breaks() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.write("a").unwrap();
        builder.insert_break(BreakType::Line).unwrap();
        builder.write("b").unwrap();
        builder.insert_break(BreakType::Page).unwrap();
        let page = builder.insert_field("PAGE").unwrap();
        assert_eq!(builder.tree().field_result(page).unwrap(), "2");
        assert!(tree.text().starts_with("a\u{0b}b\u{0c}"));
    }

    #[test]
    fn test_move_to_merge_field_with_delete() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.insert_field("MERGEFIELD Name").unwrap();
        builder.write(" tail").unwrap();

        assert!(!builder.move_to_merge_field("Other", false, false));
        assert!(builder.move_to_merge_field("name", false, true));
        builder.write("Alice").unwrap();

        assert!(builder.tree().fields().is_empty());
        assert_eq!(tree.text(), "Alice tail\u{0c}");
    }

    #[test]
    fn test_move_to_field_sides() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let field = builder.insert_field("= 1").unwrap();
        builder.move_to_field(field, false).unwrap();
        builder.write("<").unwrap();
        builder.move_to_field(field, true).unwrap();
        builder.write(">").unwrap();
        assert_eq!(tree.text(), "<\u{13}= 1\u{14}1\u{15}>\u{0c}");
    }

    #[test]
    fn test_stale_cursor_falls_back_to_paragraph_end() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        builder.write("a").unwrap();
        builder.move_to_document_start();
        let run = builder.current_node().unwrap();
        builder.tree_mut().remove(run).unwrap();

        builder.write("b").unwrap();
        assert_eq!(tree.text(), "b\u{0c}");
    }

    #[test]
    fn test_moves_to_unknown_targets_fail() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let before = builder.cursor();
        assert!(!builder.move_to(NodeId::new()));
        assert!(!builder.move_to_paragraph(3));
        assert!(!builder.move_to_section(1));
        assert_eq!(builder.cursor(), before);
    }

    #[test]
    fn test_insert_shape() {
        let mut tree = DocumentTree::new();
        let mut builder = DocumentBuilder::new(&mut tree);
        let shape = builder.insert_shape(ShapeType::Ellipse, 72.0, 36.0).unwrap();
        builder.write("caption").unwrap();
        assert_eq!(builder.tree().node_type(shape), Some(NodeType::Shape));
        assert_eq!(tree.text(), "caption\u{0c}");
    }
}
