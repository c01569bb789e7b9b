//! Reading and rewriting the node ranges a field spans

use crate::tree::{FIELD_END_CHAR, FIELD_SEPARATOR_CHAR, FIELD_START_CHAR, PARAGRAPH_END_CHAR};
use crate::{
    DocModelError, DocumentTree, Field, FieldId, FieldType, NodeId, NodeKind, NodeType, Result,
};
use std::cmp::Ordering;

/// How `span_text` renders fields nested inside the span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NestedFields {
    /// Markers, code and result
    Codes,
    /// Result text only
    Results,
    /// Result text as one field code argument, quoted when needed
    QuotedResults,
}

/// Append a nested result so the code tokenizer reads it back as a single
/// argument
fn push_argument(out: &mut String, result: &str) {
    let plain = !result.is_empty()
        && !result
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if plain {
        out.push_str(result);
        return;
    }
    out.push('"');
    for c in result.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

impl DocumentTree {
    pub fn field(&self, id: FieldId) -> Result<&Field> {
        self.fields().get(id).ok_or(DocModelError::FieldNotFound(id))
    }

    pub fn field_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        self.fields_mut()
            .get_mut(id)
            .ok_or(DocModelError::FieldNotFound(id))
    }

    /// Registered fields ordered by the position of their start marker
    pub fn fields_in_document_order(&self) -> Vec<FieldId> {
        self.document_order()
            .into_iter()
            .filter(|&id| self.fields().contains(id))
            .collect()
    }

    /// Text between the start marker and the separator (or end).
    ///
    /// With `include_child_codes` nested fields appear with their markers,
    /// code and result; otherwise each nested field contributes only its
    /// current result. A field without separator or end reads up to the
    /// end of its paragraph.
    pub fn field_code(&self, id: FieldId, include_child_codes: bool) -> Result<String> {
        let field = self.field(id)?;
        let stop = field.separator().or(field.end());
        let nested = if include_child_codes {
            NestedFields::Codes
        } else {
            NestedFields::QuotedResults
        };
        Ok(self.span_text(field.start(), stop, nested))
    }

    /// Cached result text; empty for fields that are not closed or have no
    /// separator
    pub fn field_result(&self, id: FieldId) -> Result<String> {
        let field = self.field(id)?;
        match (field.is_closed(), field.separator(), field.end()) {
            (true, Some(separator), Some(end)) => Ok(self.span_text(separator, Some(end), NestedFields::Results)),
            _ => Ok(String::new()),
        }
    }

    /// Replace everything between separator and end with a single run.
    ///
    /// A closed field without separator gets one right before its end.
    /// When the old result spanned several paragraphs they are merged.
    pub fn set_field_result(&mut self, id: FieldId, text: &str) -> Result<()> {
        let field = self.field(id)?;
        let Some(end) = field.end().filter(|_| field.is_closed()) else {
            return Err(DocModelError::InvalidOperation(format!(
                "field {} is not closed",
                id
            )));
        };

        let separator = match field.separator() {
            Some(separator) => separator,
            None => {
                let parent = self.parent(end).ok_or(DocModelError::NodeNotFound(end))?;
                let index = self
                    .index_in_parent(end)
                    .ok_or(DocModelError::NodeNotFound(end))?;
                let separator = self.attach(parent, Some(index), NodeKind::FieldSeparator { field: id });
                self.field_mut(id)?.separator = Some(separator);
                separator
            }
        };

        self.clear_between(separator, end)?;
        if !text.is_empty() {
            self.insert_before(end, NodeKind::run(text))?;
        }
        self.field_mut(id)?.dirty = false;
        tracing::trace!(field = %id, result = text, "field result replaced");
        Ok(())
    }

    /// Delete the field with its code and result
    pub fn remove_field(&mut self, id: FieldId) -> Result<()> {
        let field = self.field(id)?.clone();
        match (field.separator(), field.end()) {
            (_, Some(end)) => {
                self.clear_between(field.start(), end)?;
                self.remove(field.start())?;
                self.remove(end)?;
            }
            (Some(separator), None) => {
                self.clear_between(field.start(), separator)?;
                self.remove(field.start())?;
                self.remove(separator)?;
            }
            (None, None) => self.remove(field.start())?,
        }
        tracing::debug!(field = %id, "field removed");
        Ok(())
    }

    /// Replace the field with its result nodes, dropping code and markers
    pub fn unlink_field(&mut self, id: FieldId) -> Result<()> {
        let field = self.field(id)?.clone();
        let (Some(separator), Some(end)) = (field.separator(), field.end()) else {
            return self.remove_field(id);
        };
        self.clear_between(field.start(), separator)?;
        self.remove(field.start())?;
        self.remove(separator)?;
        self.remove(end)?;
        Ok(())
    }

    /// Refresh the type recorded for a field, both in the registry and on
    /// its start marker
    pub fn set_field_type(&mut self, id: FieldId, field_type: FieldType) -> Result<()> {
        self.field_mut(id)?.field_type = field_type.clone();
        if let Some(node) = self.get_mut(id) {
            node.kind = NodeKind::FieldStart { field_type };
        }
        Ok(())
    }

    /// The innermost closed field whose span contains this field's start
    pub fn parent_field(&self, id: FieldId) -> Result<Option<FieldId>> {
        let start = self.field(id)?.start();
        let mut parent = None;
        for other in self.fields_in_document_order() {
            if other == id {
                break;
            }
            let encloses = self
                .fields()
                .get(other)
                .and_then(Field::end)
                .map(|end| self.compare_order(start, end) == Some(Ordering::Less))
                .unwrap_or(false);
            if encloses {
                parent = Some(other);
            }
        }
        Ok(parent)
    }

    /// Fields directly nested inside this one, in document order
    pub fn child_fields(&self, id: FieldId) -> Result<Vec<FieldId>> {
        let field = self.field(id)?;
        let Some(end) = field.end() else {
            return Ok(Vec::new());
        };
        let start = field.start();
        let mut children = Vec::new();
        for candidate in self.fields_in_document_order() {
            let inside = self.compare_order(start, candidate) == Some(Ordering::Less)
                && self.compare_order(candidate, end) == Some(Ordering::Less);
            if inside && self.parent_field(candidate)? == Some(id) {
                children.push(candidate);
            }
        }
        Ok(children)
    }

    /// Child fields that sit in the code portion
    pub fn code_fields(&self, id: FieldId) -> Result<Vec<FieldId>> {
        let field = self.field(id)?;
        let Some(boundary) = field.separator().or(field.end()) else {
            return Ok(Vec::new());
        };
        Ok(self
            .child_fields(id)?
            .into_iter()
            .filter(|&child| self.compare_order(child, boundary) == Some(Ordering::Less))
            .collect())
    }

    /// Render the nodes strictly between `after` and `until`.
    ///
    /// Without `until` rendering stops at the end of the paragraph.
    pub(crate) fn span_text(&self, after: NodeId, until: Option<NodeId>, nested: NestedFields) -> String {
        let child_codes = nested == NestedFields::Codes;
        let mut out = String::new();
        let mut current = self.next_node(after);
        while let Some(id) = current {
            if Some(id) == until {
                break;
            }
            let Some(node) = self.get(id) else {
                break;
            };
            match &node.kind {
                NodeKind::Run { text } => out.push_str(text),
                NodeKind::Paragraph { .. } if until.is_none() => break,
                NodeKind::Paragraph { .. } => out.push(PARAGRAPH_END_CHAR),
                NodeKind::FieldStart { .. } if child_codes => out.push(FIELD_START_CHAR),
                NodeKind::FieldSeparator { .. } if child_codes => out.push(FIELD_SEPARATOR_CHAR),
                NodeKind::FieldEnd { .. } if child_codes => out.push(FIELD_END_CHAR),
                NodeKind::FieldStart { .. } => {
                    let end = self.fields().get(id).and_then(Field::end);
                    if let Some(end) = end {
                        if let Ok(result) = self.field_result(id) {
                            if nested == NestedFields::QuotedResults {
                                push_argument(&mut out, &result);
                            } else {
                                out.push_str(&result);
                            }
                        }
                        current = self.next_node(end);
                        continue;
                    }
                }
                _ => {}
            }
            current = self.next_node(id);
        }
        out
    }

    /// Remove every node strictly between `first` and `last`, then merge
    /// their paragraphs if they differ
    pub(crate) fn clear_between(&mut self, first: NodeId, last: NodeId) -> Result<()> {
        if self.compare_order(first, last) != Some(Ordering::Less) {
            return Err(DocModelError::InvalidOperation(
                "range end precedes its start".into(),
            ));
        }

        let mut doomed = Vec::new();
        let mut current = self.next_node(first);
        while let Some(id) = current {
            if id == last {
                break;
            }
            if self.is_ancestor_or_self(id, last) {
                current = self.next_node(id);
                continue;
            }
            doomed.push(id);
            current = self.next_outside(id);
        }
        for id in doomed {
            self.remove(id)?;
        }

        let first_paragraph = self.enclosing(first, NodeType::Paragraph);
        let last_paragraph = self.enclosing(last, NodeType::Paragraph);
        if let (Some(into), Some(next)) = (first_paragraph, last_paragraph) {
            if into != next {
                self.merge_paragraphs(into, next)?;
            }
        }
        Ok(())
    }

    /// The first node after the whole subtree of `id`
    fn next_outside(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            if let Some(sibling) = self.next_sibling(current) {
                return Some(sibling);
            }
            current = self.parent(current)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Built {
        start: NodeId,
        separator: NodeId,
        end: NodeId,
    }

    fn build_field(tree: &mut DocumentTree, para: NodeId, code: &str, result: &str) -> Built {
        let field_type = crate::FieldCode::parse(code).field_type;
        let start = tree
            .append_child(para, NodeKind::FieldStart { field_type })
            .unwrap();
        tree.append_child(para, NodeKind::run(code)).unwrap();
        let separator = tree
            .append_child(para, NodeKind::FieldSeparator { field: start })
            .unwrap();
        tree.append_child(para, NodeKind::run(result)).unwrap();
        let end = tree
            .append_child(para, NodeKind::FieldEnd { field: start })
            .unwrap();
        Built {
            start,
            separator,
            end,
        }
    }

    #[test]
    fn test_code_and_result() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        let field = build_field(&mut tree, para, "PAGE \\* roman", "iv");

        assert!(tree.field(field.start).unwrap().is_closed());
        assert_eq!(tree.field_code(field.start, false).unwrap(), "PAGE \\* roman");
        assert_eq!(tree.field_result(field.start).unwrap(), "iv");
        assert_eq!(tree.field(field.start).unwrap().separator(), Some(field.separator));
        assert_eq!(tree.field(field.start).unwrap().end(), Some(field.end));
    }

    #[test]
    fn test_nested_code_renders_child_result() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        let outer = tree
            .append_child(para, NodeKind::FieldStart { field_type: FieldType::If })
            .unwrap();
        tree.append_child(para, NodeKind::run("IF ")).unwrap();
        let inner = build_field(&mut tree, para, "PAGE", "3");
        tree.append_child(para, NodeKind::run(" > 2 big small")).unwrap();
        tree.append_child(para, NodeKind::FieldSeparator { field: outer })
            .unwrap();
        tree.append_child(para, NodeKind::run("big")).unwrap();
        tree.append_child(para, NodeKind::FieldEnd { field: outer }).unwrap();

        assert_eq!(tree.field_code(outer, false).unwrap(), "IF 3 > 2 big small");
        assert_eq!(
            tree.field_code(outer, true).unwrap(),
            "IF \u{13}PAGE\u{14}3\u{15} > 2 big small"
        );
        assert_eq!(tree.parent_field(inner.start).unwrap(), Some(outer));
        assert_eq!(tree.child_fields(outer).unwrap(), vec![inner.start]);
        assert_eq!(tree.code_fields(outer).unwrap(), vec![inner.start]);
        assert_eq!(tree.fields_in_document_order(), vec![outer, inner.start]);
    }

    #[test]
    fn test_nested_result_with_spaces_stays_one_argument() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        let outer = tree
            .append_child(para, NodeKind::FieldStart { field_type: FieldType::If })
            .unwrap();
        tree.append_child(para, NodeKind::run("IF ")).unwrap();
        build_field(&mut tree, para, "DOCVARIABLE Name", "John \"J\" Smith");
        tree.append_child(para, NodeKind::run(" = x yes no")).unwrap();
        tree.append_child(para, NodeKind::FieldSeparator { field: outer })
            .unwrap();
        tree.append_child(para, NodeKind::FieldEnd { field: outer }).unwrap();

        let code = tree.field_code(outer, false).unwrap();
        assert_eq!(code, "IF \"John \\\"J\\\" Smith\" = x yes no");
        let parsed = crate::FieldCode::parse(&code);
        assert_eq!(parsed.argument(0), Some("John \"J\" Smith"));
        assert_eq!(parsed.argument(1), Some("="));
    }

    #[test]
    fn test_set_result_merges_paragraphs() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        let field = build_field(&mut tree, para, "AUTHOR", "old");
        // Push the end marker into a following paragraph
        let index = tree.index_in_parent(field.end).unwrap();
        tree.split_paragraph(para, index).unwrap();
        assert_eq!(tree.paragraphs().len(), 2);
        assert_eq!(tree.field_result(field.start).unwrap(), "old\r");

        tree.set_field_result(field.start, "new").unwrap();
        assert_eq!(tree.paragraphs().len(), 1);
        assert_eq!(tree.field_result(field.start).unwrap(), "new");
        assert!(!tree.field(field.start).unwrap().dirty);
    }

    #[test]
    fn test_set_result_creates_missing_separator() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        let start = tree
            .append_child(para, NodeKind::FieldStart { field_type: FieldType::Page })
            .unwrap();
        tree.append_child(para, NodeKind::run("PAGE")).unwrap();
        tree.append_child(para, NodeKind::FieldEnd { field: start }).unwrap();
        assert_eq!(tree.field_result(start).unwrap(), "");

        tree.set_field_result(start, "1").unwrap();
        assert!(tree.field(start).unwrap().separator().is_some());
        assert_eq!(tree.text(), "\u{13}PAGE\u{14}1\u{15}\u{0c}");
    }

    #[test]
    fn test_set_result_requires_closed_field() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        let start = tree
            .append_child(para, NodeKind::FieldStart { field_type: FieldType::Page })
            .unwrap();
        assert!(tree.set_field_result(start, "1").is_err());
    }

    #[test]
    fn test_remove_and_unlink() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        tree.append_child(para, NodeKind::run("a ")).unwrap();
        let removed = build_field(&mut tree, para, "PAGE", "1");
        let unlinked = build_field(&mut tree, para, "AUTHOR", "Jane");

        tree.remove_field(removed.start).unwrap();
        assert!(!tree.fields().contains(removed.start));
        tree.unlink_field(unlinked.start).unwrap();
        assert!(tree.fields().is_empty());
        assert_eq!(tree.text(), "a Jane\u{0c}");
    }

    #[test]
    fn test_set_field_type_updates_marker() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        let field = build_field(&mut tree, para, "PAGE", "1");
        tree.set_field_type(field.start, FieldType::NumPages).unwrap();
        assert_eq!(tree.field(field.start).unwrap().field_type, FieldType::NumPages);
        assert_eq!(
            tree.get(field.start).unwrap().kind,
            NodeKind::FieldStart {
                field_type: FieldType::NumPages
            }
        );
    }
}
