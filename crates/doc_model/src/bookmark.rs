//! Bookmark - a named range delimited by start and end markers
//!
//! Bookmarks are referenced by REF and PAGEREF fields and by the builder's
//! bookmark navigation. Names are matched case-insensitively.

use crate::field::span::NestedFields;
use crate::{DocModelError, DocumentTree, NodeId, NodeKind, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Maximum bookmark name length
pub const MAX_BOOKMARK_NAME_LENGTH: usize = 40;

/// Validate a bookmark name
pub fn validate_bookmark_name(name: &str) -> Result<()> {
    let invalid = |reason| DocModelError::InvalidBookmarkName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.chars().count() > MAX_BOOKMARK_NAME_LENGTH {
        return Err(invalid("name cannot exceed 40 characters"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(invalid("name cannot contain whitespace"));
    }
    Ok(())
}

/// A resolved bookmark: its name and the ids of both markers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub start: NodeId,
    pub end: NodeId,
}

impl DocumentTree {
    /// Resolve a bookmark by name.
    ///
    /// Fails when the name is unknown, used by more than one start marker,
    /// or has no end marker after its start.
    pub fn bookmark(&self, name: &str) -> Result<Bookmark> {
        let mut starts = Vec::new();
        let mut ends = Vec::new();
        for id in self.document_order() {
            match self.get(id).map(|n| &n.kind) {
                Some(NodeKind::BookmarkStart { name: n }) if n.eq_ignore_ascii_case(name) => {
                    starts.push(id)
                }
                Some(NodeKind::BookmarkEnd { name: n }) if n.eq_ignore_ascii_case(name) => {
                    ends.push(id)
                }
                _ => {}
            }
        }

        let start = match starts.as_slice() {
            [] => return Err(DocModelError::BookmarkNotFound(name.to_string())),
            [start] => *start,
            _ => return Err(DocModelError::DuplicateBookmark(name.to_string())),
        };
        let end = ends
            .into_iter()
            .find(|&end| self.compare_order(start, end) == Some(Ordering::Less))
            .ok_or_else(|| DocModelError::UnterminatedBookmark(name.to_string()))?;

        let name = self
            .get(start)
            .and_then(|n| n.bookmark_name())
            .unwrap_or(name)
            .to_string();
        Ok(Bookmark { name, start, end })
    }

    /// Every well-formed bookmark in document order of its start
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.document_order()
            .into_iter()
            .filter_map(|id| match &self.get(id)?.kind {
                NodeKind::BookmarkStart { name } => self.bookmark(name).ok(),
                _ => None,
            })
            .collect()
    }

    /// Text enclosed by a bookmark; nested fields contribute their results
    pub fn bookmark_text(&self, name: &str) -> Result<String> {
        let bookmark = self.bookmark(name)?;
        Ok(self.span_text(bookmark.start, Some(bookmark.end), NestedFields::Results))
    }

    /// Remove the bookmark markers, keeping the content they enclosed
    pub fn remove_bookmark(&mut self, name: &str) -> Result<()> {
        let bookmark = self.bookmark(name)?;
        self.remove(bookmark.start)?;
        self.remove(bookmark.end)?;
        tracing::debug!(bookmark = %bookmark.name, "bookmark removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmarked(tree: &mut DocumentTree, name: &str, text: &str) -> (NodeId, NodeId) {
        let para = tree.paragraphs()[0];
        let start = tree
            .append_child(para, NodeKind::BookmarkStart { name: name.into() })
            .unwrap();
        tree.append_child(para, NodeKind::run(text)).unwrap();
        let end = tree
            .append_child(para, NodeKind::BookmarkEnd { name: name.into() })
            .unwrap();
        (start, end)
    }

    #[test]
    fn test_validate_bookmark_name() {
        assert!(validate_bookmark_name("Intro_1").is_ok());
        assert!(validate_bookmark_name("_Toc123").is_ok());
        assert!(validate_bookmark_name("").is_err());
        assert!(validate_bookmark_name("has space").is_err());
        assert!(validate_bookmark_name(&"a".repeat(41)).is_err());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut tree = DocumentTree::new();
        let (start, end) = bookmarked(&mut tree, "Chapter", "Hello");
        let bookmark = tree.bookmark("CHAPTER").unwrap();
        assert_eq!(bookmark.name, "Chapter");
        assert_eq!((bookmark.start, bookmark.end), (start, end));
        assert_eq!(tree.bookmark_text("chapter").unwrap(), "Hello");
        assert_eq!(tree.bookmarks().len(), 1);
    }

    #[test]
    fn test_missing_duplicate_and_unterminated() {
        let mut tree = DocumentTree::new();
        assert!(matches!(
            tree.bookmark("nope"),
            Err(DocModelError::BookmarkNotFound(_))
        ));

        let para = tree.paragraphs()[0];
        tree.append_child(para, NodeKind::BookmarkStart { name: "open".into() })
            .unwrap();
        assert!(matches!(
            tree.bookmark("open"),
            Err(DocModelError::UnterminatedBookmark(_))
        ));

        bookmarked(&mut tree, "twice", "a");
        bookmarked(&mut tree, "Twice", "b");
        assert!(matches!(
            tree.bookmark("twice"),
            Err(DocModelError::DuplicateBookmark(_))
        ));
        assert!(tree.bookmarks().is_empty());
    }

    #[test]
    fn test_remove_bookmark_keeps_content() {
        let mut tree = DocumentTree::new();
        bookmarked(&mut tree, "keep", "content");
        tree.remove_bookmark("keep").unwrap();
        assert!(tree.bookmark("keep").is_err());
        assert_eq!(tree.text(), "content\u{0c}");
    }
}
