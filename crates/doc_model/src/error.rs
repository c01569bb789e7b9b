//! Error types for document model operations

use crate::{FieldState, NodeId, NodeType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocModelError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("A {child:?} node cannot be placed inside a {parent:?} node")]
    InvalidChild { parent: NodeType, child: NodeType },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Field not found: {0}")]
    FieldNotFound(NodeId),

    #[error("Field in state {state:?} cannot accept {event}")]
    InvalidFieldTransition { state: FieldState, event: &'static str },

    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),

    #[error("Bookmark is not terminated: {0}")]
    UnterminatedBookmark(String),

    #[error("Bookmark name is used more than once: {0}")]
    DuplicateBookmark(String),

    #[error("Invalid bookmark name {name:?}: {reason}")]
    InvalidBookmarkName { name: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, DocModelError>;
