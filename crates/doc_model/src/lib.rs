//! Document Model - Core document tree structure and types
//!
//! This crate provides the document tree the builder edits: an arena of
//! nodes with stable ids, the field registry that tracks every field's
//! construction state, bookmarks, and structural page counting.

mod node;
mod document;
mod tree;
mod error;
mod bookmark;
pub mod field;
pub mod pagination;

pub use node::*;
pub use document::*;
pub use tree::*;
pub use error::*;
pub use bookmark::*;
pub use field::*;
pub use pagination::*;
