//! Edit Engine - document builder and field evaluation
//!
//! [`DocumentBuilder`] inserts text, paragraphs, tables, bookmarks and
//! fields at a cursor. [`FieldEvaluator`] computes field results from the
//! document tree and the caller's [`FieldOptions`].

mod error;
mod options;
mod comparison;
pub mod formula;
mod field_update;
mod builder;

pub use error::*;
pub use options::*;
pub use comparison::*;
pub use field_update::*;
pub use builder::*;
