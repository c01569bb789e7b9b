//! Error types for editing operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Document model error: {0}")]
    DocModel(#[from] doc_model::DocModelError),

    #[error("No field is under construction")]
    NoOpenField,

    #[error("No table is under construction")]
    NoOpenTable,

    #[error("Cursor does not point into the document: {0}")]
    InvalidCursor(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for EditError {
    fn from(err: serde_json::Error) -> Self {
        EditError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EditError>;
