//! Document-level properties and variables read by fields

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Built-in document properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuiltInProperties {
    pub author: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub comments: Option<String>,
    pub keywords: Option<String>,
    pub last_saved_by: Option<String>,
    /// File name including its path, if the document was ever saved
    pub file_name: Option<String>,
    pub created: Option<NaiveDateTime>,
    pub last_saved: Option<NaiveDateTime>,
    pub last_printed: Option<NaiveDateTime>,
}

/// Document metadata: built-in and custom properties plus variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub properties: BuiltInProperties,
    /// Custom properties, looked up case-insensitively by DOCPROPERTY
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    /// Document variables (DOCVARIABLE)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a built-in property by its display name
    pub fn built_in(&self, name: &str) -> Option<Option<&str>> {
        let p = &self.properties;
        let value = match name.to_ascii_lowercase().as_str() {
            "author" => &p.author,
            "title" => &p.title,
            "subject" => &p.subject,
            "comments" => &p.comments,
            "keywords" => &p.keywords,
            "lastsavedby" => &p.last_saved_by,
            "filename" => &p.file_name,
            _ => return None,
        };
        Some(value.as_deref())
    }

    /// Overwrite a built-in text property; returns false for unknown names
    pub fn set_built_in(&mut self, name: &str, value: impl Into<String>) -> bool {
        let p = &mut self.properties;
        let slot = match name.to_ascii_lowercase().as_str() {
            "author" => &mut p.author,
            "title" => &mut p.title,
            "subject" => &mut p.subject,
            "comments" => &mut p.comments,
            "keywords" => &mut p.keywords,
            "lastsavedby" => &mut p.last_saved_by,
            _ => return false,
        };
        *slot = Some(value.into());
        true
    }

    pub fn custom_property(&self, name: &str) -> Option<&str> {
        self.custom_properties
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }
}
