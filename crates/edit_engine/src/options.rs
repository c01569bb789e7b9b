//! Field evaluation settings
//!
//! Everything the evaluator reads besides the document itself lives here
//! and is handed to the evaluator explicitly.

use crate::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Information about the person editing the document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserInformation {
    /// USERNAME result
    pub name: String,
    /// USERINITIALS result
    pub initials: String,
    /// USERADDRESS result
    pub address: String,
}

/// Settings consulted while evaluating fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldOptions {
    /// AUTHOR result when the document has no author property
    pub default_document_author: Option<String>,
    /// Current user for the USER* fields
    pub user: UserInformation,
    /// FILENAME result when the document was never saved
    pub file_name: Option<String>,
    /// Clock override for DATE and TIME; the local clock when unset
    pub fixed_now: Option<NaiveDateTime>,
    /// Picture for DATE fields without `\@`
    pub default_date_format: String,
    /// Picture for TIME fields without `\@`
    pub default_time_format: String,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            default_document_author: None,
            user: UserInformation::default(),
            file_name: None,
            fixed_now: None,
            default_date_format: "M/d/yyyy".to_string(),
            default_time_format: "h:mm AM/PM".to_string(),
        }
    }
}

impl FieldOptions {
    /// Parse options from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The time DATE and TIME fields display
    pub fn now(&self) -> NaiveDateTime {
        self.fixed_now
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }
}
