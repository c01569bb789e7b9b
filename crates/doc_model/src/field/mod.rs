//! Field Module - Dynamic content fields
//!
//! A field occupies a bracketed run of markers in the tree:
//! `FieldStart`, the code runs, an optional `FieldSeparator`, the cached
//! result runs and `FieldEnd`. Code spans may contain complete child fields.
//!
//! The lifecycle of every field is tracked explicitly by [`FieldState`]
//! instead of being re-derived from marker adjacency.

mod code;
mod format;
pub(crate) mod span;

pub use code::*;
pub use format::*;
pub use span::*;

use crate::{DocModelError, FieldId, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// State machine
// =============================================================================

/// Where a field is in its construction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldState {
    /// Start marker inserted, nothing written yet
    Started,
    /// Code text is being written
    InCode,
    /// Separator inserted, result text is being written
    InResult,
    /// End marker inserted
    Closed,
}

/// Things that happen to a field while it is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEvent {
    CodeWritten,
    SeparatorInserted,
    ResultWritten,
    EndInserted,
}

impl FieldEvent {
    fn name(&self) -> &'static str {
        match self {
            FieldEvent::CodeWritten => "code text",
            FieldEvent::SeparatorInserted => "a separator",
            FieldEvent::ResultWritten => "result text",
            FieldEvent::EndInserted => "an end marker",
        }
    }
}

impl FieldState {
    /// Apply an event, returning the next state
    pub fn advance(self, event: FieldEvent) -> Result<FieldState> {
        use FieldEvent::*;
        use FieldState::*;

        let next = match (self, event) {
            (Started | InCode, CodeWritten) => Some(InCode),
            (Started | InCode, SeparatorInserted) => Some(InResult),
            (InResult, ResultWritten) => Some(InResult),
            (Started | InCode | InResult, EndInserted) => Some(Closed),
            _ => None,
        };
        next.ok_or(DocModelError::InvalidFieldTransition {
            state: self,
            event: event.name(),
        })
    }

    /// Whether the code portion is still open for writing
    pub fn accepts_code(&self) -> bool {
        matches!(self, FieldState::Started | FieldState::InCode)
    }
}

// =============================================================================
// Field
// =============================================================================

/// One field occurrence, keyed by the id of its start marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    start: NodeId,
    separator: Option<NodeId>,
    end: Option<NodeId>,
    /// Type parsed from the code when the field was last closed or updated
    pub field_type: FieldType,
    state: FieldState,
    /// Locked fields are skipped by updates
    pub locked: bool,
    /// Whether the cached result may be stale
    pub dirty: bool,
}

impl Field {
    pub(crate) fn new(start: NodeId, field_type: FieldType) -> Self {
        Self {
            start,
            separator: None,
            end: None,
            field_type,
            state: FieldState::Started,
            locked: false,
            dirty: true,
        }
    }

    pub fn id(&self) -> FieldId {
        self.start
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn separator(&self) -> Option<NodeId> {
        self.separator
    }

    pub fn end(&self) -> Option<NodeId> {
        self.end
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == FieldState::Closed
    }

    /// Advance the state machine for text written inside the field
    pub fn apply(&mut self, event: FieldEvent) -> Result<()> {
        self.state = self.state.advance(event)?;
        Ok(())
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub(crate) fn attach_separator(&mut self, separator: NodeId) -> Result<()> {
        self.apply(FieldEvent::SeparatorInserted)?;
        self.separator = Some(separator);
        Ok(())
    }

    pub(crate) fn attach_end(&mut self, end: NodeId) -> Result<()> {
        self.apply(FieldEvent::EndInserted)?;
        self.end = Some(end);
        Ok(())
    }

    /// Forget a removed marker and fall back to the state its absence implies.
    /// Returns `false` when the marker was never attached to this field.
    pub(crate) fn detach_marker(&mut self, marker: NodeId) -> bool {
        if self.end == Some(marker) {
            self.end = None;
        } else if self.separator == Some(marker) {
            self.separator = None;
        } else {
            return false;
        }
        self.state = match (self.separator, self.end) {
            (_, Some(_)) => FieldState::Closed,
            (Some(_), None) => FieldState::InResult,
            (None, None) => FieldState::InCode,
        };
        self.dirty = true;
        true
    }
}

// =============================================================================
// Field Registry
// =============================================================================

/// Registry of every field whose start marker is in the tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRegistry {
    fields: HashMap<FieldId, Field>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, field: Field) {
        self.fields.insert(field.id(), field);
    }

    pub(crate) fn remove(&mut self, id: FieldId) -> Option<Field> {
        self.fields.remove(&id)
    }

    pub fn get(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(&id)
    }

    pub fn get_mut(&mut self, id: FieldId) -> Option<&mut Field> {
        self.fields.get_mut(&id)
    }

    pub fn contains(&self, id: FieldId) -> bool {
        self.fields.contains_key(&id)
    }

    /// Fields in arbitrary order; see `DocumentTree::fields_in_document_order`
    pub fn all(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Mark every unlocked field as needing an update
    pub fn mark_all_dirty(&mut self) {
        for field in self.fields.values_mut() {
            if !field.locked {
                field.dirty = true;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
