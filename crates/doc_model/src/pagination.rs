//! Pagination - logical page and section numbering
//!
//! Without a layout engine pages are counted structurally: every page
//! break character in a run and every section after the first starts a new
//! page. PAGE, NUMPAGES, SECTION, SECTIONPAGES and PAGEREF read these
//! counters.

use crate::{DocumentTree, NodeId, NodeKind, NodeType};

/// Character that forces a page break when it appears in a run
pub const PAGE_BREAK_CHAR: char = '\u{0c}';

impl DocumentTree {
    /// Number of page breaks a single node introduces
    fn breaks_at(&self, id: NodeId) -> usize {
        match self.get(id).map(|n| &n.kind) {
            Some(NodeKind::Run { text }) => text.matches(PAGE_BREAK_CHAR).count(),
            Some(NodeKind::Section) if self.sections().first() != Some(&id) => 1,
            _ => 0,
        }
    }

    /// 1-based page on which `id` sits
    pub fn page_of(&self, id: NodeId) -> usize {
        let mut page = 1;
        for node in self.document_order() {
            if node == id {
                break;
            }
            page += self.breaks_at(node);
        }
        // A section node itself starts its page
        if self.node_type(id) == Some(NodeType::Section) {
            page += self.breaks_at(id);
        }
        page
    }

    /// Total number of pages in the document
    pub fn total_pages(&self) -> usize {
        1 + self
            .document_order()
            .into_iter()
            .map(|node| self.breaks_at(node))
            .sum::<usize>()
    }

    /// 1-based number of the section containing `id`
    pub fn section_number(&self, id: NodeId) -> usize {
        self.enclosing(id, NodeType::Section)
            .and_then(|section| self.sections().iter().position(|&s| s == section))
            .map_or(1, |index| index + 1)
    }

    /// Number of pages in the section containing `id`
    pub fn section_pages(&self, id: NodeId) -> usize {
        let Some(section) = self.enclosing(id, NodeType::Section) else {
            return 1;
        };
        1 + self
            .descendants(section)
            .into_iter()
            .map(|node| self.breaks_at(node))
            .sum::<usize>()
    }
}
