//! Field evaluation
//!
//! Results only change when `update_field` or `update_fields` is called.
//! Nested fields in a code span are brought up to date first so the outer
//! field sees their fresh results.

use crate::comparison::{
    ComparisonEvaluator, ComparisonExpression, ComparisonOperator, ComparisonOutcome,
    DefaultComparison,
};
use crate::{formula, FieldOptions, Result};
use chrono::NaiveDateTime;
use doc_model::{
    apply_general_format, format_date_picture, format_number, format_number_picture,
    DocumentTree, FieldCode, FieldId, FieldType, NodeKind,
};
use std::cmp::Ordering;
use unicode_segmentation::UnicodeSegmentation;

const REF_NOT_FOUND: &str = "Error! Reference source not found.";
const BOOKMARK_NOT_DEFINED: &str = "Error! Bookmark not defined.";
const MISSING_TEST_CONDITION: &str = "Error! Missing test condition.";
const UNKNOWN_OP_CODE: &str = "Error! Unknown op code for conditional.";
const UNKNOWN_PROPERTY: &str = "Error! Unknown document property name.";
const NO_VARIABLE: &str = "Error! No document variable supplied.";
const NO_SEQUENCE: &str = "Error! No sequence specified.";

/// Picture for CREATEDATE, SAVEDATE and PRINTDATE without `\@`
const TIMESTAMP_FORMAT: &str = "M/d/yyyy h:mm:ss AM/PM";

/// Raw value of a field before switches are applied
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Text(String),
    Number(f64),
    /// Timestamp with the picture to use when the code has no `\@`
    Date(NaiveDateTime, String),
    /// Final text that no switch may alter
    Verbatim(String),
    Error(String),
    /// Leave the cached result as it is
    Keep,
}

/// Computes field results from field codes and document state
#[derive(Debug)]
pub struct FieldEvaluator {
    options: FieldOptions,
    comparison: Box<dyn ComparisonEvaluator>,
}

impl Default for FieldEvaluator {
    fn default() -> Self {
        Self::new(FieldOptions::default())
    }
}

impl FieldEvaluator {
    pub fn new(options: FieldOptions) -> Self {
        Self {
            options,
            comparison: Box::new(DefaultComparison),
        }
    }

    /// Replace the condition evaluator used by IF and COMPARE
    pub fn with_comparison(mut self, comparison: Box<dyn ComparisonEvaluator>) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn set_comparison_evaluator(&mut self, comparison: Box<dyn ComparisonEvaluator>) {
        self.comparison = comparison;
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut FieldOptions {
        &mut self.options
    }

    // ------------------------------------------------------------------
    // Updating
    // ------------------------------------------------------------------

    /// Recompute one field and write its result.
    ///
    /// Returns `false` when the field was skipped because it is locked or
    /// not closed.
    pub fn update_field(&self, tree: &mut DocumentTree, id: FieldId) -> Result<bool> {
        let field = tree.field(id)?;
        if field.locked {
            tracing::trace!(field = %id, "locked field left unchanged");
            return Ok(false);
        }
        if !field.is_closed() {
            tracing::warn!(field = %id, state = ?field.state(), "skipping field that is not closed");
            return Ok(false);
        }

        for child in tree.code_fields(id)? {
            self.update_field(tree, child)?;
        }

        let code = FieldCode::parse(&tree.field_code(id, false)?);
        tree.set_field_type(id, code.field_type.clone())?;
        Self::store_property_argument(tree, &code);

        match self.evaluate(tree, id, &code) {
            Some(result) => tree.set_field_result(id, &result)?,
            None => tree.field_mut(id)?.dirty = false,
        }
        tracing::debug!(field = %id, field_type = %code.field_type, "field updated");
        Ok(true)
    }

    /// Update every field that is not part of another field's code.
    /// Returns how many fields were updated.
    pub fn update_fields(&self, tree: &mut DocumentTree) -> Result<usize> {
        let mut updated = 0;
        for id in tree.fields_in_document_order() {
            if !tree.fields().contains(id) || Self::is_in_parent_code(tree, id)? {
                continue;
            }
            if self.update_field(tree, id)? {
                updated += 1;
            }
        }
        tracing::debug!(updated, "fields updated");
        Ok(updated)
    }

    fn is_in_parent_code(tree: &DocumentTree, id: FieldId) -> Result<bool> {
        Ok(match tree.parent_field(id)? {
            Some(parent) => tree.code_fields(parent)?.contains(&id),
            None => false,
        })
    }

    /// AUTHOR "name" and friends write their argument back to the property
    fn store_property_argument(tree: &mut DocumentTree, code: &FieldCode) {
        let property = match code.field_type {
            FieldType::Author => "author",
            FieldType::Title => "title",
            FieldType::Subject => "subject",
            FieldType::Comments => "comments",
            FieldType::Keywords => "keywords",
            _ => return,
        };
        if let Some(value) = code.argument(0) {
            tree.document.set_built_in(property, value);
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// The text a field would display, or `None` to keep its cached result
    pub fn evaluate(&self, tree: &DocumentTree, id: FieldId, code: &FieldCode) -> Option<String> {
        let text = match self.compute(tree, id, code) {
            FieldValue::Keep => return None,
            FieldValue::Error(message) | FieldValue::Verbatim(message) => return Some(message),
            FieldValue::Number(value) => match code.numeric_format() {
                Some(picture) => format_number_picture(value, picture),
                None => format_number(value),
            },
            FieldValue::Date(timestamp, default_picture) => {
                let picture = code.date_format().unwrap_or(&default_picture);
                format_date_picture(&timestamp, picture)
            }
            FieldValue::Text(text) => match (code.numeric_format(), text.trim().parse::<f64>()) {
                (Some(picture), Ok(value)) => format_number_picture(value, picture),
                _ => text,
            },
        };
        Some(
            code.general_formats()
                .fold(text, |text, format| apply_general_format(&text, format)),
        )
    }

    fn compute(&self, tree: &DocumentTree, id: FieldId, code: &FieldCode) -> FieldValue {
        let props = &tree.document.properties;
        let text = |value: &Option<String>| FieldValue::Text(value.clone().unwrap_or_default());

        match &code.field_type {
            FieldType::Page => FieldValue::Number(tree.page_of(id) as f64),
            FieldType::NumPages => FieldValue::Number(tree.total_pages() as f64),
            FieldType::Section => FieldValue::Number(tree.section_number(id) as f64),
            FieldType::SectionPages => FieldValue::Number(tree.section_pages(id) as f64),

            FieldType::Date => {
                FieldValue::Date(self.options.now(), self.options.default_date_format.clone())
            }
            FieldType::Time => {
                FieldValue::Date(self.options.now(), self.options.default_time_format.clone())
            }
            FieldType::CreateDate => Self::timestamp(props.created),
            FieldType::SaveDate => Self::timestamp(props.last_saved),
            FieldType::PrintDate => Self::timestamp(props.last_printed),

            FieldType::Author => FieldValue::Text(
                props
                    .author
                    .clone()
                    .or_else(|| self.options.default_document_author.clone())
                    .unwrap_or_default(),
            ),
            FieldType::Title => text(&props.title),
            FieldType::Subject => text(&props.subject),
            FieldType::Comments => text(&props.comments),
            FieldType::Keywords => text(&props.keywords),
            FieldType::LastSavedBy => text(&props.last_saved_by),
            FieldType::FileName => self.file_name(tree, code),

            FieldType::UserName => self.user_value(code, &self.options.user.name),
            FieldType::UserInitials => self.user_value(code, &self.options.user.initials),
            FieldType::UserAddress => self.user_value(code, &self.options.user.address),

            FieldType::DocProperty => Self::doc_property(tree, code),
            FieldType::DocVariable => match code.argument(0).and_then(|name| tree.document.variable(name)) {
                Some(value) => FieldValue::Text(value.to_string()),
                None => FieldValue::Error(NO_VARIABLE.into()),
            },

            FieldType::Ref => Self::reference(tree, id, code),
            FieldType::PageRef => Self::page_reference(tree, id, code),

            FieldType::If => match self.condition(&code.arguments) {
                Ok((true, branch)) => {
                    FieldValue::Text(code.argument(branch).unwrap_or_default().to_string())
                }
                Ok((false, branch)) => {
                    FieldValue::Text(code.argument(branch + 1).unwrap_or_default().to_string())
                }
                Err(message) => FieldValue::Error(message),
            },
            FieldType::Compare => match self.condition(&code.arguments) {
                Ok((holds, _)) => FieldValue::Number(if holds { 1.0 } else { 0.0 }),
                Err(message) => FieldValue::Error(message),
            },
            FieldType::Formula => {
                let expression = code.argument(0).unwrap_or_default();
                let bookmark = |name: &str| Self::bookmark_number(tree, name);
                match formula::evaluate(expression, &bookmark) {
                    Ok(value) => FieldValue::Number(value),
                    Err(err) => FieldValue::Error(err.to_string()),
                }
            }

            FieldType::MergeField => match code.argument(0) {
                Some(name) => FieldValue::Verbatim(format!(
                    "{}«{}»{}",
                    code.switch_argument("\\b").unwrap_or_default(),
                    name,
                    code.switch_argument("\\f").unwrap_or_default()
                )),
                None => FieldValue::Verbatim(String::new()),
            },
            FieldType::Seq => self.sequence(tree, id, code),
            FieldType::Quote => FieldValue::Text(code.arguments.join(" ")),
            FieldType::Hyperlink => {
                let cached = tree.field_result(id).unwrap_or_default();
                if !cached.is_empty() {
                    return FieldValue::Keep;
                }
                let target = code
                    .argument(0)
                    .or_else(|| code.switch_argument("\\l"))
                    .unwrap_or_default();
                FieldValue::Text(target.to_string())
            }
            FieldType::NumWords => FieldValue::Number(word_count(tree) as f64),
            FieldType::NumChars => FieldValue::Number(char_count(tree) as f64),

            FieldType::Unknown(_) | FieldType::None => FieldValue::Keep,
        }
    }

    fn timestamp(value: Option<NaiveDateTime>) -> FieldValue {
        match value {
            Some(timestamp) => FieldValue::Date(timestamp, TIMESTAMP_FORMAT.into()),
            None => FieldValue::Text(String::new()),
        }
    }

    fn user_value(&self, code: &FieldCode, configured: &str) -> FieldValue {
        FieldValue::Text(code.argument(0).unwrap_or(configured).to_string())
    }

    fn file_name(&self, tree: &DocumentTree, code: &FieldCode) -> FieldValue {
        let path = tree
            .document
            .properties
            .file_name
            .clone()
            .or_else(|| self.options.file_name.clone())
            .unwrap_or_default();
        if code.has_switch("\\p") {
            return FieldValue::Text(path);
        }
        let name = path.rsplit(['/', '\\']).next().unwrap_or_default();
        FieldValue::Text(name.to_string())
    }

    fn doc_property(tree: &DocumentTree, code: &FieldCode) -> FieldValue {
        let Some(name) = code.argument(0) else {
            return FieldValue::Error(UNKNOWN_PROPERTY.into());
        };
        if let Some(value) = tree.document.built_in(name) {
            return FieldValue::Text(value.unwrap_or_default().to_string());
        }
        match name.to_ascii_lowercase().as_str() {
            "pages" => return FieldValue::Number(tree.total_pages() as f64),
            "words" => return FieldValue::Number(word_count(tree) as f64),
            "characters" => return FieldValue::Number(char_count(tree) as f64),
            _ => {}
        }
        match tree.document.custom_property(name) {
            Some(value) => FieldValue::Text(value.to_string()),
            None => FieldValue::Error(UNKNOWN_PROPERTY.into()),
        }
    }

    fn reference(tree: &DocumentTree, id: FieldId, code: &FieldCode) -> FieldValue {
        let Some(name) = code.argument(0) else {
            return FieldValue::Error(REF_NOT_FOUND.into());
        };
        let Ok(bookmark) = tree.bookmark(name) else {
            return FieldValue::Error(REF_NOT_FOUND.into());
        };
        if code.has_switch("\\p") {
            return FieldValue::Text(Self::relative_position(tree, id, bookmark.start).into());
        }
        match tree.bookmark_text(name) {
            Ok(text) => FieldValue::Text(text.trim_end_matches('\r').to_string()),
            Err(_) => FieldValue::Error(REF_NOT_FOUND.into()),
        }
    }

    fn page_reference(tree: &DocumentTree, id: FieldId, code: &FieldCode) -> FieldValue {
        let Some(bookmark) = code.argument(0).and_then(|name| tree.bookmark(name).ok()) else {
            return FieldValue::Error(BOOKMARK_NOT_DEFINED.into());
        };
        let page = tree.page_of(bookmark.start);
        if code.has_switch("\\p") {
            if page == tree.page_of(id) {
                return FieldValue::Text(Self::relative_position(tree, id, bookmark.start).into());
            }
            return FieldValue::Text(format!("on page {}", page));
        }
        FieldValue::Number(page as f64)
    }

    fn relative_position(tree: &DocumentTree, field: FieldId, target: doc_model::NodeId) -> &'static str {
        match tree.compare_order(target, field) {
            Some(Ordering::Less) => "above",
            _ => "below",
        }
    }

    /// Numeric value of a bookmark's text for formulas
    fn bookmark_number(tree: &DocumentTree, name: &str) -> Option<f64> {
        let text = tree.bookmark_text(name).ok()?;
        let cleaned: String = text
            .trim()
            .trim_start_matches('$')
            .chars()
            .filter(|&c| c != ',')
            .collect();
        cleaned.parse().ok()
    }

    /// Evaluate an IF/COMPARE condition. Also returns the index of the
    /// argument holding the true branch.
    fn condition(&self, args: &[String]) -> std::result::Result<(bool, usize), String> {
        let (expression, branch) = match args {
            [left, op, right, ..] if ComparisonOperator::parse(op).is_some() => {
                let operator = ComparisonOperator::parse(op).ok_or(UNKNOWN_OP_CODE)?;
                (ComparisonExpression::new(left.clone(), operator, right.clone()), 3)
            }
            [glued, ..] if split_glued_condition(glued).is_some() => {
                let expression = split_glued_condition(glued).ok_or(UNKNOWN_OP_CODE)?;
                (expression, 1)
            }
            _ if args.len() < 3 => return Err(MISSING_TEST_CONDITION.into()),
            _ => return Err(UNKNOWN_OP_CODE.into()),
        };

        let outcome = self
            .comparison
            .evaluate(&expression)
            .or_else(|| DefaultComparison.evaluate(&expression))
            .unwrap_or(ComparisonOutcome::Result(false));
        match outcome {
            ComparisonOutcome::Result(holds) => Ok((holds, branch)),
            ComparisonOutcome::Error(message) => Err(message),
        }
    }

    /// SEQ numbering, recomputed from every earlier SEQ field with the same
    /// identifier
    fn sequence(&self, tree: &DocumentTree, id: FieldId, code: &FieldCode) -> FieldValue {
        let Some(identifier) = code.argument(0) else {
            return FieldValue::Error(NO_SEQUENCE.into());
        };
        let mut counter: i64 = 0;
        for other in tree.fields_in_document_order() {
            let other_code = if other == id {
                code.clone()
            } else {
                match tree.field_code(other, false) {
                    Ok(text) => FieldCode::parse(&text),
                    Err(_) => continue,
                }
            };
            let same_sequence = other_code.field_type == FieldType::Seq
                && other_code
                    .argument(0)
                    .map_or(false, |name| name.eq_ignore_ascii_case(identifier));
            if same_sequence {
                match other_code.switch_argument("\\r").and_then(|n| n.parse::<i64>().ok()) {
                    Some(reset) => counter = reset,
                    None if other_code.has_switch("\\c") => {}
                    None => counter += 1,
                }
            }
            if other == id {
                break;
            }
        }
        if code.has_switch("\\h") {
            return FieldValue::Verbatim(String::new());
        }
        FieldValue::Number(counter as f64)
    }
}

/// Split a condition written without spaces, such as `3>2`
fn split_glued_condition(token: &str) -> Option<ComparisonExpression> {
    for symbol in ["<=", ">=", "<>", "=", "<", ">"] {
        if let Some(index) = token.find(symbol) {
            if index == 0 || index + symbol.len() == token.len() {
                continue;
            }
            let operator = ComparisonOperator::parse(symbol)?;
            return Some(ComparisonExpression::new(
                &token[..index],
                operator,
                &token[index + symbol.len()..],
            ));
        }
    }
    None
}

/// Text a reader sees: field codes are skipped, and so are the results of
/// the statistics fields themselves
fn visible_text(tree: &DocumentTree) -> String {
    struct Frame {
        field: FieldId,
        in_code: bool,
        hidden_result: bool,
    }

    let mut out = String::new();
    let mut stack: Vec<Frame> = Vec::new();
    for id in tree.document_order() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        match &node.kind {
            NodeKind::FieldStart { .. } => {
                let hidden_result = tree.field(id).map_or(false, |f| {
                    matches!(f.field_type, FieldType::NumWords | FieldType::NumChars)
                });
                stack.push(Frame {
                    field: id,
                    in_code: true,
                    hidden_result,
                });
            }
            NodeKind::FieldSeparator { field } => {
                if let Some(frame) = stack.iter_mut().rev().find(|f| f.field == *field) {
                    frame.in_code = false;
                }
            }
            NodeKind::FieldEnd { field } => {
                if let Some(index) = stack.iter().rposition(|f| f.field == *field) {
                    stack.truncate(index);
                }
            }
            NodeKind::Run { text } => {
                let visible = stack.iter().all(|f| !f.in_code && !f.hidden_result);
                if visible {
                    out.push_str(text);
                }
            }
            NodeKind::Paragraph { .. } => out.push(' '),
            _ => {}
        }
    }
    out
}

fn word_count(tree: &DocumentTree) -> usize {
    visible_text(tree).unicode_words().count()
}

fn char_count(tree: &DocumentTree) -> usize {
    visible_text(tree)
        .graphemes(true)
        .filter(|g| !g.trim().is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Append a closed field with an empty result to the first paragraph
    fn add_field(tree: &mut DocumentTree, code: &str) -> FieldId {
        let para = tree.paragraphs()[0];
        let field_type = FieldCode::parse(code).field_type;
        let start = tree
            .append_child(para, NodeKind::FieldStart { field_type })
            .unwrap();
        tree.append_child(para, NodeKind::run(code)).unwrap();
        tree.append_child(para, NodeKind::FieldSeparator { field: start })
            .unwrap();
        tree.append_child(para, NodeKind::FieldEnd { field: start }).unwrap();
        start
    }

    fn result_of(code: &str, evaluator: &FieldEvaluator, tree: &mut DocumentTree) -> String {
        let id = add_field(tree, code);
        evaluator.update_field(tree, id).unwrap();
        tree.field_result(id).unwrap()
    }

    fn eval(code: &str) -> String {
        result_of(code, &FieldEvaluator::default(), &mut DocumentTree::new())
    }

    #[test]
    fn test_formula_results() {
        assert_eq!(eval("= 2 + 3"), "5");
        assert_eq!(eval("= 10 / 3"), "3.33");
        assert_eq!(eval("= 1234.5 \\# \"#,##0.00\""), "1,234.50");
        assert_eq!(eval("= 1 / 0"), "!Zero Divide");
        assert_eq!(eval("= 2 +"), "!Unexpected End of Formula");
        assert_eq!(eval("= missing * 2"), "!Undefined Bookmark, missing");
    }

    #[test]
    fn test_if_and_compare() {
        assert_eq!(eval("IF 3 > 2 \"big\" \"small\""), "big");
        assert_eq!(eval("IF 3>20 big small"), "small");
        assert_eq!(eval("IF \"abc\" = \"a*\" yes no"), "yes");
        assert_eq!(eval("IF 1"), MISSING_TEST_CONDITION);
        assert_eq!(eval("IF 1 ~ 2 a b"), UNKNOWN_OP_CODE);
        assert_eq!(eval("COMPARE 5 >= 5"), "1");
        assert_eq!(eval("COMPARE apple > banana"), "0");
    }

    #[derive(Debug)]
    struct Inverted;

    impl ComparisonEvaluator for Inverted {
        fn evaluate(&self, expression: &ComparisonExpression) -> Option<ComparisonOutcome> {
            if expression.left == "fail" {
                return Some(ComparisonOutcome::Error("custom failure".into()));
            }
            if expression.left == "defer" {
                return None;
            }
            Some(ComparisonOutcome::Result(!crate::comparison::compare(expression)))
        }
    }

    #[test]
    fn test_custom_comparison() {
        let evaluator = FieldEvaluator::default().with_comparison(Box::new(Inverted));
        let mut tree = DocumentTree::new();
        assert_eq!(result_of("IF 1 = 1 yes no", &evaluator, &mut tree), "no");
        assert_eq!(result_of("IF fail = 1 yes no", &evaluator, &mut tree), "custom failure");
        assert_eq!(result_of("IF defer = defer yes no", &evaluator, &mut tree), "yes");
    }

    #[test]
    fn test_document_properties() {
        let mut tree = DocumentTree::new();
        tree.document.properties.title = Some("Report".into());
        tree.document
            .custom_properties
            .insert("Client".into(), "Acme".into());
        tree.document.set_variable("Stage", "Draft");
        let evaluator = FieldEvaluator::new(FieldOptions {
            default_document_author: Some("Fallback".into()),
            ..Default::default()
        });

        assert_eq!(result_of("TITLE \\* Upper", &evaluator, &mut tree), "REPORT");
        assert_eq!(result_of("AUTHOR", &evaluator, &mut tree), "Fallback");
        assert_eq!(result_of("DOCPROPERTY Title", &evaluator, &mut tree), "Report");
        assert_eq!(result_of("DOCPROPERTY client", &evaluator, &mut tree), "Acme");
        assert_eq!(result_of("DOCPROPERTY Nope", &evaluator, &mut tree), UNKNOWN_PROPERTY);
        assert_eq!(result_of("DOCVARIABLE Stage", &evaluator, &mut tree), "Draft");
        assert_eq!(result_of("DOCVARIABLE Missing", &evaluator, &mut tree), NO_VARIABLE);
    }

    #[test]
    fn test_author_argument_overwrites_property() {
        let mut tree = DocumentTree::new();
        let evaluator = FieldEvaluator::default();
        assert_eq!(result_of("AUTHOR \"Jane Doe\"", &evaluator, &mut tree), "Jane Doe");
        assert_eq!(tree.document.properties.author.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_user_and_file_fields() {
        let mut tree = DocumentTree::new();
        tree.document.properties.file_name = Some("/docs/report.docx".into());
        let mut options = FieldOptions::default();
        options.user.initials = "JD".into();
        let evaluator = FieldEvaluator::new(options);

        assert_eq!(result_of("USERINITIALS", &evaluator, &mut tree), "JD");
        assert_eq!(result_of("USERNAME \"Override\"", &evaluator, &mut tree), "Override");
        assert_eq!(result_of("FILENAME", &evaluator, &mut tree), "report.docx");
        assert_eq!(result_of("FILENAME \\p", &evaluator, &mut tree), "/docs/report.docx");
    }

    #[test]
    fn test_dates_use_fixed_clock() {
        let now = NaiveDate::from_ymd_opt(2024, 7, 4)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        let evaluator = FieldEvaluator::new(FieldOptions {
            fixed_now: Some(now),
            ..Default::default()
        });
        let mut tree = DocumentTree::new();
        assert_eq!(result_of("DATE", &evaluator, &mut tree), "7/4/2024");
        assert_eq!(result_of("TIME", &evaluator, &mut tree), "9:05 AM");
        assert_eq!(
            result_of("DATE \\@ \"dddd, MMMM d, yyyy\"", &evaluator, &mut tree),
            "Thursday, July 4, 2024"
        );
        assert_eq!(result_of("PRINTDATE", &evaluator, &mut tree), "");
    }

    #[test]
    fn test_sequence_numbering() {
        let mut tree = DocumentTree::new();
        let evaluator = FieldEvaluator::default();
        let first = add_field(&mut tree, "SEQ Figure");
        let table = add_field(&mut tree, "SEQ Table");
        let second = add_field(&mut tree, "SEQ figure \\* ROMAN");
        let repeat = add_field(&mut tree, "SEQ Figure \\c");
        let reset = add_field(&mut tree, "SEQ Figure \\r 10");
        let hidden = add_field(&mut tree, "SEQ Figure \\h");
        evaluator.update_fields(&mut tree).unwrap();

        assert_eq!(tree.field_result(first).unwrap(), "1");
        assert_eq!(tree.field_result(table).unwrap(), "1");
        assert_eq!(tree.field_result(second).unwrap(), "II");
        assert_eq!(tree.field_result(repeat).unwrap(), "2");
        assert_eq!(tree.field_result(reset).unwrap(), "10");
        assert_eq!(tree.field_result(hidden).unwrap(), "");
    }

    #[test]
    fn test_mergefield_placeholder() {
        assert_eq!(eval("MERGEFIELD Name"), "«Name»");
        assert_eq!(eval("MERGEFIELD Name \\b \"Dear \" \\f \",\""), "Dear «Name»,");
        assert_eq!(eval("MERGEFIELD Name \\* Upper"), "«Name»");
    }

    #[test]
    fn test_unknown_field_keeps_cached_result() {
        let mut tree = DocumentTree::new();
        let id = add_field(&mut tree, "TOC \\o");
        tree.set_field_result(id, "cached").unwrap();
        tree.field_mut(id).unwrap().dirty = true;
        FieldEvaluator::default().update_field(&mut tree, id).unwrap();
        assert_eq!(tree.field_result(id).unwrap(), "cached");
        assert!(!tree.field(id).unwrap().dirty);
        assert_eq!(tree.field(id).unwrap().field_type, FieldType::Unknown("TOC".into()));
    }

    #[test]
    fn test_locked_and_open_fields_are_skipped() {
        let mut tree = DocumentTree::new();
        let evaluator = FieldEvaluator::default();
        let locked = add_field(&mut tree, "= 1 + 1");
        tree.field_mut(locked).unwrap().lock();
        assert!(!evaluator.update_field(&mut tree, locked).unwrap());
        assert_eq!(tree.field_result(locked).unwrap(), "");

        let para = tree.paragraphs()[0];
        let open = tree
            .append_child(para, NodeKind::FieldStart { field_type: FieldType::Page })
            .unwrap();
        assert!(!evaluator.update_field(&mut tree, open).unwrap());
        assert_eq!(evaluator.update_fields(&mut tree).unwrap(), 0);
    }

    #[test]
    fn test_word_and_char_counts_skip_codes() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        tree.append_child(para, NodeKind::run("one two three ")).unwrap();
        let words = add_field(&mut tree, "NUMWORDS");
        let chars = add_field(&mut tree, "NUMCHARS");
        let evaluator = FieldEvaluator::default();
        evaluator.update_fields(&mut tree).unwrap();
        assert_eq!(tree.field_result(words).unwrap(), "3");
        assert_eq!(tree.field_result(chars).unwrap(), "11");

        evaluator.update_fields(&mut tree).unwrap();
        assert_eq!(tree.field_result(words).unwrap(), "3");
    }

    #[test]
    fn test_page_fields() {
        let mut tree = DocumentTree::new();
        let para = tree.paragraphs()[0];
        tree.append_child(para, NodeKind::run("\u{0c}")).unwrap();
        let page = add_field(&mut tree, "PAGE \\* roman");
        let total = add_field(&mut tree, "NUMPAGES \\# 00");
        tree.append_section();
        let evaluator = FieldEvaluator::default();
        evaluator.update_fields(&mut tree).unwrap();
        assert_eq!(tree.field_result(page).unwrap(), "ii");
        assert_eq!(tree.field_result(total).unwrap(), "03");
    }
}
