//! Condition evaluation for IF and COMPARE fields
//!
//! Operands compare numerically when both parse as numbers and lexically
//! otherwise. Lexical `=` and `<>` accept `?` and `*` wildcards in the
//! right operand.

use std::cmp::Ordering;
use std::fmt;

/// Relational operator of a field condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOperator {
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(ComparisonOperator::Equal),
            "<>" => Some(ComparisonOperator::NotEqual),
            "<" => Some(ComparisonOperator::Less),
            "<=" => Some(ComparisonOperator::LessOrEqual),
            ">" => Some(ComparisonOperator::Greater),
            ">=" => Some(ComparisonOperator::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::Less => "<",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterOrEqual => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonOperator::Equal => ordering == Ordering::Equal,
            ComparisonOperator::NotEqual => ordering != Ordering::Equal,
            ComparisonOperator::Less => ordering == Ordering::Less,
            ComparisonOperator::LessOrEqual => ordering != Ordering::Greater,
            ComparisonOperator::Greater => ordering == Ordering::Greater,
            ComparisonOperator::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed condition such as `{ MERGEFIELD Qty } > 10`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonExpression {
    pub left: String,
    pub operator: ComparisonOperator,
    pub right: String,
}

impl ComparisonExpression {
    pub fn new(left: impl Into<String>, operator: ComparisonOperator, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            operator,
            right: right.into(),
        }
    }
}

/// What a comparison produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonOutcome {
    Result(bool),
    /// Message shown as the field result instead of a true/false branch
    Error(String),
}

/// Extension point for custom condition evaluation.
///
/// Returning `None` falls back to [`DefaultComparison`].
pub trait ComparisonEvaluator: fmt::Debug + Send + Sync {
    fn evaluate(&self, expression: &ComparisonExpression) -> Option<ComparisonOutcome>;
}

/// Numeric when both sides are numbers, lexical otherwise
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparison;

impl ComparisonEvaluator for DefaultComparison {
    fn evaluate(&self, expression: &ComparisonExpression) -> Option<ComparisonOutcome> {
        Some(ComparisonOutcome::Result(compare(expression)))
    }
}

/// The default comparison rule
pub fn compare(expression: &ComparisonExpression) -> bool {
    let ComparisonExpression {
        left,
        operator,
        right,
    } = expression;

    if let (Ok(l), Ok(r)) = (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        return l.partial_cmp(&r).map_or(false, |ordering| operator.holds(ordering));
    }

    let wildcard = right.contains(['?', '*']);
    match operator {
        ComparisonOperator::Equal if wildcard => wildcard_match(left, right),
        ComparisonOperator::NotEqual if wildcard => !wildcard_match(left, right),
        _ => operator.holds(left.as_str().cmp(right.as_str())),
    }
}

fn wildcard_match(text: &str, pattern: &str) -> bool {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '?' => regex.push('.'),
            '*' => regex.push_str(".*"),
            other => regex.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    regex.push('$');
    match regex_lite::Regex::new(&regex) {
        Ok(re) => re.is_match(text),
        Err(err) => {
            tracing::warn!(pattern, %err, "invalid wildcard pattern");
            false
        }
    }
}
