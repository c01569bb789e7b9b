//! Formula (`=`) field expressions
//!
//! Expressions are tokenized, parsed into an [`Expr`] tree by recursive
//! descent and then evaluated against a bookmark resolver. Bookmark names
//! stand for the number their text holds.

use crate::comparison::ComparisonOperator;
use std::cmp::Ordering;
use thiserror::Error;

/// Failures shown in place of a formula result
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("!Syntax Error, {0}")]
    Syntax(String),

    #[error("!Unexpected End of Formula")]
    UnexpectedEnd,

    #[error("!Zero Divide")]
    ZeroDivide,

    #[error("!Undefined Bookmark, {0}")]
    UndefinedBookmark(String),
}

pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(String),
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(name) => name.clone(),
            Token::Op(op) => op.clone(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn tokenize(input: &str) -> FormulaResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let begin = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[begin..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::Syntax(text.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let begin = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[begin..i].iter().collect()));
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' | ';' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('<', Some('=')) => "<=",
                    ('<', Some('>')) => "<>",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    _ => ">",
                };
                i += op.len();
                tokens.push(Token::Op(op.into()));
            }
            '+' | '-' | '*' | '/' | '^' | '%' | '=' => {
                tokens.push(Token::Op(c.to_string()));
                i += 1;
            }
            other => return Err(FormulaError::Syntax(other.to_string())),
        }
    }
    Ok(tokens)
}

// =============================================================================
// Syntax tree
// =============================================================================

/// Parsed formula
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bookmark(String),
    Negate(Box<Expr>),
    Percent(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: ComparisonOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

/// Built-in formula functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    And,
    Average,
    Count,
    Defined,
    False,
    If,
    Int,
    Max,
    Min,
    Mod,
    Not,
    Or,
    Product,
    Round,
    Sign,
    Sum,
    True,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_uppercase().as_str() {
            "ABS" => Function::Abs,
            "AND" => Function::And,
            "AVERAGE" => Function::Average,
            "COUNT" => Function::Count,
            "DEFINED" => Function::Defined,
            "FALSE" => Function::False,
            "IF" => Function::If,
            "INT" => Function::Int,
            "MAX" => Function::Max,
            "MIN" => Function::Min,
            "MOD" => Function::Mod,
            "NOT" => Function::Not,
            "OR" => Function::Or,
            "PRODUCT" => Function::Product,
            "ROUND" => Function::Round,
            "SIGN" => Function::Sign,
            "SUM" => Function::Sum,
            "TRUE" => Function::True,
            _ => return None,
        };
        Some(function)
    }

    /// Allowed argument counts; `None` as upper bound means a list
    fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::True | Function::False => (0, Some(0)),
            Function::Abs | Function::Defined | Function::Int | Function::Not | Function::Sign => {
                (1, Some(1))
            }
            Function::And | Function::Or | Function::Mod | Function::Round => (2, Some(2)),
            Function::If => (3, Some(3)),
            Function::Average
            | Function::Count
            | Function::Max
            | Function::Min
            | Function::Product
            | Function::Sum => (1, None),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> FormulaResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FormulaError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn peek_op(&self, ops: &[&str]) -> Option<String> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(&op.as_str()) => Some(op.clone()),
            _ => None,
        }
    }

    fn expect(&mut self, expected: Token) -> FormulaResult<()> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(FormulaError::Syntax(token.text()))
        }
    }

    fn comparison(&mut self) -> FormulaResult<Expr> {
        let left = self.additive()?;
        if let Some(op) = self.peek_op(&["=", "<>", "<", "<=", ">", ">="]) {
            self.pos += 1;
            let right = self.additive()?;
            let op = ComparisonOperator::parse(&op).ok_or(FormulaError::Syntax(op))?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.term()?;
        while let Some(op) = self.peek_op(&["+", "-"]) {
            self.pos += 1;
            let right = self.term()?;
            let op = if op == "+" {
                BinaryOp::Add
            } else {
                BinaryOp::Subtract
            };
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> FormulaResult<Expr> {
        let mut left = self.power()?;
        while let Some(op) = self.peek_op(&["*", "/"]) {
            self.pos += 1;
            let right = self.power()?;
            let op = if op == "*" {
                BinaryOp::Multiply
            } else {
                BinaryOp::Divide
            };
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn power(&mut self) -> FormulaResult<Expr> {
        let mut left = self.unary()?;
        while self.peek_op(&["^"]).is_some() {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op: BinaryOp::Power,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> FormulaResult<Expr> {
        match self.peek_op(&["-", "+"]) {
            Some(op) => {
                self.pos += 1;
                let operand = self.unary()?;
                if op == "-" {
                    Ok(Expr::Negate(Box::new(operand)))
                } else {
                    Ok(operand)
                }
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> FormulaResult<Expr> {
        let mut expr = self.primary()?;
        while self.peek_op(&["%"]).is_some() {
            self.pos += 1;
            expr = Expr::Percent(Box::new(expr));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> FormulaResult<Expr> {
        match self.next()? {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::LParen => {
                let expr = self.comparison()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Ident(name) => match Function::from_name(&name) {
                Some(function) => self.call(function, name),
                None => Ok(Expr::Bookmark(name)),
            },
            other => Err(FormulaError::Syntax(other.text())),
        }
    }

    fn call(&mut self, function: Function, name: String) -> FormulaResult<Expr> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
            } else {
                loop {
                    args.push(self.comparison()?);
                    match self.next()? {
                        Token::Comma => continue,
                        Token::RParen => break,
                        other => return Err(FormulaError::Syntax(other.text())),
                    }
                }
            }
        }
        let (min, max) = function.arity();
        if args.len() < min || max.map_or(false, |max| args.len() > max) {
            return Err(FormulaError::Syntax(name));
        }
        Ok(Expr::Call { function, args })
    }
}

/// Parse a formula expression
pub fn parse(input: &str) -> FormulaResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaError::UnexpectedEnd);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.comparison()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(FormulaError::Syntax(token.text())),
    }
}

// =============================================================================
// Evaluation
// =============================================================================

impl Expr {
    /// Evaluate with `bookmark` resolving names to numbers
    pub fn evaluate(&self, bookmark: &dyn Fn(&str) -> Option<f64>) -> FormulaResult<f64> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Bookmark(name) => {
                bookmark(name).ok_or_else(|| FormulaError::UndefinedBookmark(name.clone()))
            }
            Expr::Negate(inner) => Ok(-inner.evaluate(bookmark)?),
            Expr::Percent(inner) => Ok(inner.evaluate(bookmark)? / 100.0),
            Expr::Binary { op, left, right } => {
                let l = left.evaluate(bookmark)?;
                let r = right.evaluate(bookmark)?;
                match op {
                    BinaryOp::Add => Ok(l + r),
                    BinaryOp::Subtract => Ok(l - r),
                    BinaryOp::Multiply => Ok(l * r),
                    BinaryOp::Divide if r == 0.0 => Err(FormulaError::ZeroDivide),
                    BinaryOp::Divide => Ok(l / r),
                    BinaryOp::Power => Ok(l.powf(r)),
                }
            }
            Expr::Compare { op, left, right } => {
                let l = left.evaluate(bookmark)?;
                let r = right.evaluate(bookmark)?;
                let holds = match l.partial_cmp(&r) {
                    Some(Ordering::Less) => matches!(
                        op,
                        ComparisonOperator::Less
                            | ComparisonOperator::LessOrEqual
                            | ComparisonOperator::NotEqual
                    ),
                    Some(Ordering::Greater) => matches!(
                        op,
                        ComparisonOperator::Greater
                            | ComparisonOperator::GreaterOrEqual
                            | ComparisonOperator::NotEqual
                    ),
                    Some(Ordering::Equal) => matches!(
                        op,
                        ComparisonOperator::Equal
                            | ComparisonOperator::LessOrEqual
                            | ComparisonOperator::GreaterOrEqual
                    ),
                    None => false,
                };
                Ok(flag(holds))
            }
            Expr::Call { function, args } => call(*function, args, bookmark),
        }
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn call(function: Function, args: &[Expr], bookmark: &dyn Fn(&str) -> Option<f64>) -> FormulaResult<f64> {
    let arg = |index: usize| -> FormulaResult<f64> {
        args.get(index)
            .ok_or(FormulaError::UnexpectedEnd)?
            .evaluate(bookmark)
    };
    let all = || -> FormulaResult<Vec<f64>> {
        args.iter().map(|expr| expr.evaluate(bookmark)).collect()
    };

    let value = match function {
        Function::True => 1.0,
        Function::False => 0.0,
        Function::Defined => flag(arg(0).is_ok()),
        Function::If => {
            if arg(0)? != 0.0 {
                arg(1)?
            } else {
                arg(2)?
            }
        }
        Function::Abs => arg(0)?.abs(),
        Function::Int => arg(0)?.trunc(),
        Function::Not => flag(arg(0)? == 0.0),
        Function::Sign => {
            let value = arg(0)?;
            if value > 0.0 {
                1.0
            } else if value < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        Function::And => flag(arg(0)? != 0.0 && arg(1)? != 0.0),
        Function::Or => flag(arg(0)? != 0.0 || arg(1)? != 0.0),
        Function::Mod => {
            let (value, divisor) = (arg(0)?, arg(1)?);
            if divisor == 0.0 {
                return Err(FormulaError::ZeroDivide);
            }
            value % divisor
        }
        Function::Round => {
            let factor = 10f64.powi(arg(1)?.trunc() as i32);
            (arg(0)? * factor).round() / factor
        }
        Function::Sum => all()?.iter().sum(),
        Function::Product => all()?.iter().product(),
        Function::Average => {
            let values = all()?;
            if values.is_empty() {
                return Err(FormulaError::UnexpectedEnd);
            }
            values.iter().sum::<f64>() / values.len() as f64
        }
        Function::Count => args.len() as f64,
        Function::Max => all()?.into_iter().fold(f64::NEG_INFINITY, f64::max),
        Function::Min => all()?.into_iter().fold(f64::INFINITY, f64::min),
    };
    Ok(value)
}

/// Parse and evaluate in one step
pub fn evaluate(input: &str, bookmark: &dyn Fn(&str) -> Option<f64>) -> FormulaResult<f64> {
    parse(input)?.evaluate(bookmark)
}
