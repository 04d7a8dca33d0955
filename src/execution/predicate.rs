use std::{cmp::Ordering, fmt::Display, str::FromStr};

use itertools::Itertools;
use regex::Regex;

use crate::{error::{QueryError, Result}, row::Row, types::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Between,
    Like,
    In,
}

impl FilterOp {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FilterOp::Between | FilterOp::In)
    }
}

impl FromStr for FilterOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "=" => FilterOp::Eq,
            "<>" | "!=" => FilterOp::NotEq,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::GtEq,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::LtEq,
            "between" => FilterOp::Between,
            "like" => FilterOp::Like,
            "in" => FilterOp::In,
            _ => return Err(QueryError::Parse(format!("unrecognized filter operator '{}'", s))),
        })
    }
}

impl Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "<>",
            FilterOp::Gt => ">",
            FilterOp::GtEq => ">=",
            FilterOp::Lt => "<",
            FilterOp::LtEq => "<=",
            FilterOp::Between => "BETWEEN",
            FilterOp::Like => "LIKE",
            FilterOp::In => "IN",
        };
        write!(f, "{}", op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Value),
    List(Vec<Value>),
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Scalar(value) => write!(f, "{}", value),
            Operand::List(values) => write!(f, "({})", values.iter().join(", ")),
        }
    }
}

// The comparisons that go through try_cmp
#[derive(Debug, Clone, Copy)]
enum Bound {
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl Bound {
    fn admits(&self, ordering: Ordering) -> bool {
        match self {
            Bound::Gt => ordering == Ordering::Greater,
            Bound::GtEq => ordering != Ordering::Less,
            Bound::Lt => ordering == Ordering::Less,
            Bound::LtEq => ordering != Ordering::Greater,
        }
    }
}

// The operand, checked against the operator and prepared for evaluation
#[derive(Debug, Clone)]
enum Predicate {
    Eq(Value),
    NotEq(Value),
    Compare(Bound, Value),
    Between(Value, Value),
    In(Vec<Value>),
    Like { pattern: Value, regex: Regex },
}

/// A single-column predicate. The operand shape is validated (and a LIKE pattern compiled)
/// when the clause is built, so evaluation only fails on values of the wrong kind.
#[derive(Debug, Clone)]
pub struct FilterClause {
    column_index: usize,
    op: FilterOp,
    operand: Operand,
    predicate: Predicate,
}

impl FilterClause {
    pub fn new(column_index: usize, op: FilterOp, operand: Operand) -> Result<Self> {
        let predicate = match (op, &operand) {
            (FilterOp::Like, Operand::Scalar(pattern @ Value::Text(text))) => {
                Predicate::Like { pattern: pattern.clone(), regex: compile_like_pattern(text)? }
            }
            (FilterOp::Like, Operand::Scalar(other)) => {
                return Err(QueryError::invalid_operand(op, format!("expected a text pattern, received {}", other)));
            }
            (FilterOp::Eq, Operand::Scalar(value)) => Predicate::Eq(value.clone()),
            (FilterOp::NotEq, Operand::Scalar(value)) => Predicate::NotEq(value.clone()),
            (FilterOp::Gt, Operand::Scalar(value)) => Predicate::Compare(Bound::Gt, value.clone()),
            (FilterOp::GtEq, Operand::Scalar(value)) => Predicate::Compare(Bound::GtEq, value.clone()),
            (FilterOp::Lt, Operand::Scalar(value)) => Predicate::Compare(Bound::Lt, value.clone()),
            (FilterOp::LtEq, Operand::Scalar(value)) => Predicate::Compare(Bound::LtEq, value.clone()),
            (FilterOp::Between, Operand::List(bounds)) => match bounds.as_slice() {
                [low, high] => Predicate::Between(low.clone(), high.clone()),
                _ => {
                    return Err(QueryError::invalid_operand(op, format!("expected 2 bounds, received {}", bounds.len())));
                }
            },
            (FilterOp::In, Operand::List(values)) if !values.is_empty() => Predicate::In(values.clone()),
            (FilterOp::In, Operand::List(_)) => {
                return Err(QueryError::invalid_operand(op, "expected a non-empty list"));
            }
            (op, operand) => {
                let expected = if op.is_scalar() { "a scalar" } else { "a list" };
                return Err(QueryError::invalid_operand(op, format!("expected {}, received {}", expected, operand)));
            }
        };
        Ok(Self { column_index, op, operand, predicate })
    }

    pub fn column_index(&self) -> usize {
        self.column_index
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn accepts(&self, row: &Row) -> Result<bool> {
        let value = &row[self.column_index];
        Ok(match &self.predicate {
            Predicate::Eq(operand) => value == operand,
            Predicate::NotEq(operand) => value != operand,
            Predicate::Compare(bound, operand) => bound.admits(value.try_cmp(operand)?),
            Predicate::Between(low, high) => {
                value.try_cmp(low)? != Ordering::Less && value.try_cmp(high)? != Ordering::Greater
            }
            Predicate::In(values) => values.contains(value),
            Predicate::Like { pattern, regex } => match value.as_text() {
                Some(text) => regex.is_match(text),
                None => {
                    return Err(QueryError::IncomparableValues { left: value.clone(), right: pattern.clone() });
                }
            },
        })
    }
}

/// Turns a SQL LIKE pattern into an anchored regex: `%` matches any run of characters, `_`
/// exactly one, and `\` escapes the next character.
fn compile_like_pattern(pattern: &str) -> Result<Regex> {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    let mut escaped = false;
    for ch in pattern.chars() {
        match ch {
            _ if escaped => {
                regex.push_str(&regex::escape(&ch.to_string()));
                escaped = false;
            }
            '\\' => escaped = true,
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            _ => regex.push_str(&regex::escape(&ch.to_string())),
        }
    }
    if escaped {
        regex.push_str(r"\\");
    }
    regex.push('$');
    // (?s) so that wildcards also match line breaks
    Regex::new(&format!("(?s){}", regex))
        .map_err(|e| QueryError::invalid_operand(FilterOp::Like, format!("invalid pattern '{}': {}", pattern, e)))
}
