use thiserror::Error;

use crate::types::{Value, ValueType};

pub type Result<T> = std::result::Result<T, QueryError>;

/// Every failure a query can run into. None of them are recoverable for the query that raised
/// them: construction errors abort plan building, execution errors abort the row stream.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("column '{column}' not found (available: {available})")]
    ColumnNotFound { column: String, available: String },
    #[error("row has {actual} values but the schema has {expected} columns")]
    SchemaArityMismatch { expected: usize, actual: usize },
    #[error("invalid operand for {op}: {reason}")]
    InvalidPredicateOperand { op: String, reason: String },
    #[error("unsupported aggregate function '{0}'")]
    UnsupportedAggregate(String),
    #[error("{function} cannot aggregate column '{column}' of type {value_type}")]
    InvalidAggregateInput { function: String, column: String, value_type: ValueType },
    #[error("cannot call {action} on {operator} operator in state {state}")]
    InvalidOperatorState { operator: &'static str, action: &'static str, state: String },
    #[error("unsupported join: {0}")]
    UnsupportedJoinShape(String),
    #[error("table '{0}' does not exist")]
    UnresolvedTable(String),
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("cannot compare {left} with {right}")]
    IncomparableValues { left: Value, right: Value },
    #[error("value {value} cannot be converted to {target}")]
    ValueNotConvertible { value: Value, target: ValueType },
    #[error("invalid sort keys: {0}")]
    InvalidSortKeys(String),
    #[error("numeric overflow while computing {0}")]
    NumericOverflow(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl QueryError {
    pub(crate) fn invalid_operand(op: impl ToString, reason: impl Into<String>) -> Self {
        QueryError::InvalidPredicateOperand { op: op.to_string(), reason: reason.into() }
    }
}
