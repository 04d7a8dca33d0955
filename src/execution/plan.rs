use std::{cmp::Ordering, fmt::Display, str::FromStr};

use crate::{error::QueryError, schema::ColumnDesc};

use super::predicate::{FilterOp, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(QueryError::Parse(format!("unrecognized sort direction '{}'", s))),
        }
    }
}

impl Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Equi-join condition: `left_columns[i] = right_columns[i]` for every i.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub column: String,
    pub op: FilterOp,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub columns: Vec<String>,
    pub directions: Vec<SortDirection>,
}

/*
    Resolved description of one query. Every name in here refers to a column of the input of the
    operator that ends up using it, so the engine only has to look names up, never to bind them.
    The engine always composes the operators in the same order:

    scan(s) -> join -> filter -> aggregate -> sort -> distinct -> project -> limit
 */
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPlan {
    pub tables: Vec<String>,
    pub join: Option<JoinSpec>,
    pub filter: Option<FilterSpec>,
    pub grouping: Vec<String>,
    // empty means all columns of the input
    pub columns: Vec<ColumnDesc>,
    pub order_by: Option<SortSpec>,
    pub distinct: bool,
    pub limit: Option<usize>,
}

impl QueryPlan {
    pub fn scan(table: impl Into<String>) -> Self {
        QueryPlan { tables: vec![table.into()], ..Default::default() }
    }

    pub fn join<S: Into<String>>(
        left_table: impl Into<String>,
        right_table: impl Into<String>,
        left_columns: impl IntoIterator<Item = S>,
        right_columns: impl IntoIterator<Item = S>,
    ) -> Self {
        QueryPlan {
            tables: vec![left_table.into(), right_table.into()],
            join: Some(JoinSpec {
                left_columns: left_columns.into_iter().map(Into::into).collect(),
                right_columns: right_columns.into_iter().map(Into::into).collect(),
            }),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, column: impl Into<String>, op: FilterOp, operand: Operand) -> Self {
        self.filter = Some(FilterSpec { column: column.into(), op, operand });
        self
    }

    pub fn with_grouping<S: Into<String>>(mut self, grouping: impl IntoIterator<Item = S>) -> Self {
        self.grouping = grouping.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDesc>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_order_by<S: Into<String>>(mut self, keys: impl IntoIterator<Item = (S, SortDirection)>) -> Self {
        let (columns, directions) = keys.into_iter().map(|(c, d)| (c.into(), d)).unzip();
        self.order_by = Some(SortSpec { columns, directions });
        self
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn has_aggregates(&self) -> bool {
        self.columns.iter().any(|c| c.aggregate.is_some())
    }
}
