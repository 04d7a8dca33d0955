use std::{fmt::Display, str::FromStr};

use itertools::Itertools;

use crate::{error::{QueryError, Result}, types::ValueType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaColumn {
    pub name: String,
    pub value_type: ValueType,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self { name: name.into(), value_type }
    }
}

/// Ordered list of named, typed columns. Names don't have to be unique (a join of two tables
/// with an `id` column has two of them); lookups always resolve to the first match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Schema {
    columns: Vec<SchemaColumn>,
}

impl Schema {
    pub fn new(columns: Vec<SchemaColumn>) -> Self {
        Self { columns }
    }

    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, ValueType)>) -> Self {
        Self { columns: pairs.into_iter().map(|(name, t)| SchemaColumn::new(name, t)).collect() }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, index: usize) -> &SchemaColumn {
        &self.columns[index]
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns.iter().position(|c| c.name == name).ok_or_else(|| {
            QueryError::ColumnNotFound {
                column: name.to_string(),
                available: self.column_names().join(", "),
            }
        })
    }

    pub fn column_indexes<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names.iter().map(|name| self.column_index(name.as_ref())).collect()
    }

    pub fn column_type(&self, name: &str) -> Result<ValueType> {
        Ok(self.columns[self.column_index(name)?].value_type)
    }

    /// Left columns followed by right columns, the output schema of a join.
    pub fn concat(&self, other: &Schema) -> Schema {
        Schema { columns: self.columns.iter().chain(other.columns.iter()).cloned().collect() }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.columns.iter().map(|c| format!("{} {}", c.name, c.value_type)).join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// Type of the finalized aggregate for an input column of type `input`.
    pub fn output_type(&self, input: ValueType) -> ValueType {
        match self {
            AggregateFunction::Count => ValueType::Int,
            AggregateFunction::Sum | AggregateFunction::Avg => ValueType::Float,
            AggregateFunction::Min | AggregateFunction::Max => input,
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "COUNT" => Ok(AggregateFunction::Count),
            "SUM" => Ok(AggregateFunction::Sum),
            "AVG" => Ok(AggregateFunction::Avg),
            "MIN" => Ok(AggregateFunction::Min),
            "MAX" => Ok(AggregateFunction::Max),
            _ => Err(QueryError::UnsupportedAggregate(s.to_string())),
        }
    }
}

impl Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// A column as it appears in a query's output: either a plain (possibly grouping) column of the
/// input or an aggregate over one. `value_type` is the type of the input column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDesc {
    pub name: String,
    pub value_type: ValueType,
    pub aggregate: Option<AggregateFunction>,
    pub grouping: bool,
}

impl ColumnDesc {
    pub fn column(name: impl Into<String>, value_type: ValueType) -> Self {
        Self { name: name.into(), value_type, aggregate: None, grouping: false }
    }

    pub fn grouping(name: impl Into<String>, value_type: ValueType) -> Self {
        Self { name: name.into(), value_type, aggregate: None, grouping: true }
    }

    pub fn aggregate(function: AggregateFunction, name: impl Into<String>, value_type: ValueType) -> Self {
        Self { name: name.into(), value_type, aggregate: Some(function), grouping: false }
    }

    /// Name the column carries in an operator's output schema. Aggregates are named after the
    /// call, `COUNT(id)`, so they can be told apart from the column they aggregate.
    pub fn output_name(&self) -> String {
        match self.aggregate {
            Some(function) => format!("{}({})", function, self.name),
            None => self.name.clone(),
        }
    }

    pub fn output_type(&self) -> ValueType {
        match self.aggregate {
            Some(function) => function.output_type(self.value_type),
            None => self.value_type,
        }
    }

    pub fn to_schema_column(&self) -> SchemaColumn {
        SchemaColumn::new(self.output_name(), self.output_type())
    }
}

impl Display for ColumnDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}", self.output_name())?;
        if self.grouping {
            write!(f, ", grouping")?;
        }
        write!(f, "]")
    }
}
