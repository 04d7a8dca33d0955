use std::fmt::Display;

use itertools::Itertools;

use crate::{error::Result, row::Row, schema::Schema};

use super::plan::QueryPlan;

pub mod volcano_style;

pub trait ExecutionEngine {
    fn execute(&self, plan: &QueryPlan) -> Result<QueryResult>;
    /// Indented description of the operator tree `execute` would run for `plan`.
    fn explain(&self, plan: &QueryPlan) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Display for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header: Vec<String> = self.schema.column_names().map(str::to_string).collect();
        let cells: Vec<Vec<String>> = self.rows.iter()
            .map(|row| row.values().iter().map(|v| v.to_string()).collect())
            .collect();
        let widths: Vec<usize> = (0..header.len())
            .map(|i| cells.iter().map(|r| r[i].chars().count()).chain([header[i].chars().count()]).max().unwrap_or(0))
            .collect();

        let format_line = |line: &[String]| {
            line.iter().zip(&widths).map(|(cell, width)| format!("{:<width$}", cell, width = width)).join(" | ").trim_end().to_string()
        };
        writeln!(f, "{}", format_line(header.as_slice()))?;
        writeln!(f, "{}", widths.iter().map(|w| "-".repeat(*w)).join("-+-"))?;
        for line in &cells {
            writeln!(f, "{}", format_line(line.as_slice()))?;
        }
        write!(f, "({} {})", self.rows.len(), if self.rows.len() == 1 { "row" } else { "rows" })
    }
}

#[cfg(test)]
mod test {
    use crate::{row, types::ValueType};

    use super::*;

    #[test]
    fn test_display_result() {
        let result = QueryResult {
            schema: Schema::from_pairs([("id", ValueType::Int), ("name", ValueType::Text)]),
            rows: vec![row![1, "Elon"], row![22, "Marty"]],
        };
        let expected = "\
id | name
---+--------
1  | \"Elon\"
22 | \"Marty\"
(2 rows)";
        assert_eq!(result.to_string(), expected);
    }
}
