use itertools::Itertools;

use crate::{error::Result, row::Row, schema::{ColumnDesc, Schema}};

use super::{close_input, indent, BoxedOperator, Lifecycle, Operator, OperatorState};

/// Narrows and reorders the input columns. Descriptors are looked up by their output name, so
/// aggregates computed further down are selected as `COUNT(id)`.
pub struct Project {
    input: BoxedOperator,
    columns: Vec<ColumnDesc>,
    indexes: Vec<usize>,
    schema: Schema,
    lifecycle: Lifecycle,
}

impl Project {
    pub fn new(input: BoxedOperator, columns: Vec<ColumnDesc>) -> Result<Self> {
        let indexes = columns.iter()
            .map(|c| input.output_schema().column_index(&c.output_name()))
            .collect::<Result<Vec<_>>>()?;
        let schema = Schema::new(columns.iter().map(ColumnDesc::to_schema_column).collect());
        Ok(Project { input, columns, indexes, schema, lifecycle: Lifecycle::new("project") })
    }
}

impl Operator for Project {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.input.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        match self.input.next()? {
            Some(row) => Ok(Some(row.project(&self.indexes))),
            None => {
                self.lifecycle.exhaust();
                close_input(self.input.as_mut())?;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.close()?;
        close_input(self.input.as_mut())
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }

    fn state(&self) -> OperatorState {
        self.lifecycle.state()
    }

    fn explain(&self, indentation: usize) -> String {
        format!(
            "{}project[columns: [{}], input:\n{}]",
            indent(indentation),
            self.columns.iter().map(ColumnDesc::output_name).join(", "),
            self.input.explain(indentation + 2)
        )
    }
}
