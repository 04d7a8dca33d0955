use crate::{
    error::Result,
    execution::predicate::{FilterClause, FilterOp, Operand},
    row::Row,
    schema::Schema,
};

use super::{close_input, indent, BoxedOperator, Lifecycle, Operator, OperatorState};

pub struct Filter {
    input: BoxedOperator,
    column: String,
    clause: FilterClause,
    lifecycle: Lifecycle,
}

impl Filter {
    pub fn new(input: BoxedOperator, column: &str, op: FilterOp, operand: Operand) -> Result<Self> {
        let column_index = input.output_schema().column_index(column)?;
        let clause = FilterClause::new(column_index, op, operand)?;
        Ok(Filter { input, column: column.to_string(), clause, lifecycle: Lifecycle::new("filter") })
    }
}

impl Operator for Filter {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.input.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        while let Some(row) = self.input.next()? {
            if self.clause.accepts(&row)? {
                return Ok(Some(row));
            }
        }
        self.lifecycle.exhaust();
        close_input(self.input.as_mut())?;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.close()?;
        close_input(self.input.as_mut())
    }

    fn output_schema(&self) -> &Schema {
        self.input.output_schema()
    }

    fn state(&self) -> OperatorState {
        self.lifecycle.state()
    }

    fn explain(&self, indentation: usize) -> String {
        format!(
            "{}filter[column: {}, op: {}, value: {}, input:\n{}]",
            indent(indentation),
            self.column,
            self.clause.op(),
            self.clause.operand(),
            self.input.explain(indentation + 2)
        )
    }
}
