use std::collections::VecDeque;

use ahash::AHashMap;
use tracing::debug;

use crate::{
    error::{QueryError, Result},
    row::Row,
    schema::Schema,
    types::Value,
};

use super::{close_input, explain_columns, indent, BoxedOperator, Lifecycle, Operator, OperatorState};

// Build rows still owed to the current probe row
struct PendingMatches {
    probe: Row,
    remaining: VecDeque<Row>,
}

/// Inner equi-join. The right input is the build side and gets drained into a hash table on
/// open, the left input is streamed against it. Output rows are the left row followed by the
/// right row.
pub struct HashJoin {
    left: BoxedOperator,
    right: BoxedOperator,
    left_columns: Vec<String>,
    right_columns: Vec<String>,
    left_indexes: Vec<usize>,
    right_indexes: Vec<usize>,
    schema: Schema,
    table: AHashMap<Vec<Value>, Vec<Row>>,
    pending: Option<PendingMatches>,
    lifecycle: Lifecycle,
}

impl HashJoin {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        left_columns: Vec<String>,
        right_columns: Vec<String>,
    ) -> Result<Self> {
        if left_columns.is_empty() {
            return Err(QueryError::UnsupportedJoinShape("no join columns given".to_string()));
        }
        if left_columns.len() != right_columns.len() {
            return Err(QueryError::UnsupportedJoinShape(
                format!("{} left join columns but {} right join columns", left_columns.len(), right_columns.len())
            ));
        }
        let left_indexes = left.output_schema().column_indexes(&left_columns)?;
        let right_indexes = right.output_schema().column_indexes(&right_columns)?;
        for (l, r) in left_indexes.iter().zip(&right_indexes) {
            let left_column = left.output_schema().column(*l);
            let right_column = right.output_schema().column(*r);
            if left_column.value_type != right_column.value_type {
                return Err(QueryError::UnsupportedJoinShape(format!(
                    "cannot join {} {} with {} {}",
                    left_column.name, left_column.value_type, right_column.name, right_column.value_type
                )));
            }
        }
        let schema = left.output_schema().concat(right.output_schema());
        Ok(HashJoin {
            left,
            right,
            left_columns,
            right_columns,
            left_indexes,
            right_indexes,
            schema,
            table: AHashMap::new(),
            pending: None,
            lifecycle: Lifecycle::new("hash_join"),
        })
    }
}

impl Operator for HashJoin {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.right.open()?;
        let mut build_rows = 0;
        while let Some(row) = self.right.next()? {
            self.table.entry(row.key(&self.right_indexes)).or_default().push(row);
            build_rows += 1;
        }
        close_input(self.right.as_mut())?;
        debug!(rows = build_rows, keys = self.table.len(), "hash_join.build");
        self.left.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        if let Some(pending) = self.pending.as_mut() {
            if let Some(build_row) = pending.remaining.pop_front() {
                let row = pending.probe.combine(&build_row);
                if pending.remaining.is_empty() {
                    self.pending = None;
                }
                return Ok(Some(row));
            }
            self.pending = None;
        }
        loop {
            let probe = match self.left.next()? {
                Some(row) => row,
                None => {
                    self.lifecycle.exhaust();
                    close_input(self.left.as_mut())?;
                    return Ok(None);
                }
            };
            match self.table.get(&probe.key(&self.left_indexes)).map(Vec::as_slice) {
                Some([single]) => return Ok(Some(probe.combine(single))),
                Some([first, rest @ ..]) => {
                    let row = probe.combine(first);
                    self.pending = Some(PendingMatches { probe, remaining: rest.iter().cloned().collect() });
                    return Ok(Some(row));
                }
                _ => continue,
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.close()?;
        self.table.clear();
        self.pending = None;
        close_input(self.left.as_mut())?;
        close_input(self.right.as_mut())
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }

    fn state(&self) -> OperatorState {
        self.lifecycle.state()
    }

    fn explain(&self, indentation: usize) -> String {
        format!(
            "{}join[left_columns: {}, right_columns: {}, left:\n{}\n{}, right:\n{}]",
            indent(indentation),
            explain_columns(&self.left_columns),
            explain_columns(&self.right_columns),
            self.left.explain(indentation + 2),
            indent(indentation),
            self.right.explain(indentation + 2)
        )
    }
}
