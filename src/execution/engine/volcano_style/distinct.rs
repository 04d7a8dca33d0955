use ahash::AHashSet;

use crate::{error::Result, row::Row, schema::Schema, types::Value};

use super::{close_input, explain_columns, indent, BoxedOperator, Lifecycle, Operator, OperatorState};

/// Drops every row whose values on `columns` were already seen, keeping the first one. Without
/// columns the whole row is the key.
pub struct Distinct {
    input: BoxedOperator,
    columns: Vec<String>,
    indexes: Vec<usize>,
    seen: AHashSet<Vec<Value>>,
    lifecycle: Lifecycle,
}

impl Distinct {
    pub fn new(input: BoxedOperator, columns: Vec<String>) -> Result<Self> {
        let indexes = if columns.is_empty() {
            (0..input.output_schema().len()).collect()
        } else {
            input.output_schema().column_indexes(&columns)?
        };
        Ok(Distinct { input, columns, indexes, seen: AHashSet::new(), lifecycle: Lifecycle::new("distinct") })
    }
}

impl Operator for Distinct {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.input.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        while let Some(row) = self.input.next()? {
            if self.seen.insert(row.key(&self.indexes)) {
                return Ok(Some(row));
            }
        }
        self.lifecycle.exhaust();
        close_input(self.input.as_mut())?;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.close()?;
        self.seen.clear();
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
            "{}distinct[columns: {}, input:\n{}]",
            indent(indentation),
            explain_columns(&self.columns),
            self.input.explain(indentation + 2)
        )
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::{
        error::QueryError,
        execution::engine::volcano_style::mock::{drain, MockSourceOperator},
        row,
        types::ValueType,
    };

    use super::*;

    fn get_test_schema() -> Schema {
        Schema::from_pairs([("a", ValueType::Int), ("b", ValueType::Text)])
    }

    #[test]
    fn test_distinct_on_subset_keeps_first_seen() {
        let source = MockSourceOperator::boxed(get_test_schema(), vec![
            row![1, "x"], row![2, "y"], row![1, "z"], row![3, "x"], row![2, "x"],
        ]);
        let mut distinct = Distinct::new(source, vec!["a".to_string()]).unwrap();
        distinct.open().unwrap();
        assert_eq!(drain(&mut distinct).unwrap(), vec![row![1, "x"], row![2, "y"], row![3, "x"]]);
        distinct.close().unwrap();
    }

    #[test]
    fn test_distinct_whole_row() {
        let source = MockSourceOperator::boxed(get_test_schema(), vec![
            row![1, "x"], row![1, "x"], row![1, "y"], row![1, "x"],
        ]);
        let mut distinct = Distinct::new(source, vec![]).unwrap();
        distinct.open().unwrap();
        assert_eq!(drain(&mut distinct).unwrap(), vec![row![1, "x"], row![1, "y"]]);
    }

    #[test]
    fn test_unknown_column() {
        let source = MockSourceOperator::boxed(get_test_schema(), vec![]);
        assert!(matches!(Distinct::new(source, vec!["c".to_string()]), Err(QueryError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_randomized_distinct() {
        let mut rng = StdRng::seed_from_u64(42);
        let rows: Vec<Row> = (0..500).map(|_| row![rng.gen_range(0..20i64), rng.gen_range(0..3i64)]).collect();
        let schema = Schema::from_pairs([("a", ValueType::Int), ("b", ValueType::Int)]);
        let mut distinct = Distinct::new(MockSourceOperator::boxed(schema, rows.clone()), vec!["a".to_string()]).unwrap();
        distinct.open().unwrap();
        let output = drain(&mut distinct).unwrap();

        let keys: AHashSet<Value> = output.iter().map(|r| r[0].clone()).collect();
        assert_eq!(keys.len(), output.len());
        let input_keys: AHashSet<Value> = rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(keys, input_keys);
        // the representative is the first row with that key
        for row in &output {
            assert_eq!(rows.iter().find(|r| r[0] == row[0]), Some(row));
        }
    }
}
