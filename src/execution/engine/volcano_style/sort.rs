use std::cmp::Ordering;

use itertools::Itertools;
use tracing::debug;

use crate::{
    error::{QueryError, Result},
    execution::plan::SortDirection,
    row::Row,
    schema::Schema,
};

use super::{close_input, indent, BoxedOperator, Lifecycle, Operator, OperatorState};

/// Blocking multi-key sort. `open` buffers the whole input and the buffer is handed out row by
/// row afterwards.
pub struct Sort {
    input: BoxedOperator,
    columns: Vec<String>,
    directions: Vec<SortDirection>,
    keys: Vec<(usize, SortDirection)>,
    rows: Vec<Row>,
    position: usize,
    lifecycle: Lifecycle,
}

impl Sort {
    pub fn new(input: BoxedOperator, columns: Vec<String>, directions: Vec<SortDirection>) -> Result<Self> {
        if columns.is_empty() {
            return Err(QueryError::InvalidSortKeys("no sort columns given".to_string()));
        }
        if columns.len() != directions.len() {
            return Err(QueryError::InvalidSortKeys(
                format!("{} sort columns but {} directions", columns.len(), directions.len())
            ));
        }
        let indexes = input.output_schema().column_indexes(&columns)?;
        let keys = indexes.into_iter().zip(directions.iter().copied()).collect();
        Ok(Sort { input, columns, directions, keys, rows: Vec::new(), position: 0, lifecycle: Lifecycle::new("sort") })
    }
}

/*
    One stable pass per key, least significant key first. A later pass only moves rows that
    differ on its own key, so ties keep the order the earlier passes gave them.
 */
fn sort_rows(rows: &mut [Row], keys: &[(usize, SortDirection)]) -> Result<()> {
    for &(index, direction) in keys.iter().rev() {
        let mut error = None;
        rows.sort_by(|a, b| match a[index].try_cmp(&b[index]) {
            Ok(ordering) => direction.apply(ordering),
            Err(e) => {
                error.get_or_insert(e);
                Ordering::Equal
            }
        });
        if let Some(e) = error {
            return Err(e);
        }
    }
    Ok(())
}

impl Operator for Sort {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.input.open()?;
        while let Some(row) = self.input.next()? {
            self.rows.push(row);
        }
        sort_rows(&mut self.rows, &self.keys)?;
        self.position = 0;
        debug!(rows = self.rows.len(), "sort.open");
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        if let Some(row) = self.rows.get_mut(self.position) {
            self.position += 1;
            return Ok(Some(std::mem::take(row)));
        }
        self.lifecycle.exhaust();
        self.rows.clear();
        close_input(self.input.as_mut())?;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.close()?;
        self.rows.clear();
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
            "{}sort[columns: [{}], input:\n{}]",
            indent(indentation),
            self.columns.iter().zip(&self.directions).map(|(c, d)| format!("{} {}", c, d)).join(", "),
            self.input.explain(indentation + 2)
        )
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::{
        execution::engine::volcano_style::mock::{drain, MockSourceOperator},
        row,
        types::ValueType,
    };

    use super::*;

    fn get_test_schema() -> Schema {
        Schema::from_pairs([("a", ValueType::Int), ("b", ValueType::Text)])
    }

    fn sort(rows: Vec<Row>, keys: &[(&str, SortDirection)]) -> Result<Vec<Row>> {
        let source = MockSourceOperator::boxed(get_test_schema(), rows);
        let columns = keys.iter().map(|(c, _)| c.to_string()).collect();
        let directions = keys.iter().map(|(_, d)| *d).collect();
        let mut sort = Sort::new(source, columns, directions)?;
        sort.open()?;
        let rows = drain(&mut sort)?;
        sort.close()?;
        Ok(rows)
    }

    #[test]
    fn test_two_keys_mixed_directions() {
        let rows = vec![row![1, "x"], row![1, "y"], row![0, "z"]];
        assert_eq!(
            sort(rows, &[("a", SortDirection::Asc), ("b", SortDirection::Desc)]).unwrap(),
            vec![row![0, "z"], row![1, "y"], row![1, "x"]]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let rows = vec![row![2, "first"], row![1, "a"], row![2, "second"], row![2, "third"]];
        assert_eq!(
            sort(rows, &[("a", SortDirection::Desc)]).unwrap(),
            vec![row![2, "first"], row![2, "second"], row![2, "third"], row![1, "a"]]
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(sort(vec![], &[]), Err(QueryError::InvalidSortKeys(_))));
        let source = MockSourceOperator::boxed(get_test_schema(), vec![]);
        assert!(matches!(
            Sort::new(source, vec!["a".to_string()], vec![]),
            Err(QueryError::InvalidSortKeys(_))
        ));
        assert!(matches!(sort(vec![], &[("c", SortDirection::Asc)]), Err(QueryError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_mixed_kinds_fail() {
        let schema = Schema::from_pairs([("a", ValueType::Int)]);
        let source = MockSourceOperator::boxed(schema, vec![row![1], row!["one"]]);
        let mut sort = Sort::new(source, vec!["a".to_string()], vec![SortDirection::Asc]).unwrap();
        assert!(matches!(sort.open(), Err(QueryError::IncomparableValues { .. })));
    }

    #[test]
    fn test_input_closed_once_after_buffer_is_served() {
        let source = MockSourceOperator::new(get_test_schema(), vec![row![2, "b"], row![1, "a"]]);
        let closes = source.closes();
        let mut sort = Sort::new(Box::new(source), vec!["a".to_string()], vec![SortDirection::Asc]).unwrap();
        sort.open().unwrap();
        assert_eq!(sort.next(), Ok(Some(row![1, "a"])));
        assert_eq!(sort.next(), Ok(Some(row![2, "b"])));
        assert_eq!(closes.get(), 0);
        assert_eq!(sort.next(), Ok(None));
        assert_eq!(closes.get(), 1);
        assert_eq!(sort.next(), Ok(None));
        sort.close().unwrap();
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_randomized_multi_key_sort() {
        let mut rng = StdRng::seed_from_u64(7);
        let letters = ["a", "b", "c", "d"];
        let rows: Vec<Row> = (0..300)
            .map(|_| row![rng.gen_range(0..10i64), letters[rng.gen_range(0..letters.len())]])
            .collect();
        let sorted = sort(rows.clone(), &[("a", SortDirection::Asc), ("b", SortDirection::Desc)]).unwrap();

        assert_eq!(sorted.len(), rows.len());
        for pair in sorted.windows(2) {
            let (a0, a1) = (&pair[0][0], &pair[1][0]);
            assert_ne!(a0.try_cmp(a1).unwrap(), Ordering::Greater);
            if a0 == a1 {
                assert_ne!(pair[0][1].try_cmp(&pair[1][1]).unwrap(), Ordering::Less);
            }
        }
        // same multiset of rows
        let mut expected = rows;
        let mut actual = sorted;
        let by_display = |r: &Row| r.to_string();
        expected.sort_by_key(by_display);
        actual.sort_by_key(by_display);
        assert_eq!(actual, expected);
    }
}
