use crate::{error::Result, row::Row, schema::Schema};

use super::{close_input, indent, BoxedOperator, Lifecycle, Operator, OperatorState};

/// Passes on at most `limit` rows. The input is never pulled past the limit.
pub struct Limit {
    input: BoxedOperator,
    limit: usize,
    emitted: usize,
    lifecycle: Lifecycle,
}

impl Limit {
    pub fn new(input: BoxedOperator, limit: usize) -> Self {
        Limit { input, limit, emitted: 0, lifecycle: Lifecycle::new("limit") }
    }
}

impl Operator for Limit {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.emitted = 0;
        self.input.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        if self.emitted >= self.limit {
            self.lifecycle.exhaust();
            close_input(self.input.as_mut())?;
            return Ok(None);
        }
        self.emitted += 1;
        let row = self.input.next()?;
        if row.is_none() {
            self.lifecycle.exhaust();
        }
        Ok(row)
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
        format!("{}limit[limit: {}, input:\n{}]", indent(indentation), self.limit, self.input.explain(indentation + 2))
    }
}

#[cfg(test)]
mod test {
    use crate::{
        execution::engine::volcano_style::mock::{drain, MockSourceOperator},
        row,
        types::ValueType,
    };

    use super::*;

    fn get_test_source(n: i64) -> MockSourceOperator {
        MockSourceOperator::new(Schema::from_pairs([("a", ValueType::Int)]), (0..n).map(|i| row![i]).collect())
    }

    #[test]
    fn test_limit_is_a_prefix() {
        for (available, limit) in [(10, 3), (3, 10), (5, 5), (0, 2)] {
            let mut operator = Limit::new(Box::new(get_test_source(available)), limit);
            operator.open().unwrap();
            let rows = drain(&mut operator).unwrap();
            let expected: Vec<Row> = (0..available.min(limit as i64)).map(|i| row![i]).collect();
            assert_eq!(rows, expected);
            operator.close().unwrap();
        }
    }

    #[test]
    fn test_limit_does_not_overpull() {
        let source = get_test_source(10);
        let pulls = source.pulls();
        let closes = source.closes();
        let mut operator = Limit::new(Box::new(source), 3);
        operator.open().unwrap();
        assert_eq!(drain(&mut operator).unwrap().len(), 3);
        assert_eq!(pulls.get(), 3);
        assert_eq!(closes.get(), 1);
        // further calls neither pull nor close again
        assert_eq!(operator.next(), Ok(None));
        operator.close().unwrap();
        assert_eq!(pulls.get(), 3);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_limit_zero() {
        let source = get_test_source(10);
        let pulls = source.pulls();
        let mut operator = Limit::new(Box::new(source), 0);
        operator.open().unwrap();
        assert_eq!(operator.next(), Ok(None));
        assert_eq!(pulls.get(), 0);
    }
}
