use std::{cmp::Ordering, collections::hash_map::Entry};

use ahash::AHashMap;
use itertools::Itertools;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use tracing::debug;

use crate::{
    error::{QueryError, Result},
    row::Row,
    schema::{AggregateFunction, ColumnDesc, Schema, SchemaColumn},
    types::{Value, ValueType},
};

use super::{close_input, indent, BoxedOperator, Lifecycle, Operator, OperatorState};

// A bound aggregate column: where its input lives and what it computes
struct AggregateSpec {
    index: usize,
    function: AggregateFunction,
    input_type: ValueType,
    name: String,
}

/*
    Exact sum of floats. The partials never overlap and always add up to the exact sum of every
    value seen, so only the final rounding in `value` loses precision (Shewchuk's algorithm, as in
    Python's math.fsum). Infinite and NaN inputs bypass the partials and dominate the result.
 */
#[derive(Debug, Clone, Default)]
struct ExactSum {
    partials: Vec<f64>,
    special: Option<f64>,
}

impl ExactSum {
    fn add(&mut self, value: f64, name: &str) -> Result<()> {
        if !value.is_finite() {
            self.special = Some(self.special.unwrap_or(0.0) + value);
            return Ok(());
        }
        let mut x = value;
        let mut kept = 0;
        for j in 0..self.partials.len() {
            let mut y = self.partials[j];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            if !hi.is_finite() {
                return Err(QueryError::NumericOverflow(name.to_string()));
            }
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        self.partials.truncate(kept);
        self.partials.push(x);
        Ok(())
    }

    // The exact sum rounded to the nearest float
    fn value(&self) -> f64 {
        if let Some(special) = self.special {
            return special;
        }
        let partials = &self.partials;
        let mut n = partials.len();
        if n == 0 {
            return 0.0;
        }
        n -= 1;
        let mut hi = partials[n];
        let mut lo = 0.0;
        while n > 0 {
            let x = hi;
            n -= 1;
            let y = partials[n];
            hi = x + y;
            lo = y - (hi - x);
            if lo != 0.0 {
                break;
            }
        }
        // round half even across the remaining partials
        if n > 0 && ((lo < 0.0 && partials[n - 1] < 0.0) || (lo > 0.0 && partials[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            if y == x - hi {
                hi = x;
            }
        }
        hi
    }
}

// Running total of SUM and AVG. Integer columns add up in decimal, float columns in an exact
// float sum; neither rounds before the group is finished.
enum Total {
    Int(Decimal),
    Float(ExactSum),
}

impl Total {
    fn new(spec: &AggregateSpec) -> Self {
        match spec.input_type {
            ValueType::Int => Total::Int(Decimal::ZERO),
            _ => Total::Float(ExactSum::default()),
        }
    }

    fn add(&mut self, value: &Value, name: &str) -> Result<()> {
        match (self, value) {
            (Total::Int(total), Value::Int(i)) => {
                *total = total.checked_add(Decimal::from(*i))
                    .ok_or_else(|| QueryError::NumericOverflow(name.to_string()))?;
            }
            (Total::Float(sum), Value::Float(f)) => sum.add(*f, name)?,
            (Total::Float(sum), Value::Int(i)) => sum.add(*i as f64, name)?,
            (Total::Int(_), other) => {
                return Err(QueryError::ValueNotConvertible { value: other.clone(), target: ValueType::Int });
            }
            (Total::Float(_), other) => {
                return Err(QueryError::ValueNotConvertible { value: other.clone(), target: ValueType::Float });
            }
        }
        Ok(())
    }

    fn sum(&self, name: &str) -> Result<f64> {
        match self {
            Total::Int(total) => to_f64(*total, name),
            Total::Float(sum) => Ok(sum.value()),
        }
    }

    fn average(&self, count: i64, name: &str) -> Result<f64> {
        match self {
            Total::Int(total) => {
                let average = total.checked_div(Decimal::from(count))
                    .ok_or_else(|| QueryError::NumericOverflow(name.to_string()))?;
                to_f64(average, name)
            }
            Total::Float(sum) => Ok(sum.value() / count as f64),
        }
    }
}

fn to_f64(value: Decimal, name: &str) -> Result<f64> {
    value.to_f64().ok_or_else(|| QueryError::NumericOverflow(name.to_string()))
}

// Running state of one aggregate within one group
enum Accumulator {
    Count(i64),
    Sum(Total),
    Avg { total: Total, count: i64 },
    Min(Value),
    Max(Value),
}

impl Accumulator {
    fn new(spec: &AggregateSpec, value: &Value) -> Result<Self> {
        let mut accumulator = match spec.function {
            AggregateFunction::Count => return Ok(Accumulator::Count(1)),
            AggregateFunction::Min => return Ok(Accumulator::Min(value.clone())),
            AggregateFunction::Max => return Ok(Accumulator::Max(value.clone())),
            AggregateFunction::Sum => Accumulator::Sum(Total::new(spec)),
            AggregateFunction::Avg => Accumulator::Avg { total: Total::new(spec), count: 0 },
        };
        accumulator.update(spec, value)?;
        Ok(accumulator)
    }

    fn update(&mut self, spec: &AggregateSpec, value: &Value) -> Result<()> {
        match self {
            Accumulator::Count(count) => *count += 1,
            Accumulator::Sum(total) => total.add(value, &spec.name)?,
            Accumulator::Avg { total, count } => {
                total.add(value, &spec.name)?;
                *count += 1;
            }
            Accumulator::Min(min) => {
                if value.try_cmp(min)? == Ordering::Less {
                    *min = value.clone();
                }
            }
            Accumulator::Max(max) => {
                if value.try_cmp(max)? == Ordering::Greater {
                    *max = value.clone();
                }
            }
        }
        Ok(())
    }

    fn finish(self, spec: &AggregateSpec) -> Result<Value> {
        Ok(match self {
            Accumulator::Count(count) => Value::Int(count),
            Accumulator::Sum(total) => Value::Float(total.sum(&spec.name)?),
            Accumulator::Avg { total, count } => Value::Float(total.average(count, &spec.name)?),
            Accumulator::Min(value) | Accumulator::Max(value) => value,
        })
    }
}

/// Blocking grouped aggregation. Emits one row per group, grouping values first, in no
/// particular group order.
pub struct Aggregate {
    input: BoxedOperator,
    grouping: Vec<ColumnDesc>,
    grouping_indexes: Vec<usize>,
    specs: Vec<AggregateSpec>,
    schema: Schema,
    rows: Vec<Row>,
    position: usize,
    lifecycle: Lifecycle,
}

impl Aggregate {
    pub fn new(input: BoxedOperator, grouping: Vec<ColumnDesc>, aggregates: Vec<ColumnDesc>) -> Result<Self> {
        let input_schema = input.output_schema();
        let grouping_indexes = grouping.iter()
            .map(|c| input_schema.column_index(&c.name))
            .collect::<Result<Vec<_>>>()?;
        let mut columns: Vec<SchemaColumn> = grouping_indexes.iter()
            .map(|&i| input_schema.column(i).clone())
            .collect();

        let mut specs = Vec::with_capacity(aggregates.len());
        for column in &aggregates {
            let index = input_schema.column_index(&column.name)?;
            let input_type = input_schema.column(index).value_type;
            let function = column.aggregate.ok_or_else(|| QueryError::InvalidAggregateInput {
                function: "none".to_string(),
                column: column.name.clone(),
                value_type: input_type,
            })?;
            if matches!(function, AggregateFunction::Sum | AggregateFunction::Avg) && !input_type.is_numeric() {
                return Err(QueryError::InvalidAggregateInput {
                    function: function.to_string(),
                    column: column.name.clone(),
                    value_type: input_type,
                });
            }
            columns.push(SchemaColumn::new(column.output_name(), function.output_type(input_type)));
            specs.push(AggregateSpec { index, function, input_type, name: column.output_name() });
        }

        Ok(Aggregate {
            input,
            grouping,
            grouping_indexes,
            specs,
            schema: Schema::new(columns),
            rows: Vec::new(),
            position: 0,
            lifecycle: Lifecycle::new("aggregate"),
        })
    }
}

impl Operator for Aggregate {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.input.open()?;
        let mut groups: AHashMap<Vec<Value>, Vec<Accumulator>> = AHashMap::new();
        let mut input_rows = 0;
        while let Some(row) = self.input.next()? {
            input_rows += 1;
            match groups.entry(row.key(&self.grouping_indexes)) {
                Entry::Occupied(mut entry) => {
                    for (accumulator, spec) in entry.get_mut().iter_mut().zip(&self.specs) {
                        accumulator.update(spec, &row[spec.index])?;
                    }
                }
                Entry::Vacant(entry) => {
                    let accumulators = self.specs.iter()
                        .map(|spec| Accumulator::new(spec, &row[spec.index]))
                        .collect::<Result<Vec<_>>>()?;
                    entry.insert(accumulators);
                }
            }
        }
        close_input(self.input.as_mut())?;

        let mut rows = Vec::with_capacity(groups.len());
        for (key, accumulators) in groups {
            let mut values = key;
            for (accumulator, spec) in accumulators.into_iter().zip(&self.specs) {
                values.push(accumulator.finish(spec)?);
            }
            rows.push(Row::new(values));
        }
        debug!(input_rows, groups = rows.len(), "aggregate.open");
        self.rows = rows;
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        match self.rows.get_mut(self.position) {
            Some(row) => {
                self.position += 1;
                Ok(Some(std::mem::take(row)))
            }
            None => {
                self.lifecycle.exhaust();
                self.rows.clear();
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.close()?;
        self.rows.clear();
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
            "{}aggregate[grouping: [{}], aggregates: [{}], input:\n{}]",
            indent(indentation),
            self.grouping.iter().map(|c| &c.name).join(", "),
            self.specs.iter().map(|s| &s.name).join(", "),
            self.input.explain(indentation + 2)
        )
    }
}
