use std::{fmt::Display, sync::Arc};

use tracing::debug;

use crate::{
    catalog::Catalog,
    error::{QueryError, Result},
    execution::plan::QueryPlan,
    row::Row,
    schema::{ColumnDesc, Schema},
};

use super::{ExecutionEngine, QueryResult};

mod aggregate;
mod distinct;
mod filter;
mod hash_join;
mod limit;
mod project;
mod scan;
mod sort;

pub use aggregate::Aggregate;
pub use distinct::Distinct;
pub use filter::Filter;
pub use hash_join::HashJoin;
pub use limit::Limit;
pub use project::Project;
pub use scan::Scan;
pub use sort::Sort;

/*
    Pull based (volcano style) operators. A parent drives its children through

        open -> next* -> close

    `next` hands out one row at a time and `Ok(None)` once the stream is over. Every operator
    tracks where it is in that protocol and refuses calls that are out of order instead of
    returning garbage. Operators that detect the end of their input close the input right away,
    so a parent only closes children that are still open.
 */
pub trait Operator {
    fn open(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<Row>>;
    fn close(&mut self) -> Result<()>;
    fn output_schema(&self) -> &Schema;
    fn state(&self) -> OperatorState;
    fn explain(&self, indentation: usize) -> String;
}

pub type BoxedOperator = Box<dyn Operator>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Constructed,
    Open,
    Exhausted,
    Closed,
}

impl Display for OperatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorState::Constructed => write!(f, "constructed"),
            OperatorState::Open => write!(f, "open"),
            OperatorState::Exhausted => write!(f, "exhausted"),
            OperatorState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    operator: &'static str,
    state: OperatorState,
}

impl Lifecycle {
    pub(crate) fn new(operator: &'static str) -> Self {
        Lifecycle { operator, state: OperatorState::Constructed }
    }

    pub(crate) fn state(&self) -> OperatorState {
        self.state
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        match self.state {
            OperatorState::Constructed => {
                self.state = OperatorState::Open;
                Ok(())
            }
            _ => Err(self.violation("open")),
        }
    }

    /// Whether a call to `next` may still produce rows. Fails outside of open/exhausted.
    pub(crate) fn has_next(&self) -> Result<bool> {
        match self.state {
            OperatorState::Open => Ok(true),
            OperatorState::Exhausted => Ok(false),
            _ => Err(self.violation("next")),
        }
    }

    pub(crate) fn exhaust(&mut self) {
        if self.state == OperatorState::Open {
            self.state = OperatorState::Exhausted;
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        match self.state {
            OperatorState::Open | OperatorState::Exhausted => {
                self.state = OperatorState::Closed;
                Ok(())
            }
            _ => Err(self.violation("close")),
        }
    }

    fn violation(&self, action: &'static str) -> QueryError {
        QueryError::InvalidOperatorState { operator: self.operator, action, state: self.state.to_string() }
    }
}

/// Closes `input` unless it already closed itself.
pub(crate) fn close_input(input: &mut dyn Operator) -> Result<()> {
    match input.state() {
        OperatorState::Closed => Ok(()),
        _ => input.close(),
    }
}

pub(crate) fn indent(indentation: usize) -> String {
    " ".repeat(indentation)
}

pub(crate) fn explain_columns(columns: &[String]) -> String {
    format!("[{}]", columns.join(", "))
}

/// Drives a complete operator tree: opens the root, pulls every row and closes it again.
pub fn collect_rows(mut root: BoxedOperator) -> Result<QueryResult> {
    root.open()?;
    let mut rows = Vec::new();
    while let Some(row) = root.next()? {
        rows.push(row);
    }
    root.close()?;
    Ok(QueryResult { schema: root.output_schema().clone(), rows })
}

pub struct VolcanoEngine {
    catalog: Arc<dyn Catalog>,
}

impl VolcanoEngine {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        VolcanoEngine { catalog }
    }

    /// Composes the operator tree for `plan`. All names are resolved here, so a plan that
    /// builds only fails during execution on values it can't compare.
    pub fn build(&self, plan: &QueryPlan) -> Result<BoxedOperator> {
        let mut root: BoxedOperator = match (plan.tables.as_slice(), &plan.join) {
            ([table], None) => Box::new(Scan::new(self.catalog.clone(), table)?),
            ([_], Some(_)) => {
                return Err(QueryError::UnsupportedJoinShape("a join condition needs two tables".to_string()));
            }
            ([left, right], Some(join)) => Box::new(HashJoin::new(
                Box::new(Scan::new(self.catalog.clone(), left)?),
                Box::new(Scan::new(self.catalog.clone(), right)?),
                join.left_columns.clone(),
                join.right_columns.clone(),
            )?),
            ([_, _], None) => {
                return Err(QueryError::UnsupportedJoinShape("two tables without an equi-join condition".to_string()));
            }
            ([], _) => return Err(QueryError::InvalidQuery("no table to read from".to_string())),
            (tables, _) => {
                return Err(QueryError::UnsupportedJoinShape(
                    format!("{} tables referenced, at most two are supported", tables.len())
                ));
            }
        };

        if let Some(filter) = &plan.filter {
            root = Box::new(Filter::new(root, &filter.column, filter.op, filter.operand.clone())?);
        }
        if !plan.grouping.is_empty() || plan.has_aggregates() {
            let grouping = plan.grouping.iter()
                .map(|name| Ok(ColumnDesc::grouping(name.clone(), root.output_schema().column_type(name)?)))
                .collect::<Result<Vec<_>>>()?;
            let aggregates = plan.columns.iter().filter(|c| c.aggregate.is_some()).cloned().collect();
            root = Box::new(Aggregate::new(root, grouping, aggregates)?);
        }
        if let Some(order_by) = &plan.order_by {
            root = Box::new(Sort::new(root, order_by.columns.clone(), order_by.directions.clone())?);
        }
        if plan.distinct {
            let columns = plan.columns.iter().map(ColumnDesc::output_name).collect();
            root = Box::new(Distinct::new(root, columns)?);
        }
        if !plan.columns.is_empty() {
            root = Box::new(Project::new(root, plan.columns.clone())?);
        }
        if let Some(limit) = plan.limit {
            root = Box::new(Limit::new(root, limit));
        }
        Ok(root)
    }
}

impl ExecutionEngine for VolcanoEngine {
    fn execute(&self, plan: &QueryPlan) -> Result<QueryResult> {
        let root = self.build(plan)?;
        debug!(plan = %root.explain(0), "engine.execute");
        let result = collect_rows(root)?;
        debug!(rows = result.rows.len(), "engine.finished");
        Ok(result)
    }

    fn explain(&self, plan: &QueryPlan) -> Result<String> {
        Ok(self.build(plan)?.explain(0))
    }
}


#[cfg(test)]
mod test {
    use crate::{
        catalog::MemoryCatalog,
        execution::{plan::SortDirection, predicate::{FilterOp, Operand}},
        row,
        schema::{AggregateFunction, SchemaColumn},
        types::{Value, ValueType},
    };

    use super::{mock::MockSourceOperator, *};

    fn get_test_catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog.create_table("people", vec![
            SchemaColumn::new("id", ValueType::Int),
            SchemaColumn::new("name", ValueType::Text),
            SchemaColumn::new("age", ValueType::Int),
        ]).unwrap();
        catalog.create_table("cars", vec![
            SchemaColumn::new("owner", ValueType::Int),
            SchemaColumn::new("model", ValueType::Text),
        ]).unwrap();
        catalog.insert_rows("people", vec![
            row![1, "Elon", 51],
            row![2, "Marty", 17],
            row![3, "Doc", 65],
            row![4, "Biff", 17],
        ]).unwrap();
        catalog.insert_rows("cars", vec![
            row![2, "DeLorean"],
            row![1, "Model S"],
            row![3, "DeLorean"],
            row![1, "Cybertruck"],
        ]).unwrap();
        catalog
    }

    fn get_test_engine() -> VolcanoEngine {
        VolcanoEngine::new(Arc::new(get_test_catalog()))
    }

    #[test]
    fn test_lifecycle() {
        let mut lifecycle = Lifecycle::new("test");
        assert!(matches!(lifecycle.has_next(), Err(QueryError::InvalidOperatorState { action: "next", .. })));
        assert!(matches!(lifecycle.close(), Err(QueryError::InvalidOperatorState { action: "close", .. })));
        lifecycle.open().unwrap();
        assert!(matches!(lifecycle.open(), Err(QueryError::InvalidOperatorState { action: "open", .. })));
        assert_eq!(lifecycle.has_next(), Ok(true));
        lifecycle.exhaust();
        assert_eq!(lifecycle.has_next(), Ok(false));
        lifecycle.close().unwrap();
        assert_eq!(lifecycle.state(), OperatorState::Closed);
        assert!(matches!(lifecycle.has_next(), Err(QueryError::InvalidOperatorState { action: "next", .. })));
        assert!(lifecycle.close().is_err());
        // exhaustion never reopens a closed operator
        lifecycle.exhaust();
        assert_eq!(lifecycle.state(), OperatorState::Closed);
    }

    #[test]
    fn test_close_input_once() {
        let mut source = MockSourceOperator::new(Schema::default(), vec![]);
        let closes = source.closes();
        source.open().unwrap();
        close_input(&mut source).unwrap();
        close_input(&mut source).unwrap();
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_collect_rows() {
        let schema = Schema::from_pairs([("a", ValueType::Int)]);
        let result = collect_rows(MockSourceOperator::boxed(schema.clone(), vec![row![1], row![2]])).unwrap();
        assert_eq!(result, QueryResult { schema, rows: vec![row![1], row![2]] });
    }

    #[test]
    fn test_execute_full_pipeline() {
        let engine = get_test_engine();
        let plan = QueryPlan::scan("people")
            .with_filter("age", FilterOp::Lt, Operand::Scalar(Value::Int(60)))
            .with_order_by([("age", SortDirection::Desc), ("name", SortDirection::Asc)])
            .with_columns(vec![ColumnDesc::column("name", ValueType::Text)])
            .with_limit(2);
        let result = engine.execute(&plan).unwrap();
        assert_eq!(result.schema, Schema::from_pairs([("name", ValueType::Text)]));
        assert_eq!(result.rows, vec![row!["Elon"], row!["Biff"]]);
    }

    #[test]
    fn test_execute_join_with_aggregate() {
        let engine = get_test_engine();
        let plan = QueryPlan::join("people", "cars", ["id"], ["owner"])
            .with_grouping(["name"])
            .with_columns(vec![
                ColumnDesc::grouping("name", ValueType::Text),
                ColumnDesc::aggregate(AggregateFunction::Count, "model", ValueType::Text),
            ])
            .with_order_by([("COUNT(model)", SortDirection::Desc), ("name", SortDirection::Asc)]);
        let result = engine.execute(&plan).unwrap();
        assert_eq!(result.schema, Schema::from_pairs([("name", ValueType::Text), ("COUNT(model)", ValueType::Int)]));
        assert_eq!(result.rows, vec![row!["Elon", 2], row!["Doc", 1], row!["Marty", 1]]);
    }

    #[test]
    fn test_execute_distinct_projection() {
        let engine = get_test_engine();
        let plan = QueryPlan::scan("cars")
            .with_columns(vec![ColumnDesc::column("model", ValueType::Text)])
            .with_distinct();
        let result = engine.execute(&plan).unwrap();
        assert_eq!(result.rows, vec![row!["DeLorean"], row!["Model S"], row!["Cybertruck"]]);
    }

    #[test]
    fn test_global_aggregate() {
        let engine = get_test_engine();
        let plan = QueryPlan::scan("people").with_columns(vec![
            ColumnDesc::aggregate(AggregateFunction::Count, "id", ValueType::Int),
            ColumnDesc::aggregate(AggregateFunction::Max, "age", ValueType::Int),
        ]);
        assert_eq!(engine.execute(&plan).unwrap().rows, vec![row![4, 65]]);

        // no rows, no groups
        let empty = plan.with_filter("age", FilterOp::Gt, Operand::Scalar(Value::Int(100)));
        assert!(engine.execute(&empty).unwrap().rows.is_empty());
    }

    #[test]
    fn test_unsupported_shapes() {
        let engine = get_test_engine();
        let mut plan = QueryPlan::scan("people");
        plan.tables.push("cars".to_string());
        assert!(matches!(engine.execute(&plan), Err(QueryError::UnsupportedJoinShape(_))));

        plan.tables.push("people".to_string());
        assert!(matches!(engine.execute(&plan), Err(QueryError::UnsupportedJoinShape(_))));

        let mut plan = QueryPlan::join("people", "cars", ["id"], ["owner"]);
        plan.tables.pop();
        assert!(matches!(engine.execute(&plan), Err(QueryError::UnsupportedJoinShape(_))));

        assert!(matches!(engine.execute(&QueryPlan::default()), Err(QueryError::InvalidQuery(_))));
        assert_eq!(
            engine.execute(&QueryPlan::scan("planes")),
            Err(QueryError::UnresolvedTable("planes".to_string()))
        );
    }

    #[test]
    fn test_construction_errors_surface_before_execution() {
        let engine = get_test_engine();
        let plan = QueryPlan::scan("people").with_filter("height", FilterOp::Eq, Operand::Scalar(Value::Int(1)));
        assert!(matches!(engine.build(&plan), Err(QueryError::ColumnNotFound { .. })));

        let plan = QueryPlan::scan("people").with_order_by([("height", SortDirection::Asc)]);
        assert!(matches!(engine.build(&plan), Err(QueryError::ColumnNotFound { .. })));

        let plan = QueryPlan::scan("people").with_columns(vec![
            ColumnDesc::aggregate(AggregateFunction::Sum, "name", ValueType::Text),
        ]);
        assert!(matches!(engine.build(&plan), Err(QueryError::InvalidAggregateInput { .. })));
    }

    #[test]
    fn test_explain() {
        let engine = get_test_engine();
        let plan = QueryPlan::join("people", "cars", ["id"], ["owner"])
            .with_filter("model", FilterOp::Eq, Operand::Scalar(Value::from("DeLorean")))
            .with_columns(vec![ColumnDesc::column("name", ValueType::Text)])
            .with_limit(1);
        let expected = "\
limit[limit: 1, input:
  project[columns: [name], input:
    filter[column: model, op: =, value: \"DeLorean\", input:
      join[left_columns: [id], right_columns: [owner], left:
        scan[table: people]
      , right:
        scan[table: cars]]]]]";
        assert_eq!(engine.explain(&plan).unwrap(), expected);
    }
}
