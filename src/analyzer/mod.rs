use std::sync::Arc;

use crate::{
    catalog::Catalog,
    error::{QueryError, Result},
    execution::{
        plan::{FilterSpec, JoinSpec, QueryPlan, SortSpec},
        predicate::{FilterOp, Operand},
    },
    parser::{
        BoundParseAttribute, BoundParseTable, CreateTableParseTree, InsertParseTree, ParseOperand, ParseTree,
        ParseWhereClause, SelectItem, SelectParseTree,
    },
    row::Row,
    schema::{AggregateFunction, ColumnDesc, Schema, SchemaColumn},
    types::{Value, ValueType},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(QueryPlan),
    Insert { table: String, rows: Vec<Row> },
    CreateTable { name: String, columns: Vec<SchemaColumn> },
}

// A table of the FROM clause together with the name its columns are qualified with
struct BoundTable<'a> {
    binding: &'a str,
    schema: Schema,
}

// A column reference resolved to the table it belongs to
struct BoundColumn {
    table: usize,
    name: String,
    value_type: ValueType,
}

/// Binds parse trees against the catalog. Everything a query references is checked here, so
/// the plans handed to the engine only contain names that exist.
pub struct Analyzer {
    catalog: Arc<dyn Catalog>,
}

impl Analyzer {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Analyzer { catalog }
    }

    pub fn analyze(&self, parse_tree: &ParseTree) -> Result<Statement> {
        match parse_tree {
            ParseTree::Select(select) => self.analyze_select(select).map(Statement::Select),
            ParseTree::Insert(insert) => self.analyze_insert(insert),
            ParseTree::CreateTable(create) => self.analyze_create_table(create),
        }
    }

    fn analyze_insert(&self, insert: &InsertParseTree) -> Result<Statement> {
        // Fails for unknown tables. Arity and types are checked by the catalog on insert.
        self.catalog.table_schema(insert.table)?;
        Ok(Statement::Insert {
            table: insert.table.to_string(),
            rows: insert.rows.iter().cloned().map(Row::new).collect(),
        })
    }

    fn analyze_create_table(&self, create: &CreateTableParseTree) -> Result<Statement> {
        for (i, (name, _)) in create.columns.iter().enumerate() {
            if create.columns[..i].iter().any(|(other, _)| other == name) {
                return Err(QueryError::InvalidQuery(format!("column '{}' is defined twice", name)));
            }
        }
        Ok(Statement::CreateTable {
            name: create.name.to_string(),
            columns: create.columns.iter().map(|(name, t)| SchemaColumn::new(*name, *t)).collect(),
        })
    }

    pub fn analyze_select(&self, select: &SelectParseTree) -> Result<QueryPlan> {
        let tables = self.bind_tables(select)?;
        let mut plan = QueryPlan {
            tables: std::iter::once(select.from_table.name)
                .chain(select.join.iter().map(|j| j.table.name))
                .map(str::to_string)
                .collect(),
            distinct: select.distinct,
            limit: select.limit,
            ..Default::default()
        };

        let mut join_keys = Vec::new();
        if let Some(join) = &select.join {
            let mut left_columns = Vec::with_capacity(join.on.len());
            let mut right_columns = Vec::with_capacity(join.on.len());
            for (a, b) in &join.on {
                let (a, b) = (resolve_column(&tables, a)?, resolve_column(&tables, b)?);
                let (left, right) = match (a.table, b.table) {
                    (0, 1) => (a, b),
                    (1, 0) => (b, a),
                    _ => {
                        return Err(QueryError::UnsupportedJoinShape(
                            "join conditions have to compare a column of each table".to_string()
                        ));
                    }
                };
                join_keys.push((left.name.clone(), right.name.clone()));
                left_columns.push(left.name);
                right_columns.push(right.name);
            }
            plan.join = Some(JoinSpec { left_columns, right_columns });
        }
        // Output columns are looked up by name, so a right column that shares its name with a
        // left column would silently read the left one. Only join keys are safe, they're equal.
        let check_shadowing = |column: &BoundColumn| -> Result<()> {
            let shadowed = column.table == 1
                && tables[0].schema.column_index(&column.name).is_ok()
                && !join_keys.iter().any(|(l, r)| l == &column.name && r == &column.name);
            if shadowed {
                return Err(QueryError::InvalidQuery(format!(
                    "column '{}.{}' is shadowed by '{}.{}' in the join output",
                    tables[1].binding, column.name, tables[0].binding, column.name
                )));
            }
            Ok(())
        };

        if let Some(where_clause) = &select.where_clause {
            let column = resolve_column(&tables, &where_clause.column)?;
            check_shadowing(&column)?;
            plan.filter = Some(bind_filter(where_clause, column)?);
        }

        for attribute in &select.group_by {
            let column = resolve_column(&tables, attribute)?;
            check_shadowing(&column)?;
            if !plan.grouping.contains(&column.name) {
                plan.grouping.push(column.name);
            }
        }

        if let Some(items) = &select.columns {
            for item in items {
                let (bound, column) = bind_select_item(&tables, item, &plan.grouping)?;
                check_shadowing(&bound)?;
                plan.columns.push(column);
            }
        }
        let aggregating = !plan.grouping.is_empty() || plan.has_aggregates();
        if aggregating {
            if select.columns.is_none() {
                return Err(QueryError::InvalidQuery("SELECT * cannot be combined with aggregation".to_string()));
            }
            if let Some(column) = plan.columns.iter().find(|c| c.aggregate.is_none() && !c.grouping) {
                return Err(QueryError::InvalidQuery(format!(
                    "column '{}' must appear in the GROUP BY clause or be used in an aggregate",
                    column.name
                )));
            }
        }

        if !select.order_by.is_empty() {
            let mut order_by = SortSpec::default();
            for (item, direction) in &select.order_by {
                let (bound, column) = bind_select_item(&tables, item, &plan.grouping)?;
                check_shadowing(&bound)?;
                let name = column.output_name();
                // Sorting happens after the aggregation, only its output columns are left
                if aggregating && !column.grouping && !plan.columns.iter().any(|c| c.output_name() == name) {
                    return Err(QueryError::InvalidQuery(
                        format!("ORDER BY {} requires it to be part of the aggregated output", name)
                    ));
                }
                order_by.columns.push(name);
                order_by.directions.push(*direction);
            }
            plan.order_by = Some(order_by);
        }
        Ok(plan)
    }

    fn bind_tables<'a>(&self, select: &SelectParseTree<'a>) -> Result<Vec<BoundTable<'a>>> {
        let parse_tables: Vec<&BoundParseTable<'a>> = std::iter::once(&select.from_table)
            .chain(select.join.iter().map(|j| &j.table))
            .collect();
        let mut tables: Vec<BoundTable<'a>> = Vec::with_capacity(parse_tables.len());
        for table in parse_tables {
            if tables.iter().any(|t| t.binding == table.binding_name()) {
                return Err(QueryError::InvalidQuery(
                    format!("table name '{}' is used more than once, use an alias", table.binding_name())
                ));
            }
            tables.push(BoundTable { binding: table.binding_name(), schema: self.catalog.table_schema(table.name)? });
        }
        Ok(tables)
    }
}

fn bind_select_item(tables: &[BoundTable], item: &SelectItem, grouping: &[String]) -> Result<(BoundColumn, ColumnDesc)> {
    match item {
        SelectItem::Column(attribute) => {
            let column = resolve_column(tables, attribute)?;
            let desc = if grouping.contains(&column.name) {
                ColumnDesc::grouping(column.name.clone(), column.value_type)
            } else {
                ColumnDesc::column(column.name.clone(), column.value_type)
            };
            Ok((column, desc))
        }
        SelectItem::Aggregate { function, argument } => {
            let function = function.parse::<AggregateFunction>()?;
            let column = resolve_column(tables, argument)?;
            let desc = ColumnDesc::aggregate(function, column.name.clone(), column.value_type);
            Ok((column, desc))
        }
    }
}

fn resolve_column(tables: &[BoundTable], attribute: &BoundParseAttribute) -> Result<BoundColumn> {
    let candidates: Vec<usize> = match attribute.binding {
        Some(binding) => {
            let table = tables.iter().position(|t| t.binding == binding).ok_or_else(|| {
                QueryError::InvalidQuery(format!("unknown table or alias '{}' in '{}'", binding, attribute))
            })?;
            vec![table]
        }
        None => (0..tables.len()).collect(),
    };
    let matches: Vec<usize> = candidates.into_iter()
        .filter(|&t| tables[t].schema.column_index(attribute.name).is_ok())
        .collect();
    match matches.as_slice() {
        [table] => Ok(BoundColumn {
            table: *table,
            name: attribute.name.to_string(),
            value_type: tables[*table].schema.column_type(attribute.name)?,
        }),
        [] => Err(QueryError::ColumnNotFound {
            column: attribute.to_string(),
            available: tables.iter()
                .flat_map(|t| t.schema.column_names().map(move |c| format!("{}.{}", t.binding, c)))
                .collect::<Vec<_>>()
                .join(", "),
        }),
        _ => Err(QueryError::InvalidQuery(format!("column reference '{}' is ambiguous", attribute))),
    }
}

fn bind_filter(where_clause: &ParseWhereClause, column: BoundColumn) -> Result<FilterSpec> {
    let coerce = |value: &Value| column.value_type.coerce(value.clone());
    let operand = match (&where_clause.op, &where_clause.operand) {
        // The pattern stays text whatever the column is, matching a number fails at run time
        (FilterOp::Like, ParseOperand::Scalar(pattern)) => Operand::Scalar(pattern.clone()),
        (_, ParseOperand::Scalar(value)) => Operand::Scalar(coerce(value)?),
        (_, ParseOperand::List(values)) => Operand::List(values.iter().map(coerce).collect::<Result<Vec<_>>>()?),
    };
    Ok(FilterSpec { column: column.name, op: where_clause.op, operand })
}
