use std::sync::Arc;

use tracing::trace;

use crate::{catalog::{Catalog, RowStream}, error::{QueryError, Result}, row::Row, schema::Schema};

use super::{indent, Lifecycle, Operator, OperatorState};

/// Leaf operator reading one table. The schema is fixed when the scan is built, the rows are
/// fetched from the catalog anew on every open.
pub struct Scan {
    catalog: Arc<dyn Catalog>,
    table: String,
    schema: Schema,
    rows: Option<RowStream>,
    lifecycle: Lifecycle,
}

impl Scan {
    pub fn new(catalog: Arc<dyn Catalog>, table: &str) -> Result<Self> {
        let schema = catalog.table_schema(table)?;
        Ok(Scan { catalog, table: table.to_string(), schema, rows: None, lifecycle: Lifecycle::new("scan") })
    }
}

impl Operator for Scan {
    fn open(&mut self) -> Result<()> {
        self.lifecycle.open()?;
        self.rows = Some(self.catalog.scan_table(&self.table)?);
        trace!(table = %self.table, "scan.open");
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.lifecycle.has_next()? {
            return Ok(None);
        }
        match self.rows.as_mut().and_then(|rows| rows.next()) {
            Some(row) if row.len() != self.schema.len() => {
                Err(QueryError::SchemaArityMismatch { expected: self.schema.len(), actual: row.len() })
            }
            Some(row) => Ok(Some(row)),
            None => {
                self.rows = None;
                self.lifecycle.exhaust();
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.lifecycle.close()?;
        self.rows = None;
        Ok(())
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }

    fn state(&self) -> OperatorState {
        self.lifecycle.state()
    }

    fn explain(&self, indentation: usize) -> String {
        format!("{}scan[table: {}]", indent(indentation), self.table)
    }
}
