use std::{collections::BTreeMap, sync::Arc};

#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use tracing::debug;

use crate::{error::{QueryError, Result}, row::Row, schema::{Schema, SchemaColumn}};

pub type RowStream = Box<dyn Iterator<Item = Row>>;

/*
    The catalog is the only way the execution engine gets at data. It hands out the (fixed)
    schema of a table and a fresh row stream per scan. Scans don't keep anything alive between
    opens, so a table may well grow between two executions of the same operator tree.
 */
#[cfg_attr(test, automock)]
pub trait Catalog {
    fn table_schema(&self, name: &str) -> Result<Schema>;
    fn scan_table(&self, name: &str) -> Result<RowStream>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDesc {
    pub name: String,
    pub schema: Schema,
}

struct TableEntry {
    desc: TableDesc,
    // Copy on write. Scans hold on to the snapshot they started with.
    rows: Arc<Vec<Row>>,
}

/// Iterates a snapshot of a table's rows.
pub struct SnapshotScan {
    rows: Arc<Vec<Row>>,
    position: usize,
}

impl Iterator for SnapshotScan {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.get(self.position)?.clone();
        self.position += 1;
        Some(row)
    }
}

#[derive(Clone, Default)]
pub struct MemoryCatalog {
    cache: Arc<CatalogCache>,
}

#[derive(Default)]
struct CatalogCache {
    tables: RwLock<BTreeMap<String, TableEntry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: Vec<SchemaColumn>) -> Result<TableDesc> {
        let mut tables = self.cache.tables.write();
        if tables.contains_key(name) {
            return Err(QueryError::TableAlreadyExists(name.to_string()));
        }
        let desc = TableDesc { name: name.to_string(), schema: Schema::new(columns) };
        debug!(table = name, schema = %desc.schema, "catalog.create_table");
        tables.insert(name.to_string(), TableEntry { desc: desc.clone(), rows: Arc::new(Vec::new()) });
        Ok(desc)
    }

    pub fn find_table_by_name(&self, name: &str) -> Option<TableDesc> {
        self.cache.tables.read().get(name).map(|t| t.desc.clone())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.cache.tables.read().keys().cloned().collect()
    }

    /// Appends rows to a table. Every row is checked against the table schema and its values
    /// are normalized to the declared column types; nothing is inserted if one row is bad.
    pub fn insert_rows(&self, name: &str, rows: Vec<Row>) -> Result<usize> {
        let mut tables = self.cache.tables.write();
        let table = tables.get_mut(name).ok_or_else(|| QueryError::UnresolvedTable(name.to_string()))?;
        let schema = &table.desc.schema;
        let mut normalized = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != schema.len() {
                return Err(QueryError::SchemaArityMismatch { expected: schema.len(), actual: row.len() });
            }
            let values = row.into_values().into_iter()
                .zip(schema.columns())
                .map(|(value, column)| column.value_type.coerce(value))
                .collect::<Result<Vec<_>>>()?;
            normalized.push(Row::new(values));
        }
        let inserted = normalized.len();
        Arc::make_mut(&mut table.rows).extend(normalized);
        debug!(table = name, inserted, total = table.rows.len(), "catalog.insert_rows");
        Ok(inserted)
    }
}

impl Catalog for MemoryCatalog {
    fn table_schema(&self, name: &str) -> Result<Schema> {
        self.find_table_by_name(name)
            .map(|t| t.schema)
            .ok_or_else(|| QueryError::UnresolvedTable(name.to_string()))
    }

    fn scan_table(&self, name: &str) -> Result<RowStream> {
        let tables = self.cache.tables.read();
        let table = tables.get(name).ok_or_else(|| QueryError::UnresolvedTable(name.to_string()))?;
        Ok(Box::new(SnapshotScan { rows: table.rows.clone(), position: 0 }))
    }
}

#[cfg(test)]
mod test {
    use crate::{row, types::{Value, ValueType}};

    use super::*;

    fn get_test_catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog.create_table("people", vec![
            SchemaColumn::new("id", ValueType::Int),
            SchemaColumn::new("name", ValueType::Text),
            SchemaColumn::new("score", ValueType::Float),
        ]).unwrap();
        catalog
    }

    #[test]
    fn test_create_and_find() {
        let catalog = get_test_catalog();
        let desc = catalog.find_table_by_name("people").unwrap();
        assert_eq!(desc.schema.len(), 3);
        assert_eq!(catalog.table_names(), vec!["people".to_string()]);
        assert_eq!(
            catalog.create_table("people", vec![]),
            Err(QueryError::TableAlreadyExists("people".to_string()))
        );
    }

    #[test]
    fn test_unresolved_table() {
        let catalog = get_test_catalog();
        assert_eq!(catalog.table_schema("cars"), Err(QueryError::UnresolvedTable("cars".to_string())));
        assert!(matches!(catalog.scan_table("cars"), Err(QueryError::UnresolvedTable(_))));
        assert!(matches!(catalog.insert_rows("cars", vec![]), Err(QueryError::UnresolvedTable(_))));
    }

    #[test]
    fn test_insert_normalizes_values() {
        let catalog = get_test_catalog();
        // the score arrives as an integer and gets widened
        catalog.insert_rows("people", vec![row![1, "Elon", 3]]).unwrap();
        let rows: Vec<Row> = catalog.scan_table("people").unwrap().collect();
        assert_eq!(rows, vec![row![1, "Elon", 3.0]]);
        assert_eq!(rows[0][2], Value::Float(3.0));
    }

    #[test]
    fn test_insert_rejects_bad_rows() {
        let catalog = get_test_catalog();
        assert_eq!(
            catalog.insert_rows("people", vec![row![1, "Elon", 1.0], row![2, "Marty"]]),
            Err(QueryError::SchemaArityMismatch { expected: 3, actual: 2 })
        );
        assert!(matches!(
            catalog.insert_rows("people", vec![row!["one", "Elon", 1.0]]),
            Err(QueryError::ValueNotConvertible { target: ValueType::Int, .. })
        ));
        // all or nothing
        assert_eq!(catalog.scan_table("people").unwrap().count(), 0);
    }

    #[test]
    fn test_scan_is_a_snapshot() {
        let catalog = get_test_catalog();
        catalog.insert_rows("people", vec![row![1, "Elon", 1.0]]).unwrap();
        let scan = catalog.scan_table("people").unwrap();
        catalog.insert_rows("people", vec![row![2, "Marty", 2.0]]).unwrap();
        assert_eq!(scan.count(), 1);
        assert_eq!(catalog.scan_table("people").unwrap().count(), 2);
    }
}
