// Ties the parts together into something that takes SQL text and hands back rows. Tables live
// in memory only, nothing survives the process.

use std::sync::Arc;

use tracing::info;

use crate::{
    analyzer::{Analyzer, Statement},
    catalog::MemoryCatalog,
    error::{QueryError, Result},
    execution::engine::{volcano_style::VolcanoEngine, ExecutionEngine, QueryResult},
    parser,
    row::Row,
    schema::{Schema, SchemaColumn},
    types::ValueType,
};

pub struct VolcanoDatabase {
    catalog: MemoryCatalog,
    analyzer: Analyzer,
    executor: VolcanoEngine,
}

impl Default for VolcanoDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl VolcanoDatabase {
    pub fn new() -> VolcanoDatabase {
        let catalog = MemoryCatalog::new();
        let analyzer = Analyzer::new(Arc::new(catalog.clone()));
        let executor = VolcanoEngine::new(Arc::new(catalog.clone()));
        VolcanoDatabase { catalog, analyzer, executor }
    }

    /// Runs one statement. Statements that don't produce rows return an empty result whose
    /// schema describes what happened (`inserted` with the row count for INSERT).
    pub fn query(&self, query: &str) -> Result<QueryResult> {
        let parse_tree = parser::parse_query(query)?;
        match self.analyzer.analyze(&parse_tree)? {
            Statement::Select(plan) => self.executor.execute(&plan),
            Statement::Insert { table, rows } => {
                let inserted = self.insert(&table, rows)?;
                Ok(QueryResult {
                    schema: Schema::from_pairs([("inserted", ValueType::Int)]),
                    rows: vec![crate::row![inserted as i64]],
                })
            }
            Statement::CreateTable { name, columns } => {
                self.create_table(&name, columns)?;
                Ok(QueryResult::default())
            }
        }
    }

    pub fn explain(&self, query: &str) -> Result<String> {
        let parse_tree = parser::parse_query(query)?;
        match self.analyzer.analyze(&parse_tree)? {
            Statement::Select(plan) => self.executor.explain(&plan),
            _ => Err(QueryError::InvalidQuery("only SELECT statements can be explained".to_string())),
        }
    }

    pub fn create_table(&self, name: &str, columns: Vec<SchemaColumn>) -> Result<()> {
        self.catalog.create_table(name, columns)?;
        Ok(())
    }

    pub fn insert(&self, table: &str, rows: Vec<Row>) -> Result<usize> {
        self.catalog.insert_rows(table, rows)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    pub fn table_schema(&self, name: &str) -> Option<Schema> {
        self.catalog.find_table_by_name(name).map(|t| t.schema)
    }

    pub fn demo_init(&self) -> Result<()> {
        self.query("CREATE TABLE people (id INT, name VARCHAR(255), age INT)")?;
        self.query("CREATE TABLE cars (id INT, model VARCHAR(255), owner_id INT)")?;
        self.query(
            "INSERT INTO people VALUES (1, 'Elon', 51), (2, 'Marty McFly', 17), \
             (3, 'Dr. Emmett L. Brown', 65), (4, 'Biff Tannen', 17)"
        )?;
        self.query(
            "INSERT INTO cars VALUES (1, 'Tesla Model 3', 1), (2, 'DeLorean DMC-12', 3), \
             (3, 'Cybertruck', 1), (4, 'Ford Super De Luxe', 4)"
        )?;
        info!(tables = ?self.table_names(), "database.demo_init");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{row, types::Value};

    use super::*;

    fn get_demo_database() -> VolcanoDatabase {
        let db = VolcanoDatabase::new();
        db.demo_init().unwrap();
        db
    }

    fn rows(db: &VolcanoDatabase, query: &str) -> Vec<Row> {
        db.query(query).unwrap().rows
    }

    #[test]
    fn test_demo_tables() {
        let db = get_demo_database();
        assert_eq!(db.table_names(), vec!["cars".to_string(), "people".to_string()]);
        assert_eq!(db.query("SELECT * FROM people").unwrap().len(), 4);
        assert!(matches!(db.demo_init(), Err(QueryError::TableAlreadyExists(_))));
    }

    #[test]
    fn test_filter_order_limit() {
        let db = get_demo_database();
        assert_eq!(
            rows(&db, "SELECT name FROM people WHERE age >= 18 ORDER BY age DESC LIMIT 1"),
            vec![row!["Dr. Emmett L. Brown"]]
        );
        assert!(rows(&db, "SELECT id FROM people WHERE age > 100").is_empty());
    }

    #[test]
    fn test_predicates() {
        let db = get_demo_database();
        assert_eq!(rows(&db, "SELECT id FROM people WHERE age BETWEEN 17 AND 51 ORDER BY id"), vec![
            row![1], row![2], row![4],
        ]);
        assert_eq!(rows(&db, "SELECT id FROM people WHERE id IN (4, 2, 9) ORDER BY id"), vec![row![2], row![4]]);
        assert_eq!(rows(&db, "SELECT id FROM people WHERE name LIKE '%Brown'"), vec![row![3]]);
        assert_eq!(rows(&db, "SELECT id FROM people WHERE age <> 17 ORDER BY id DESC"), vec![row![3], row![1]]);
    }

    #[test]
    fn test_join_group_by() {
        let db = get_demo_database();
        let result = db.query(
            "SELECT p.name, COUNT(c.model) FROM people p JOIN cars c ON p.id = c.owner_id \
             GROUP BY p.name ORDER BY COUNT(c.model) DESC, p.name"
        ).unwrap();
        assert_eq!(result.schema.column_names().collect::<Vec<_>>(), vec!["name", "COUNT(model)"]);
        assert_eq!(result.rows, vec![
            row!["Elon", 2],
            row!["Biff Tannen", 1],
            row!["Dr. Emmett L. Brown", 1],
        ]);
    }

    #[test]
    fn test_distinct_and_aggregates() {
        let db = get_demo_database();
        assert_eq!(rows(&db, "SELECT DISTINCT age FROM people ORDER BY age"), vec![row![17], row![51], row![65]]);
        assert_eq!(
            rows(&db, "SELECT COUNT(id), SUM(age), AVG(age), MIN(name), MAX(age) FROM people"),
            vec![Row::new(vec![
                Value::Int(4),
                Value::Float(150.0),
                Value::Float(37.5),
                Value::Text("Biff Tannen".to_string()),
                Value::Int(65),
            ])]
        );
    }

    #[test]
    fn test_insert_and_create() {
        let db = VolcanoDatabase::new();
        assert_eq!(db.query("CREATE TABLE t (a INT, b DOUBLE)").unwrap(), QueryResult::default());
        assert_eq!(rows(&db, "INSERT INTO t VALUES (1, 2), (3, 4.5)"), vec![row![2]]);
        // ints are widened to the column type on insert
        assert_eq!(rows(&db, "SELECT b FROM t"), vec![row![2.0], row![4.5]]);
        assert!(matches!(db.query("INSERT INTO t VALUES (1)"), Err(QueryError::SchemaArityMismatch { .. })));
        assert!(matches!(db.query("INSERT INTO t VALUES ('x', 1)"), Err(QueryError::ValueNotConvertible { .. })));
        assert_eq!(
            db.table_schema("t").map(|s| s.column_names().map(str::to_string).collect::<Vec<_>>()),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_explain() {
        let db = get_demo_database();
        assert_eq!(
            db.explain("SELECT name FROM people WHERE age > 20 LIMIT 2").unwrap(),
            "limit[limit: 2, input:\n  project[columns: [name], input:\n    filter[column: age, op: >, value: 20, input:\n      scan[table: people]]]]"
        );
        assert!(matches!(db.explain("CREATE TABLE x (a INT)"), Err(QueryError::InvalidQuery(_))));
    }

    #[test]
    fn test_errors() {
        let db = get_demo_database();
        assert!(matches!(db.query("SELEC * FROM people"), Err(QueryError::Parse(_))));
        assert!(matches!(db.query("SELECT * FROM planes"), Err(QueryError::UnresolvedTable(_))));
        assert!(matches!(db.query("SELECT height FROM people"), Err(QueryError::ColumnNotFound { .. })));
        assert!(matches!(db.query("SELECT * FROM people WHERE name > 3"), Err(QueryError::ValueNotConvertible { .. })));
    }
}
