pub mod error;
pub mod types;
pub mod row;
pub mod schema;
pub mod catalog;
pub mod execution;
pub mod parser;
pub mod analyzer;
pub mod config;
pub mod database;

pub use database::VolcanoDatabase;
pub use error::{QueryError, Result};
