pub mod engine;
pub mod plan;
pub mod predicate;
