use std::path::PathBuf;

use tracing::warn;

pub const EXPLAIN_VAR: &str = "VOLCANO_SQL_EXPLAIN";
pub const HISTORY_VAR: &str = "VOLCANO_SQL_HISTORY";
pub const DEMO_VAR: &str = "VOLCANO_SQL_DEMO";
pub const LOG_VAR: &str = "VOLCANO_SQL_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    // print the operator tree before every result
    pub explain: bool,
    pub history_file: Option<PathBuf>,
    // load the people/cars demo tables on startup
    pub demo_tables: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { explain: false, history_file: None, demo_tables: true }
    }
}

impl EngineConfig {
    pub fn new() -> EngineConfig {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from a variable lookup. Unset or malformed variables fall back to the
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
        let defaults = EngineConfig::default();
        let explain = match lookup(EXPLAIN_VAR) {
            Some(val) => parse_flag(EXPLAIN_VAR, &val).unwrap_or(defaults.explain),
            None => defaults.explain,
        };
        let demo_tables = match lookup(DEMO_VAR) {
            Some(val) => parse_flag(DEMO_VAR, &val).unwrap_or(defaults.demo_tables),
            None => defaults.demo_tables,
        };
        let history_file = lookup(HISTORY_VAR)
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from);
        EngineConfig { explain, history_file, demo_tables }
    }
}

fn parse_flag(name: &str, val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(variable = name, value = val, "config.ignored_value");
            None
        }
    }
}
