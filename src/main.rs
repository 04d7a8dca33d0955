use rustyline::{error::ReadlineError, DefaultEditor};
use tracing_subscriber::EnvFilter;

use volcano_sql::{config::{EngineConfig, LOG_VAR}, VolcanoDatabase};

fn main() -> rustyline::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::new();
    let db = VolcanoDatabase::new();
    if config.demo_tables {
        if let Err(e) = db.demo_init() {
            eprintln!("Could not load the demo tables: {}", e);
        }
    }

    println!("volcano_sql - pull based SQL engine");
    println!("End statements with ;  Commands: .tables, .schema <table>, .quit");
    println!("Prefix a SELECT with 'explain' to see its operator tree.\n");

    let mut rl = DefaultEditor::new()?;
    if let Some(path) = &config.history_file {
        if path.exists() {
            let _ = rl.load_history(path);
        }
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "sql> " } else { "...> " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        };
        let trimmed = line.trim();
        if buffer.is_empty() && trimmed.starts_with('.') {
            let _ = rl.add_history_entry(trimmed);
            if !run_command(&db, trimmed) {
                break;
            }
            continue;
        }

        buffer.push_str(&line);
        buffer.push('\n');
        if !trimmed.ends_with(';') {
            continue;
        }
        let statement = std::mem::take(&mut buffer);
        let statement = statement.trim();
        let _ = rl.add_history_entry(statement);
        run_statement(&db, &config, statement);
    }

    if let Some(path) = &config.history_file {
        if let Err(e) = rl.save_history(path) {
            eprintln!("Could not save history to {}: {}", path.display(), e);
        }
    }
    Ok(())
}

// Returns false when the shell should exit
fn run_command(db: &VolcanoDatabase, command: &str) -> bool {
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(".quit") | Some(".exit"), _) => return false,
        (Some(".tables"), _) => {
            for table in db.table_names() {
                println!("{}", table);
            }
        }
        (Some(".schema"), Some(table)) => match db.table_schema(table) {
            Some(schema) => println!("{} {}", table, schema),
            None => eprintln!("Error: table '{}' does not exist", table),
        },
        _ => eprintln!("Unknown command '{}'", command),
    }
    true
}

fn run_statement(db: &VolcanoDatabase, config: &EngineConfig, statement: &str) {
    let explain_only = statement.get(..8).map_or(false, |prefix| prefix.eq_ignore_ascii_case("explain "));
    if explain_only {
        match db.explain(&statement[8..]) {
            Ok(plan) => println!("{}\n", plan),
            Err(e) => eprintln!("Error: {}\n", e),
        }
        return;
    }
    if config.explain {
        // Only SELECTs have an operator tree, everything else just runs
        if let Ok(plan) = db.explain(statement) {
            println!("{}\n", plan);
        }
    }
    match db.query(statement) {
        Ok(result) if result.schema.is_empty() => println!("OK\n"),
        Ok(result) => println!("{}\n", result),
        Err(e) => eprintln!("Error: {}\n", e),
    }
}
