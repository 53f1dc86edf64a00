//! dbcnx - Main entry point.
//!
//! Runs a single read or write through the pooled client and prints the
//! result as JSON.

use clap::Parser;
use dbcnx::config::{Command, Config, OutputFormat};
use dbcnx::{DbError, DbResult, PoolDb, PoolRegistry, QueryParam};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only results
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> DbResult<()> {
    let out = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Pretty => serde_json::to_string_pretty(value),
    }
    .map_err(|e| DbError::internal(format!("Failed to encode result: {}", e)))?;
    println!("{}", out);
    Ok(())
}

fn parse_params(raw: &[String]) -> Vec<QueryParam> {
    raw.iter().map(|arg| QueryParam::from_cli_arg(arg)).collect()
}

async fn run(db: &PoolDb, command: &Command, output: OutputFormat) -> DbResult<()> {
    match command {
        Command::Read {
            sql,
            params,
            datatype,
        } => {
            let data = db.read_data(sql, &parse_params(params), datatype).await?;
            print_json(&data, output)
        }
        Command::Execute { sql, params } => {
            let rows_affected = db.execute_query(sql, &parse_params(params)).await?;
            print_json(&json!({ "rows_affected": rows_affected }), output)
        }
        Command::ExecuteMany { sql, values } => {
            let values: Vec<Vec<QueryParam>> = serde_json::from_str(values).map_err(|e| {
                DbError::invalid_input(format!(
                    "--values must be a JSON array of parameter arrays: {}",
                    e
                ))
            })?;
            let rows_affected = db.execute_many(sql, &values).await?;
            print_json(&json!({ "rows_affected": rows_affected }), output)
        }
    }
}

#[tokio::main]
async fn main() {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    info!(
        driver = %config.driver,
        pool_size = config.pool_size,
        "Starting dbcnx v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry: PoolRegistry = PoolRegistry::new();
    let db = PoolDb::new(&registry, config.setup(), Some(config.pool_size)).await;

    let result = run(&db, &config.command, config.output).await;

    if let Some(pool) = db.pool() {
        pool.close().await;
    }

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Error: {}\nSuggestion: {}", e, suggestion);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}
