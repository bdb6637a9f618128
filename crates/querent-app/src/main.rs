//! Querent application binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Open the configured database engine
//! 3. Build the storage exporter from `[storage]`
//! 4. Run the requested command and print JSON to stdout

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use querent_agent::{AgentError, QueryOrchestrator, QueryRequest, StaticGenerator};
use querent_core::config::QuerentConfig;
use querent_core::error::QuerentError;
use querent_core::safety::QueryGuard;
use querent_core::types::{BackendKind, EngineKind};
use querent_engine::{catalog, EngineRegistry, SqliteEngine};
use querent_export::build_exporter;
use tracing_subscriber::EnvFilter;

use cli::{expand_home, CliArgs, Command};

/// `RUST_LOG` wins over the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Register the engine named in `[database]`.
///
/// Only SQLite ships with the binary. Other engines need an external
/// driver registered through `SqlEngine`; without one, discovery reports
/// a connection error.
fn build_engines(config: &QuerentConfig) -> Result<EngineRegistry, AgentError> {
    let mut engines = EngineRegistry::new();
    let kind: EngineKind = config
        .database
        .engine
        .parse()
        .map_err(QuerentError::Config)?;
    match kind {
        EngineKind::Sqlite => {
            let path = expand_home(&config.database.path);
            let engine = SqliteEngine::open(&path, config.database.pool_size)
                .map_err(AgentError::Discovery)?;
            engines.register(Arc::new(engine));
            tracing::info!(path = %path.display(), "SQLite engine ready");
        }
        other => {
            tracing::warn!(engine = %other, "No driver bundled for engine");
        }
    }
    Ok(engines)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AgentError> {
    let text = serde_json::to_string_pretty(value).map_err(QuerentError::from)?;
    println!("{}", text);
    Ok(())
}

/// Write the default configuration, refusing to clobber an existing file.
fn init_config(path: &Path, force: bool) -> Result<(), AgentError> {
    if path.exists() && !force {
        return Err(QuerentError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ))
        .into());
    }
    QuerentConfig::default().save(path)?;
    print_json(&serde_json::json!({ "config": path.display().to_string() }))
}

async fn run(
    command: Command,
    config: QuerentConfig,
    config_file: &Path,
) -> Result<(), AgentError> {
    match command {
        Command::Init { force } => init_config(config_file, force)?,
        Command::Validate { sql } => {
            let guard = QueryGuard::new(&config.guard);
            let validated = guard.validate_sql(&sql)?;
            print_json(&serde_json::json!({
                "sql": validated.sql(),
                "limit_injected": validated.limit_injected(),
                "functions": validated.functions(),
            }))?;
        }
        Command::Schema { tables } => {
            let engines = build_engines(&config)?;
            let schema = catalog::discover(
                &engines,
                &config.database.name,
                &config.database.engine,
                tables.as_deref(),
                std::time::Duration::from_millis(config.database.discovery_timeout_ms),
            )
            .await
            .map_err(AgentError::Discovery)?;
            print_json(&schema)?;
        }
        Command::Ask {
            question,
            sql,
            tables,
            output,
            backend,
        } => {
            let engines = build_engines(&config)?;
            let mut storage = config.storage.clone();
            storage.local.root = expand_home(&storage.local.root)
                .to_string_lossy()
                .to_string();
            let exporter = build_exporter(&storage, None)?;
            let orchestrator = QueryOrchestrator::new(
                &config,
                engines,
                exporter,
                Arc::new(StaticGenerator::new(sql)),
            );

            let mut request = QueryRequest::new(question);
            if let Some(tables) = tables {
                request = request.with_tables(tables);
            }
            if let Some(output) = output {
                request = request.with_storage_path(output);
            }
            if let Some(backend) = backend {
                let kind: BackendKind = backend.parse().map_err(QuerentError::Config)?;
                request = request.with_backend(kind);
            }

            let response = orchestrator.run(&request).await?;
            if let Some(ref e) = response.export_failure {
                tracing::warn!(error = %e, "Result not exported");
            }
            print_json(&response)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();

    // The configured log level is unknown until the file is read, so
    // loading logs through a temporary subscriber at the CLI level.
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(&args.resolve_log_level("info")))
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        QuerentConfig::load_or_default(&config_file)
    });

    // Tracing goes to stderr; stdout carries the JSON result.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(&level))
        .init();

    tracing::info!("Starting Querent v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    run(args.command, config, &config_file).await?;
    Ok(())
}
