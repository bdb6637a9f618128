//! CLI argument definitions for the `querent` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Querent: answer questions about a database with validated, read-only SQL.
#[derive(Parser, Debug)]
#[command(name = "querent", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file to the resolved config path.
    Init {
        /// Overwrite an existing file.
        #[arg(long = "force")]
        force: bool,
    },
    /// Print the discovered schema as JSON.
    Schema {
        /// Comma-separated table names to keep.
        #[arg(long = "tables", value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },
    /// Check a statement against the safety policy without running it.
    Validate {
        #[arg(long = "sql")]
        sql: String,
    },
    /// Run a question end to end with caller-supplied SQL.
    Ask {
        question: String,
        #[arg(long = "sql")]
        sql: String,
        /// Comma-separated table names to keep.
        #[arg(long = "tables", value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Object path for the exported XML.
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
        /// Storage backend (gdrive, s3, local, azure, gcs).
        #[arg(short = 'b', long = "backend")]
        backend: Option<String>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > QUERENT_CONFIG env var > ~/.querent/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("QUERENT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".querent").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
