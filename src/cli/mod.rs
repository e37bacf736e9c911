//! Command-line interface for mongocursor
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Turning arguments into the `find` that opens the cursor

use bson::{Bson, Document};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, LogLevel, OutputFormat};
use crate::connection::{CollectionNamespace, FindRequest};
use crate::cursor::PrefetchMode;
use crate::error::{ConfigError, Result};

/// Stream a MongoDB query through a prefetching cursor
#[derive(Parser, Debug)]
#[command(
    name = "mongocursor",
    version,
    about = "Stream query results through a prefetching MongoDB cursor",
    long_about = "Runs a find against one collection and prints every document as JSON,
fetching the next batch in the background while the current one is printed."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Database name to use
    #[arg(long, value_name = "NAME")]
    pub database: Option<String>,

    /// Collection to query
    #[arg(long, value_name = "NAME")]
    pub collection: Option<String>,

    /// Query filter as (extended) JSON
    #[arg(long, value_name = "JSON")]
    pub filter: Option<String>,

    /// Documents per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<u32>,

    /// Maximum number of documents to print
    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,

    /// Prefetch policy (always, never, remaining-below)
    #[arg(long, value_name = "MODE")]
    pub prefetch: Option<String>,

    /// Unread items left in a batch before remaining-below prefetches
    #[arg(long, value_name = "N")]
    pub threshold: Option<usize>,

    /// Output format (json, json-pretty)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for mongocursor
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse(), |key| std::env::var(key).ok())
    }

    /// Build from parsed arguments and an environment lookup
    pub fn from_args<F>(args: CliArgs, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env_from(env)?;
        Self::apply_args_to_config(&mut config, &args)?;
        config.validate()?;

        Ok(Self { args, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Effective log level after `-v` / `--vv`
    pub fn log_level(&self) -> tracing::Level {
        self.config.logging.level.to_tracing_level()
    }

    /// Namespace to query
    ///
    /// # Returns
    /// * `Result<CollectionNamespace>` - Fails if no collection was given
    pub fn namespace(&self) -> Result<CollectionNamespace> {
        let collection = self
            .args
            .collection
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "collection".to_string(),
                value: String::new(),
            })?;
        Ok(CollectionNamespace::new(
            self.config.connection.database.as_str(),
            collection,
        ))
    }

    /// Parse the `--filter` argument
    ///
    /// Accepts extended JSON, so `{"_id": {"$oid": "..."}}` matches an ObjectId.
    pub fn filter(&self) -> Result<Document> {
        let Some(text) = self.args.filter.as_deref() else {
            return Ok(Document::new());
        };

        let invalid = || ConfigError::InvalidValue {
            field: "filter".to_string(),
            value: text.to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(text).map_err(|_| invalid())?;
        match Bson::try_from(json).map_err(|_| invalid())? {
            Bson::Document(doc) => Ok(doc),
            _ => Err(invalid().into()),
        }
    }

    /// The `find` command that opens the cursor
    pub fn find_request(&self) -> Result<FindRequest> {
        Ok(FindRequest {
            namespace: self.namespace()?,
            filter: self.filter()?,
            batch_size: Some(self.config.cursor.batch_size),
            limit: self.config.cursor.limit,
            comment: None,
        })
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) -> Result<()> {
        Self::apply_connection_args(config, args);
        Self::apply_cursor_args(config, args)?;
        Self::apply_display_args(config, args)?;
        Self::apply_logging_args(config, args);
        Ok(())
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(uri) = &args.uri {
            config.connection.uri = uri.clone();
            if let Some(db) = extract_database_from_uri(uri) {
                config.connection.database = db;
            }
        }
        if let Some(db) = &args.database {
            config.connection.database = db.clone();
        }
    }

    fn apply_cursor_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        if let Some(size) = args.batch_size {
            config.cursor.batch_size = size;
        }
        if let Some(limit) = args.limit {
            config.cursor.limit = Some(limit);
        }
        if let Some(mode) = &args.prefetch {
            config.cursor.prefetch.mode = mode
                .parse::<PrefetchMode>()
                .map_err(|_| invalid_arg("prefetch", mode))?;
        }
        if let Some(threshold) = args.threshold {
            config.cursor.prefetch.threshold = threshold;
        }
        Ok(())
    }

    fn apply_display_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        if let Some(format) = &args.format {
            config.display.format = format
                .parse::<OutputFormat>()
                .map_err(|_| invalid_arg("format", format))?;
        }
        if args.no_color {
            config.display.color = false;
        }
        Ok(())
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        if args.very_verbose {
            config.logging.level = LogLevel::Trace;
        } else if args.verbose {
            config.logging.level = LogLevel::Debug;
        }
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Config { show }) => {
                if *show {
                    self.show_config()?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self
            .args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path);
        println!("# Configuration file: {}", path.display());
        println!("{}", self.config.to_toml()?);
        Ok(())
    }
}

fn invalid_arg(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Extract database name from MongoDB connection URI
///
/// Format: mongodb://[username:password@]host[:port][/database][?options]
fn extract_database_from_uri(uri: &str) -> Option<String> {
    let after_scheme = uri.split("://").nth(1)?;
    let path_part = after_scheme.split('/').nth(1)?;
    let db_name = path_part.split('?').next().unwrap_or("");
    (!db_name.is_empty()).then(|| db_name.to_string())
}
