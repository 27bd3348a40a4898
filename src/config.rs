use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::stats::{BucketLayout, LayoutError, DEFAULT_BUCKET_BOUNDARIES_MS};

pub const DEFAULT_COLLECTION: &str = "sql_executions";

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub backend: String, // "duckdb" or "memory"
    pub connection_string: String,
    pub pool_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    pub slow_sql_threshold_ms: f64,
    pub bucket_boundaries_ms: Vec<f64>,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub slow_sql_list_limit: usize,
}

impl AnalysisConfig {
    pub fn bucket_layout(&self) -> Result<BucketLayout, LayoutError> {
        BucketLayout::new(self.bucket_boundaries_ms.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB database file (":memory:" for a throwaway database)
    #[arg(long, value_name = "PATH")]
    pub database: Option<String>,

    /// JSON or JSON-lines files of execution records to load before serving
    #[arg(long, value_name = "FILE")]
    pub import: Vec<PathBuf>,

    /// Collection that imported records are written to
    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let mut config_builder = Config::builder()
            .set_default("database.backend", defaults.database.backend)?
            .set_default("database.connection_string", defaults.database.connection_string)?
            .set_default("database.pool_size", i64::from(defaults.database.pool_size))?
            .set_default("web.host", defaults.web.host)?
            .set_default("web.port", i64::from(defaults.web.port))?
            .set_default("analysis.slow_sql_threshold_ms", defaults.analysis.slow_sql_threshold_ms)?
            .set_default("analysis.bucket_boundaries_ms", defaults.analysis.bucket_boundaries_ms)?
            .set_default("analysis.default_page_size", i64::from(defaults.analysis.default_page_size))?
            .set_default("analysis.max_page_size", i64::from(defaults.analysis.max_page_size))?
            .set_default(
                "analysis.slow_sql_list_limit",
                defaults.analysis.slow_sql_list_limit as i64,
            )?;

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = ["config.toml", "config/config.toml", "/etc/plan-scope/config.toml"];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // PLAN_SCOPE__WEB__PORT=9000 and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix("PLAN_SCOPE")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.backend = "duckdb".to_string();
            config.database.connection_string = database.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.analysis
            .bucket_layout()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        let analysis = &self.analysis;
        if analysis.default_page_size == 0 || analysis.default_page_size > analysis.max_page_size {
            return Err(ConfigError::Message(format!(
                "default_page_size must be between 1 and max_page_size ({})",
                analysis.max_page_size
            )));
        }
        if !analysis.slow_sql_threshold_ms.is_finite() || analysis.slow_sql_threshold_ms < 0.0 {
            return Err(ConfigError::Message(
                "slow_sql_threshold_ms must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            slow_sql_threshold_ms: 100.0,
            bucket_boundaries_ms: DEFAULT_BUCKET_BOUNDARIES_MS.to_vec(),
            default_page_size: 20,
            max_page_size: 500,
            slow_sql_list_limit: 50,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "duckdb".to_string(),
            connection_string: "plan-scope.db".to_string(),
            pool_size: 5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            analysis: AnalysisConfig::default(),
        }
    }
}
