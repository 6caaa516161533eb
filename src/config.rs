//! Configuration management for the SAR engine
//!
//! Strongly-typed configuration loaded from environment variables (and a
//! `.env` file when present), validated once at startup.
//!
//! # Example
//! ```no_run
//! use sar::Config;
//! let config = Config::from_env().expect("failed to load config");
//! let sar_config = config.sar_config().expect("invalid model settings");
//! println!("Similarity: {}", sar_config.similarity_type());
//! ```

use crate::error::{Error, Result};
use crate::recommendation::model_config::{
    ColumnNames, SarConfig, DEFAULT_THRESHOLD, DEFAULT_TIME_DECAY_HALF_LIFE,
};
use crate::recommendation::similarity::SimilarityType;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration; `None` serves from memory
    pub database: Option<DatabaseConfig>,
    /// API server configuration
    pub api: ApiConfig,
    /// Model hyper-parameters
    pub model: ModelConfig,
    /// Batch recommendation job
    pub batch: BatchConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections to keep open
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    pub idle_timeout: Duration,
    /// Maximum lifetime for connections
    pub max_lifetime: Duration,
    /// Enable statement caching
    pub statement_cache_size: usize,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
}

/// Raw model settings, turned into a validated [`SarConfig`] by
/// [`Config::sar_config`]
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub similarity_type: SimilarityType,
    pub time_decay: bool,
    pub time_decay_half_life: f64,
    pub time_now: Option<f64>,
    pub threshold: f64,
    pub binary: bool,
    pub columns: ColumnNames,
}

/// Batch job configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Interactions file; the batch job is disabled when unset
    pub interactions_path: Option<PathBuf>,
    /// Field separator of the interactions file
    pub separator: String,
    /// Recommendations stored per user
    pub top_k: usize,
    /// Exclude items the user already interacted with
    pub remove_seen: bool,
    /// Interval between refits; `None` runs the job once at startup
    pub refresh_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Try to load .env file (ignore if not found)
        dotenvy::dotenv().ok();

        let config = Self {
            database: DatabaseConfig::from_env()?,
            api: ApiConfig::from_env()?,
            model: ModelConfig::from_env()?,
            batch: BatchConfig::from_env()?,
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Build the validated model configuration
    pub fn sar_config(&self) -> Result<SarConfig> {
        let model = &self.model;
        SarConfig::builder(model.similarity_type)
            .columns(model.columns.clone())
            .time_decay_flag(model.time_decay)
            .time_decay_half_life(model.time_decay_half_life)
            .time_now(model.time_now)
            .threshold(model.threshold)
            .binary(model.binary)
            .build()
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if let Some(database) = &self.database {
            if database.max_connections < database.min_connections {
                return Err(Error::InvalidConfig {
                    key: "DB_MAX_CONNECTIONS",
                    message: "max_connections must be >= min_connections".into(),
                });
            }
        }

        if self.batch.top_k == 0 {
            return Err(Error::InvalidConfig {
                key: "BATCH_TOP_K",
                message: "top_k must be at least 1".into(),
            });
        }

        if self.batch.separator.len() != 1 {
            return Err(Error::InvalidConfig {
                key: "BATCH_SEPARATOR",
                message: "separator must be a single byte".into(),
            });
        }

        // Surface model errors at startup rather than on the first fit
        self.sar_config()?;

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Database:");
        match &self.database {
            Some(database) => {
                info!("    URL: {}", mask_url(&database.url));
                info!(
                    "    Pool Size: {}-{}",
                    database.min_connections, database.max_connections
                );
            }
            None => info!("    In-memory repository (DATABASE_URL not set)"),
        }
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("  Model:");
        info!("    Similarity: {}", self.model.similarity_type);
        info!(
            "    Time decay: {} (half-life {}s)",
            self.model.time_decay, self.model.time_decay_half_life
        );
        info!(
            "    Threshold: {}, binary: {}",
            self.model.threshold, self.model.binary
        );
        info!("  Batch:");
        match &self.batch.interactions_path {
            Some(path) => info!(
                "    Interactions: {} (top {}, remove seen: {})",
                path.display(),
                self.batch.top_k,
                self.batch.remove_seen
            ),
            None => info!("    Disabled (BATCH_INTERACTIONS_PATH not set)"),
        }
        if let Some(interval) = self.batch.refresh_interval {
            info!("    Refresh every {:?}", interval);
        }
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Option<Self>> {
        let Ok(url) = get_env("DATABASE_URL") else {
            return Ok(None);
        };

        Ok(Some(Self {
            url,
            max_connections: get_env_or("DB_MAX_CONNECTIONS", "10").parse().unwrap_or(10),
            min_connections: get_env_or("DB_MIN_CONNECTIONS", "1").parse().unwrap_or(1),
            connect_timeout: Duration::from_secs(
                get_env_or("DB_CONNECT_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            idle_timeout: Duration::from_secs(
                get_env_or("DB_IDLE_TIMEOUT_SECS", "600")
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                get_env_or("DB_MAX_LIFETIME_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
            ),
            statement_cache_size: get_env_or("DB_STATEMENT_CACHE_SIZE", "100")
                .parse()
                .unwrap_or(100),
        }))
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: get_env_or("API_PORT", "5000").parse().unwrap_or(5000),
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
        })
    }
}

impl ModelConfig {
    fn from_env() -> Result<Self> {
        let defaults = ColumnNames::default();

        Ok(Self {
            similarity_type: get_env_or("SAR_SIMILARITY_TYPE", "jaccard").parse()?,
            time_decay: get_env_parsed_or("SAR_TIME_DECAY", false)?,
            time_decay_half_life: get_env_parsed_or(
                "SAR_TIME_DECAY_HALF_LIFE_SECS",
                DEFAULT_TIME_DECAY_HALF_LIFE,
            )?,
            time_now: match std::env::var("SAR_TIME_NOW") {
                Ok(raw) => Some(parse_time_now(&raw)?),
                Err(_) => None,
            },
            threshold: get_env_parsed_or("SAR_THRESHOLD", DEFAULT_THRESHOLD)?,
            binary: get_env_parsed_or("SAR_BINARY", false)?,
            columns: ColumnNames {
                col_user: get_env_or("SAR_COL_USER", &defaults.col_user),
                col_item: get_env_or("SAR_COL_ITEM", &defaults.col_item),
                col_rating: get_env_or("SAR_COL_RATING", &defaults.col_rating),
                col_timestamp: get_env_or("SAR_COL_TIMESTAMP", &defaults.col_timestamp),
                col_prediction: get_env_or("SAR_COL_PREDICTION", &defaults.col_prediction),
            },
        })
    }
}

impl BatchConfig {
    fn from_env() -> Result<Self> {
        let refresh_secs: u64 = get_env_parsed_or("BATCH_REFRESH_SECS", 0)?;

        Ok(Self {
            interactions_path: std::env::var("BATCH_INTERACTIONS_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            separator: unescape_separator(&get_env_or("BATCH_SEPARATOR", "\t")),
            top_k: get_env_parsed_or("BATCH_TOP_K", 10)?,
            remove_seen: get_env_parsed_or("BATCH_REMOVE_SEEN", true)?,
            refresh_interval: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get and parse an optional environment variable
///
/// Unlike `get_env_or(..).parse().unwrap_or(..)`, a value that is set but
/// malformed is an error.
fn get_env_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
        Err(_) => Ok(default),
    }
}

/// Reference time as epoch seconds or an RFC 3339 timestamp
fn parse_time_now(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<f64>() {
        return Ok(seconds);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.timestamp_millis() as f64 / 1000.0)
        .map_err(|e| Error::InvalidConfig {
            key: "SAR_TIME_NOW",
            message: format!("expected epoch seconds or RFC 3339, got '{}': {}", raw, e).into(),
        })
}

/// `.env` files often carry a literal `\t`
fn unescape_separator(raw: &str) -> String {
    match raw {
        "\\t" => "\t".to_string(),
        other => other.to_string(),
    }
}

/// Mask sensitive parts of URL
fn mask_url(url: &str) -> String {
    // Mask password if present
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let (before, after) = url.split_at(colon_pos + 1);
            let (_, rest) = after.split_at(at_pos - colon_pos - 1);
            return format!("{}****{}", before, rest);
        }
    }
    url.to_string()
}
