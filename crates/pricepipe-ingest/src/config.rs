//! Configuration management
//!
//! The connection descriptor is read once from a JSON file; everything else
//! comes from `PRICEPIPE_*` environment variables (a `.env` file is honoured)
//! with the defaults below. A missing or malformed descriptor is fatal.

use chrono::{DateTime, Utc};
use pricepipe_common::timestamp::parse_timestamp;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::BatchSettings;
use crate::error::{IngestError, IngestResult};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default location of the connection descriptor.
pub const DEFAULT_DB_CONFIG_PATH: &str = "db_config.json";

/// Default pipeline name used as the checkpoint key.
pub const DEFAULT_PIPELINE_NAME: &str = "item_prices_ingestion";

/// Default first-run watermark; older than any real data.
pub const DEFAULT_SENTINEL_TIMESTAMP: &str = "1900-01-01T00:00:00Z";

/// Default intake directory for batch files.
pub const DEFAULT_BATCH_DIR: &str = "data/batch_processing_data";

/// Default directory for currency CSV snapshots.
pub const DEFAULT_RAW_CURRENCY_DIR: &str = "data/raw_currency_data";

/// Default rate-quote service.
pub const DEFAULT_CURRENCY_API_URL: &str = "https://api.vatcomply.com";

/// Default PostgreSQL port when the descriptor omits it.
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Default database connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where and how to reach PostgreSQL
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    DEFAULT_DATABASE_PORT
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl ConnectionDescriptor {
    /// Load the descriptor from a JSON file
    pub fn from_file(path: &Path) -> IngestResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!(
                "cannot read connection descriptor '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&raw).map_err(|e| match e {
            IngestError::Config(msg) => {
                IngestError::config(format!("{} (in '{}')", msg, path.display()))
            },
            other => other,
        })
    }

    /// Parse and validate a descriptor from JSON text
    pub fn from_json(raw: &str) -> IngestResult<Self> {
        let descriptor: Self = serde_json::from_str(raw)
            .map_err(|e| IngestError::config(format!("malformed connection descriptor: {}", e)))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.host.trim().is_empty() {
            return Err(IngestError::config("connection descriptor has an empty host"));
        }
        if self.dbname.trim().is_empty() {
            return Err(IngestError::config("connection descriptor has an empty dbname"));
        }
        if self.user.trim().is_empty() {
            return Err(IngestError::config("connection descriptor has an empty user"));
        }
        if self.port == 0 {
            return Err(IngestError::config("connection descriptor port must be greater than 0"));
        }
        Ok(())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.dbname)
            .username(&self.user)
            .password(&self.password)
    }
}

/// Rate-quote service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub api_url: String,
    /// Directory for CSV snapshots of fetched data; `None` disables snapshots
    pub snapshot_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl CurrencyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CURRENCY_API_URL.to_string(),
            snapshot_dir: Some(PathBuf::from(DEFAULT_RAW_CURRENCY_DIR)),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Everything one invocation needs, loaded once at startup
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub connection: ConnectionDescriptor,
    pub pipeline_name: String,
    pub sentinel_timestamp: DateTime<Utc>,
    pub batch_dir: PathBuf,
    pub connect_timeout_secs: u64,
    pub currency: CurrencyConfig,
}

impl PipelineConfig {
    /// Load the descriptor at `db_config_path` and overlay the environment
    pub fn load(db_config_path: &Path) -> IngestResult<Self> {
        dotenvy::dotenv().ok();

        let connection = ConnectionDescriptor::from_file(db_config_path)?;
        let config = Self::from_env(connection)?;
        config.validate()?;

        Ok(config)
    }

    /// Build from an already loaded descriptor plus `PRICEPIPE_*` variables
    pub fn from_env(connection: ConnectionDescriptor) -> IngestResult<Self> {
        let sentinel = std::env::var("PRICEPIPE_SENTINEL_TIMESTAMP")
            .unwrap_or_else(|_| DEFAULT_SENTINEL_TIMESTAMP.to_string());
        let sentinel_timestamp = parse_timestamp(&sentinel).map_err(|_| {
            IngestError::config(format!("PRICEPIPE_SENTINEL_TIMESTAMP is not a timestamp: {}", sentinel))
        })?;

        let snapshot_dir = match std::env::var("PRICEPIPE_RAW_CURRENCY_DIR") {
            Ok(dir) if dir.is_empty() => None,
            Ok(dir) => Some(PathBuf::from(dir)),
            Err(_) => Some(PathBuf::from(DEFAULT_RAW_CURRENCY_DIR)),
        };

        Ok(Self {
            connection,
            pipeline_name: std::env::var("PRICEPIPE_PIPELINE_NAME")
                .unwrap_or_else(|_| DEFAULT_PIPELINE_NAME.to_string()),
            sentinel_timestamp,
            batch_dir: std::env::var("PRICEPIPE_BATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_BATCH_DIR)),
            connect_timeout_secs: std::env::var("PRICEPIPE_DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            currency: CurrencyConfig {
                api_url: std::env::var("PRICEPIPE_CURRENCY_API_URL")
                    .unwrap_or_else(|_| DEFAULT_CURRENCY_API_URL.to_string()),
                snapshot_dir,
                request_timeout_secs: std::env::var("PRICEPIPE_REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
        })
    }

    pub fn validate(&self) -> IngestResult<()> {
        self.connection.validate()?;

        if self.pipeline_name.trim().is_empty() {
            return Err(IngestError::config("pipeline name cannot be empty"));
        }

        if self.connect_timeout_secs == 0 {
            return Err(IngestError::config("PRICEPIPE_DB_CONNECT_TIMEOUT must be greater than 0"));
        }

        if self.currency.api_url.is_empty() {
            return Err(IngestError::config("PRICEPIPE_CURRENCY_API_URL cannot be empty"));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The subset of settings the batch orchestrator runs with
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            pipeline_name: self.pipeline_name.clone(),
            sentinel_timestamp: self.sentinel_timestamp,
            intake_dir: self.batch_dir.clone(),
        }
    }
}
