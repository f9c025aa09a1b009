//! Error types for the ingestion jobs
//!
//! Every error carries a [`Severity`]. Callers decide from that value whether
//! a job can continue with its next unit of work or must stop.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Whether an error ends the run or only the current unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Setup or connectivity failure; nothing further can succeed
    Fatal,
    /// Confined to one file, table or currency; the run goes on
    Recoverable,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to the database: {0}. Check the connection descriptor.")]
    Connect(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to read '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid value in row {row}, column '{column}': {message}")]
    InvalidRow {
        row: usize,
        column: &'static str,
        message: String,
    },

    #[error("Cannot enumerate input files: {0}")]
    Source(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream service returned HTTP {status} for {url}")]
    Upstream { url: String, status: u16 },

    #[error("Invalid {entity} '{key}': {message}")]
    Validation {
        entity: &'static str,
        key: String,
        message: String,
    },

    #[error("No checkpoint recorded for pipeline '{0}'")]
    CheckpointMissing(String),

    #[error("No file transaction is open")]
    NoTransaction,

    #[error(transparent)]
    Common(#[from] pricepipe_common::PricepipeError),
}

impl IngestError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid row error
    pub fn invalid_row(row: usize, column: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidRow {
            row,
            column,
            message: message.into(),
        }
    }

    /// Create a validation error for one upstream entry
    pub fn validation(entity: &'static str, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        use pricepipe_common::PricepipeError as Common;

        match self {
            IngestError::Config(_) | IngestError::Connect(_) | IngestError::Source(_) => {
                Severity::Fatal
            },
            // The store went away underneath us; later files cannot succeed either.
            IngestError::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut,
            ) => Severity::Fatal,
            IngestError::Common(Common::Config(_) | Common::Io(_)) => {
                Severity::Fatal
            },
            _ => Severity::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
