//! Pricepipe Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Jobs that keep the item-price store in PostgreSQL up to date.
//!
//! - **batch**: checkpointed ingestion of item-price CSV files with a
//!   last-writer-wins merge on `system_timestamp`
//! - **currency**: currency and exchange-rate refresh from the rate service
//! - **view**: the NOK price view over both
//!
//! # Example
//!
//! ```no_run
//! use pricepipe_ingest::batch::BatchOrchestrator;
//! use pricepipe_ingest::config::PipelineConfig;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load(Path::new("db_config.json"))?;
//!     let summary = BatchOrchestrator::connect(&config).await?.run(None).await?;
//!     println!("{} files committed", summary.committed());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod currency;
pub mod db;
pub mod error;
pub mod view;

pub use error::{IngestError, IngestResult, Severity};
