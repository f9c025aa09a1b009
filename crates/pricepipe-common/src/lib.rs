//! Pricepipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging and timestamp utilities for the pricepipe
//! workspace members.
//!
//! - **Error Handling**: [`PricepipeError`] and the [`Result`] alias
//! - **Logging**: subscriber configuration and initialisation for binaries
//! - **Timestamps**: lenient parsing of the timestamp formats found in batch files
//!
//! # Example
//!
//! ```no_run
//! use pricepipe_common::timestamp::parse_timestamp;
//!
//! fn main() -> pricepipe_common::Result<()> {
//!     let ts = parse_timestamp("2024-01-02 10:00:00+01:00")?;
//!     println!("{}", ts.to_rfc3339());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod timestamp;

// Re-export commonly used types
pub use error::{PricepipeError, Result};
