//! Database connection
//!
//! Every job holds exactly one connection for its whole run. The pool is only
//! used as an owner for that connection so transactions can be `'static`.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::ConnectionDescriptor;
use crate::error::{IngestError, IngestResult};

/// Open the single connection a run works with
pub async fn connect(
    descriptor: &ConnectionDescriptor,
    connect_timeout: Duration,
) -> IngestResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .acquire_timeout(connect_timeout)
        .connect_with(descriptor.connect_options())
        .await
        .map_err(IngestError::Connect)?;

    tracing::info!(
        host = %descriptor.host,
        port = descriptor.port,
        database = %descriptor.dbname,
        "Database connection established"
    );

    Ok(pool)
}
