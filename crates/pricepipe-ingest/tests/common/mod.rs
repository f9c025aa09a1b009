//! Common test utilities for pricepipe integration tests using testcontainers
//!
//! Each test starts its own PostgreSQL container, so tests are isolated from
//! one another and need no pre-existing database. Requires a running Docker
//! daemon; the tests using this module are `#[ignore]`d by default:
//!
//! ```text
//! cargo test -p pricepipe-ingest -- --ignored
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use pricepipe_ingest::config::ConnectionDescriptor;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

pub const POSTGRES_TAG: &str = "16-alpine";

/// PostgreSQL test container plus a pool for assertions
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    descriptor: ConnectionDescriptor,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag(POSTGRES_TAG)
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let descriptor = ConnectionDescriptor {
            host: host.to_string(),
            port,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
        };

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(descriptor.connect_options())
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self {
            container,
            pool,
            descriptor,
        })
    }

    /// Pool owned by the test, independent of the pools jobs open and close
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Descriptor jobs use to open their own connection
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub async fn job_pool(&self) -> Result<PgPool> {
        pricepipe_ingest::db::connect(&self.descriptor, Duration::from_secs(30))
            .await
            .context("Failed to open job connection")
    }
}

/// Write a batch file with the standard header
///
/// Rows are `(id, item, price, currency, updated_at, system_timestamp)`.
pub fn write_batch_file(dir: &Path, name: &str, rows: &[(&str, &str, &str, &str, &str, &str)]) {
    let mut body = String::from("id,item,price,currency,created_at,updated_at,system_timestamp\n");
    for (id, item, price, currency, updated_at, system_timestamp) in rows {
        body.push_str(&format!(
            "{},{},{},{},2024-01-01 00:00:00,{},{}\n",
            id, item, price, currency, updated_at, system_timestamp
        ));
    }
    std::fs::write(dir.join(name), body).expect("Failed to write batch file");
}

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pricepipe_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
