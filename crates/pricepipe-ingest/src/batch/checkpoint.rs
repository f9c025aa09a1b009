//! Checkpoint persistence
//!
//! One row per pipeline in `checkpoints.ingestion_checkpoints`. The row is
//! provisioned lazily with a sentinel value and afterwards only updated.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::debug;

use super::models::{Checkpoint, CheckpointInit};
use crate::error::{IngestError, IngestResult};

const CREATE_SCHEMA: &str = "CREATE SCHEMA IF NOT EXISTS checkpoints";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS checkpoints.ingestion_checkpoints (
        pipeline_name TEXT PRIMARY KEY,
        last_system_timestamp TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

/// Create the checkpoint relation if it is missing. Safe to repeat.
pub async fn ensure_table(conn: &mut PgConnection) -> IngestResult<()> {
    sqlx::query(CREATE_SCHEMA).execute(&mut *conn).await?;
    sqlx::query(CREATE_TABLE).execute(&mut *conn).await?;
    Ok(())
}

/// Current watermark for `pipeline_name`, seeding it with `sentinel` on first use
pub async fn get_or_init(
    conn: &mut PgConnection,
    pipeline_name: &str,
    sentinel: DateTime<Utc>,
) -> IngestResult<CheckpointInit> {
    ensure_table(conn).await?;

    let seeded: Option<DateTime<Utc>> = sqlx::query_scalar(
        r#"
        INSERT INTO checkpoints.ingestion_checkpoints (pipeline_name, last_system_timestamp)
        VALUES ($1, $2)
        ON CONFLICT (pipeline_name) DO NOTHING
        RETURNING last_system_timestamp
        "#,
    )
    .bind(pipeline_name)
    .bind(sentinel)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(value) = seeded {
        debug!(pipeline = pipeline_name, checkpoint = %value, "Seeded checkpoint");
        return Ok(CheckpointInit { value, seeded: true });
    }

    let checkpoint = fetch(conn, pipeline_name)
        .await?
        .ok_or_else(|| IngestError::CheckpointMissing(pipeline_name.to_string()))?;

    Ok(CheckpointInit {
        value: checkpoint.last_system_timestamp,
        seeded: false,
    })
}

pub async fn fetch(conn: &mut PgConnection, pipeline_name: &str) -> IngestResult<Option<Checkpoint>> {
    let checkpoint = sqlx::query_as::<_, Checkpoint>(
        r#"
        SELECT pipeline_name, last_system_timestamp, updated_at
        FROM checkpoints.ingestion_checkpoints
        WHERE pipeline_name = $1
        "#,
    )
    .bind(pipeline_name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(checkpoint)
}

/// Persist `value` as the new watermark.
///
/// Monotonicity is the caller's responsibility; this writes whatever it is given.
pub async fn advance(
    conn: &mut PgConnection,
    pipeline_name: &str,
    value: DateTime<Utc>,
) -> IngestResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE checkpoints.ingestion_checkpoints
        SET last_system_timestamp = $2, updated_at = NOW()
        WHERE pipeline_name = $1
        "#,
    )
    .bind(pipeline_name)
    .bind(value)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(IngestError::CheckpointMissing(pipeline_name.to_string()));
    }

    Ok(())
}
