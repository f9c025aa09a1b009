//! Staging loader
//!
//! `public.item_prices_staging` holds the filtered rows of the file currently
//! being processed and nothing else. It is truncated before every load.

use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::models::StagingBatch;
use crate::error::IngestResult;

/// Seven bind parameters per row; keeps each statement well under the 65535 limit.
const CHUNK_SIZE: usize = 5000;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS public.item_prices_staging (
        id UUID PRIMARY KEY,
        item TEXT,
        price NUMERIC,
        currency TEXT,
        created_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ,
        system_timestamp TIMESTAMPTZ
    )
"#;

/// Make sure the staging relation exists and is empty
pub async fn reset(conn: &mut PgConnection) -> IngestResult<()> {
    sqlx::query(CREATE_TABLE).execute(&mut *conn).await?;
    sqlx::query("TRUNCATE TABLE public.item_prices_staging")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Bulk insert `batch`, returning the number of rows written
pub async fn load(conn: &mut PgConnection, batch: &StagingBatch) -> IngestResult<u64> {
    let mut written = 0;

    for chunk in batch.rows().chunks(CHUNK_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO public.item_prices_staging \
             (id, item, price, currency, created_at, updated_at, system_timestamp) ",
        );

        query_builder.push_values(chunk, |mut b, record| {
            b.push_bind(record.id)
                .push_bind(&record.item)
                .push_bind(&record.price)
                .push_bind(&record.currency)
                .push_bind(record.created_at)
                .push_bind(record.updated_at)
                .push_bind(record.system_timestamp);
        });

        let result = query_builder.build().execute(&mut *conn).await?;
        written += result.rows_affected();
    }

    tracing::debug!(rows = written, "Loaded staging batch");
    Ok(written)
}
