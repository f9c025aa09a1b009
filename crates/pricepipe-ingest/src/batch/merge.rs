//! Merge engine
//!
//! Reconciles the staging relation into `public.item_prices` keyed by `id`.
//! A stored row is only overwritten by a version with a strictly greater
//! `system_timestamp`, so replaying files in any order converges.

use sqlx::PgConnection;

use super::models::MergeStats;
use crate::error::IngestResult;

const CREATE_TARGET: &str = r#"
    CREATE TABLE IF NOT EXISTS public.item_prices (
        id UUID PRIMARY KEY,
        item TEXT NOT NULL,
        price NUMERIC(10, 2) NOT NULL,
        currency TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        system_timestamp TIMESTAMPTZ NOT NULL
    )
"#;

// `xmax = 0` holds only for freshly inserted tuples; rows skipped by the WHERE
// clause are not returned at all.
const MERGE_STAGING: &str = r#"
    INSERT INTO public.item_prices AS target
        (id, item, price, currency, created_at, updated_at, system_timestamp)
    SELECT id, item, price, currency, created_at, updated_at, system_timestamp
    FROM public.item_prices_staging
    ON CONFLICT (id) DO UPDATE SET
        item = EXCLUDED.item,
        price = EXCLUDED.price,
        currency = EXCLUDED.currency,
        created_at = EXCLUDED.created_at,
        updated_at = EXCLUDED.updated_at,
        system_timestamp = EXCLUDED.system_timestamp
    WHERE target.system_timestamp < EXCLUDED.system_timestamp
    RETURNING (xmax = 0) AS inserted
"#;

/// Create the permanent item-price relation if it is missing
pub async fn ensure_target(conn: &mut PgConnection) -> IngestResult<()> {
    sqlx::query(CREATE_TARGET).execute(&mut *conn).await?;
    Ok(())
}

/// Merge everything currently staged into the permanent relation
pub async fn merge(conn: &mut PgConnection) -> IngestResult<MergeStats> {
    let staged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM public.item_prices_staging")
        .fetch_one(&mut *conn)
        .await?;

    let flags: Vec<bool> = sqlx::query_scalar(MERGE_STAGING)
        .fetch_all(&mut *conn)
        .await?;

    let stats = MergeStats::from_flags(staged.max(0) as u64, &flags);
    tracing::debug!(
        staged = stats.staged,
        inserted = stats.inserted,
        updated = stats.updated,
        unchanged = stats.unchanged,
        "Merged staging into item_prices"
    );

    Ok(stats)
}
