//! NOK price view
//!
//! Exposes every stored item price converted into Norwegian kroner. Items whose
//! currency has no NOK rate keep their row with a NULL price and currency.

use sqlx::PgPool;
use tracing::info;

use crate::batch::merge;
use crate::currency::storage;
use crate::error::IngestResult;

pub const NOK_VIEW: &str = "public.item_prices_nok_view";

const CREATE_NOK_VIEW: &str = r#"
    CREATE OR REPLACE VIEW public.item_prices_nok_view AS
    SELECT
        ip.id,
        ip.item,
        round(ip.price * cr.exchange_rate, 2) AS price,
        cr.target_currency AS currency
    FROM public.item_prices ip
    LEFT JOIN public.currency_conversion_rates AS cr
        ON cr.base_currency = ip.currency
        AND cr.target_currency = 'NOK'
    ORDER BY id ASC
"#;

/// Create or replace the view, provisioning the relations it reads from
pub async fn create_nok_view(pool: &PgPool) -> IngestResult<()> {
    let mut tx = pool.begin().await?;

    merge::ensure_target(&mut tx).await?;
    storage::ensure_tables(&mut tx).await?;
    sqlx::query(CREATE_NOK_VIEW).execute(&mut *tx).await?;

    tx.commit().await?;
    info!(view = NOK_VIEW, "View created");
    Ok(())
}
