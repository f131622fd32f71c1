//! Stock reservation helpers.
//!
//! These run inside the order transactions in [`super::orders`]; the guarded
//! `UPDATE` is what makes concurrent reservations safe without a separate
//! row lock.

use sqlx::PgConnection;

use artisan_roast_core::{OrderId, VariantId};

use crate::models::StockShortfall;

/// Atomically reserve `quantity` units of a variant.
///
/// Returns a shortfall (and records an inventory exception) when stock is
/// insufficient; the stock level is left untouched in that case. Payment is
/// captured before the engine runs, so callers create the order either way.
pub(super) async fn reserve(
    conn: &mut PgConnection,
    order_id: OrderId,
    variant_id: VariantId,
    quantity: i32,
) -> Result<Option<StockShortfall>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE variants SET stock_quantity = stock_quantity - $2 \
         WHERE id = $1 AND stock_quantity >= $2",
    )
    .bind(variant_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(None);
    }

    let available: i32 =
        sqlx::query_scalar("SELECT stock_quantity FROM variants WHERE id = $1")
            .bind(variant_id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(0);

    sqlx::query(
        "INSERT INTO inventory_exceptions (order_id, variant_id, requested, available) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(order_id)
    .bind(variant_id)
    .bind(quantity)
    .bind(available)
    .execute(&mut *conn)
    .await?;

    Ok(Some(StockShortfall {
        variant_id,
        requested: quantity,
        available,
    }))
}

/// Return `quantity` units of a variant to stock.
pub(super) async fn restock(
    conn: &mut PgConnection,
    variant_id: VariantId,
    quantity: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE variants SET stock_quantity = stock_quantity + $2 WHERE id = $1")
        .bind(variant_id)
        .bind(quantity)
        .execute(conn)
        .await?;
    Ok(())
}
