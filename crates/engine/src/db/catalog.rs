//! Catalog queries.

use async_trait::async_trait;
use sqlx::FromRow;

use artisan_roast_core::{Cents, ProductId, PurchaseOptionId, PurchaseType, VariantId};

use crate::models::PurchaseOptionDetail;
use crate::store::{CatalogStore, StoreError};

use super::PgStore;

const OPTION_SELECT: &str = "SELECT po.id, po.purchase_type, po.price_cents, \
     po.delivery_schedule, v.id AS variant_id, v.name AS variant_name, \
     p.id AS product_id, p.name AS product_name, p.disabled AS product_disabled, \
     v.stock_quantity \
     FROM purchase_options po \
     JOIN variants v ON v.id = po.variant_id \
     JOIN products p ON p.id = v.product_id";

#[derive(FromRow)]
struct OptionRow {
    id: PurchaseOptionId,
    purchase_type: String,
    price_cents: Cents,
    delivery_schedule: Option<String>,
    variant_id: VariantId,
    variant_name: String,
    product_id: ProductId,
    product_name: String,
    product_disabled: bool,
    stock_quantity: i32,
}

impl TryFrom<OptionRow> for PurchaseOptionDetail {
    type Error = StoreError;

    fn try_from(row: OptionRow) -> Result<Self, StoreError> {
        let purchase_type = row
            .purchase_type
            .parse::<PurchaseType>()
            .map_err(StoreError::DataCorruption)?;
        Ok(Self {
            id: row.id,
            purchase_type,
            price: row.price_cents,
            delivery_schedule: row.delivery_schedule,
            variant_id: row.variant_id,
            variant_name: row.variant_name,
            product_id: row.product_id,
            product_name: row.product_name,
            product_disabled: row.product_disabled,
            stock_quantity: row.stock_quantity,
        })
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn purchase_option(
        &self,
        id: PurchaseOptionId,
    ) -> Result<Option<PurchaseOptionDetail>, StoreError> {
        let row = sqlx::query_as::<_, OptionRow>(&format!("{OPTION_SELECT} WHERE po.id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(PurchaseOptionDetail::try_from).transpose()
    }

    async fn subscription_option_for_product(
        &self,
        product_name: &str,
    ) -> Result<Option<PurchaseOptionDetail>, StoreError> {
        // Renewal invoices only carry the product name; map it back to the
        // product's subscription option. Disabled products still renew.
        let row = sqlx::query_as::<_, OptionRow>(&format!(
            "{OPTION_SELECT} \
             WHERE p.name = $1 AND po.purchase_type = 'SUBSCRIPTION' \
             ORDER BY po.id \
             LIMIT 1"
        ))
        .bind(product_name)
        .fetch_optional(self.pool())
        .await?;
        row.map(PurchaseOptionDetail::try_from).transpose()
    }
}
