//! Read-side catalog model.
//!
//! The engine never mutates catalog rows except for the stock counter on
//! variants; everything else is managed elsewhere. A purchase option is one
//! buyable configuration of a product variant (one-time bag, biweekly
//! subscription, and so on) with its own price.

use artisan_roast_core::{Cents, ProductId, PurchaseOptionId, PurchaseType, VariantId};

/// A purchase option joined with its variant and product, as the
/// materializer needs it: enough to snapshot names and prices onto order
/// items and to reserve stock.
#[derive(Debug, Clone)]
pub struct PurchaseOptionDetail {
    pub id: PurchaseOptionId,
    pub purchase_type: PurchaseType,
    pub price: Cents,
    /// Free-text billing schedule for subscription options ("Every 2 weeks").
    pub delivery_schedule: Option<String>,
    pub variant_id: VariantId,
    pub variant_name: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_disabled: bool,
    pub stock_quantity: i32,
}
