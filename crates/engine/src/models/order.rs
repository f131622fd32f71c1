//! Order and order item models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use artisan_roast_core::{
    Cents, DeliveryMethod, Email, OrderId, OrderItemId, OrderStatus, PurchaseOptionId, UserId,
    VariantId,
};

/// A shipping address snapshot.
///
/// Orders carry a full copy of the address at purchase time so later edits to
/// the customer's address book never rewrite order history. The same shape is
/// used for address-book deduplication (field-by-field equality).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// Payment references reported by the processor for an order.
///
/// All fields are optional at materialization time; the initial-invoice
/// webhook backfills whatever the checkout session did not carry.
#[derive(Debug, Clone, Default)]
pub struct PaymentRefs {
    pub transaction_id: Option<String>,
    pub charge_id: Option<String>,
    pub invoice_id: Option<String>,
    /// Human-readable card summary, e.g. "Visa ****4242".
    pub card_summary: Option<String>,
}

impl PaymentRefs {
    /// Whether any reference is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.transaction_id.is_none() && self.charge_id.is_none() && self.invoice_id.is_none()
    }
}

/// A materialized order.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub delivery_method: DeliveryMethod,
    pub customer_email: Option<Email>,
    pub customer_phone: Option<String>,
    pub total: Cents,
    pub shipping_cost: Cents,
    /// Discount applied at checkout. Zero for renewal orders.
    pub discount: Cents,
    /// Idempotency key: processor checkout session id. Renewal orders have
    /// none (they originate from invoices, not checkout sessions).
    pub processor_session_id: Option<String>,
    pub processor_subscription_id: Option<String>,
    pub processor_customer_id: Option<String>,
    pub payment: PaymentRefs,
    pub recipient_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
}

/// A line on an order, with name and price snapshotted at purchase time.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub purchase_option_id: PurchaseOptionId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
    pub unit_price: Cents,
    /// Set when the item's stock has been restored by a cancellation.
    /// Replayed cancellations skip already-restocked items.
    pub restocked_at: Option<DateTime<Utc>>,
}

/// Input for creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<UserId>,
    pub delivery_method: DeliveryMethod,
    pub customer_email: Option<Email>,
    pub customer_phone: Option<String>,
    pub total: Cents,
    pub shipping_cost: Cents,
    pub discount: Cents,
    pub processor_session_id: Option<String>,
    pub processor_subscription_id: Option<String>,
    pub processor_customer_id: Option<String>,
    pub payment: PaymentRefs,
    pub recipient_name: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub items: Vec<NewOrderItem>,
}

/// Input for a single order line.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub purchase_option_id: PurchaseOptionId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
    pub unit_price: Cents,
}

/// Recipient contact fields propagated from a processor customer update.
///
/// Fields set here overwrite the stored values; `None` fields are left
/// untouched. `recipient_name` travels with `shipping_address` and is only
/// set when the update carries an address.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub recipient_name: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

/// A variant the store could not fully reserve stock for.
///
/// Payment is already captured by the time the engine sees the event, so a
/// shortfall never blocks the order; it is recorded for manual follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockShortfall {
    pub variant_id: VariantId,
    pub requested: i32,
    pub available: i32,
}

/// Result of creating an order: the persisted rows plus any stock
/// shortfalls encountered while reserving inventory.
#[derive(Debug, Clone)]
pub struct MaterializedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shortfalls: Vec<StockShortfall>,
}

/// Result of a cancel-and-restock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The order was pending and has been cancelled; stock restored for the
    /// listed `(variant, quantity)` pairs.
    Cancelled { restocked: Vec<(VariantId, i32)> },
    /// The order was not in a cancellable state; nothing changed.
    NotCancellable,
}
