//! Persistence trait seams.
//!
//! Services talk to storage through these traits so the webhook and action
//! flows can be driven end to end against [`memory::MemoryStore`] in tests.
//! Production wiring uses the `PostgreSQL` implementations in [`crate::db`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use artisan_roast_core::{Email, OrderId, SubscriptionId, UserId};

use crate::models::{
    CancelOutcome, ContactUpdate, MaterializedOrder, NewOrder, Order, OrderItem, PaymentRefs,
    PurchaseOptionDetail, ShippingAddress, Subscription, SubscriptionPatch, SubscriptionRecord,
    User,
};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted (invalid email, unknown
    /// status text).
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Customer lookup and contact maintenance.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user by id.
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Fetch the most recently created user whose email matches
    /// case-insensitively.
    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    /// Resolve a user from their order history: the most recent order
    /// carrying this processor customer id that is linked to an account.
    async fn user_by_processor_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Fill in name/phone on a user only where currently absent. Existing
    /// values are never overwritten.
    async fn fill_missing_contact(
        &self,
        id: UserId,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Read-side catalog access.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch a purchase option with its variant and product.
    async fn purchase_option(
        &self,
        id: artisan_roast_core::PurchaseOptionId,
    ) -> Result<Option<PurchaseOptionDetail>, StoreError>;

    /// Find the subscription purchase option for a product by name. Used by
    /// renewal materialization, where the invoice only carries product names.
    async fn subscription_option_for_product(
        &self,
        product_name: &str,
    ) -> Result<Option<PurchaseOptionDetail>, StoreError>;
}

/// Order ledger.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetch an order by id.
    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Look up an order by its processor checkout session id (the
    /// idempotency key for checkout materialization).
    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>, StoreError>;

    /// Create an order with its items and reserve stock for every line, all
    /// in one transaction. Insufficient stock for a line is returned as a
    /// shortfall (and recorded as an inventory exception) rather than
    /// failing the order; payment is already captured by this point.
    async fn create(&self, order: NewOrder) -> Result<MaterializedOrder, StoreError>;

    /// Look up an order by the processor invoice id on its payment
    /// references (the idempotency key for renewal materialization).
    async fn find_by_invoice(&self, invoice_id: &str) -> Result<Option<Order>, StoreError>;

    /// Fetch the items of an order.
    async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    /// All pending orders linked to a processor subscription id.
    async fn pending_for_subscription(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Vec<Order>, StoreError>;

    /// Cancel a pending order and restore stock for its not-yet-restocked
    /// items, in one transaction. Safe to replay: a second call on the same
    /// order reports [`CancelOutcome::NotCancellable`] and restores nothing.
    async fn cancel_and_restock(&self, order_id: OrderId) -> Result<CancelOutcome, StoreError>;

    /// Backfill payment references from an initial subscription invoice.
    ///
    /// Targets orders linked to the subscription that have no transaction id
    /// yet. When the checkout webhook has not linked the order yet (webhook
    /// ordering is not guaranteed), falls back to recent unlinked orders for
    /// the same processor customer and links them too. Returns the number of
    /// orders updated.
    async fn backfill_payment_refs(
        &self,
        processor_subscription_id: &str,
        processor_customer_id: &str,
        refs: &PaymentRefs,
    ) -> Result<u64, StoreError>;

    /// Apply updated recipient contact to the customer's pending orders.
    /// Fields absent from the update keep their stored values. Returns the
    /// number of orders touched.
    async fn update_pending_contact(
        &self,
        processor_customer_id: &str,
        update: &ContactUpdate,
    ) -> Result<u64, StoreError>;
}

/// Subscription records keyed by processor subscription id.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Fetch by local id.
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, StoreError>;

    /// Fetch by processor subscription id.
    async fn find_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    /// All subscriptions billed to a processor customer.
    async fn for_processor_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Create or update the record for its processor subscription id.
    /// Returns the local id and whether a new row was created.
    async fn upsert(
        &self,
        record: &SubscriptionRecord,
        user_id: UserId,
    ) -> Result<(SubscriptionId, bool), StoreError>;

    /// Apply a billing-state patch to an existing record; returns `false`
    /// (without writing) when no local record exists for the processor
    /// subscription id.
    async fn update_existing(&self, patch: &SubscriptionPatch) -> Result<bool, StoreError>;

    /// Mark a subscription canceled (terminal). Returns whether a local
    /// record existed.
    async fn mark_canceled(
        &self,
        processor_subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Pause until the given resume timestamp.
    async fn set_paused(&self, id: SubscriptionId, until: DateTime<Utc>) -> Result<(), StoreError>;

    /// Return to active billing.
    async fn set_active(&self, id: SubscriptionId) -> Result<(), StoreError>;

    /// Overwrite recipient contact fields carried by the update; absent
    /// fields keep their stored values.
    async fn update_recipient_contact(
        &self,
        id: SubscriptionId,
        update: &ContactUpdate,
    ) -> Result<(), StoreError>;
}

/// Saved shipping addresses.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Persist the address for the user unless an identical one already
    /// exists (field-by-field comparison). Returns whether a row was saved.
    async fn save_if_new(
        &self,
        user_id: UserId,
        recipient_name: Option<&str>,
        address: &ShippingAddress,
    ) -> Result<bool, StoreError>;
}
