//! In-memory store backing unit and router tests.
//!
//! Implements every persistence trait over a single mutex-guarded state so a
//! whole webhook flow can run without `PostgreSQL`. Ships in `src` (not
//! behind `cfg(test)`) so the integration tests in `tests/` can use it too.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use artisan_roast_core::{
    Email, OrderId, OrderItemId, OrderStatus, PurchaseOptionId, SubscriptionId,
    SubscriptionStatus, UserId, VariantId,
};

use crate::models::{
    CancelOutcome, ContactUpdate, MaterializedOrder, NewOrder, Order, OrderItem, PaymentRefs,
    PurchaseOptionDetail, ShippingAddress, StockShortfall, Subscription, SubscriptionPatch,
    SubscriptionRecord, User,
};

use super::{
    AddressBook, CatalogStore, OrderStore, StoreError, SubscriptionStore, UserStore,
};

/// A recorded inventory exception (shortfall during reservation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedShortfall {
    pub order_id: OrderId,
    pub variant_id: VariantId,
    pub requested: i32,
    pub available: i32,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    options: Vec<PurchaseOptionDetail>,
    stock: HashMap<VariantId, i32>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    subscriptions: Vec<Subscription>,
    addresses: Vec<(UserId, Option<String>, ShippingAddress)>,
    shortfalls: Vec<RecordedShortfall>,
    next_order_id: i64,
    next_item_id: i64,
    next_subscription_id: i64,
}

/// In-memory implementation of all persistence traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- seeding helpers ----

    pub fn insert_user(&self, user: User) {
        self.lock().users.push(user);
    }

    /// Seed a purchase option; its `stock_quantity` seeds the variant's
    /// stock counter.
    pub fn insert_purchase_option(&self, option: PurchaseOptionDetail) {
        let mut inner = self.lock();
        inner.stock.insert(option.variant_id, option.stock_quantity);
        inner.options.push(option);
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        let mut inner = self.lock();
        inner.next_subscription_id = inner
            .next_subscription_id
            .max(subscription.id.as_i64());
        inner.subscriptions.push(subscription);
    }

    pub fn insert_order(&self, order: Order, items: Vec<OrderItem>) {
        let mut inner = self.lock();
        inner.next_order_id = inner.next_order_id.max(order.id.as_i64());
        for item in &items {
            inner.next_item_id = inner.next_item_id.max(item.id.as_i64());
        }
        inner.orders.push(order);
        inner.items.extend(items);
    }

    // ---- inspection helpers for assertions ----

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders.clone()
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    #[must_use]
    pub fn stock_level(&self, variant_id: VariantId) -> i32 {
        self.lock().stock.get(&variant_id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn recorded_shortfalls(&self) -> Vec<RecordedShortfall> {
        self.lock().shortfalls.clone()
    }

    #[must_use]
    pub fn saved_addresses(&self) -> Vec<(UserId, Option<String>, ShippingAddress)> {
        self.lock().addresses.clone()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let wanted = email.normalized();
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|u| {
                u.email
                    .as_ref()
                    .is_some_and(|e| e.normalized() == wanted)
            })
            .max_by_key(|u| u.id)
            .cloned())
    }

    async fn user_by_processor_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.lock();
        let user_id = inner
            .orders
            .iter()
            .filter(|o| {
                o.processor_customer_id.as_deref() == Some(processor_customer_id)
                    && o.user_id.is_some()
            })
            .max_by_key(|o| o.created_at)
            .and_then(|o| o.user_id);
        Ok(user_id.and_then(|id| inner.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn fill_missing_contact(
        &self,
        id: UserId,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            if user.name.is_none() {
                user.name = name.map(str::to_owned);
            }
            if user.phone.is_none() {
                user.phone = phone.map(str::to_owned);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn purchase_option(
        &self,
        id: PurchaseOptionId,
    ) -> Result<Option<PurchaseOptionDetail>, StoreError> {
        let inner = self.lock();
        Ok(inner.options.iter().find(|o| o.id == id).map(|o| {
            let mut option = o.clone();
            option.stock_quantity = inner.stock.get(&o.variant_id).copied().unwrap_or(0);
            option
        }))
    }

    async fn subscription_option_for_product(
        &self,
        product_name: &str,
    ) -> Result<Option<PurchaseOptionDetail>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .options
            .iter()
            .find(|o| {
                o.purchase_type == artisan_roast_core::PurchaseType::Subscription
                    && o.product_name.eq_ignore_ascii_case(product_name)
            })
            .map(|o| {
                let mut option = o.clone();
                option.stock_quantity = inner.stock.get(&o.variant_id).copied().unwrap_or(0);
                option
            }))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.lock().orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .lock()
            .orders
            .iter()
            .find(|o| o.processor_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn create(&self, order: NewOrder) -> Result<MaterializedOrder, StoreError> {
        let mut inner = self.lock();
        inner.next_order_id += 1;
        let order_id = OrderId::new(inner.next_order_id);
        let now = Utc::now();

        let mut items = Vec::with_capacity(order.items.len());
        let mut shortfalls = Vec::new();
        for item in &order.items {
            inner.next_item_id += 1;
            let item_id = OrderItemId::new(inner.next_item_id);

            let available = inner.stock.get(&item.variant_id).copied().unwrap_or(0);
            if available >= item.quantity {
                inner.stock.insert(item.variant_id, available - item.quantity);
            } else {
                shortfalls.push(StockShortfall {
                    variant_id: item.variant_id,
                    requested: item.quantity,
                    available,
                });
                inner.shortfalls.push(RecordedShortfall {
                    order_id,
                    variant_id: item.variant_id,
                    requested: item.quantity,
                    available,
                });
            }

            items.push(OrderItem {
                id: item_id,
                order_id,
                purchase_option_id: item.purchase_option_id,
                variant_id: item.variant_id,
                product_name: item.product_name.clone(),
                variant_name: item.variant_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                restocked_at: None,
            });
        }

        let persisted = Order {
            id: order_id,
            user_id: order.user_id,
            status: OrderStatus::Pending,
            delivery_method: order.delivery_method,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            total: order.total,
            shipping_cost: order.shipping_cost,
            discount: order.discount,
            processor_session_id: order.processor_session_id,
            processor_subscription_id: order.processor_subscription_id,
            processor_customer_id: order.processor_customer_id,
            payment: order.payment,
            recipient_name: order.recipient_name,
            shipping_address: order.shipping_address,
            created_at: now,
        };

        inner.orders.push(persisted.clone());
        inner.items.extend(items.clone());

        Ok(MaterializedOrder {
            order: persisted,
            items,
            shortfalls,
        })
    }

    async fn find_by_invoice(&self, invoice_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .lock()
            .orders
            .iter()
            .find(|o| o.payment.invoice_id.as_deref() == Some(invoice_id))
            .cloned())
    }

    async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn pending_for_subscription(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .lock()
            .orders
            .iter()
            .filter(|o| {
                o.processor_subscription_id.as_deref() == Some(processor_subscription_id)
                    && o.status == OrderStatus::Pending
            })
            .cloned()
            .collect())
    }

    async fn cancel_and_restock(&self, order_id: OrderId) -> Result<CancelOutcome, StoreError> {
        let mut inner = self.lock();
        let Some(index) = inner.orders.iter().position(|o| o.id == order_id) else {
            return Err(StoreError::NotFound(format!("order {order_id}")));
        };
        if !inner.orders[index].status.cancellable() {
            return Ok(CancelOutcome::NotCancellable);
        }
        inner.orders[index].status = OrderStatus::Cancelled;

        let now = Utc::now();
        let mut restocked = Vec::new();
        let pending_restock: Vec<(VariantId, i32)> = inner
            .items
            .iter_mut()
            .filter(|i| i.order_id == order_id && i.restocked_at.is_none())
            .map(|i| {
                i.restocked_at = Some(now);
                (i.variant_id, i.quantity)
            })
            .collect();
        for (variant_id, quantity) in pending_restock {
            *inner.stock.entry(variant_id).or_insert(0) += quantity;
            restocked.push((variant_id, quantity));
        }

        Ok(CancelOutcome::Cancelled { restocked })
    }

    async fn backfill_payment_refs(
        &self,
        processor_subscription_id: &str,
        processor_customer_id: &str,
        refs: &PaymentRefs,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut updated = 0;
        for order in inner.orders.iter_mut().filter(|o| {
            o.processor_subscription_id.as_deref() == Some(processor_subscription_id)
                && o.payment.transaction_id.is_none()
        }) {
            apply_refs(&mut order.payment, refs);
            updated += 1;
        }
        if updated > 0 {
            return Ok(updated);
        }

        // Checkout webhook may not have linked the order yet; match recent
        // unlinked orders for the same customer.
        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        for order in inner.orders.iter_mut().filter(|o| {
            o.processor_customer_id.as_deref() == Some(processor_customer_id)
                && o.processor_subscription_id.is_none()
                && o.payment.transaction_id.is_none()
                && o.created_at >= cutoff
        }) {
            order.processor_subscription_id = Some(processor_subscription_id.to_owned());
            apply_refs(&mut order.payment, refs);
            updated += 1;
        }
        Ok(updated)
    }

    async fn update_pending_contact(
        &self,
        processor_customer_id: &str,
        update: &ContactUpdate,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut updated = 0;
        for order in inner.orders.iter_mut().filter(|o| {
            o.processor_customer_id.as_deref() == Some(processor_customer_id)
                && o.status == OrderStatus::Pending
        }) {
            if update.recipient_name.is_some() {
                order.recipient_name.clone_from(&update.recipient_name);
            }
            if update.phone.is_some() {
                order.customer_phone.clone_from(&update.phone);
            }
            if let Some(address) = &update.shipping_address {
                order.shipping_address = Some(address.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }
}

fn apply_refs(target: &mut PaymentRefs, refs: &PaymentRefs) {
    if target.transaction_id.is_none() {
        target.transaction_id.clone_from(&refs.transaction_id);
    }
    if target.charge_id.is_none() {
        target.charge_id.clone_from(&refs.charge_id);
    }
    if target.invoice_id.is_none() {
        target.invoice_id.clone_from(&refs.invoice_id);
    }
    if target.card_summary.is_none() {
        target.card_summary.clone_from(&refs.card_summary);
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, StoreError> {
        Ok(self.lock().subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .find(|s| s.processor_subscription_id == processor_subscription_id)
            .cloned())
    }

    async fn for_processor_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.processor_customer_id == processor_customer_id)
            .cloned()
            .collect())
    }

    async fn upsert(
        &self,
        record: &SubscriptionRecord,
        user_id: UserId,
    ) -> Result<(SubscriptionId, bool), StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.processor_subscription_id == record.processor_subscription_id)
        {
            apply_record(existing, record);
            return Ok((existing.id, false));
        }

        inner.next_subscription_id += 1;
        let id = SubscriptionId::new(inner.next_subscription_id);
        inner.subscriptions.push(Subscription {
            id,
            user_id,
            processor_subscription_id: record.processor_subscription_id.clone(),
            processor_customer_id: record.processor_customer_id.clone(),
            status: record.status,
            product_names: record.product_names.clone(),
            quantities: record.quantities.clone(),
            price: record.price,
            delivery_schedule: record.delivery_schedule.clone(),
            current_period_start: record.current_period_start,
            current_period_end: record.current_period_end,
            cancel_at_period_end: record.cancel_at_period_end,
            canceled_at: record.canceled_at,
            paused_until: record.paused_until,
            recipient_name: record.recipient_name.clone(),
            recipient_phone: None,
            shipping_address: record.shipping_address.clone(),
            created_at: Utc::now(),
        });
        Ok((id, true))
    }

    async fn update_existing(&self, patch: &SubscriptionPatch) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner
            .subscriptions
            .iter_mut()
            .find(|s| s.processor_subscription_id == patch.processor_subscription_id)
        {
            Some(existing) => {
                existing.status = patch.status;
                existing.current_period_start = patch.current_period_start;
                existing.current_period_end = patch.current_period_end;
                existing.cancel_at_period_end = patch.cancel_at_period_end;
                existing.canceled_at = patch.canceled_at;
                existing.paused_until = patch.paused_until;
                if patch.delivery_schedule.is_some() {
                    existing
                        .delivery_schedule
                        .clone_from(&patch.delivery_schedule);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_canceled(
        &self,
        processor_subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner
            .subscriptions
            .iter_mut()
            .find(|s| s.processor_subscription_id == processor_subscription_id)
        {
            Some(sub) => {
                sub.status = SubscriptionStatus::Canceled;
                sub.canceled_at = Some(at);
                sub.cancel_at_period_end = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_paused(&self, id: SubscriptionId, until: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sub = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("subscription {id}")))?;
        sub.status = SubscriptionStatus::Paused;
        sub.paused_until = Some(until);
        Ok(())
    }

    async fn set_active(&self, id: SubscriptionId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sub = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("subscription {id}")))?;
        sub.status = SubscriptionStatus::Active;
        sub.paused_until = None;
        Ok(())
    }

    async fn update_recipient_contact(
        &self,
        id: SubscriptionId,
        update: &ContactUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sub = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("subscription {id}")))?;
        if update.recipient_name.is_some() {
            sub.recipient_name.clone_from(&update.recipient_name);
        }
        if update.phone.is_some() {
            sub.recipient_phone.clone_from(&update.phone);
        }
        if let Some(address) = &update.shipping_address {
            sub.shipping_address = Some(address.clone());
        }
        Ok(())
    }
}

fn apply_record(target: &mut Subscription, record: &SubscriptionRecord) {
    target.processor_customer_id = record.processor_customer_id.clone();
    target.status = record.status;
    target.product_names = record.product_names.clone();
    target.quantities = record.quantities.clone();
    target.price = record.price;
    target.delivery_schedule = record.delivery_schedule.clone();
    target.current_period_start = record.current_period_start;
    target.current_period_end = record.current_period_end;
    target.cancel_at_period_end = record.cancel_at_period_end;
    target.canceled_at = record.canceled_at;
    target.paused_until = record.paused_until;
    if record.recipient_name.is_some() {
        target.recipient_name.clone_from(&record.recipient_name);
    }
    if record.shipping_address.is_some() {
        target.shipping_address.clone_from(&record.shipping_address);
    }
}

#[async_trait]
impl AddressBook for MemoryStore {
    async fn save_if_new(
        &self,
        user_id: UserId,
        recipient_name: Option<&str>,
        address: &ShippingAddress,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let exists = inner
            .addresses
            .iter()
            .any(|(uid, _, a)| *uid == user_id && a == address);
        if exists {
            return Ok(false);
        }
        inner
            .addresses
            .push((user_id, recipient_name.map(str::to_owned), address.clone()));
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use artisan_roast_core::{Cents, DeliveryMethod, ProductId, PurchaseType};

    use super::*;
    use crate::models::NewOrderItem;

    fn option(id: i64, variant: i64, stock: i32) -> PurchaseOptionDetail {
        PurchaseOptionDetail {
            id: PurchaseOptionId::new(id),
            purchase_type: PurchaseType::OneTime,
            price: Cents::new(1800),
            delivery_schedule: None,
            variant_id: VariantId::new(variant),
            variant_name: "12oz".to_string(),
            product_id: ProductId::new(1),
            product_name: "House Blend".to_string(),
            product_disabled: false,
            stock_quantity: stock,
        }
    }

    fn new_order(session: &str, variant: i64, quantity: i32) -> NewOrder {
        NewOrder {
            user_id: None,
            delivery_method: DeliveryMethod::Delivery,
            customer_email: None,
            customer_phone: None,
            total: Cents::new(1800),
            shipping_cost: Cents::ZERO,
            discount: Cents::ZERO,
            processor_session_id: Some(session.to_string()),
            processor_subscription_id: None,
            processor_customer_id: None,
            payment: PaymentRefs::default(),
            recipient_name: None,
            shipping_address: None,
            items: vec![NewOrderItem {
                purchase_option_id: PurchaseOptionId::new(1),
                variant_id: VariantId::new(variant),
                product_name: "House Blend".to_string(),
                variant_name: "12oz".to_string(),
                quantity,
                unit_price: Cents::new(1800),
            }],
        }
    }

    #[tokio::test]
    async fn test_create_reserves_stock() {
        let store = MemoryStore::new();
        store.insert_purchase_option(option(1, 7, 10));

        let created = store.create(new_order("cs_1", 7, 3)).await.unwrap();
        assert!(created.shortfalls.is_empty());
        assert_eq!(store.stock_level(VariantId::new(7)), 7);
    }

    #[tokio::test]
    async fn test_create_records_shortfall_without_going_negative() {
        let store = MemoryStore::new();
        store.insert_purchase_option(option(1, 7, 2));

        let created = store.create(new_order("cs_1", 7, 5)).await.unwrap();
        assert_eq!(
            created.shortfalls,
            vec![StockShortfall {
                variant_id: VariantId::new(7),
                requested: 5,
                available: 2,
            }]
        );
        // Reservation is all-or-nothing per line; the counter never dips
        // below zero.
        assert_eq!(store.stock_level(VariantId::new(7)), 2);
        assert_eq!(store.recorded_shortfalls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_and_restock_is_replay_safe() {
        let store = MemoryStore::new();
        store.insert_purchase_option(option(1, 7, 10));
        let created = store.create(new_order("cs_1", 7, 4)).await.unwrap();
        assert_eq!(store.stock_level(VariantId::new(7)), 6);

        let outcome = store.cancel_and_restock(created.order.id).await.unwrap();
        assert_eq!(
            outcome,
            CancelOutcome::Cancelled {
                restocked: vec![(VariantId::new(7), 4)]
            }
        );
        assert_eq!(store.stock_level(VariantId::new(7)), 10);

        // Replaying the cancel restores nothing a second time.
        let outcome = store.cancel_and_restock(created.order.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::NotCancellable);
        assert_eq!(store.stock_level(VariantId::new(7)), 10);
    }

    #[tokio::test]
    async fn test_user_by_email_is_case_insensitive_most_recent() {
        let store = MemoryStore::new();
        store.insert_user(User {
            id: UserId::new(1),
            email: Some(Email::parse("jane@example.com").unwrap()),
            name: None,
            phone: None,
        });
        store.insert_user(User {
            id: UserId::new(2),
            email: Some(Email::parse("JANE@example.com").unwrap()),
            name: Some("Jane".to_string()),
            phone: None,
        });

        let found = store
            .user_by_email(&Email::parse("Jane@Example.COM").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, UserId::new(2));
    }

    #[tokio::test]
    async fn test_backfill_falls_back_to_recent_customer_orders() {
        let store = MemoryStore::new();
        store.insert_purchase_option(option(1, 7, 10));
        let mut order = new_order("cs_1", 7, 1);
        order.processor_customer_id = Some("cus_9".to_string());
        store.create(order).await.unwrap();

        let refs = PaymentRefs {
            transaction_id: Some("pi_1".to_string()),
            charge_id: Some("ch_1".to_string()),
            invoice_id: Some("in_1".to_string()),
            card_summary: None,
        };
        let updated = store
            .backfill_payment_refs("sub_1", "cus_9", &refs)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let order = &store.orders()[0];
        assert_eq!(order.processor_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(order.payment.transaction_id.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn test_update_pending_contact_skips_other_orders() {
        let store = MemoryStore::new();
        store.insert_purchase_option(option(1, 7, 10));

        let mut pending = new_order("cs_1", 7, 1);
        pending.processor_customer_id = Some("cus_9".to_string());
        let pending = store.create(pending).await.unwrap();

        let mut cancelled = new_order("cs_2", 7, 1);
        cancelled.processor_customer_id = Some("cus_9".to_string());
        let cancelled = store.create(cancelled).await.unwrap();
        store.cancel_and_restock(cancelled.order.id).await.unwrap();

        let mut other_customer = new_order("cs_3", 7, 1);
        other_customer.processor_customer_id = Some("cus_other".to_string());
        store.create(other_customer).await.unwrap();

        let update = ContactUpdate {
            recipient_name: Some("Jane Doe".to_string()),
            phone: Some("+15035551234".to_string()),
            shipping_address: Some(ShippingAddress {
                street: "500 SE Division St".to_string(),
                city: "Portland".to_string(),
                state: "OR".to_string(),
                postal_code: "97202".to_string(),
                country: "US".to_string(),
            }),
        };
        let touched = store.update_pending_contact("cus_9", &update).await.unwrap();
        assert_eq!(touched, 1);

        let orders = store.orders();
        let updated = orders.iter().find(|o| o.id == pending.order.id).unwrap();
        assert_eq!(updated.recipient_name.as_deref(), Some("Jane Doe"));
        assert_eq!(updated.customer_phone.as_deref(), Some("+15035551234"));
        assert_eq!(
            updated.shipping_address.as_ref().unwrap().street,
            "500 SE Division St"
        );
        let untouched = orders.iter().find(|o| o.id == cancelled.order.id).unwrap();
        assert!(untouched.shipping_address.is_none());
    }

    #[tokio::test]
    async fn test_address_book_deduplicates() {
        let store = MemoryStore::new();
        let address = ShippingAddress {
            street: "1 Main St".to_string(),
            city: "Portland".to_string(),
            state: "OR".to_string(),
            postal_code: "97201".to_string(),
            country: "US".to_string(),
        };
        assert!(store
            .save_if_new(UserId::new(1), Some("Jane"), &address)
            .await
            .unwrap());
        assert!(!store
            .save_if_new(UserId::new(1), Some("Jane"), &address)
            .await
            .unwrap());
        assert_eq!(store.saved_addresses().len(), 1);
    }
}
