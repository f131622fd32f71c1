//! Order materialization.
//!
//! Turns normalized checkout and invoice events into local orders. Exactly
//! one order per checkout session and per renewal invoice; replays are
//! detected by those keys and acknowledged without writing. Notifications go
//! out after the storage transaction, best-effort.

use std::sync::Arc;

use artisan_roast_core::{Cents, DeliveryMethod, Email, PurchaseType, UserId};

use crate::error::EngineError;
use crate::events::normalizer::record_from_processor;
use crate::events::{CheckoutEvent, InvoiceEvent};
use crate::models::{
    MaterializedOrder, NewOrder, NewOrderItem, Order, PaymentRefs, User,
};
use crate::processor::{ProcessorClient, ProcessorSubscription};
use crate::store::{AddressBook, CatalogStore, OrderStore, UserStore};

use super::notify::NotificationSender;
use super::SubscriptionLifecycle;

/// Result of materializing a checkout event.
#[derive(Debug)]
pub enum MaterializeOutcome {
    /// A new order was created.
    Created(MaterializedOrder),
    /// The session was already materialized; nothing was written.
    Duplicate(Order),
}

/// Materializes orders from checkout and invoice events.
#[derive(Clone)]
pub struct OrderMaterializer {
    users: Arc<dyn UserStore>,
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
    addresses: Arc<dyn AddressBook>,
    notifier: Arc<dyn NotificationSender>,
    processor: Arc<dyn ProcessorClient>,
    lifecycle: SubscriptionLifecycle,
}

impl OrderMaterializer {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        catalog: Arc<dyn CatalogStore>,
        orders: Arc<dyn OrderStore>,
        addresses: Arc<dyn AddressBook>,
        notifier: Arc<dyn NotificationSender>,
        processor: Arc<dyn ProcessorClient>,
        lifecycle: SubscriptionLifecycle,
    ) -> Self {
        Self {
            users,
            catalog,
            orders,
            addresses,
            notifier,
            processor,
            lifecycle,
        }
    }

    /// Materialize a completed checkout into an order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedEvent`] for unknown purchase options,
    /// or store/processor errors from the underlying operations.
    pub async fn materialize_checkout(
        &self,
        event: &CheckoutEvent,
    ) -> Result<MaterializeOutcome, EngineError> {
        if let Some(existing) = self.orders.find_by_session(&event.session_id).await? {
            tracing::info!(
                session_id = %event.session_id,
                order_id = %existing.id,
                "Session already materialized, acknowledging replay"
            );
            return Ok(MaterializeOutcome::Duplicate(existing));
        }

        let user = self.resolve_user(event).await?;
        if let Some(user) = &user {
            self.record_customer_details(user, event).await?;
        }

        let mut items = Vec::with_capacity(event.cart.len());
        let mut subtotal = Cents::ZERO;
        let mut has_subscription_line = false;
        for line in &event.cart {
            let option = self
                .catalog
                .purchase_option(line.purchase_option_id)
                .await?
                .ok_or_else(|| {
                    EngineError::MalformedEvent(format!(
                        "unknown purchase option {} on session {}",
                        line.purchase_option_id, event.session_id
                    ))
                })?;
            if option.purchase_type == PurchaseType::Subscription {
                has_subscription_line = true;
            }
            subtotal += option.price.times(i64::from(line.quantity));
            items.push(NewOrderItem {
                purchase_option_id: option.id,
                variant_id: option.variant_id,
                product_name: option.product_name,
                variant_name: option.variant_name,
                quantity: line.quantity,
                unit_price: option.price,
            });
        }

        let created = self
            .orders
            .create(NewOrder {
                user_id: user.as_ref().map(|u| u.id),
                delivery_method: event.delivery_method,
                customer_email: event.customer_email.clone(),
                customer_phone: event.customer_phone.clone(),
                total: event.total,
                // Whatever the session charged beyond the item subtotal.
                shipping_cost: event.total.saturating_sub(subtotal),
                discount: event.discount,
                processor_session_id: Some(event.session_id.clone()),
                processor_subscription_id: event.subscription_id.clone(),
                processor_customer_id: event.customer_id.clone(),
                payment: event.payment.clone(),
                recipient_name: event.shipping_name.clone(),
                shipping_address: event.shipping_address.clone(),
                items,
            })
            .await?;

        for shortfall in &created.shortfalls {
            tracing::warn!(
                order_id = %created.order.id,
                variant_id = %shortfall.variant_id,
                requested = shortfall.requested,
                available = shortfall.available,
                "Insufficient stock, order created anyway (payment captured)"
            );
        }

        if has_subscription_line {
            self.ensure_subscription(event, user.as_ref()).await?;
        }

        self.send_checkout_notifications(&created).await;
        Ok(MaterializeOutcome::Created(created))
    }

    /// Handle a paid invoice: renewals materialize a new order, initial
    /// invoices backfill payment references onto the checkout order.
    ///
    /// # Errors
    ///
    /// Returns store/processor errors; invoices without a subscription are
    /// ignored, not errors.
    pub async fn handle_invoice_paid(&self, invoice: &InvoiceEvent) -> Result<(), EngineError> {
        let Some(subscription_id) = invoice.subscription_id.as_deref() else {
            tracing::debug!(invoice_id = %invoice.invoice_id, "Invoice without subscription, ignoring");
            return Ok(());
        };

        let subscription = self.processor.fetch_subscription(subscription_id).await?;

        if invoice.is_renewal() {
            self.materialize_renewal(invoice, &subscription).await
        } else {
            self.backfill_initial_invoice(invoice, &subscription).await
        }
    }

    /// Two-tier user resolution: explicit account id from checkout
    /// metadata, then most-recent case-insensitive email match, else guest.
    async fn resolve_user(&self, event: &CheckoutEvent) -> Result<Option<User>, EngineError> {
        if let Some(id) = event.metadata_user_id {
            if let Some(user) = self.users.user_by_id(id).await? {
                return Ok(Some(user));
            }
            tracing::warn!(
                session_id = %event.session_id,
                user_id = %id,
                "Checkout metadata references unknown user, falling back to email"
            );
        }

        if let Some(email) = &event.customer_email {
            if let Some(user) = self.users.user_by_email(email).await? {
                return Ok(Some(user));
            }
        }

        Ok(None)
    }

    /// Contact backfill and address book, for resolved users only.
    async fn record_customer_details(
        &self,
        user: &User,
        event: &CheckoutEvent,
    ) -> Result<(), EngineError> {
        let name = event
            .customer_name
            .as_deref()
            .or(event.shipping_name.as_deref());
        if name.is_some() || event.customer_phone.is_some() {
            self.users
                .fill_missing_contact(user.id, name, event.customer_phone.as_deref())
                .await?;
        }

        if let Some(address) = &event.shipping_address {
            let saved = self
                .addresses
                .save_if_new(user.id, event.shipping_name.as_deref(), address)
                .await?;
            if saved {
                tracing::debug!(user_id = %user.id, "Shipping address saved to address book");
            }
        }
        Ok(())
    }

    async fn ensure_subscription(
        &self,
        event: &CheckoutEvent,
        user: Option<&User>,
    ) -> Result<(), EngineError> {
        let Some(subscription_id) = event.subscription_id.as_deref() else {
            tracing::warn!(
                session_id = %event.session_id,
                "Subscription line without a subscription id on session"
            );
            return Ok(());
        };
        let Some(user) = user else {
            // The invoice handler resolves users through order history; it
            // will pick this subscription up.
            tracing::warn!(
                session_id = %event.session_id,
                "Subscription checkout without resolvable user, deferring to invoice handler"
            );
            return Ok(());
        };

        let subscription = self.processor.fetch_subscription(subscription_id).await?;
        let mut record = record_from_processor(&subscription);
        if record.shipping_address.is_none() {
            record.shipping_address.clone_from(&event.shipping_address);
            record.recipient_name.clone_from(&event.shipping_name);
        }
        self.lifecycle.ensure(&record, user.id).await?;

        if let Some(address) = &event.shipping_address {
            self.lifecycle
                .publish_shipping(subscription_id, event.shipping_name.as_deref(), address)
                .await;
        }
        Ok(())
    }

    async fn materialize_renewal(
        &self,
        invoice: &InvoiceEvent,
        subscription: &ProcessorSubscription,
    ) -> Result<(), EngineError> {
        if let Some(existing) = self.orders.find_by_invoice(&invoice.invoice_id).await? {
            tracing::info!(
                invoice_id = %invoice.invoice_id,
                order_id = %existing.id,
                "Invoice already materialized, acknowledging replay"
            );
            return Ok(());
        }

        let customer_id = invoice
            .customer_id
            .as_deref()
            .unwrap_or(&subscription.customer_id);
        let user = self.resolve_user_by_customer(customer_id).await?;
        if user.is_none() {
            tracing::warn!(
                invoice_id = %invoice.invoice_id,
                customer_id,
                "Renewal for unknown customer, creating guest order"
            );
        }

        let mut items = Vec::new();
        let mut subtotal = Cents::ZERO;
        for line in &subscription.lines {
            let Some(option) = self
                .catalog
                .subscription_option_for_product(&line.product_name)
                .await?
            else {
                tracing::warn!(
                    invoice_id = %invoice.invoice_id,
                    product = %line.product_name,
                    "No subscription purchase option for renewal line, skipping"
                );
                continue;
            };
            subtotal += option.price.times(i64::from(line.quantity));
            items.push(NewOrderItem {
                purchase_option_id: option.id,
                variant_id: option.variant_id,
                product_name: option.product_name,
                variant_name: option.variant_name,
                quantity: line.quantity,
                unit_price: option.price,
            });
        }
        if items.is_empty() {
            tracing::warn!(
                invoice_id = %invoice.invoice_id,
                "No resolvable lines on renewal, nothing to materialize"
            );
            return Ok(());
        }

        let record = record_from_processor(subscription);
        let mut payment = invoice.payment.clone();
        merge_refs(&mut payment, &subscription.latest_payment);

        let created = self
            .orders
            .create(NewOrder {
                user_id: user.as_ref().map(|u| u.id),
                delivery_method: DeliveryMethod::Delivery,
                customer_email: user.and_then(|u| u.email),
                customer_phone: None,
                total: subtotal,
                shipping_cost: Cents::ZERO,
                discount: Cents::ZERO,
                processor_session_id: None,
                processor_subscription_id: Some(subscription.id.clone()),
                processor_customer_id: Some(customer_id.to_owned()),
                payment,
                recipient_name: record.recipient_name,
                shipping_address: record.shipping_address,
                items,
            })
            .await?;

        for shortfall in &created.shortfalls {
            tracing::warn!(
                order_id = %created.order.id,
                variant_id = %shortfall.variant_id,
                requested = shortfall.requested,
                available = shortfall.available,
                "Insufficient stock for renewal"
            );
        }

        // Merchant only; the customer hears from us when it ships.
        if let Err(err) = self
            .notifier
            .merchant_alert(&created.order, &created.items, true)
            .await
        {
            tracing::warn!(order_id = %created.order.id, error = %err, "Merchant alert failed");
        }

        tracing::info!(
            order_id = %created.order.id,
            invoice_id = %invoice.invoice_id,
            "Renewal order materialized"
        );
        Ok(())
    }

    async fn backfill_initial_invoice(
        &self,
        invoice: &InvoiceEvent,
        subscription: &ProcessorSubscription,
    ) -> Result<(), EngineError> {
        let customer_id = invoice
            .customer_id
            .as_deref()
            .unwrap_or(&subscription.customer_id);

        // The checkout webhook may have lost the race (or the user); make
        // sure a local record exists when we can attribute one.
        if let Some(user) = self.resolve_user_by_customer(customer_id).await? {
            let record = record_from_processor(subscription);
            self.lifecycle.ensure(&record, user.id).await?;
        }

        let mut refs = invoice.payment.clone();
        merge_refs(&mut refs, &subscription.latest_payment);
        let updated = self
            .orders
            .backfill_payment_refs(&subscription.id, customer_id, &refs)
            .await?;
        tracing::info!(
            invoice_id = %invoice.invoice_id,
            subscription_id = %subscription.id,
            updated,
            "Backfilled payment references"
        );
        Ok(())
    }

    /// Resolve a user from a processor customer id: order history first,
    /// then the customer's email at the processor.
    async fn resolve_user_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<User>, EngineError> {
        if let Some(user) = self.users.user_by_processor_customer(customer_id).await? {
            return Ok(Some(user));
        }

        if let Some(raw) = self.processor.fetch_customer_email(customer_id).await? {
            if let Ok(email) = Email::parse(&raw) {
                return Ok(self.users.user_by_email(&email).await?);
            }
        }
        Ok(None)
    }

    async fn send_checkout_notifications(&self, created: &MaterializedOrder) {
        if created.order.customer_email.is_some() {
            if let Err(err) = self
                .notifier
                .order_confirmation(&created.order, &created.items)
                .await
            {
                tracing::warn!(
                    order_id = %created.order.id,
                    error = %err,
                    "Order confirmation failed"
                );
            }
        }
        if let Err(err) = self
            .notifier
            .merchant_alert(&created.order, &created.items, false)
            .await
        {
            tracing::warn!(order_id = %created.order.id, error = %err, "Merchant alert failed");
        }
    }
}

fn merge_refs(target: &mut PaymentRefs, fallback: &PaymentRefs) {
    if target.transaction_id.is_none() {
        target.transaction_id.clone_from(&fallback.transaction_id);
    }
    if target.charge_id.is_none() {
        target.charge_id.clone_from(&fallback.charge_id);
    }
    if target.invoice_id.is_none() {
        target.invoice_id.clone_from(&fallback.invoice_id);
    }
    if target.card_summary.is_none() {
        target.card_summary.clone_from(&fallback.card_summary);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use artisan_roast_core::{
        OrderStatus, ProductId, PurchaseOptionId, SubscriptionStatus, VariantId,
    };
    use chrono::{TimeZone, Utc};

    use crate::events::CartLine;
    use crate::models::PurchaseOptionDetail;
    use crate::processor::mock::MockProcessor;
    use crate::processor::SubscriptionLine;
    use crate::services::notify::{NotificationKind, RecordingNotifier};
    use crate::store::memory::MemoryStore;
    use crate::store::SubscriptionStore;

    use super::*;

    struct Harness {
        store: Arc<MemoryStore>,
        processor: Arc<MockProcessor>,
        notifier: Arc<RecordingNotifier>,
        materializer: OrderMaterializer,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let processor = Arc::new(MockProcessor::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let lifecycle = SubscriptionLifecycle::new(
            Arc::clone(&store) as _,
            Arc::clone(&processor) as _,
        );
        let materializer = OrderMaterializer::new(
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&store) as _,
            Arc::clone(&notifier) as _,
            Arc::clone(&processor) as _,
            lifecycle,
        );
        Harness {
            store,
            processor,
            notifier,
            materializer,
        }
    }

    fn seed_option(store: &MemoryStore, id: i64, purchase_type: PurchaseType, stock: i32) {
        store.insert_purchase_option(PurchaseOptionDetail {
            id: PurchaseOptionId::new(id),
            purchase_type,
            price: Cents::new(1800),
            delivery_schedule: Some("Every 2 weeks".to_owned()),
            variant_id: VariantId::new(id),
            variant_name: "12oz".to_owned(),
            product_id: ProductId::new(1),
            product_name: "House Blend".to_owned(),
            product_disabled: false,
            stock_quantity: stock,
        });
    }

    fn checkout_event(session_id: &str) -> CheckoutEvent {
        CheckoutEvent {
            session_id: session_id.to_owned(),
            customer_id: Some("cus_9".to_owned()),
            customer_email: Some(Email::parse("jane@example.com").unwrap()),
            customer_name: Some("Jane Doe".to_owned()),
            customer_phone: Some("+15035551234".to_owned()),
            metadata_user_id: None,
            cart: vec![CartLine {
                purchase_option_id: PurchaseOptionId::new(1),
                quantity: 2,
            }],
            delivery_method: DeliveryMethod::Delivery,
            shipping_name: Some("Jane Doe".to_owned()),
            shipping_address: Some(crate::models::ShippingAddress {
                street: "1 Main St".to_owned(),
                city: "Portland".to_owned(),
                state: "OR".to_owned(),
                postal_code: "97201".to_owned(),
                country: "US".to_owned(),
            }),
            payment: PaymentRefs {
                transaction_id: Some("pi_1".to_owned()),
                charge_id: Some("ch_1".to_owned()),
                invoice_id: None,
                card_summary: Some("Visa ****4242".to_owned()),
            },
            total: Cents::new(4100),
            discount: Cents::ZERO,
            subscription_id: None,
        }
    }

    fn processor_subscription(id: &str) -> ProcessorSubscription {
        ProcessorSubscription {
            id: id.to_owned(),
            customer_id: "cus_9".to_owned(),
            status: "active".to_owned(),
            cancel_at_period_end: false,
            canceled_at: None,
            current_period_start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            current_period_end: Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
            pause_resumes_at: None,
            lines: vec![SubscriptionLine {
                product_name: "House Blend".to_owned(),
                quantity: 1,
                unit_amount: Cents::new(1800),
                interval: Some("week".to_owned()),
                interval_count: Some(2),
                price_nickname: Some("Every 2 weeks - 12oz".to_owned()),
            }],
            latest_payment: PaymentRefs::default(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_checkout_creates_order_once() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 10);
        let event = checkout_event("cs_1");

        let outcome = h.materializer.materialize_checkout(&event).await.unwrap();
        let MaterializeOutcome::Created(created) = outcome else {
            panic!("expected created");
        };
        assert_eq!(created.order.status, OrderStatus::Pending);
        assert_eq!(created.order.total, Cents::new(4100));
        // total - 2 * 1800 item subtotal
        assert_eq!(created.order.shipping_cost, Cents::new(500));
        assert_eq!(h.store.stock_level(VariantId::new(1)), 8);

        // Replay: acknowledged, nothing new written.
        let outcome = h.materializer.materialize_checkout(&event).await.unwrap();
        assert!(matches!(outcome, MaterializeOutcome::Duplicate(_)));
        assert_eq!(h.store.orders().len(), 1);
        assert_eq!(h.store.stock_level(VariantId::new(1)), 8);
    }

    #[tokio::test]
    async fn test_checkout_discount_lands_on_order() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 10);
        let mut event = checkout_event("cs_1");
        event.discount = Cents::new(600);

        let MaterializeOutcome::Created(created) =
            h.materializer.materialize_checkout(&event).await.unwrap()
        else {
            panic!("expected created");
        };
        assert_eq!(created.order.discount, Cents::new(600));
        assert_eq!(
            h.store.orders()[0].discount,
            Cents::new(600)
        );
    }

    #[tokio::test]
    async fn test_user_resolution_prefers_metadata_id() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 10);
        h.store.insert_user(User {
            id: UserId::new(7),
            email: Some(Email::parse("someone-else@example.com").unwrap()),
            name: None,
            phone: None,
        });
        h.store.insert_user(User {
            id: UserId::new(8),
            email: Some(Email::parse("jane@example.com").unwrap()),
            name: None,
            phone: None,
        });

        let mut event = checkout_event("cs_1");
        event.metadata_user_id = Some(UserId::new(7));
        let MaterializeOutcome::Created(created) =
            h.materializer.materialize_checkout(&event).await.unwrap()
        else {
            panic!("expected created");
        };
        assert_eq!(created.order.user_id, Some(UserId::new(7)));
    }

    #[tokio::test]
    async fn test_unknown_metadata_user_falls_back_to_email() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 10);
        h.store.insert_user(User {
            id: UserId::new(8),
            email: Some(Email::parse("JANE@example.com").unwrap()),
            name: None,
            phone: None,
        });

        let mut event = checkout_event("cs_1");
        event.metadata_user_id = Some(UserId::new(999));
        let MaterializeOutcome::Created(created) =
            h.materializer.materialize_checkout(&event).await.unwrap()
        else {
            panic!("expected created");
        };
        assert_eq!(created.order.user_id, Some(UserId::new(8)));
    }

    #[tokio::test]
    async fn test_guest_checkout_when_no_user_matches() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 10);
        let MaterializeOutcome::Created(created) = h
            .materializer
            .materialize_checkout(&checkout_event("cs_1"))
            .await
            .unwrap()
        else {
            panic!("expected created");
        };
        assert_eq!(created.order.user_id, None);
    }

    #[tokio::test]
    async fn test_contact_backfill_and_address_book() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 10);
        h.store.insert_user(User {
            id: UserId::new(8),
            email: Some(Email::parse("jane@example.com").unwrap()),
            name: None,
            phone: None,
        });

        h.materializer
            .materialize_checkout(&checkout_event("cs_1"))
            .await
            .unwrap();

        let user = h.store.user_by_id(UserId::new(8)).await.unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Jane Doe"));
        assert_eq!(user.phone.as_deref(), Some("+15035551234"));
        assert_eq!(h.store.saved_addresses().len(), 1);

        // Second checkout with the same address saves nothing new.
        h.materializer
            .materialize_checkout(&checkout_event("cs_2"))
            .await
            .unwrap();
        assert_eq!(h.store.saved_addresses().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_purchase_option_is_malformed() {
        let h = harness();
        let err = h
            .materializer
            .materialize_checkout(&checkout_event("cs_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedEvent(_)));
        assert!(h.store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_shortfall_never_blocks_order() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 1);
        let MaterializeOutcome::Created(created) = h
            .materializer
            .materialize_checkout(&checkout_event("cs_1"))
            .await
            .unwrap()
        else {
            panic!("expected created");
        };
        assert_eq!(created.shortfalls.len(), 1);
        assert_eq!(h.store.orders().len(), 1);
        assert_eq!(h.store.recorded_shortfalls().len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_checkout_ensures_record_and_stamps_metadata() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::Subscription, 10);
        h.store.insert_user(User {
            id: UserId::new(8),
            email: Some(Email::parse("jane@example.com").unwrap()),
            name: None,
            phone: None,
        });
        h.processor.add_subscription(processor_subscription("sub_1"));

        let mut event = checkout_event("cs_1");
        event.subscription_id = Some("sub_1".to_owned());
        h.materializer.materialize_checkout(&event).await.unwrap();

        let subs = h.store.subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].user_id, UserId::new(8));
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        assert_eq!(subs[0].delivery_schedule.as_deref(), Some("Every 2 weeks"));
        assert!(subs[0].shipping_address.is_some());

        let stamped = h.processor.subscription("sub_1").unwrap();
        assert!(stamped.metadata.contains_key("shippingAddress"));

        let order = &h.store.orders()[0];
        assert_eq!(order.processor_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn test_notifications_fire_and_failures_do_not_propagate() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::OneTime, 10);

        h.materializer
            .materialize_checkout(&checkout_event("cs_1"))
            .await
            .unwrap();
        let kinds: Vec<_> = h.notifier.sent().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![NotificationKind::Confirmation, NotificationKind::MerchantNew]
        );

        h.notifier.fail_sends();
        let result = h
            .materializer
            .materialize_checkout(&checkout_event("cs_2"))
            .await;
        assert!(result.is_ok());
        assert_eq!(h.store.orders().len(), 2);
    }

    #[tokio::test]
    async fn test_renewal_invoice_materializes_order() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::Subscription, 10);
        h.processor.add_subscription(processor_subscription("sub_1"));
        h.processor.set_customer_email("cus_9", "jane@example.com");
        h.store.insert_user(User {
            id: UserId::new(8),
            email: Some(Email::parse("jane@example.com").unwrap()),
            name: None,
            phone: None,
        });

        let invoice = InvoiceEvent {
            invoice_id: "in_2".to_owned(),
            customer_id: Some("cus_9".to_owned()),
            subscription_id: Some("sub_1".to_owned()),
            billing_reason: Some("subscription_cycle".to_owned()),
            payment: PaymentRefs {
                transaction_id: Some("pi_2".to_owned()),
                charge_id: None,
                invoice_id: Some("in_2".to_owned()),
                card_summary: None,
            },
        };
        h.materializer.handle_invoice_paid(&invoice).await.unwrap();

        let orders = h.store.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].user_id, Some(UserId::new(8)));
        assert_eq!(orders[0].processor_session_id, None);
        assert_eq!(orders[0].payment.transaction_id.as_deref(), Some("pi_2"));
        assert_eq!(h.store.stock_level(VariantId::new(1)), 9);

        // Merchant-only notification.
        let kinds: Vec<_> = h.notifier.sent().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::MerchantRenewal]);

        // Redelivery is a no-op.
        h.materializer.handle_invoice_paid(&invoice).await.unwrap();
        assert_eq!(h.store.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_initial_invoice_backfills_payment_refs() {
        let h = harness();
        seed_option(&h.store, 1, PurchaseType::Subscription, 10);
        h.processor.add_subscription(processor_subscription("sub_1"));

        // Checkout landed first but carried no payment references.
        let mut event = checkout_event("cs_1");
        event.payment = PaymentRefs::default();
        event.subscription_id = Some("sub_1".to_owned());
        h.materializer.materialize_checkout(&event).await.unwrap();

        let invoice = InvoiceEvent {
            invoice_id: "in_1".to_owned(),
            customer_id: Some("cus_9".to_owned()),
            subscription_id: Some("sub_1".to_owned()),
            billing_reason: Some("subscription_create".to_owned()),
            payment: PaymentRefs {
                transaction_id: Some("pi_1".to_owned()),
                charge_id: Some("ch_1".to_owned()),
                invoice_id: Some("in_1".to_owned()),
                card_summary: None,
            },
        };
        h.materializer.handle_invoice_paid(&invoice).await.unwrap();

        let order = &h.store.orders()[0];
        assert_eq!(order.payment.transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(order.payment.charge_id.as_deref(), Some("ch_1"));
        // Still exactly one order: the initial invoice never materializes.
        assert_eq!(h.store.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_invoice_without_subscription_ignored() {
        let h = harness();
        let invoice = InvoiceEvent {
            invoice_id: "in_oneoff".to_owned(),
            customer_id: Some("cus_9".to_owned()),
            subscription_id: None,
            billing_reason: Some("manual".to_owned()),
            payment: PaymentRefs::default(),
        };
        h.materializer.handle_invoice_paid(&invoice).await.unwrap();
        assert!(h.store.orders().is_empty());
        assert!(h.processor.calls().is_empty());
    }
}
