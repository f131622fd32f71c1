//! Order queries and transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use artisan_roast_core::{
    Cents, DeliveryMethod, Email, OrderId, OrderItemId, OrderStatus, PurchaseOptionId, UserId,
    VariantId,
};

use crate::models::{
    CancelOutcome, ContactUpdate, MaterializedOrder, NewOrder, Order, OrderItem, PaymentRefs,
    ShippingAddress,
};
use crate::store::{OrderStore, StoreError};

use super::{inventory, PgStore};

const ORDER_COLUMNS: &str = "id, user_id, status, delivery_method, customer_email, \
     customer_phone, total_cents, shipping_cents, discount_cents, processor_session_id, \
     processor_subscription_id, processor_customer_id, transaction_id, charge_id, \
     invoice_id, card_summary, recipient_name, shipping_street, shipping_city, \
     shipping_state, shipping_postal_code, shipping_country, created_at";

#[derive(FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: Option<UserId>,
    status: String,
    delivery_method: String,
    customer_email: Option<Email>,
    customer_phone: Option<String>,
    total_cents: Cents,
    shipping_cents: Cents,
    discount_cents: Cents,
    processor_session_id: Option<String>,
    processor_subscription_id: Option<String>,
    processor_customer_id: Option<String>,
    transaction_id: Option<String>,
    charge_id: Option<String>,
    invoice_id: Option<String>,
    card_summary: Option<String>,
    recipient_name: Option<String>,
    shipping_street: Option<String>,
    shipping_city: Option<String>,
    shipping_state: Option<String>,
    shipping_postal_code: Option<String>,
    shipping_country: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, StoreError> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(StoreError::DataCorruption)?;
        let delivery_method = row
            .delivery_method
            .parse::<DeliveryMethod>()
            .map_err(StoreError::DataCorruption)?;

        let shipping_address = match (
            row.shipping_street,
            row.shipping_city,
            row.shipping_state,
            row.shipping_postal_code,
            row.shipping_country,
        ) {
            (Some(street), Some(city), Some(state), Some(postal_code), Some(country)) => {
                Some(ShippingAddress {
                    street,
                    city,
                    state,
                    postal_code,
                    country,
                })
            }
            _ => None,
        };

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            status,
            delivery_method,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            total: row.total_cents,
            shipping_cost: row.shipping_cents,
            discount: row.discount_cents,
            processor_session_id: row.processor_session_id,
            processor_subscription_id: row.processor_subscription_id,
            processor_customer_id: row.processor_customer_id,
            payment: PaymentRefs {
                transaction_id: row.transaction_id,
                charge_id: row.charge_id,
                invoice_id: row.invoice_id,
                card_summary: row.card_summary,
            },
            recipient_name: row.recipient_name,
            shipping_address,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ItemRow {
    id: OrderItemId,
    order_id: OrderId,
    purchase_option_id: PurchaseOptionId,
    variant_id: VariantId,
    product_name: String,
    variant_name: String,
    quantity: i32,
    unit_price_cents: Cents,
    restocked_at: Option<DateTime<Utc>>,
}

impl From<ItemRow> for OrderItem {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            purchase_option_id: row.purchase_option_id,
            variant_id: row.variant_id,
            product_name: row.product_name,
            variant_name: row.variant_name,
            quantity: row.quantity,
            unit_price: row.unit_price_cents,
            restocked_at: row.restocked_at,
        }
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE processor_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn create(&self, order: NewOrder) -> Result<MaterializedOrder, StoreError> {
        let mut tx = self.pool().begin().await?;

        let address = order.shipping_address.as_ref();
        let order_row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (user_id, status, delivery_method, customer_email, \
             customer_phone, total_cents, shipping_cents, discount_cents, \
             processor_session_id, processor_subscription_id, processor_customer_id, \
             transaction_id, charge_id, invoice_id, card_summary, recipient_name, \
             shipping_street, shipping_city, shipping_state, shipping_postal_code, \
             shipping_country) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
             $16, $17, $18, $19, $20, $21) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id)
        .bind(OrderStatus::Pending)
        .bind(order.delivery_method)
        .bind(order.customer_email.as_ref())
        .bind(order.customer_phone.as_deref())
        .bind(order.total)
        .bind(order.shipping_cost)
        .bind(order.discount)
        .bind(order.processor_session_id.as_deref())
        .bind(order.processor_subscription_id.as_deref())
        .bind(order.processor_customer_id.as_deref())
        .bind(order.payment.transaction_id.as_deref())
        .bind(order.payment.charge_id.as_deref())
        .bind(order.payment.invoice_id.as_deref())
        .bind(order.payment.card_summary.as_deref())
        .bind(order.recipient_name.as_deref())
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.state.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.map(|a| a.country.as_str()))
        .fetch_one(&mut *tx)
        .await?;
        let persisted = Order::try_from(order_row)?;

        let mut items = Vec::with_capacity(order.items.len());
        let mut shortfalls = Vec::new();
        for item in &order.items {
            let item_row = sqlx::query_as::<_, ItemRow>(
                "INSERT INTO order_items (order_id, purchase_option_id, variant_id, \
                 product_name, variant_name, quantity, unit_price_cents) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING id, order_id, purchase_option_id, variant_id, product_name, \
                 variant_name, quantity, unit_price_cents, restocked_at",
            )
            .bind(persisted.id)
            .bind(item.purchase_option_id)
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(&item.variant_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(OrderItem::from(item_row));

            if let Some(shortfall) =
                inventory::reserve(&mut tx, persisted.id, item.variant_id, item.quantity).await?
            {
                shortfalls.push(shortfall);
            }
        }

        tx.commit().await?;
        Ok(MaterializedOrder {
            order: persisted,
            items,
            shortfalls,
        })
    }

    async fn find_by_invoice(&self, invoice_id: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE invoice_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(invoice_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT id, order_id, purchase_option_id, variant_id, product_name, \
             variant_name, quantity, unit_price_cents, restocked_at \
             FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn pending_for_subscription(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE processor_subscription_id = $1 AND status = 'PENDING' \
             ORDER BY created_at"
        ))
        .bind(processor_subscription_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn cancel_and_restock(&self, order_id: OrderId) -> Result<CancelOutcome, StoreError> {
        let mut tx = self.pool().begin().await?;

        // The status guard makes replays observable: a second cancel matches
        // zero rows.
        let cancelled = sqlx::query(
            "UPDATE orders SET status = 'CANCELLED' WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        if cancelled.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CancelOutcome::NotCancellable);
        }

        let lines = sqlx::query_as::<_, (VariantId, i32)>(
            "UPDATE order_items SET restocked_at = NOW() \
             WHERE order_id = $1 AND restocked_at IS NULL \
             RETURNING variant_id, quantity",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut restocked = Vec::with_capacity(lines.len());
        for (variant_id, quantity) in lines {
            inventory::restock(&mut tx, variant_id, quantity).await?;
            restocked.push((variant_id, quantity));
        }

        tx.commit().await?;
        Ok(CancelOutcome::Cancelled { restocked })
    }

    async fn backfill_payment_refs(
        &self,
        processor_subscription_id: &str,
        processor_customer_id: &str,
        refs: &PaymentRefs,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool().begin().await?;

        let linked = sqlx::query(
            "UPDATE orders SET \
             transaction_id = COALESCE(transaction_id, $2), \
             charge_id = COALESCE(charge_id, $3), \
             invoice_id = COALESCE(invoice_id, $4), \
             card_summary = COALESCE(card_summary, $5) \
             WHERE processor_subscription_id = $1 AND transaction_id IS NULL",
        )
        .bind(processor_subscription_id)
        .bind(refs.transaction_id.as_deref())
        .bind(refs.charge_id.as_deref())
        .bind(refs.invoice_id.as_deref())
        .bind(refs.card_summary.as_deref())
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() > 0 {
            tx.commit().await?;
            return Ok(linked.rows_affected());
        }

        // The checkout webhook may not have linked the order yet; match
        // recent unlinked orders for the same customer and adopt them.
        let adopted = sqlx::query(
            "UPDATE orders SET \
             processor_subscription_id = $1, \
             transaction_id = COALESCE(transaction_id, $3), \
             charge_id = COALESCE(charge_id, $4), \
             invoice_id = COALESCE(invoice_id, $5), \
             card_summary = COALESCE(card_summary, $6) \
             WHERE processor_customer_id = $2 \
             AND processor_subscription_id IS NULL \
             AND transaction_id IS NULL \
             AND created_at >= NOW() - INTERVAL '5 minutes'",
        )
        .bind(processor_subscription_id)
        .bind(processor_customer_id)
        .bind(refs.transaction_id.as_deref())
        .bind(refs.charge_id.as_deref())
        .bind(refs.invoice_id.as_deref())
        .bind(refs.card_summary.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(adopted.rows_affected())
    }

    async fn update_pending_contact(
        &self,
        processor_customer_id: &str,
        update: &ContactUpdate,
    ) -> Result<u64, StoreError> {
        let address = update.shipping_address.as_ref();
        let result = sqlx::query(
            "UPDATE orders SET \
             recipient_name = COALESCE($2, recipient_name), \
             customer_phone = COALESCE($3, customer_phone), \
             shipping_street = COALESCE($4, shipping_street), \
             shipping_city = COALESCE($5, shipping_city), \
             shipping_state = COALESCE($6, shipping_state), \
             shipping_postal_code = COALESCE($7, shipping_postal_code), \
             shipping_country = COALESCE($8, shipping_country) \
             WHERE processor_customer_id = $1 AND status = 'PENDING'",
        )
        .bind(processor_customer_id)
        .bind(update.recipient_name.as_deref())
        .bind(update.phone.as_deref())
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.state.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.map(|a| a.country.as_str()))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
