//! Subscription queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use artisan_roast_core::{Cents, SubscriptionId, SubscriptionStatus, UserId};

use crate::models::{
    ContactUpdate, ShippingAddress, Subscription, SubscriptionPatch, SubscriptionRecord,
};
use crate::store::{StoreError, SubscriptionStore};

use super::PgStore;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, processor_subscription_id, \
     processor_customer_id, status, product_names, quantities, price_cents, \
     delivery_schedule, current_period_start, current_period_end, \
     cancel_at_period_end, canceled_at, paused_until, recipient_name, \
     recipient_phone, shipping_street, shipping_city, shipping_state, \
     shipping_postal_code, shipping_country, created_at";

#[derive(FromRow)]
struct SubscriptionRow {
    id: SubscriptionId,
    user_id: UserId,
    processor_subscription_id: String,
    processor_customer_id: String,
    status: String,
    product_names: Vec<String>,
    quantities: Vec<i32>,
    price_cents: Cents,
    delivery_schedule: Option<String>,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    paused_until: Option<DateTime<Utc>>,
    recipient_name: Option<String>,
    recipient_phone: Option<String>,
    shipping_street: Option<String>,
    shipping_city: Option<String>,
    shipping_state: Option<String>,
    shipping_postal_code: Option<String>,
    shipping_country: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, StoreError> {
        let status = row
            .status
            .parse::<SubscriptionStatus>()
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
            processor_subscription_id: row.processor_subscription_id,
            processor_customer_id: row.processor_customer_id,
            status,
            product_names: row.product_names,
            quantities: row.quantities,
            price: row.price_cents,
            delivery_schedule: row.delivery_schedule,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at,
            paused_until: row.paused_until,
            recipient_name: row.recipient_name,
            recipient_phone: row.recipient_phone,
            shipping_address,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn find(&self, id: SubscriptionId) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE processor_subscription_id = $1"
        ))
        .bind(processor_subscription_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn for_processor_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE processor_customer_id = $1 ORDER BY id"
        ))
        .bind(processor_customer_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn upsert(
        &self,
        record: &SubscriptionRecord,
        user_id: UserId,
    ) -> Result<(SubscriptionId, bool), StoreError> {
        let address = record.shipping_address.as_ref();
        // xmax = 0 distinguishes a fresh insert from a conflict update.
        let (id, inserted) = sqlx::query_as::<_, (SubscriptionId, bool)>(
            "INSERT INTO subscriptions (user_id, processor_subscription_id, \
             processor_customer_id, status, product_names, quantities, price_cents, \
             delivery_schedule, current_period_start, current_period_end, \
             cancel_at_period_end, canceled_at, paused_until, recipient_name, \
             shipping_street, shipping_city, shipping_state, shipping_postal_code, \
             shipping_country) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16, $17, $18, $19) \
             ON CONFLICT (processor_subscription_id) DO UPDATE SET \
             processor_customer_id = EXCLUDED.processor_customer_id, \
             status = EXCLUDED.status, \
             product_names = EXCLUDED.product_names, \
             quantities = EXCLUDED.quantities, \
             price_cents = EXCLUDED.price_cents, \
             delivery_schedule = EXCLUDED.delivery_schedule, \
             current_period_start = EXCLUDED.current_period_start, \
             current_period_end = EXCLUDED.current_period_end, \
             cancel_at_period_end = EXCLUDED.cancel_at_period_end, \
             canceled_at = EXCLUDED.canceled_at, \
             paused_until = EXCLUDED.paused_until, \
             recipient_name = COALESCE(EXCLUDED.recipient_name, subscriptions.recipient_name), \
             shipping_street = COALESCE(EXCLUDED.shipping_street, subscriptions.shipping_street), \
             shipping_city = COALESCE(EXCLUDED.shipping_city, subscriptions.shipping_city), \
             shipping_state = COALESCE(EXCLUDED.shipping_state, subscriptions.shipping_state), \
             shipping_postal_code = COALESCE(EXCLUDED.shipping_postal_code, subscriptions.shipping_postal_code), \
             shipping_country = COALESCE(EXCLUDED.shipping_country, subscriptions.shipping_country) \
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(user_id)
        .bind(&record.processor_subscription_id)
        .bind(&record.processor_customer_id)
        .bind(record.status)
        .bind(&record.product_names)
        .bind(&record.quantities)
        .bind(record.price)
        .bind(record.delivery_schedule.as_deref())
        .bind(record.current_period_start)
        .bind(record.current_period_end)
        .bind(record.cancel_at_period_end)
        .bind(record.canceled_at)
        .bind(record.paused_until)
        .bind(record.recipient_name.as_deref())
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.state.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.map(|a| a.country.as_str()))
        .fetch_one(self.pool())
        .await?;
        Ok((id, inserted))
    }

    async fn update_existing(&self, patch: &SubscriptionPatch) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET \
             status = $2, \
             current_period_start = $3, \
             current_period_end = $4, \
             cancel_at_period_end = $5, \
             canceled_at = $6, \
             paused_until = $7, \
             delivery_schedule = COALESCE($8, delivery_schedule) \
             WHERE processor_subscription_id = $1",
        )
        .bind(&patch.processor_subscription_id)
        .bind(patch.status)
        .bind(patch.current_period_start)
        .bind(patch.current_period_end)
        .bind(patch.cancel_at_period_end)
        .bind(patch.canceled_at)
        .bind(patch.paused_until)
        .bind(patch.delivery_schedule.as_deref())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_canceled(
        &self,
        processor_subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET \
             status = 'CANCELED', \
             canceled_at = $2, \
             cancel_at_period_end = FALSE \
             WHERE processor_subscription_id = $1",
        )
        .bind(processor_subscription_id)
        .bind(at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_paused(&self, id: SubscriptionId, until: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'PAUSED', paused_until = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(until)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("subscription {id}")));
        }
        Ok(())
    }

    async fn set_active(&self, id: SubscriptionId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'ACTIVE', paused_until = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("subscription {id}")));
        }
        Ok(())
    }

    async fn update_recipient_contact(
        &self,
        id: SubscriptionId,
        update: &ContactUpdate,
    ) -> Result<(), StoreError> {
        let address = update.shipping_address.as_ref();
        let result = sqlx::query(
            "UPDATE subscriptions SET \
             recipient_name = COALESCE($2, recipient_name), \
             recipient_phone = COALESCE($3, recipient_phone), \
             shipping_street = COALESCE($4, shipping_street), \
             shipping_city = COALESCE($5, shipping_city), \
             shipping_state = COALESCE($6, shipping_state), \
             shipping_postal_code = COALESCE($7, shipping_postal_code), \
             shipping_country = COALESCE($8, shipping_country) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.recipient_name.as_deref())
        .bind(update.phone.as_deref())
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.state.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.map(|a| a.country.as_str()))
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("subscription {id}")));
        }
        Ok(())
    }
}
