//! Address book queries.

use async_trait::async_trait;

use artisan_roast_core::UserId;

use crate::models::ShippingAddress;
use crate::store::{AddressBook, StoreError};

use super::PgStore;

#[async_trait]
impl AddressBook for PgStore {
    async fn save_if_new(
        &self,
        user_id: UserId,
        recipient_name: Option<&str>,
        address: &ShippingAddress,
    ) -> Result<bool, StoreError> {
        // Field-by-field dedup; the recipient name alone does not make an
        // address new.
        let result = sqlx::query(
            "INSERT INTO addresses (user_id, recipient_name, street, city, state, \
             postal_code, country) \
             SELECT $1, $2, $3, $4, $5, $6, $7 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM addresses \
                 WHERE user_id = $1 AND street = $3 AND city = $4 AND state = $5 \
                 AND postal_code = $6 AND country = $7 \
             )",
        )
        .bind(user_id)
        .bind(recipient_name)
        .bind(&address.street)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
