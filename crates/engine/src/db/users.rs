//! User queries.

use async_trait::async_trait;
use sqlx::FromRow;

use artisan_roast_core::{Email, UserId};

use crate::models::User;
use crate::store::{StoreError, UserStore};

use super::PgStore;

#[derive(FromRow)]
struct UserRow {
    id: UserId,
    email: Option<Email>,
    name: Option<String>,
    phone: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            phone: row.phone,
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, phone FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(User::from))
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        // Most recent account wins when several share an email with
        // different casing.
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, phone FROM users \
             WHERE LOWER(email) = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1",
        )
        .bind(email.normalized())
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(User::from))
    }

    async fn user_by_processor_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.email, u.name, u.phone FROM users u \
             JOIN orders o ON o.user_id = u.id \
             WHERE o.processor_customer_id = $1 \
             ORDER BY o.created_at DESC \
             LIMIT 1",
        )
        .bind(processor_customer_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(User::from))
    }

    async fn fill_missing_contact(
        &self,
        id: UserId,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET \
             name = COALESCE(name, $2), \
             phone = COALESCE(phone, $3) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(name)
        .bind(phone)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
