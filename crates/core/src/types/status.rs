//! Status enums for orders, subscriptions, and purchase options.
//!
//! All of these are stored as TEXT columns (SCREAMING_SNAKE_CASE values, the
//! same strings the original schema used), so the sqlx impls delegate to
//! `String` via `Display`/`FromStr` rather than mapping a Postgres enum type.

use serde::{Deserialize, Serialize};

/// Implements `Display`, `FromStr`, and (with the `postgres` feature) sqlx
/// text encoding for a status enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $(Self::$variant => $text,)+
                };
                write!(f, "{s}")
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }

        #[cfg(feature = "postgres")]
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(s.parse::<Self>()?)
            }
        }

        #[cfg(feature = "postgres")]
        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.to_string(), buf)
            }
        }
    };
}

/// Order fulfillment status.
///
/// Transitions are monotonic (`Pending` -> `Shipped` -> `Delivered`) except
/// for the explicit cancel-after-pending path. A `Shipped` order is never
/// cancelled by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Shipped,
    Delivered,
    Cancelled,
}

text_enum!(OrderStatus {
    Pending => "PENDING",
    Shipped => "SHIPPED",
    Delivered => "DELIVERED",
    Cancelled => "CANCELLED",
});

impl OrderStatus {
    /// Whether the engine may cancel an order in this state.
    #[must_use]
    pub const fn cancellable(self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Local subscription status, mirroring the processor's billing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Paused,
    Canceled,
    PastDue,
}

text_enum!(SubscriptionStatus {
    Active => "ACTIVE",
    Paused => "PAUSED",
    Canceled => "CANCELED",
    PastDue => "PAST_DUE",
});

impl SubscriptionStatus {
    /// `Canceled` is terminal; no transition leaves it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Skip is only valid on an active subscription.
    #[must_use]
    pub const fn can_skip(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Resume is only valid on a paused subscription.
    #[must_use]
    pub const fn can_resume(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Cancel is valid from active or paused.
    #[must_use]
    pub const fn can_cancel(self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }
}

/// How a purchase option bills: once, or on a recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseType {
    OneTime,
    Subscription,
}

text_enum!(PurchaseType {
    OneTime => "ONE_TIME",
    Subscription => "SUBSCRIPTION",
});

/// How an order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    #[default]
    Delivery,
    Pickup,
}

text_enum!(DeliveryMethod {
    Delivery => "DELIVERY",
    Pickup => "PICKUP",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_text_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let text = status.to_string();
            assert_eq!(text.parse::<OrderStatus>().unwrap(), status);
        }
        assert!("SHIPPED?".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_subscription_status_text_roundtrip() {
        assert_eq!(
            "PAST_DUE".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::PastDue
        );
        assert_eq!(SubscriptionStatus::PastDue.to_string(), "PAST_DUE");
    }

    #[test]
    fn test_order_cancellable_only_when_pending() {
        assert!(OrderStatus::Pending.cancellable());
        assert!(!OrderStatus::Shipped.cancellable());
        assert!(!OrderStatus::Delivered.cancellable());
        assert!(!OrderStatus::Cancelled.cancellable());
    }

    #[test]
    fn test_subscription_transition_guards() {
        assert!(SubscriptionStatus::Active.can_skip());
        assert!(!SubscriptionStatus::Paused.can_skip());

        assert!(SubscriptionStatus::Paused.can_resume());
        assert!(!SubscriptionStatus::Active.can_resume());

        assert!(SubscriptionStatus::Active.can_cancel());
        assert!(SubscriptionStatus::Paused.can_cancel());
        assert!(!SubscriptionStatus::Canceled.can_cancel());
        assert!(SubscriptionStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_serde_matches_wire_format() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"PAST_DUE\"");
        let json = serde_json::to_string(&PurchaseType::OneTime).unwrap();
        assert_eq!(json, "\"ONE_TIME\"");
    }
}
