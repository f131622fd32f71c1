//! Domain models for the reconciliation engine.

pub mod catalog;
pub mod order;
pub mod subscription;
pub mod user;

pub use catalog::PurchaseOptionDetail;
pub use order::{
    CancelOutcome, ContactUpdate, MaterializedOrder, NewOrder, NewOrderItem, Order, OrderItem,
    PaymentRefs, ShippingAddress, StockShortfall,
};
pub use subscription::{Subscription, SubscriptionPatch, SubscriptionRecord};
pub use user::User;
