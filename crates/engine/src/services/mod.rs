//! Business services: the order materializer, subscription lifecycle,
//! cancellation compensator, notifications, and the keyed lock that
//! serializes webhook handling per subscription.

pub mod compensator;
pub mod lifecycle;
pub mod locks;
pub mod materializer;
pub mod notify;

pub use compensator::{CancellationCompensator, CompensationSummary, OrderUnwind};
pub use lifecycle::SubscriptionLifecycle;
pub use locks::KeyedLock;
pub use materializer::{MaterializeOutcome, OrderMaterializer};
pub use notify::{
    NotificationKind, NotificationSender, NotifyError, NullNotifier, RecordingNotifier,
    SmtpNotifier,
};
