//! Order notifications.
//!
//! Notifications are a collaborator seam: the engine calls through
//! [`NotificationSender`] after a transaction commits, logs failures, and
//! never propagates them. Template rendering is out of scope; bodies are
//! plain text.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use crate::config::EmailConfig;
use crate::models::{Order, OrderItem};

/// Errors from building or sending a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("order has no customer email")]
    NoRecipient,
}

/// Sends order notifications. Callers treat every send as best-effort.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Confirmation to the customer after checkout materialization.
    async fn order_confirmation(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), NotifyError>;

    /// New-order alert to the merchant. `renewal` distinguishes subscription
    /// renewals from fresh checkouts in the subject line.
    async fn merchant_alert(
        &self,
        order: &Order,
        items: &[OrderItem],
        renewal: bool,
    ) -> Result<(), NotifyError>;
}

/// SMTP-backed sender.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    merchant: Mailbox,
}

impl SmtpNotifier {
    /// Build a sender from email configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if the relay or the configured addresses are
    /// invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.expose_secret().to_owned(),
            ))
            .build();
        Ok(Self {
            transport,
            from: config.from_address.parse()?,
            merchant: config.merchant_address.parse()?,
        })
    }

    async fn send(&self, to: Mailbox, subject: String, body: String) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

fn item_lines(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "  {} x {} ({}) - {} each",
                item.quantity, item.product_name, item.variant_name, item.unit_price
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl NotificationSender for SmtpNotifier {
    async fn order_confirmation(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), NotifyError> {
        let email = order.customer_email.as_ref().ok_or(NotifyError::NoRecipient)?;
        let to: Mailbox = email.as_str().parse()?;
        let body = format!(
            "Thanks for your order!\n\nOrder #{}\n\n{}\n\nTotal: {}\n\nWe'll email you again when it ships.\n",
            order.id,
            item_lines(items),
            order.total
        );
        self.send(to, format!("Order confirmation #{}", order.id), body)
            .await
    }

    async fn merchant_alert(
        &self,
        order: &Order,
        items: &[OrderItem],
        renewal: bool,
    ) -> Result<(), NotifyError> {
        let kind = if renewal { "Subscription renewal" } else { "New order" };
        let customer = order
            .customer_email
            .as_ref()
            .map_or("guest", artisan_roast_core::Email::as_str);
        let body = format!(
            "{kind} #{}\n\nCustomer: {customer}\nDelivery: {}\n\n{}\n\nTotal: {}\n",
            order.id,
            order.delivery_method,
            item_lines(items),
            order.total
        );
        self.send(
            self.merchant.clone(),
            format!("{kind} #{}", order.id),
            body,
        )
        .await
    }
}

/// No-op sender used when SMTP is not configured.
pub struct NullNotifier;

#[async_trait]
impl NotificationSender for NullNotifier {
    async fn order_confirmation(
        &self,
        order: &Order,
        _items: &[OrderItem],
    ) -> Result<(), NotifyError> {
        tracing::debug!(order_id = %order.id, "Email disabled, skipping order confirmation");
        Ok(())
    }

    async fn merchant_alert(
        &self,
        order: &Order,
        _items: &[OrderItem],
        renewal: bool,
    ) -> Result<(), NotifyError> {
        tracing::debug!(order_id = %order.id, renewal, "Email disabled, skipping merchant alert");
        Ok(())
    }
}

/// Records sends instead of delivering; tests assert on the log.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: Mutex<bool>,
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub kind: NotificationKind,
    pub order_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Confirmation,
    MerchantNew,
    MerchantRenewal,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SentNotification>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent send fail; callers must treat that as
    /// non-fatal.
    pub fn fail_sends(&self) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.lock().clone()
    }

    fn record(&self, kind: NotificationKind, order: &Order) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(NotifyError::NoRecipient);
        }
        self.lock().push(SentNotification {
            kind,
            order_id: order.id.as_i64(),
        });
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn order_confirmation(
        &self,
        order: &Order,
        _items: &[OrderItem],
    ) -> Result<(), NotifyError> {
        self.record(NotificationKind::Confirmation, order)
    }

    async fn merchant_alert(
        &self,
        order: &Order,
        _items: &[OrderItem],
        renewal: bool,
    ) -> Result<(), NotifyError> {
        let kind = if renewal {
            NotificationKind::MerchantRenewal
        } else {
            NotificationKind::MerchantNew
        };
        self.record(kind, order)
    }
}
