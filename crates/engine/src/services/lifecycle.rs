//! Subscription state machine.
//!
//! Local subscription records mirror the processor's billing state. Webhook
//! handlers apply processor-driven transitions (`ensure`, `apply_update`,
//! `mark_canceled`); user-driven transitions (`skip`, `resume`,
//! `finalize_cancel`) talk to the processor first and only record locally
//! once the processor accepted the change. `CANCELED` is terminal.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use artisan_roast_core::{SubscriptionId, UserId};

use crate::billing;
use crate::error::EngineError;
use crate::models::{ShippingAddress, Subscription, SubscriptionPatch, SubscriptionRecord};
use crate::processor::{ProcessorClient, ProcessorError};
use crate::store::SubscriptionStore;

/// Subscription transitions, local and processor-side.
#[derive(Clone)]
pub struct SubscriptionLifecycle {
    store: Arc<dyn SubscriptionStore>,
    processor: Arc<dyn ProcessorClient>,
}

impl SubscriptionLifecycle {
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>, processor: Arc<dyn ProcessorClient>) -> Self {
        Self { store, processor }
    }

    /// Verify the caller owns the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Forbidden`] on mismatch.
    pub fn authorize(subscription: &Subscription, caller: UserId) -> Result<(), EngineError> {
        if subscription.user_id == caller {
            Ok(())
        } else {
            Err(EngineError::Forbidden(
                "subscription belongs to a different account".to_owned(),
            ))
        }
    }

    /// Create or refresh the local record for a processor subscription.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the upsert fails.
    pub async fn ensure(
        &self,
        record: &SubscriptionRecord,
        user_id: UserId,
    ) -> Result<(SubscriptionId, bool), EngineError> {
        let (id, created) = self.store.upsert(record, user_id).await?;
        if created {
            tracing::info!(
                subscription_id = %id,
                processor_subscription_id = %record.processor_subscription_id,
                "Subscription record created"
            );
        }
        Ok((id, created))
    }

    /// Apply a processor-driven billing-state patch. Returns whether a local
    /// record existed; updates for unknown subscriptions are skipped, not
    /// created (checkout materialization owns creation).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the write fails.
    pub async fn apply_update(&self, patch: &SubscriptionPatch) -> Result<bool, EngineError> {
        let applied = self.store.update_existing(patch).await?;
        if !applied {
            tracing::info!(
                processor_subscription_id = %patch.processor_subscription_id,
                "No local record for subscription update, skipping"
            );
        }
        Ok(applied)
    }

    /// Record a processor-driven cancellation. Returns whether a local
    /// record existed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the write fails.
    pub async fn mark_canceled(
        &self,
        processor_subscription_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError> {
        let existed = self
            .store
            .mark_canceled(processor_subscription_id, at.unwrap_or_else(Utc::now))
            .await?;
        if !existed {
            tracing::info!(
                processor_subscription_id,
                "No local record for canceled subscription, skipping"
            );
        }
        Ok(existed)
    }

    /// Stamp the shipping snapshot onto the processor subscription's
    /// metadata so renewal orders can ship without a local lookup.
    /// Best-effort; failures are logged, never propagated.
    pub async fn publish_shipping(
        &self,
        processor_subscription_id: &str,
        recipient_name: Option<&str>,
        address: &ShippingAddress,
    ) {
        let json = match serde_json::to_string(address) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to serialize shipping address");
                return;
            }
        };
        let mut entries = vec![("shippingAddress", json)];
        if let Some(name) = recipient_name {
            entries.push(("recipientName", name.to_owned()));
        }
        if let Err(err) = self
            .processor
            .update_subscription_metadata(processor_subscription_id, &entries)
            .await
        {
            tracing::warn!(
                processor_subscription_id,
                error = %err,
                "Failed to stamp shipping metadata on subscription"
            );
        }
    }

    /// Skip the next billing period: pause collection at the processor until
    /// the period after next, then record PAUSED locally. Returns the resume
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] unless the subscription is
    /// active, or a processor/store error if either side fails.
    pub async fn skip(&self, subscription: &Subscription) -> Result<DateTime<Utc>, EngineError> {
        if !subscription.status.can_skip() {
            return Err(EngineError::InvalidTransition(
                "Can only skip billing on active subscriptions".to_owned(),
            ));
        }

        let resumes_at = billing::next_period_timestamp(
            subscription.current_period_end,
            subscription.delivery_schedule.as_deref(),
        );
        self.processor
            .pause_collection(&subscription.processor_subscription_id, resumes_at)
            .await?;
        self.store.set_paused(subscription.id, resumes_at).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            %resumes_at,
            "Billing period skipped"
        );
        Ok(resumes_at)
    }

    /// Resume a paused subscription.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] unless the subscription is
    /// paused, or a processor/store error if either side fails.
    pub async fn resume(&self, subscription: &Subscription) -> Result<(), EngineError> {
        if !subscription.status.can_resume() {
            return Err(EngineError::InvalidTransition(
                "Can only resume paused subscriptions".to_owned(),
            ));
        }

        self.processor
            .resume_collection(&subscription.processor_subscription_id)
            .await?;
        self.store.set_active(subscription.id).await?;

        tracing::info!(subscription_id = %subscription.id, "Subscription resumed");
        Ok(())
    }

    /// Cancel at the processor and record the terminal state locally.
    ///
    /// A processor 404 (subscription already gone on their side) is logged
    /// and treated as success; the local record is still closed out.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] if the subscription cannot
    /// be cancelled from its current state, or a processor/store error.
    pub async fn finalize_cancel(&self, subscription: &Subscription) -> Result<(), EngineError> {
        if !subscription.status.can_cancel() {
            return Err(EngineError::InvalidTransition(
                "Can only cancel active or paused subscriptions".to_owned(),
            ));
        }

        match self
            .processor
            .cancel_subscription(&subscription.processor_subscription_id)
            .await
        {
            Ok(()) => {}
            Err(ProcessorError::Rejected {
                status: Some(404), ..
            }) => {
                tracing::warn!(
                    processor_subscription_id = %subscription.processor_subscription_id,
                    "Subscription already gone at processor, closing out locally"
                );
            }
            Err(err) => return Err(err.into()),
        }

        self.store
            .mark_canceled(&subscription.processor_subscription_id, Utc::now())
            .await?;
        tracing::info!(subscription_id = %subscription.id, "Subscription canceled");
        Ok(())
    }
}
