//! Cancellation compensator.
//!
//! When a subscription is cancelled, its pending orders are unwound: refund
//! the payment, cancel the order, restore stock. Each order is processed
//! independently; one failure never blocks the rest.
//!
//! Refunds are two-tier. The stored transaction id is tried first; orders
//! that predate the payment backfill fall back to the customer's recent
//! charges, matched on exact amount, not already refunded, and succeeded.
//! The amount match is ambiguous when a customer has two identical-amount
//! charges; the processor call log line per refund keeps that auditable.

use std::sync::Arc;

use crate::error::EngineError;
use crate::models::{CancelOutcome, Order};
use crate::processor::{ProcessorClient, ProcessorError};
use crate::store::OrderStore;

/// How many recent charges the fallback scans.
const CHARGE_LOOKBACK: u8 = 10;

/// Aggregate result of unwinding a subscription's pending orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationSummary {
    pub orders_canceled: u32,
    pub orders_refunded: u32,
    /// Refund attempts that timed out: outcome unknown, flagged for manual
    /// reconciliation.
    pub refunds_unresolved: u32,
}

enum RefundOutcome {
    Refunded,
    NoTarget,
    Unresolved,
}

/// Result of unwinding a single order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUnwind {
    pub refunded: bool,
    /// The refund attempt timed out: outcome unknown, flagged for manual
    /// reconciliation.
    pub refund_unresolved: bool,
    pub outcome: CancelOutcome,
}

/// Unwinds pending orders when a subscription is cancelled.
#[derive(Clone)]
pub struct CancellationCompensator {
    orders: Arc<dyn OrderStore>,
    processor: Arc<dyn ProcessorClient>,
}

impl CancellationCompensator {
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>, processor: Arc<dyn ProcessorClient>) -> Self {
        Self { orders, processor }
    }

    /// Refund and cancel every pending order linked to the subscription.
    ///
    /// Failures local to one order are logged and counted, never
    /// propagated; only the initial pending-order listing can fail.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if pending orders cannot be listed.
    pub async fn compensate(
        &self,
        processor_subscription_id: &str,
    ) -> Result<CompensationSummary, EngineError> {
        let pending = self
            .orders
            .pending_for_subscription(processor_subscription_id)
            .await?;
        tracing::info!(
            processor_subscription_id,
            pending = pending.len(),
            "Unwinding pending orders"
        );

        let mut summary = CompensationSummary::default();
        for order in &pending {
            match self.refund_order(order).await {
                RefundOutcome::Refunded => summary.orders_refunded += 1,
                RefundOutcome::NoTarget => {}
                RefundOutcome::Unresolved => summary.refunds_unresolved += 1,
            }

            match self.orders.cancel_and_restock(order.id).await {
                Ok(CancelOutcome::Cancelled { restocked }) => {
                    summary.orders_canceled += 1;
                    tracing::info!(
                        order_id = %order.id,
                        restocked_lines = restocked.len(),
                        "Order cancelled and restocked"
                    );
                }
                Ok(CancelOutcome::NotCancellable) => {
                    tracing::info!(order_id = %order.id, "Order no longer cancellable, skipping");
                }
                Err(err) => {
                    tracing::error!(order_id = %order.id, error = %err, "Order cancel failed");
                }
            }
        }

        Ok(summary)
    }

    /// Refund and cancel a single order (the self-service cancel path).
    ///
    /// The refund stays best-effort like the subscription unwind; the
    /// cancel is not, since the caller asked for this specific order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the cancel-and-restock write fails.
    pub async fn unwind_order(&self, order: &Order) -> Result<OrderUnwind, EngineError> {
        let refund = self.refund_order(order).await;
        let outcome = self.orders.cancel_and_restock(order.id).await?;
        Ok(OrderUnwind {
            refunded: matches!(refund, RefundOutcome::Refunded),
            refund_unresolved: matches!(refund, RefundOutcome::Unresolved),
            outcome,
        })
    }

    /// Tier 1: stored transaction id. Tier 2: charge-list match.
    async fn refund_order(&self, order: &Order) -> RefundOutcome {
        if let Some(transaction_id) = order.payment.transaction_id.as_deref() {
            match self.processor.refund_transaction(transaction_id).await {
                Ok(refund) => {
                    tracing::info!(order_id = %order.id, refund_id = %refund.id, "Order refunded");
                    return RefundOutcome::Refunded;
                }
                Err(ProcessorError::Timeout { .. }) => {
                    // Unknown outcome; a second attempt could double-refund.
                    tracing::error!(
                        order_id = %order.id,
                        transaction_id,
                        "Refund timed out, outcome unknown; needs manual reconciliation"
                    );
                    return RefundOutcome::Unresolved;
                }
                Err(err) => {
                    tracing::warn!(
                        order_id = %order.id,
                        error = %err,
                        "Transaction refund failed, trying charge lookup"
                    );
                }
            }
        }

        self.refund_via_charges(order).await
    }

    async fn refund_via_charges(&self, order: &Order) -> RefundOutcome {
        let Some(customer_id) = order.processor_customer_id.as_deref() else {
            tracing::warn!(order_id = %order.id, "No refund target on order");
            return RefundOutcome::NoTarget;
        };

        let charges = match self.processor.list_charges(customer_id, CHARGE_LOOKBACK).await {
            Ok(charges) => charges,
            Err(ProcessorError::Timeout { .. }) => {
                tracing::error!(order_id = %order.id, "Charge listing timed out");
                return RefundOutcome::Unresolved;
            }
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "Charge listing failed");
                return RefundOutcome::NoTarget;
            }
        };

        let Some(charge) = charges.iter().find(|c| c.matches_refund(order.total)) else {
            tracing::warn!(
                order_id = %order.id,
                amount = %order.total,
                "No matching charge for refund"
            );
            return RefundOutcome::NoTarget;
        };

        match self.processor.refund_charge(&charge.id).await {
            Ok(refund) => {
                tracing::info!(
                    order_id = %order.id,
                    charge_id = %charge.id,
                    refund_id = %refund.id,
                    "Order refunded via charge match"
                );
                RefundOutcome::Refunded
            }
            Err(ProcessorError::Timeout { .. }) => {
                tracing::error!(
                    order_id = %order.id,
                    charge_id = %charge.id,
                    "Charge refund timed out, outcome unknown; needs manual reconciliation"
                );
                RefundOutcome::Unresolved
            }
            Err(err) => {
                tracing::warn!(order_id = %order.id, error = %err, "Charge refund failed");
                RefundOutcome::NoTarget
            }
        }
    }
}
