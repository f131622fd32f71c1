//! Mock processor client for tests.
//!
//! Holds seeded sessions, subscriptions, and charges behind a mutex, records
//! every call, and can be told to reject or time out specific refunds. Ships
//! in `src` so the router integration tests can use it.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    Charge, CheckoutSession, ProcessorClient, ProcessorError, ProcessorSubscription, Refund,
};

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, CheckoutSession>,
    subscriptions: HashMap<String, ProcessorSubscription>,
    customer_emails: HashMap<String, String>,
    charges: HashMap<String, Vec<Charge>>,
    reject_refunds: HashSet<String>,
    timeout_refunds: HashSet<String>,
    refunded: Vec<String>,
    calls: Vec<String>,
}

/// Scriptable in-memory [`ProcessorClient`].
#[derive(Default)]
pub struct MockProcessor {
    inner: Mutex<MockState>,
}

impl MockProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_session(&self, session: CheckoutSession) {
        self.lock().sessions.insert(session.id.clone(), session);
    }

    pub fn add_subscription(&self, subscription: ProcessorSubscription) {
        self.lock()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub fn set_customer_email(&self, customer_id: &str, email: &str) {
        self.lock()
            .customer_emails
            .insert(customer_id.to_owned(), email.to_owned());
    }

    pub fn add_charge(&self, customer_id: &str, charge: Charge) {
        self.lock()
            .charges
            .entry(customer_id.to_owned())
            .or_default()
            .push(charge);
    }

    /// Make refunds against this transaction or charge id fail with
    /// [`ProcessorError::Rejected`].
    pub fn reject_refund(&self, id: &str) {
        self.lock().reject_refunds.insert(id.to_owned());
    }

    /// Make refunds against this transaction or charge id fail with
    /// [`ProcessorError::Timeout`].
    pub fn timeout_refund(&self, id: &str) {
        self.lock().timeout_refunds.insert(id.to_owned());
    }

    /// Transaction/charge ids successfully refunded, in order.
    #[must_use]
    pub fn refunded(&self) -> Vec<String> {
        self.lock().refunded.clone()
    }

    /// Every call made against the mock, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Current state of a seeded subscription.
    #[must_use]
    pub fn subscription(&self, id: &str) -> Option<ProcessorSubscription> {
        self.lock().subscriptions.get(id).cloned()
    }

    fn refund(&self, target: &str, operation: &'static str) -> Result<Refund, ProcessorError> {
        let mut state = self.lock();
        state.calls.push(format!("{operation} {target}"));
        if state.timeout_refunds.contains(target) {
            return Err(ProcessorError::Timeout { operation });
        }
        if state.reject_refunds.contains(target) {
            return Err(ProcessorError::Rejected {
                status: Some(402),
                message: format!("refund rejected for {target}"),
            });
        }
        state.refunded.push(target.to_owned());
        // Mark a matching listed charge refunded so repeated fallbacks do not
        // pick it again.
        for charges in state.charges.values_mut() {
            for charge in charges.iter_mut().filter(|c| c.id == target) {
                charge.refunded = true;
            }
        }
        let id = format!("re_{}", state.refunded.len());
        Ok(Refund {
            id,
            status: "succeeded".to_owned(),
        })
    }
}

fn not_found(what: &str, id: &str) -> ProcessorError {
    ProcessorError::Rejected {
        status: Some(404),
        message: format!("no such {what}: {id}"),
    }
}

#[async_trait]
impl ProcessorClient for MockProcessor {
    async fn fetch_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProcessorError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("fetch_checkout_session {session_id}"));
        state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| not_found("checkout session", session_id))
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProcessorSubscription, ProcessorError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("fetch_subscription {subscription_id}"));
        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| not_found("subscription", subscription_id))
    }

    async fn fetch_customer_email(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, ProcessorError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("fetch_customer_email {customer_id}"));
        Ok(state.customer_emails.get(customer_id).cloned())
    }

    async fn refund_transaction(&self, transaction_id: &str) -> Result<Refund, ProcessorError> {
        self.refund(transaction_id, "refund_transaction")
    }

    async fn refund_charge(&self, charge_id: &str) -> Result<Refund, ProcessorError> {
        self.refund(charge_id, "refund_charge")
    }

    async fn list_charges(
        &self,
        customer_id: &str,
        limit: u8,
    ) -> Result<Vec<Charge>, ProcessorError> {
        let mut state = self.lock();
        state.calls.push(format!("list_charges {customer_id}"));
        Ok(state
            .charges
            .get(customer_id)
            .map(|charges| charges.iter().take(usize::from(limit)).cloned().collect())
            .unwrap_or_default())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ProcessorError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("cancel_subscription {subscription_id}"));
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found("subscription", subscription_id))?;
        sub.status = "canceled".to_owned();
        sub.canceled_at = Some(Utc::now());
        Ok(())
    }

    async fn pause_collection(
        &self,
        subscription_id: &str,
        resumes_at: DateTime<Utc>,
    ) -> Result<(), ProcessorError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("pause_collection {subscription_id}"));
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found("subscription", subscription_id))?;
        sub.pause_resumes_at = Some(resumes_at);
        Ok(())
    }

    async fn resume_collection(&self, subscription_id: &str) -> Result<(), ProcessorError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("resume_collection {subscription_id}"));
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found("subscription", subscription_id))?;
        sub.pause_resumes_at = None;
        Ok(())
    }

    async fn update_subscription_metadata(
        &self,
        subscription_id: &str,
        entries: &[(&str, String)],
    ) -> Result<(), ProcessorError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("update_subscription_metadata {subscription_id}"));
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found("subscription", subscription_id))?;
        for (key, value) in entries {
            sub.metadata.insert((*key).to_owned(), value.clone());
        }
        Ok(())
    }
}
