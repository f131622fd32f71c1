//! Stripe REST API client.
//!
//! Implements [`ProcessorClient`] against the Stripe v1 API: JSON responses,
//! form-encoded writes, bearer auth, and a bounded per-request timeout from
//! [`ProcessorConfig`]. Expandable fields (strings that become objects when
//! `expand[]` is requested) are modeled with the [`Expandable`] enum.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use artisan_roast_core::Cents;

use crate::config::ProcessorConfig;
use crate::models::{PaymentRefs, ShippingAddress};

use super::{
    Charge, CheckoutMode, CheckoutSession, ProcessorClient, ProcessorError,
    ProcessorSubscription, Refund, SubscriptionLine,
};

/// Stripe API client.
pub struct StripeClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl StripeClient {
    /// Build a client from processor configuration.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &ProcessorConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, ProcessorError> {
        let response = request
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, operation))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(&e, operation))?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("no error message")
                .to_owned();
            return Err(ProcessorError::Rejected {
                status: Some(status.as_u16()),
                message,
            });
        }

        serde_json::from_value(body)
            .map_err(|e| ProcessorError::Malformed(format!("{operation}: {e}")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<T, ProcessorError> {
        self.send(self.http.get(self.url(path)).query(query), operation)
            .await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
        operation: &'static str,
    ) -> Result<T, ProcessorError> {
        self.send(self.http.post(self.url(path)).form(form), operation)
            .await
    }
}

fn map_reqwest_error(err: &reqwest::Error, operation: &'static str) -> ProcessorError {
    if err.is_timeout() {
        ProcessorError::Timeout { operation }
    } else {
        ProcessorError::Transport(err.to_string())
    }
}

#[async_trait::async_trait]
impl ProcessorClient for StripeClient {
    async fn fetch_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProcessorError> {
        let session: ApiSession = self
            .get(
                &format!("/v1/checkout/sessions/{session_id}"),
                &[("expand[]", "payment_intent.latest_charge")],
                "fetch_checkout_session",
            )
            .await?;
        session.try_into()
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProcessorSubscription, ProcessorError> {
        let subscription: ApiSubscription = self
            .get(
                &format!("/v1/subscriptions/{subscription_id}"),
                &[
                    ("expand[]", "items.data.price.product"),
                    ("expand[]", "latest_invoice.payment_intent.latest_charge"),
                ],
                "fetch_subscription",
            )
            .await?;
        subscription.try_into()
    }

    async fn fetch_customer_email(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, ProcessorError> {
        let customer: ApiCustomer = self
            .get(
                &format!("/v1/customers/{customer_id}"),
                &[],
                "fetch_customer_email",
            )
            .await?;
        Ok(customer.email)
    }

    async fn refund_transaction(&self, transaction_id: &str) -> Result<Refund, ProcessorError> {
        let refund: ApiRefund = self
            .post_form(
                "/v1/refunds",
                &[("payment_intent".to_owned(), transaction_id.to_owned())],
                "refund_transaction",
            )
            .await?;
        Ok(Refund {
            id: refund.id,
            status: refund.status.unwrap_or_default(),
        })
    }

    async fn refund_charge(&self, charge_id: &str) -> Result<Refund, ProcessorError> {
        let refund: ApiRefund = self
            .post_form(
                "/v1/refunds",
                &[("charge".to_owned(), charge_id.to_owned())],
                "refund_charge",
            )
            .await?;
        Ok(Refund {
            id: refund.id,
            status: refund.status.unwrap_or_default(),
        })
    }

    async fn list_charges(
        &self,
        customer_id: &str,
        limit: u8,
    ) -> Result<Vec<Charge>, ProcessorError> {
        let limit = limit.to_string();
        let charges: ApiList<ApiCharge> = self
            .get(
                "/v1/charges",
                &[("customer", customer_id), ("limit", limit.as_str())],
                "list_charges",
            )
            .await?;
        Ok(charges
            .data
            .into_iter()
            .map(|c| Charge {
                id: c.id,
                amount: Cents::new(c.amount),
                refunded: c.refunded,
                status: c.status,
            })
            .collect())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), ProcessorError> {
        let _: ApiSubscriptionStub = self
            .send(
                self.http
                    .delete(self.url(&format!("/v1/subscriptions/{subscription_id}"))),
                "cancel_subscription",
            )
            .await?;
        Ok(())
    }

    async fn pause_collection(
        &self,
        subscription_id: &str,
        resumes_at: DateTime<Utc>,
    ) -> Result<(), ProcessorError> {
        // behavior=void drops invoices entirely during the pause; the skipped
        // period is never billed later.
        let form = vec![
            (
                "pause_collection[behavior]".to_owned(),
                "void".to_owned(),
            ),
            (
                "pause_collection[resumes_at]".to_owned(),
                resumes_at.timestamp().to_string(),
            ),
        ];
        let _: ApiSubscriptionStub = self
            .post_form(
                &format!("/v1/subscriptions/{subscription_id}"),
                &form,
                "pause_collection",
            )
            .await?;
        Ok(())
    }

    async fn resume_collection(&self, subscription_id: &str) -> Result<(), ProcessorError> {
        // Empty string clears the pause_collection attribute.
        let form = vec![("pause_collection".to_owned(), String::new())];
        let _: ApiSubscriptionStub = self
            .post_form(
                &format!("/v1/subscriptions/{subscription_id}"),
                &form,
                "resume_collection",
            )
            .await?;
        Ok(())
    }

    async fn update_subscription_metadata(
        &self,
        subscription_id: &str,
        entries: &[(&str, String)],
    ) -> Result<(), ProcessorError> {
        let form: Vec<(String, String)> = entries
            .iter()
            .map(|(key, value)| (format!("metadata[{key}]"), value.clone()))
            .collect();
        let _: ApiSubscriptionStub = self
            .post_form(
                &format!("/v1/subscriptions/{subscription_id}"),
                &form,
                "update_subscription_metadata",
            )
            .await?;
        Ok(())
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// A field that is an id string by default and an object when expanded.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expandable<T> {
    Object(Box<T>),
    Id(String),
}

impl<T> Expandable<T> {
    fn object(&self) -> Option<&T> {
        match self {
            Self::Object(obj) => Some(obj),
            Self::Id(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiSession {
    id: String,
    payment_status: String,
    mode: String,
    customer: Option<Expandable<ApiCustomer>>,
    customer_details: Option<ApiCustomerDetails>,
    amount_total: Option<i64>,
    total_details: Option<ApiTotalDetails>,
    subscription: Option<Expandable<ApiSubscriptionStub>>,
    payment_intent: Option<Expandable<ApiPaymentIntent>>,
    invoice: Option<Expandable<ApiInvoiceStub>>,
    shipping_details: Option<ApiShippingDetails>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ApiTotalDetails {
    amount_discount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiCustomer {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCustomerDetails {
    email: Option<String>,
    name: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiShippingDetails {
    name: Option<String>,
    address: Option<ApiAddress>,
}

#[derive(Debug, Deserialize)]
struct ApiAddress {
    line1: Option<String>,
    line2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPaymentIntent {
    id: String,
    latest_charge: Option<Expandable<ApiCharge>>,
}

#[derive(Debug, Deserialize)]
struct ApiCharge {
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    refunded: bool,
    #[serde(default)]
    status: String,
    payment_method_details: Option<ApiPaymentMethodDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiPaymentMethodDetails {
    card: Option<ApiCard>,
}

#[derive(Debug, Deserialize)]
struct ApiCard {
    brand: Option<String>,
    last4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRefund {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiInvoiceStub {
    id: String,
}

/// Minimal subscription shape for responses we only acknowledge.
#[derive(Debug, Deserialize)]
struct ApiSubscriptionStub {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiSubscription {
    id: String,
    customer: Expandable<ApiCustomerStub>,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    canceled_at: Option<i64>,
    current_period_start: i64,
    current_period_end: i64,
    pause_collection: Option<ApiPauseCollection>,
    items: ApiList<ApiSubscriptionItem>,
    latest_invoice: Option<Expandable<ApiInvoice>>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ApiCustomerStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiPauseCollection {
    resumes_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiSubscriptionItem {
    quantity: Option<i64>,
    price: ApiPrice,
}

#[derive(Debug, Deserialize)]
struct ApiPrice {
    nickname: Option<String>,
    unit_amount: Option<i64>,
    recurring: Option<ApiRecurring>,
    product: Option<Expandable<ApiProduct>>,
}

#[derive(Debug, Deserialize)]
struct ApiRecurring {
    interval: Option<String>,
    interval_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiProduct {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiInvoice {
    id: String,
    payment_intent: Option<Expandable<ApiPaymentIntent>>,
}

// =============================================================================
// Conversions
// =============================================================================

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, ProcessorError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ProcessorError::Malformed(format!("{field}: invalid timestamp {secs}")))
}

fn card_summary(charge: &ApiCharge) -> Option<String> {
    let card = charge.payment_method_details.as_ref()?.card.as_ref()?;
    let brand = card.brand.as_deref()?;
    let last4 = card.last4.as_deref()?;
    let mut chars = brand.chars();
    let brand = chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    });
    Some(format!("{brand} ****{last4}"))
}

fn shipping_address(details: &ApiShippingDetails) -> Option<ShippingAddress> {
    let address = details.address.as_ref()?;
    let mut street = address.line1.clone()?;
    if let Some(line2) = address.line2.as_deref().filter(|l| !l.is_empty()) {
        street.push_str(", ");
        street.push_str(line2);
    }
    Some(ShippingAddress {
        street,
        city: address.city.clone().unwrap_or_default(),
        state: address.state.clone().unwrap_or_default(),
        postal_code: address.postal_code.clone().unwrap_or_default(),
        country: address.country.clone().unwrap_or_default(),
    })
}

fn payment_refs_from_intent(intent: Option<&Expandable<ApiPaymentIntent>>) -> PaymentRefs {
    let mut refs = PaymentRefs::default();
    match intent {
        Some(Expandable::Object(pi)) => {
            refs.transaction_id = Some(pi.id.clone());
            if let Some(charge) = pi.latest_charge.as_ref() {
                match charge {
                    Expandable::Object(charge) => {
                        refs.charge_id = Some(charge.id.clone());
                        refs.card_summary = card_summary(charge);
                    }
                    Expandable::Id(id) => refs.charge_id = Some(id.clone()),
                }
            }
        }
        Some(Expandable::Id(id)) => refs.transaction_id = Some(id.clone()),
        None => {}
    }
    refs
}

impl TryFrom<ApiSession> for CheckoutSession {
    type Error = ProcessorError;

    fn try_from(session: ApiSession) -> Result<Self, Self::Error> {
        let mode = match session.mode.as_str() {
            "payment" => CheckoutMode::Payment,
            "subscription" => CheckoutMode::Subscription,
            other => {
                return Err(ProcessorError::Malformed(format!(
                    "unsupported checkout mode: {other}"
                )));
            }
        };

        let mut payment = payment_refs_from_intent(session.payment_intent.as_ref());
        payment.invoice_id = session.invoice.as_ref().map(|i| match i {
            Expandable::Object(invoice) => invoice.id.clone(),
            Expandable::Id(id) => id.clone(),
        });

        let customer_id = session.customer.as_ref().map(|c| match c {
            // The session endpoint does not expand customers; an object here
            // would only appear if a caller asked for it.
            Expandable::Object(_) => String::new(),
            Expandable::Id(id) => id.clone(),
        });

        Ok(Self {
            id: session.id,
            payment_status: session.payment_status,
            mode,
            customer_id: customer_id.filter(|id| !id.is_empty()),
            customer_email: session
                .customer_details
                .as_ref()
                .and_then(|d| d.email.clone()),
            customer_name: session
                .customer_details
                .as_ref()
                .and_then(|d| d.name.clone()),
            customer_phone: session
                .customer_details
                .as_ref()
                .and_then(|d| d.phone.clone()),
            amount_total: Cents::new(session.amount_total.unwrap_or(0)),
            discount: Cents::new(
                session
                    .total_details
                    .as_ref()
                    .and_then(|t| t.amount_discount)
                    .unwrap_or(0),
            ),
            subscription_id: session.subscription.as_ref().map(|s| match s {
                Expandable::Object(sub) => sub.id.clone(),
                Expandable::Id(id) => id.clone(),
            }),
            payment,
            shipping_name: session
                .shipping_details
                .as_ref()
                .and_then(|d| d.name.clone()),
            shipping_address: session.shipping_details.as_ref().and_then(shipping_address),
            metadata: session.metadata,
        })
    }
}

impl TryFrom<ApiSubscription> for ProcessorSubscription {
    type Error = ProcessorError;

    fn try_from(sub: ApiSubscription) -> Result<Self, Self::Error> {
        let customer_id = match &sub.customer {
            Expandable::Object(customer) => customer.id.clone(),
            Expandable::Id(id) => id.clone(),
        };

        let lines = sub
            .items
            .data
            .iter()
            .map(|item| {
                let product_name = item
                    .price
                    .product
                    .as_ref()
                    .and_then(Expandable::object)
                    .and_then(|p| p.name.clone())
                    .unwrap_or_default();
                #[allow(clippy::cast_possible_truncation)]
                SubscriptionLine {
                    product_name,
                    quantity: item.quantity.unwrap_or(1) as i32,
                    unit_amount: Cents::new(item.price.unit_amount.unwrap_or(0)),
                    interval: item
                        .price
                        .recurring
                        .as_ref()
                        .and_then(|r| r.interval.clone()),
                    interval_count: item
                        .price
                        .recurring
                        .as_ref()
                        .and_then(|r| r.interval_count)
                        .map(|c| c as i32),
                    price_nickname: item.price.nickname.clone(),
                }
            })
            .collect();

        let mut latest_payment = PaymentRefs::default();
        if let Some(invoice) = sub.latest_invoice.as_ref() {
            match invoice {
                Expandable::Object(invoice) => {
                    latest_payment = payment_refs_from_intent(invoice.payment_intent.as_ref());
                    latest_payment.invoice_id = Some(invoice.id.clone());
                }
                Expandable::Id(id) => latest_payment.invoice_id = Some(id.clone()),
            }
        }

        Ok(Self {
            id: sub.id,
            customer_id,
            status: sub.status,
            cancel_at_period_end: sub.cancel_at_period_end,
            canceled_at: sub
                .canceled_at
                .map(|t| timestamp(t, "canceled_at"))
                .transpose()?,
            current_period_start: timestamp(sub.current_period_start, "current_period_start")?,
            current_period_end: timestamp(sub.current_period_end, "current_period_end")?,
            pause_resumes_at: sub
                .pause_collection
                .and_then(|p| p.resumes_at)
                .map(|t| timestamp(t, "pause_collection.resumes_at"))
                .transpose()?,
            lines,
            latest_payment,
            metadata: sub.metadata,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_conversion_with_expanded_payment_intent() {
        let json = serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "mode": "payment",
            "customer": "cus_9",
            "customer_details": {
                "email": "jane@example.com",
                "name": "Jane Doe",
                "phone": "+15035551234"
            },
            "amount_total": 3500,
            "total_details": { "amount_discount": 500, "amount_shipping": 0 },
            "payment_intent": {
                "id": "pi_1",
                "latest_charge": {
                    "id": "ch_1",
                    "amount": 3500,
                    "refunded": false,
                    "status": "succeeded",
                    "payment_method_details": {
                        "card": { "brand": "visa", "last4": "4242" }
                    }
                }
            },
            "shipping_details": {
                "name": "Jane Doe",
                "address": {
                    "line1": "1 Main St",
                    "line2": "Apt 2",
                    "city": "Portland",
                    "state": "OR",
                    "postal_code": "97201",
                    "country": "US"
                }
            },
            "metadata": { "deliveryMethod": "DELIVERY" }
        });

        let api: ApiSession = serde_json::from_value(json).unwrap();
        let session: CheckoutSession = api.try_into().unwrap();

        assert_eq!(session.mode, CheckoutMode::Payment);
        assert_eq!(session.customer_id.as_deref(), Some("cus_9"));
        assert_eq!(session.amount_total, Cents::new(3500));
        assert_eq!(session.discount, Cents::new(500));
        assert_eq!(session.payment.transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(session.payment.charge_id.as_deref(), Some("ch_1"));
        assert_eq!(
            session.payment.card_summary.as_deref(),
            Some("Visa ****4242")
        );
        let address = session.shipping_address.unwrap();
        assert_eq!(address.street, "1 Main St, Apt 2");
        assert_eq!(address.postal_code, "97201");
    }

    #[test]
    fn test_session_conversion_rejects_unknown_mode() {
        let json = serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "mode": "setup"
        });
        let api: ApiSession = serde_json::from_value(json).unwrap();
        let result: Result<CheckoutSession, _> = api.try_into();
        assert!(matches!(result, Err(ProcessorError::Malformed(_))));
    }

    #[test]
    fn test_subscription_conversion() {
        let json = serde_json::json!({
            "id": "sub_1",
            "customer": "cus_9",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_701_209_600,
            "pause_collection": { "resumes_at": 1_702_419_200 },
            "items": {
                "data": [{
                    "quantity": 2,
                    "price": {
                        "nickname": "Every 2 weeks - 12oz",
                        "unit_amount": 1800,
                        "recurring": { "interval": "week", "interval_count": 2 },
                        "product": { "name": "House Blend" }
                    }
                }]
            },
            "latest_invoice": {
                "id": "in_1",
                "payment_intent": { "id": "pi_1", "latest_charge": "ch_1" }
            },
            "metadata": {}
        });

        let api: ApiSubscription = serde_json::from_value(json).unwrap();
        let sub: ProcessorSubscription = api.try_into().unwrap();

        assert_eq!(sub.customer_id, "cus_9");
        assert!(sub.pause_resumes_at.is_some());
        assert_eq!(sub.lines.len(), 1);
        assert_eq!(sub.lines[0].product_name, "House Blend");
        assert_eq!(sub.lines[0].quantity, 2);
        assert_eq!(sub.lines[0].interval.as_deref(), Some("week"));
        assert_eq!(sub.latest_payment.invoice_id.as_deref(), Some("in_1"));
        assert_eq!(sub.latest_payment.transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(sub.latest_payment.charge_id.as_deref(), Some("ch_1"));
    }

    #[test]
    fn test_unexpanded_ids_stay_ids() {
        let json = serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "mode": "subscription",
            "subscription": "sub_1",
            "payment_intent": "pi_1",
            "invoice": "in_1"
        });
        let api: ApiSession = serde_json::from_value(json).unwrap();
        let session: CheckoutSession = api.try_into().unwrap();
        assert_eq!(session.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(session.payment.transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(session.payment.invoice_id.as_deref(), Some("in_1"));
        assert!(session.payment.card_summary.is_none());
        assert_eq!(session.discount, Cents::ZERO);
    }
}
