//! Shared application state.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::EngineConfig;
use crate::db::PgStore;
use crate::events::EventNormalizer;
use crate::processor::signature::WebhookVerifier;
use crate::processor::stripe::StripeClient;
use crate::processor::ProcessorClient;
use crate::services::{
    CancellationCompensator, KeyedLock, NotificationSender, NullNotifier, OrderMaterializer,
    SmtpNotifier, SubscriptionLifecycle,
};
use crate::store::{AddressBook, CatalogStore, OrderStore, SubscriptionStore, UserStore};

/// Collaborators the engine is wired with. Production uses `PostgreSQL`
/// stores and the real processor client; tests swap in the in-memory
/// doubles.
pub struct EngineDeps {
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub orders: Arc<dyn OrderStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub addresses: Arc<dyn AddressBook>,
    pub processor: Arc<dyn ProcessorClient>,
    pub notifier: Arc<dyn NotificationSender>,
}

/// Shared application state, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: EngineConfig,
    verifier: WebhookVerifier,
    locks: KeyedLock,
    normalizer: EventNormalizer,
    materializer: OrderMaterializer,
    lifecycle: SubscriptionLifecycle,
    compensator: CancellationCompensator,
    subscriptions: Arc<dyn SubscriptionStore>,
    orders: Arc<dyn OrderStore>,
}

impl AppState {
    /// Wire the engine from configuration and collaborators.
    #[must_use]
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        let verifier = WebhookVerifier::new(config.processor.webhook_secret.clone());
        let normalizer = EventNormalizer::new(Arc::clone(&deps.processor));
        let lifecycle = SubscriptionLifecycle::new(
            Arc::clone(&deps.subscriptions),
            Arc::clone(&deps.processor),
        );
        let materializer = OrderMaterializer::new(
            deps.users,
            deps.catalog,
            Arc::clone(&deps.orders),
            deps.addresses,
            deps.notifier,
            Arc::clone(&deps.processor),
            lifecycle.clone(),
        );
        let compensator =
            CancellationCompensator::new(Arc::clone(&deps.orders), deps.processor);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                verifier,
                locks: KeyedLock::new(),
                normalizer,
                materializer,
                lifecycle,
                compensator,
                subscriptions: deps.subscriptions,
                orders: deps.orders,
            }),
        }
    }

    /// Production wiring: `PostgreSQL` stores and the real processor client.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor HTTP client or the SMTP transport
    /// cannot be built from the configuration.
    pub fn with_postgres(
        config: EngineConfig,
        pool: PgPool,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let store = Arc::new(PgStore::new(pool));
        let processor: Arc<dyn ProcessorClient> = Arc::new(StripeClient::new(&config.processor)?);
        let notifier: Arc<dyn NotificationSender> = match &config.email {
            Some(email) => Arc::new(SmtpNotifier::new(email)?),
            None => Arc::new(NullNotifier),
        };

        let deps = EngineDeps {
            users: Arc::clone(&store) as _,
            catalog: Arc::clone(&store) as _,
            orders: Arc::clone(&store) as _,
            subscriptions: Arc::clone(&store) as _,
            addresses: store as _,
            processor,
            notifier,
        };
        Ok(Self::new(config, deps))
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.inner.verifier
    }

    #[must_use]
    pub fn locks(&self) -> &KeyedLock {
        &self.inner.locks
    }

    #[must_use]
    pub fn normalizer(&self) -> &EventNormalizer {
        &self.inner.normalizer
    }

    #[must_use]
    pub fn materializer(&self) -> &OrderMaterializer {
        &self.inner.materializer
    }

    #[must_use]
    pub fn lifecycle(&self) -> &SubscriptionLifecycle {
        &self.inner.lifecycle
    }

    #[must_use]
    pub fn compensator(&self) -> &CancellationCompensator {
        &self.inner.compensator
    }

    #[must_use]
    pub fn subscriptions(&self) -> &dyn SubscriptionStore {
        self.inner.subscriptions.as_ref()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }
}
