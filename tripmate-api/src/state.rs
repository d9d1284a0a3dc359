use std::sync::Arc;

use secrecy::SecretString;
use tripmate_core::payment::PaymentGateway;
use tripmate_core::repository::{PaymentEventRepository, RequestRepository, UserRepository};
use tripmate_core::ChangeFeed;
use tripmate_lifecycle::{PaymentReconciler, RequestManager};
use tripmate_pricing::{CostEstimator, Tariff};
use tripmate_store::{EventProducer, RedisClient};

use crate::events::ChangeBus;
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthSettings {
    pub session_secret: String,
    pub id_token_secret: String,
    pub session_ttl_seconds: u64,
    pub secure_cookies: bool,
}

#[derive(Clone)]
pub struct Settings {
    pub auth: AuthSettings,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
    pub rate_limit_per_minute: i64,
    /// Public gateway key handed to checkout clients
    pub payment_key_id: Option<String>,
    pub currency: String,
    pub tariff: Tariff,
}

/// Adapters and repositories chosen at startup
pub struct Services {
    pub requests: Arc<dyn RequestRepository>,
    pub users: Arc<dyn UserRepository>,
    pub payment_events: Arc<dyn PaymentEventRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub webhook_secret: Option<SecretString>,
    pub kafka: Option<Arc<EventProducer>>,
    pub redis: Option<Arc<RedisClient>>,
}

#[derive(Clone)]
pub struct AppState {
    pub requests: Arc<dyn RequestRepository>,
    pub users: Arc<dyn UserRepository>,
    pub payment_events: Arc<dyn PaymentEventRepository>,
    pub lifecycle: Arc<RequestManager>,
    pub reconciler: Arc<PaymentReconciler>,
    pub changes: ChangeBus,
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(services: Services, settings: Settings) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let changes = ChangeBus::new(services.kafka, metrics.clone());
        let feed: Arc<dyn ChangeFeed> = Arc::new(changes.clone());

        let lifecycle = RequestManager::new(
            services.requests.clone(),
            services.users.clone(),
            services.gateway,
            feed.clone(),
            CostEstimator::new(settings.tariff),
            settings.currency.clone(),
        );
        let reconciler = PaymentReconciler::new(
            services.webhook_secret,
            services.requests.clone(),
            services.payment_events.clone(),
            feed,
        );

        Ok(Self {
            requests: services.requests,
            users: services.users,
            payment_events: services.payment_events,
            lifecycle: Arc::new(lifecycle),
            reconciler: Arc::new(reconciler),
            changes,
            redis: services.redis,
            metrics,
            settings,
        })
    }
}
