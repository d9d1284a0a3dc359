use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripmate_api::{
    app,
    state::{AppState, AuthSettings, Services, Settings},
    worker::start_notification_worker,
};
use tripmate_core::memory::{InMemoryPaymentEventRepository, InMemoryRequestRepository, InMemoryUserRepository};
use tripmate_core::payment::{MockPaymentGateway, PaymentGateway};
use tripmate_core::repository::{PaymentEventRepository, RequestRepository, UserRepository};
use tripmate_lifecycle::RazorpayGateway;
use tripmate_notify::{FcmPushSender, LogMailer, LogPushSender, Mailer, NotificationDispatcher, PushSender, SmtpMailer};
use tripmate_store::app_config::{Config, GatewayKind};
use tripmate_store::{
    DbClient, EventProducer, RedisClient, StorePaymentEventRepository, StoreRequestRepository, StoreUserRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripmate_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tripmate API on port {}", config.server.port);

    // Postgres, or in-memory documents for local development
    let (requests, users, payment_events): (
        Arc<dyn RequestRepository>,
        Arc<dyn UserRepository>,
        Arc<dyn PaymentEventRepository>,
    ) = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            (
                Arc::new(StoreRequestRepository::new(db.pool.clone())),
                Arc::new(StoreUserRepository::new(db.pool.clone())),
                Arc::new(StorePaymentEventRepository::new(db.pool.clone())),
            )
        }
        None => {
            tracing::warn!("No database url configured, data will not survive a restart");
            (
                Arc::new(InMemoryRequestRepository::new()),
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(InMemoryPaymentEventRepository::new()),
            )
        }
    };

    // Redis is only used for rate limiting
    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(RedisClient::new(url).context("Invalid Redis url")?)),
        None => {
            tracing::warn!("No Redis configured, rate limiting disabled");
            None
        }
    };

    // Kafka mirror of the change feed
    let kafka = match &config.kafka.brokers {
        Some(brokers) => Some(Arc::new(
            EventProducer::new(brokers, config.kafka.topic.clone()).context("Failed to create Kafka producer")?,
        )),
        None => None,
    };

    let gateway: Arc<dyn PaymentGateway> = match config.payment.gateway {
        GatewayKind::Razorpay => {
            let key_id = config
                .payment
                .key_id
                .clone()
                .context("payment.key_id is required for the razorpay gateway")?;
            let key_secret = config
                .payment
                .key_secret
                .clone()
                .context("payment.key_secret is required for the razorpay gateway")?;
            Arc::new(RazorpayGateway::new(key_id, SecretString::from(key_secret.into_inner())))
        }
        GatewayKind::Mock => {
            tracing::warn!("Using the mock payment gateway");
            Arc::new(MockPaymentGateway)
        }
    };
    if config.payment.webhook_secret.is_none() {
        tracing::warn!("payment.webhook_secret is not set, payment webhooks will be refused");
    }

    let push: Arc<dyn PushSender> = match (&config.push.fcm_project_id, &config.push.fcm_access_token) {
        (Some(project), Some(token)) => Arc::new(FcmPushSender::new(
            project,
            SecretString::from(token.expose().clone()),
        )),
        _ => Arc::new(LogPushSender),
    };

    let mailer: Arc<dyn Mailer> = match &config.email.smtp_host {
        Some(host) => {
            let password = config
                .email
                .smtp_password
                .as_ref()
                .map(|p| p.expose().clone())
                .unwrap_or_default();
            Arc::new(
                SmtpMailer::new(
                    host,
                    config.email.smtp_port,
                    config.email.smtp_username.clone(),
                    &SecretString::from(password),
                    config.email.from_address.clone(),
                )
                .context("Failed to configure SMTP")?,
            )
        }
        None => Arc::new(LogMailer),
    };

    let services = Services {
        requests: requests.clone(),
        users: users.clone(),
        payment_events,
        gateway,
        webhook_secret: config
            .payment
            .webhook_secret
            .as_ref()
            .map(|s| SecretString::from(s.expose().clone())),
        kafka,
        redis,
    };
    let settings = Settings {
        auth: AuthSettings {
            session_secret: config.auth.session_secret.expose().clone(),
            id_token_secret: config.auth.id_token_secret.expose().clone(),
            session_ttl_seconds: config.auth.session_ttl_seconds,
            secure_cookies: config.auth.secure_cookies,
        },
        cors_origins: config.server.cors_origins.clone(),
        rate_limit_per_minute: config.server.rate_limit_per_minute,
        payment_key_id: config.payment.key_id.clone(),
        currency: config.payment.currency.clone(),
        tariff: config.tariff.tariff(),
    };
    let app_state = AppState::new(services, settings)?;

    // Notification worker
    let dispatcher = Arc::new(NotificationDispatcher::new(requests, users, push, mailer));
    tokio::spawn(start_notification_worker(
        app_state.changes.subscribe(),
        dispatcher,
        app_state.metrics.clone(),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
