use serde::Deserialize;
use std::env;
use tripmate_pricing::Tariff;
use tripmate_shared::Masked;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub push: PushConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 {
    120
}

/// In-memory repositories are used when no url is set
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

/// Rate limiting is disabled when no url is set
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

/// Change events go to Kafka only when brokers are set
#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    "travel-requests.changed".to_string()
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: None,
            topic: default_topic(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Signs session cookies
    pub session_secret: Masked<String>,
    /// Verifies identity-provider id tokens
    pub id_token_secret: Masked<String>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_session_ttl() -> u64 {
    5 * 24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    #[default]
    Mock,
    Razorpay,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default)]
    pub gateway: GatewayKind,
    pub key_id: Option<String>,
    pub key_secret: Option<Masked<String>>,
    /// Webhooks are refused with a 500 until this is set
    pub webhook_secret: Option<Masked<String>>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "INR".to_string()
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayKind::Mock,
            key_id: None,
            key_secret: None,
            webhook_secret: None,
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TariffConfig {
    #[serde(default = "default_base_rate")]
    pub base_rate: f64,
    #[serde(default = "default_extended_rate")]
    pub extended_rate: f64,
    #[serde(default = "default_base_hours")]
    pub base_hours: f64,
}

fn default_base_rate() -> f64 { 150.0 }
fn default_extended_rate() -> f64 { 100.0 }
fn default_base_hours() -> f64 { 3.0 }

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            base_rate: default_base_rate(),
            extended_rate: default_extended_rate(),
            base_hours: default_base_hours(),
        }
    }
}

impl TariffConfig {
    pub fn tariff(&self) -> Tariff {
        Tariff {
            base_rate: self.base_rate,
            extended_rate: self.extended_rate,
            base_hours: self.base_hours,
        }
    }
}

/// Mail is only logged when `smtp_host` is unset
#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    pub smtp_password: Option<Masked<String>>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "Tripmate <no-reply@tripmate.local>".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: None,
            from_address: default_from_address(),
        }
    }
}

/// Pushes are only logged unless both fields are set
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PushConfig {
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<Masked<String>>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // TRIPMATE__DATABASE__URL=... sets database.url
            .add_source(config::Environment::with_prefix("TRIPMATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
