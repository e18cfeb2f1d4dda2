use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DROP_LIMIT: u64 = 300;
const DEFAULT_PRICE_RUB: i64 = 8990;
const DEV_DEFAULT_PAYMENT_PASSWORD: &str = "dev_payment_password_not_for_production";

/// Payment provider configuration
///
/// `password1` signs outbound payment links, `password2` verifies inbound
/// result webhooks. The digest algorithm is a configuration value because the
/// provider lets merchants choose it per shop.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Merchant identifier registered with the payment provider
    #[serde(default = "default_merchant_login")]
    pub merchant_login: String,

    /// Shared secret for outbound link signatures
    #[serde(default)]
    pub password1: String,

    /// Shared secret for inbound webhook signatures
    #[serde(default)]
    pub password2: String,

    /// Signature digest: "MD5" or "SHA256" (case-insensitive)
    #[serde(default = "default_signature_alg")]
    #[validate(custom = "validate_signature_alg")]
    pub signature_alg: String,

    /// Adds IsTest=1 to generated payment links
    #[serde(default = "default_true_bool")]
    pub test_mode: bool,

    /// Payment page base URL
    #[serde(default = "default_payment_base_url")]
    pub base_url: String,

    /// Human-readable purchase description shown on the payment page
    #[serde(default = "default_payment_description")]
    pub description: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            merchant_login: default_merchant_login(),
            password1: String::new(),
            password2: String::new(),
            signature_alg: default_signature_alg(),
            test_mode: default_true_bool(),
            base_url: default_payment_base_url(),
            description: default_payment_description(),
        }
    }
}

/// CRM integration configuration
///
/// The integration is disabled when no base URL is configured; every CRM call
/// is best-effort either way.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CrmConfig {
    /// Inbound webhook base URL of the CRM REST endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// Source identifier stamped onto created leads
    #[serde(default = "default_lead_source_id")]
    pub lead_source_id: String,

    /// Request timeout in seconds; a slow CRM must never block the order path
    #[serde(default = "default_crm_timeout_secs")]
    pub timeout_secs: u64,
}

impl CrmConfig {
    pub fn enabled(&self) -> bool {
        self.base_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

/// Outbound chat delivery configuration
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// URL the conversational transport listens on for outbound messages
    #[serde(default)]
    pub delivery_url: Option<String>,

    /// HMAC secret for signing outbound deliveries
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Delivery request timeout in seconds
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Maximum number of admitted orders for the running drop
    ///
    /// An order consumes a slot while its payment status is PENDING or PAID.
    #[serde(default = "default_drop_limit")]
    pub drop_limit: u64,

    /// Fallback price in whole rubles for products listed without one
    #[serde(default = "default_price_rub")]
    #[validate(range(min = 1))]
    pub price_rub: i64,

    /// Operator contact shown by the support prompt
    #[serde(default = "default_support_contact")]
    pub support_contact: String,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Payment provider settings
    #[serde(default)]
    #[validate]
    pub payment: PaymentConfig,

    /// CRM integration settings
    #[serde(default)]
    #[validate]
    pub crm: CrmConfig,

    /// Outbound chat delivery settings
    #[serde(default)]
    #[validate]
    pub chat: ChatConfig,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            drop_limit: default_drop_limit(),
            price_rub: default_price_rub(),
            support_contact: default_support_contact(),
            event_channel_capacity: default_event_channel_capacity(),
            payment: PaymentConfig::default(),
            crm: CrmConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Constraints that depend on the deployment environment
    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() {
            for (field, value) in [
                ("payment.password1", &self.payment.password1),
                ("payment.password2", &self.payment.password2),
            ] {
                let trimmed = value.trim();
                if trimmed.is_empty() || trimmed == DEV_DEFAULT_PAYMENT_PASSWORD {
                    let mut err = ValidationError::new("payment_password_placeholder");
                    err.message = Some(
                        "Payment passwords must be set to the merchant values outside development"
                            .into(),
                    );
                    errors.add(field, err);
                }
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration error type
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    10
}

fn default_db_idle_timeout_secs() -> u64 {
    300
}

fn default_db_acquire_timeout_secs() -> u64 {
    10
}

fn default_drop_limit() -> u64 {
    DEFAULT_DROP_LIMIT
}

fn default_price_rub() -> i64 {
    DEFAULT_PRICE_RUB
}

fn default_support_contact() -> String {
    "@dropshop_support".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_merchant_login() -> String {
    "dropshop".to_string()
}

fn default_signature_alg() -> String {
    "MD5".to_string()
}

fn default_payment_base_url() -> String {
    "https://auth.robokassa.ru/Merchant/Index.aspx".to_string()
}

fn default_payment_description() -> String {
    "Drop preorder".to_string()
}

fn default_lead_source_id() -> String {
    "WEB".to_string()
}

fn default_crm_timeout_secs() -> u64 {
    5
}

fn default_chat_timeout_secs() -> u64 {
    10
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Validates payment signature digest names
fn validate_signature_alg(value: &str) -> Result<(), ValidationError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "MD5" | "SHA256" => Ok(()),
        _ => {
            let mut err = ValidationError::new("signature_alg");
            err.message = Some("Must be one of: MD5, SHA256".into());
            Err(err)
        }
    }
}

fn validate_event_channel_capacity(capacity: &usize) -> Result<(), ValidationError> {
    if *capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("dropshop_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Docker config (config/docker.toml) if DOCKER env var is set
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // The bundled payment passwords only pass validation in development;
    // production deployments must override them via APP__PAYMENT__PASSWORD1/2.
    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://dropshop.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("payment.password1", DEV_DEFAULT_PAYMENT_PASSWORD)?
        .set_default("payment.password2", DEV_DEFAULT_PAYMENT_PASSWORD)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    if env::var("DOCKER").is_ok() {
        info!("Docker environment detected");
        builder =
            builder.add_source(File::with_name(&format!("{}/docker", CONFIG_DIR)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod payment_secret_tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://dropshop.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_real_payment_secrets() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_merchant_secrets_passes() {
        let mut cfg = base_config();
        cfg.payment.password1 = "merchant-pass-one".into();
        cfg.payment.password2 = "merchant-pass-two".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_bundled_secrets() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }
}
