//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ENGINE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `ENGINE_SESSION_SECRET` - Secret used to verify forwarded caller identity tags
//! - `STRIPE_SECRET_KEY` - Payment processor API key
//! - `STRIPE_WEBHOOK_SECRET` - Webhook signing secret
//!
//! ## Optional
//! - `ENGINE_HOST` - Bind address (default: 127.0.0.1)
//! - `ENGINE_PORT` - Listen port (default: 3100)
//! - `STRIPE_API_BASE_URL` - Processor API base (default: <https://api.stripe.com>)
//! - `PROCESSOR_TIMEOUT_SECS` - Outbound processor request timeout (default: 15)
//! - `SMTP_HOST` / `SMTP_USERNAME` / `SMTP_PASSWORD` / `EMAIL_FROM` /
//!   `MERCHANT_EMAIL` - Notification delivery; notifications are disabled when
//!   `SMTP_HOST` is unset
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SECRET_LENGTH: usize = 16;
const MIN_DISTINCT_SECRET_CHARS: usize = 8;

/// Blocklist of common placeholder patterns (case-insensitive).
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Secret used to verify caller identity tags on subscription actions
    pub session_secret: SecretString,
    /// Payment processor configuration
    pub processor: ProcessorConfig,
    /// Email notification configuration (None disables notifications)
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Payment processor API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ProcessorConfig {
    /// API key for outbound processor calls
    pub api_key: SecretString,
    /// Webhook signing secret
    pub webhook_secret: SecretString,
    /// Processor REST API base URL
    pub api_base_url: String,
    /// Per-request timeout for outbound processor calls
    pub timeout: Duration,
}

impl std::fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// SMTP delivery configuration for order notifications.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP relay host
    pub smtp_host: String,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password
    pub smtp_password: SecretString,
    /// From address for outgoing mail
    pub from_address: String,
    /// Merchant address for new-order notifications
    pub merchant_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("merchant_address", &self.merchant_address)
            .finish()
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail placeholder/variety validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ENGINE_DATABASE_URL")?;
        let host = get_env_or_default("ENGINE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ENGINE_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ENGINE_PORT", "3100")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ENGINE_PORT".to_string(), e.to_string()))?;
        let session_secret = get_validated_secret("ENGINE_SESSION_SECRET")?;

        Ok(Self {
            database_url,
            host,
            port,
            session_secret,
            processor: ProcessorConfig::from_env()?,
            email: EmailConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ProcessorConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = get_env_or_default("PROCESSOR_TIMEOUT_SECS", "15")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("PROCESSOR_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            api_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            api_base_url: get_env_or_default("STRIPE_API_BASE_URL", "https://api.stripe.com"),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl EmailConfig {
    /// Loads the SMTP group; `None` when `SMTP_HOST` is unset.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_required_env("EMAIL_FROM")?,
            merchant_address: get_required_env("MERCHANT_EMAIL")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a secret is not a placeholder and has some character variety.
///
/// A real signing secret or API key (`whsec_...`, `sk_live_...`) easily
/// clears both checks; `changeme` and `aaaaaaaaaaaaaaaa` do not.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {MIN_SECRET_LENGTH} characters (got {})",
                secret.len()
            ),
        ));
    }

    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let mut chars: Vec<char> = secret.chars().collect();
    chars.sort_unstable();
    chars.dedup();
    if chars.len() < MIN_DISTINCT_SECRET_CHARS {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "too few distinct characters ({}, need >= {MIN_DISTINCT_SECRET_CHARS}). Use a randomly generated secret.",
                chars.len()
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-webhook-signing-key", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_too_short() {
        assert!(validate_secret_strength("whsec_ab", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_repetitive() {
        let result = validate_secret_strength("abababababababababab", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("whsec_8fK3mQ2vTz7LpR4x", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = EngineConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "0.0.0.0".parse().unwrap(),
            port: 3100,
            session_secret: SecretString::from("whsec_8fK3mQ2vTz7LpR4x"),
            processor: ProcessorConfig {
                api_key: SecretString::from("sk_test_key"),
                webhook_secret: SecretString::from("whsec_test"),
                api_base_url: "https://api.stripe.com".to_string(),
                timeout: Duration::from_secs(15),
            },
            email: None,
            sentry_dsn: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
        assert_eq!(addr.port(), 3100);
    }

    #[test]
    fn test_processor_config_debug_redacts_secrets() {
        let config = ProcessorConfig {
            api_key: SecretString::from("sk_live_very_secret_key"),
            webhook_secret: SecretString::from("whsec_very_secret_value"),
            api_base_url: "https://api.stripe.com".to_string(),
            timeout: Duration::from_secs(15),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_live_very_secret_key"));
        assert!(!debug_output.contains("whsec_very_secret_value"));
    }
}
