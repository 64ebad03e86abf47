//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SHIPPING_FLAT_FEE` - Shipping fee below the free-shipping threshold (default: 4.99)
//! - `FREE_SHIPPING_THRESHOLD` - Discounted subtotal that ships free (default: 50.00)
//! - `REVIEW_DENYLIST` - Comma-separated terms that block a review
//! - `REVIEW_SENSITIVE_TERMS` - Comma-separated terms that hold a review for moderation
//! - `REVIEW_POSITIVE_TERMS` - Comma-separated terms that let a moderate review through

use std::net::{IpAddr, SocketAddr};

use boutique_core::Money;
use boutique_core::moderation::ModerationPolicy;
use boutique_core::pricing::PricingPolicy;
use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
///
/// Implements `Debug` manually to redact the database URL.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
    /// Shipping rules used by the pricing engine
    pub pricing: PricingPolicy,
    /// Word lists and thresholds of review moderation
    pub moderation: ModerationPolicy,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("database_url", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .field("pricing", &self.pricing)
            .field("moderation", &self.moderation)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;

        Ok(Self {
            database_url,
            host,
            port,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            pricing: pricing_from_env()?,
            moderation: moderation_from_env(),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn pricing_from_env() -> Result<PricingPolicy, ConfigError> {
    let defaults = PricingPolicy::default();
    Ok(PricingPolicy {
        flat_shipping_fee: get_money_or("SHIPPING_FLAT_FEE", defaults.flat_shipping_fee)?,
        free_shipping_threshold: get_money_or(
            "FREE_SHIPPING_THRESHOLD",
            defaults.free_shipping_threshold,
        )?,
    })
}

fn moderation_from_env() -> ModerationPolicy {
    let mut policy = ModerationPolicy::default();
    if let Some(terms) = get_optional_env("REVIEW_DENYLIST") {
        policy.denylist = parse_terms(&terms);
    }
    if let Some(terms) = get_optional_env("REVIEW_SENSITIVE_TERMS") {
        policy.sensitive_terms = parse_terms(&terms);
    }
    if let Some(terms) = get_optional_env("REVIEW_POSITIVE_TERMS") {
        policy.positive_terms = parse_terms(&terms);
    }
    policy
}

// =============================================================================
// Helper Functions
// =============================================================================

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

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a non-negative amount, or the default when unset.
fn get_money_or(key: &str, default: Money) -> Result<Money, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| parse_money(key, &raw))
}

fn parse_money(key: &str, raw: &str) -> Result<Money, ConfigError> {
    let amount = raw
        .parse::<Money>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if amount.is_negative() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(amount)
}

/// Split a comma-separated word list, dropping blanks.
fn parse_terms(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}
