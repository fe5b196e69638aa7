//! # Configuration Management System
//!
//! Hierarchical configuration for the screening engine. Supports loading
//! configuration from multiple sources in order of precedence:
//!
//! 1. **Environment Variables** (highest precedence)
//! 2. **Environment-specific TOML files** (e.g., `config/production.toml`)
//! 3. **Default TOML file** (`config/default.toml`) (lowest precedence)
//!
//! ## Usage
//!
//! ```rust
//! use screening_core::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! let db_url = &config.database.url;
//! let max_concurrent = config.gateway.max_concurrent_queries;
//! ```
//!
//! ## Environment Selection
//!
//! The configuration system automatically selects the appropriate environment
//! based on the `ENVIRONMENT` environment variable:
//!
//! - `development` (default): Uses `config/development.toml`
//! - `testing`: Uses `config/testing.toml`
//! - `production`: Uses `config/production.toml`
//!
//! ## Security Considerations
//!
//! - Sensitive values (credentials, provider API keys) should be provided via environment variables
//! - Never commit sensitive data to TOML configuration files

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main configuration structure containing all engine settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Database connection and pool configuration
    pub database: DatabaseConfig,
    /// Cryptographic parameters for data-at-rest encryption
    pub security: SecurityConfig,
    /// Rate limiting and throttling configuration
    pub rate_limit: RateLimitConfig,
    /// Provider gateway configuration (circuit breaker, concurrency, timeouts)
    pub gateway: GatewayConfig,
    /// Response cache freshness policy
    pub cache: CacheConfig,
    /// Vigilance scheduler configuration
    pub vigilance: VigilanceConfig,
    /// Compliance and consent gate configuration
    pub compliance: ComplianceConfig,
    /// Application-level settings and feature flags
    pub app: AppConfig,
    /// Prometheus metrics and monitoring configuration
    pub metrics: MetricsConfig,
    /// HTTP bind address for the screening-api server
    pub server: ServerConfig,
}

/// PostgreSQL database configuration and connection pool settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL including credentials and database name.
    ///
    /// **Security Note**: In production, this should be provided via
    /// the `DATABASE_URL` environment variable, never in configuration files.
    pub url: String,

    /// Maximum number of database connections in the pool.
    pub max_connections: u32,

    /// Minimum number of database connections to maintain in the pool.
    pub min_connections: u32,
}

/// Security and cryptographic configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// AES-GCM encryption key for raw provider responses at rest.
    ///
    /// **Must be exactly 32 characters long**. Must be provided via
    /// `AES_ENCRYPTION_KEY` environment variable in production.
    pub aes_encryption_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

/// Provider gateway configuration: concurrency, timeouts and circuit breaker thresholds.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Default per-screening concurrent provider query limit.
    pub max_concurrent_queries: u32,
    /// Per-query timeout in seconds before a provider call is abandoned.
    pub query_timeout_seconds: u64,
    /// Maximum retry attempts per provider query.
    pub max_retry_attempts: u32,
    /// Consecutive failures before a provider's circuit breaker opens.
    pub circuit_breaker_failure_threshold: u32,
    /// Cooldown period in seconds before a half-open retry is attempted.
    pub circuit_breaker_cooldown_seconds: u64,
    /// Cap applied to confidence scores derived from synthesis-only providers.
    pub synthesis_confidence_cap: f64,
}

/// Response cache freshness policy, keyed by information type tier.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Seconds a cached response is considered FRESH for a volatile info type (e.g. news).
    pub fresh_ttl_volatile_seconds: i64,
    /// Seconds a cached response is considered FRESH for a stable info type (e.g. identity).
    pub fresh_ttl_stable_seconds: i64,
    /// Seconds beyond FRESH a cached response is considered STALE (reusable with a refresh hint)
    /// before being treated as EXPIRED.
    pub stale_grace_period_seconds: i64,
}

/// Vigilance scheduler configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct VigilanceConfig {
    /// How often the scheduler sweeps for due monitoring subscriptions, in seconds.
    pub sweep_interval_seconds: u64,
    /// Maximum subscriptions re-screened concurrently per sweep.
    pub max_concurrent_rescreens: u32,
    /// Default re-screen cadence for a new monitoring subscription, in days.
    pub default_cadence_days: i64,
}

/// Compliance and consent gate configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ComplianceConfig {
    /// Whether recorded consent is required before a screening may run.
    pub require_consent: bool,
    /// Jurisdictions for which screening is categorically disallowed.
    pub disallowed_jurisdictions: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub company_name: String,
    pub base_url: String,
    pub environment: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
    pub namespace: String,
}

/// HTTP bind address for the screening-api server. Unlike the teacher's
/// `ServerConfig`, there is no `workers` field: the api crate runs on the
/// default Tokio multi-thread runtime rather than a tuned worker count, and
/// no `CorsConfig` sibling, since the non-goal wire-format/auth surface this
/// engine serves is internal service-to-service traffic, not a browser.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Loads configuration from multiple sources in hierarchical order.
    ///
    /// 1. **Default configuration** (`config/default.toml`) - Base values
    /// 2. **Environment-specific configuration** (e.g., `config/production.toml`)
    /// 3. **Environment variables** - Runtime overrides (highest precedence)
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(Environment::with_prefix("").separator("_"));

        let config = builder.build()?;
        let mut loaded_config: Config = config.try_deserialize()?;

        loaded_config.validate(&environment)?;

        Ok(loaded_config)
    }

    /// Validates the loaded configuration and ensures critical security requirements are met.
    fn validate(&mut self, environment: &str) -> Result<(), ConfigError> {
        use config::ConfigError;

        // Validate AES encryption key
        if self.security.aes_encryption_key.len() != 32 {
            return Err(ConfigError::Message(format!(
                "AES encryption key must be exactly 32 characters long (current: {})",
                self.security.aes_encryption_key.len()
            )));
        }

        if environment == "production" {
            self.validate_production_security()?;
        }

        if !self.database.url.starts_with("postgresql://") {
            return Err(ConfigError::Message(
                "Database URL must be a PostgreSQL connection string starting with 'postgresql://'".to_string()
            ));
        }

        if self.gateway.max_concurrent_queries == 0 {
            return Err(ConfigError::Message(
                "gateway.max_concurrent_queries must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.gateway.synthesis_confidence_cap) {
            return Err(ConfigError::Message(
                "gateway.synthesis_confidence_cap must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates production-specific security requirements.
    ///
    /// Fail-fast: any security violation causes the application to refuse to start,
    /// preventing insecure deployments.
    fn validate_production_security(&self) -> Result<(), ConfigError> {
        use config::ConfigError;

        let error_indicators = [
            "ERROR_", "INSECURE_DEFAULT", "CHANGE_THIS", "NOT_SET",
            "CHECK_ENVIRONMENT", "PLACEHOLDER",
        ];

        for indicator in &error_indicators {
            if self.security.aes_encryption_key.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected insecure AES encryption key. Set AES_ENCRYPTION_KEY environment variable. Current value contains: {}",
                    indicator
                )));
            }
        }

        for indicator in &error_indicators {
            if self.database.url.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected missing database configuration. Set DATABASE_URL environment variable. Current value contains: {}",
                    indicator
                )));
            }
        }

        for indicator in &error_indicators {
            if self.app.base_url.contains(indicator) {
                return Err(ConfigError::Message(format!(
                    "Production deployment detected missing base URL. Set BASE_URL environment variable. Current value contains: {}",
                    indicator
                )));
            }
        }

        Ok(())
    }
}
