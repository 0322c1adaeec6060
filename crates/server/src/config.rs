//! Signup server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Store
//! - `SIGNUP_STORE` - `postgres` (default) or `memory`
//! - `SIGNUP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `SIGNUP_DB_SCHEMA` - Schema holding the collections (default: signup)
//! - `SIGNUP_USERS_COLLECTION` - User collection name (default: users)
//! - `SIGNUP_PENDING_COLLECTION` - Pending signup collection name (default: `pending_signups`)
//! - `SIGNUP_STORE_TIMEOUT_SECS` - Bound on every store operation (default: 30)
//!
//! ## Server
//! - `SIGNUP_HOST` - Bind address (default: 127.0.0.1)
//! - `SIGNUP_PORT` - Listen port (default: 8080)
//! - `SIGNUP_LOG_JSON` - Emit JSON logs (default: false)
//!
//! ## Signup flow
//! - `SIGNUP_ENV` - `production` (default) or `development`
//! - `SIGNUP_DEV_MAIL_OVERRIDE` - Deliver all signup mail here (development only)
//! - `SIGNUP_OTP_EXPIRY_MINUTES` - Lifetime stated in the passcode email (default: 10)
//! - `SIGNUP_DISPATCH_FAILURE` - `keep` (default) or `delete` the record when
//!   the passcode email fails
//!
//! ## Email (all or none; required in production)
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`, `SMTP_PASSWORD`
//! - `EMAIL_FROM_ADDRESS`
//!
//! Without SMTP a development server records mail in memory instead of
//! sending it.
//!
//! ## Error tracking
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use signup_core::Email;

use crate::db::{StoreNamespace, validate_identifier};
use crate::services::{DispatchFailurePolicy, SignupPolicy};

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!("expected 'production' or 'development', got '{other}'")),
        }
    }
}

/// Which document store backs the server.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres(DatabaseConfig),
    /// In-process store; data is lost on restart.
    Memory,
}

/// `PostgreSQL` connection and collection names.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Connection URL (contains password)
    pub database_url: SecretString,
    pub namespace: StoreNamespace,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("database_url", &"[REDACTED]")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl DatabaseConfig {
    /// Load database settings from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if no database URL is set or a collection name is
    /// not a valid identifier.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(&env_lookup)
    }

    /// Load database settings through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`DatabaseConfig::from_env`].
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);
        let defaults = StoreNamespace::default();

        let namespace = StoreNamespace {
            schema: env.identifier("SIGNUP_DB_SCHEMA", &defaults.schema)?,
            users: env.identifier("SIGNUP_USERS_COLLECTION", &defaults.users)?,
            pending_signups: env.identifier("SIGNUP_PENDING_COLLECTION", &defaults.pending_signups)?,
        };

        Ok(Self {
            database_url: env.database_url("SIGNUP_DATABASE_URL")?,
            namespace,
        })
    }
}

/// SMTP settings.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password
    pub smtp_password: SecretString,
    /// Sender address
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl EmailConfig {
    const REQUIRED: [&'static str; 4] = [
        "SMTP_HOST",
        "SMTP_USERNAME",
        "SMTP_PASSWORD",
        "EMAIL_FROM_ADDRESS",
    ];

    /// `None` when no SMTP variable is set; an error when only some are.
    fn from_lookup(env: &Env<'_>) -> Result<Option<Self>, ConfigError> {
        if Self::REQUIRED.iter().all(|key| env.optional(key).is_none()) {
            return Ok(None);
        }

        Ok(Some(Self {
            smtp_host: env.required("SMTP_HOST")?,
            smtp_port: env.parse_or("SMTP_PORT", 587)?,
            smtp_username: env.required("SMTP_USERNAME")?,
            smtp_password: SecretString::from(env.required("SMTP_PASSWORD")?),
            from_address: env.required("EMAIL_FROM_ADDRESS")?,
        }))
    }
}

/// Signup server configuration.
#[derive(Debug, Clone)]
pub struct SignupConfig {
    pub store: StoreConfig,
    /// Bound applied to every store operation
    pub store_timeout: Duration,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    pub environment: Environment,
    /// Mail override, honored in development only
    pub dev_mail_override: Option<Email>,
    pub otp_expiry_minutes: u32,
    pub dispatch_failure: DispatchFailurePolicy,
    /// Emit JSON logs instead of text
    pub log_json: bool,
    /// SMTP settings; `None` (development only) selects the outbox mailer
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

impl SignupConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// including when SMTP is not configured in production.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(&env_lookup)
    }

    /// Load configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// See [`SignupConfig::from_env`].
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let store = match env.or_default("SIGNUP_STORE", "postgres").as_str() {
            "postgres" => StoreConfig::Postgres(DatabaseConfig::from_lookup(lookup)?),
            "memory" => StoreConfig::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "SIGNUP_STORE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };

        let dev_mail_override = env
            .optional("SIGNUP_DEV_MAIL_OVERRIDE")
            .map(|value| {
                Email::parse(&value).map_err(|e| {
                    ConfigError::InvalidEnvVar("SIGNUP_DEV_MAIL_OVERRIDE".to_string(), e.to_string())
                })
            })
            .transpose()?;

        let environment = env.parse_or("SIGNUP_ENV", Environment::Production)?;
        let email = EmailConfig::from_lookup(&env)?;
        if email.is_none() && environment == Environment::Production {
            return Err(ConfigError::MissingEnvVar("SMTP_HOST".to_string()));
        }

        Ok(Self {
            store,
            store_timeout: Duration::from_secs(env.parse_or("SIGNUP_STORE_TIMEOUT_SECS", 30)?),
            host: env.parse_or("SIGNUP_HOST", IpAddr::from([127, 0, 0, 1]))?,
            port: env.parse_or("SIGNUP_PORT", 8080)?,
            environment,
            dev_mail_override,
            otp_expiry_minutes: env.parse_or("SIGNUP_OTP_EXPIRY_MINUTES", 10)?,
            dispatch_failure: env.parse_or("SIGNUP_DISPATCH_FAILURE", DispatchFailurePolicy::Keep)?,
            log_json: env.parse_or("SIGNUP_LOG_JSON", false)?,
            email,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env
                .optional("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            sentry_traces_sample_rate: env
                .optional("SENTRY_TRACES_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Signup tunables. The mail override applies in development only.
    #[must_use]
    pub fn policy(&self) -> SignupPolicy {
        SignupPolicy {
            otp_expiry_minutes: self.otp_expiry_minutes,
            dev_mail_override: match self.environment {
                Environment::Development => self.dev_mail_override.clone(),
                Environment::Production => None,
            },
            dispatch_failure: self.dispatch_failure,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Variable access over a lookup function. Empty values count as unset.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, or use `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// Get a collection or schema name, rejecting anything unsafe to quote.
    fn identifier(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        let value = self.or_default(key, default);
        validate_identifier(&value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e))?;
        Ok(value)
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    const SMTP: [(&str, &str); 4] = [
        ("SMTP_HOST", "smtp.example.com"),
        ("SMTP_USERNAME", "mailer"),
        ("SMTP_PASSWORD", "hunter22"),
        ("EMAIL_FROM_ADDRESS", "noreply@example.com"),
    ];

    /// Load with SMTP configured, so production settings are complete.
    fn load_with_smtp(vars: &[(&str, &str)]) -> Result<SignupConfig, ConfigError> {
        let mut all = SMTP.to_vec();
        all.extend_from_slice(vars);
        load(&all)
    }

    fn load(vars: &[(&str, &str)]) -> Result<SignupConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        SignupConfig::from_lookup(&|key| vars.get(key).cloned())
    }

    #[test]
    fn test_memory_defaults() {
        let config = load_with_smtp(&[("SIGNUP_STORE", "memory")]).unwrap();

        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.port, 8080);
        assert_eq!(config.store_timeout, Duration::from_secs(30));
        assert_eq!(config.otp_expiry_minutes, 10);
        assert_eq!(config.dispatch_failure, DispatchFailurePolicy::Keep);
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.log_json);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "SIGNUP_DATABASE_URL"));
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load_with_smtp(&[("DATABASE_URL", "postgres://localhost/app")]).unwrap();
        let StoreConfig::Postgres(db) = config.store else {
            panic!("expected postgres store");
        };
        assert_eq!(db.database_url.expose_secret(), "postgres://localhost/app");
        assert_eq!(db.namespace, StoreNamespace::default());
    }

    #[test]
    fn test_rejects_unsafe_collection_name() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("SIGNUP_USERS_COLLECTION", "users; drop table x"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "SIGNUP_USERS_COLLECTION"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("SIGNUP_STORE", "memory"), ("SIGNUP_PORT", "eighty")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(matches!(
            load(&[("SIGNUP_STORE", "redis")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(matches!(
            load(&[("SIGNUP_STORE", "memory"), ("SIGNUP_DISPATCH_FAILURE", "drop")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_partial_smtp_is_an_error() {
        let err = load(&[("SIGNUP_STORE", "memory"), ("SMTP_HOST", "smtp.example.com")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_smtp_config_redacts_password() {
        let config = load_with_smtp(&[("SIGNUP_STORE", "memory")]).unwrap();
        let email = config.email.unwrap();

        assert_eq!(email.smtp_port, 587);
        assert!(!format!("{email:?}").contains("hunter22"));
    }

    #[test]
    fn test_mail_override_only_in_development() {
        let vars = [
            ("SIGNUP_STORE", "memory"),
            ("SIGNUP_DEV_MAIL_OVERRIDE", "dev@example.com"),
        ];
        assert!(load_with_smtp(&vars).unwrap().policy().dev_mail_override.is_none());

        let mut dev = vars.to_vec();
        dev.push(("SIGNUP_ENV", "development"));
        let policy = load(&dev).unwrap().policy();
        assert_eq!(
            policy.dev_mail_override.unwrap().as_str(),
            "dev@example.com"
        );
    }

    #[test]
    fn test_production_requires_smtp() {
        let err = load(&[("SIGNUP_STORE", "memory")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "SMTP_HOST"));

        let err = load(&[("SIGNUP_STORE", "memory"), ("SIGNUP_ENV", "production")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));

        let config = load(&[("SIGNUP_STORE", "memory"), ("SIGNUP_ENV", "development")]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert!(config.email.is_none());
    }
}
