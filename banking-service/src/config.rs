//! Service configuration
//!
//! Loaded from TOML (`from_file`) or environment variables (`from_env`).
//! Every section has defaults except the token secret, which must be set.

use crate::error::{Result, ServiceError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum token secret length (bytes)
pub const MIN_SECRET_LEN: usize = 32;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Ledger store configuration
    pub ledger: ledger_core::Config,

    /// Credential settings
    pub auth: AuthConfig,

    /// Admin panel settings
    pub admin: AdminConfig,

    /// Superadmin created at startup when absent
    pub bootstrap: Option<BootstrapAdmin>,
}

/// Credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for bearer credentials
    pub token_secret: String,

    /// Issuer claim and OTP issuer label
    pub issuer: String,

    /// User credential lifetime (minutes)
    pub user_token_ttl_minutes: i64,

    /// Admin credential lifetime (minutes)
    pub admin_token_ttl_minutes: i64,

    /// Accepted OTP drift, in steps on each side
    pub otp_tolerance_steps: u32,

    /// Length of generated temporary passwords
    pub temp_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            issuer: "SecureBank".to_string(),
            user_token_ttl_minutes: 30,
            admin_token_ttl_minutes: 15,
            otp_tolerance_steps: 1,
            temp_password_length: 12,
        }
    }
}

/// Admin panel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Page size when the caller gives none
    pub default_page_size: u32,

    /// Largest page size accepted
    pub max_page_size: u32,

    /// Default threshold of the large-amount filter
    #[serde(with = "rust_decimal::serde::str")]
    pub large_amount_threshold: Decimal,

    /// Default retention of the purge operation (days)
    pub log_retention_days: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            large_amount_threshold: Decimal::new(10_000, 0),
            log_retention_days: 30,
        }
    }
}

/// Initial superadmin account
#[derive(Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    /// Username
    pub username: String,

    /// Initial password (must meet the complexity policy)
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ServiceConfig {
    /// Config rooted at `data_dir` with the given token secret
    pub fn new(data_dir: impl Into<PathBuf>, token_secret: impl Into<String>) -> Self {
        let mut config = Self {
            ledger: ledger_core::Config::with_data_dir(data_dir),
            ..Self::default()
        };
        config.auth.token_secret = token_secret.into();
        config
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("Failed to read config: {}", e)))?;
        let config: ServiceConfig = toml::from_str(&content)
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = ServiceConfig {
            ledger: ledger_core::Config::from_env()?,
            ..Self::default()
        };

        if let Ok(secret) = std::env::var("BANKING_TOKEN_SECRET") {
            config.auth.token_secret = secret;
        }

        if let Ok(issuer) = std::env::var("BANKING_ISSUER") {
            config.auth.issuer = issuer;
        }

        if let Ok(ttl) = std::env::var("BANKING_USER_TOKEN_TTL_MINUTES") {
            config.auth.user_token_ttl_minutes = parse_env("BANKING_USER_TOKEN_TTL_MINUTES", &ttl)?;
        }

        if let Ok(ttl) = std::env::var("BANKING_ADMIN_TOKEN_TTL_MINUTES") {
            config.auth.admin_token_ttl_minutes =
                parse_env("BANKING_ADMIN_TOKEN_TTL_MINUTES", &ttl)?;
        }

        if let Ok(tolerance) = std::env::var("BANKING_OTP_TOLERANCE_STEPS") {
            config.auth.otp_tolerance_steps = parse_env("BANKING_OTP_TOLERANCE_STEPS", &tolerance)?;
        }

        if let (Ok(username), Ok(password)) = (
            std::env::var("BANKING_BOOTSTRAP_ADMIN"),
            std::env::var("BANKING_BOOTSTRAP_PASSWORD"),
        ) {
            config.bootstrap = Some(BootstrapAdmin { username, password });
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.auth.token_secret.len() < MIN_SECRET_LEN {
            return Err(ServiceError::Config(format!(
                "token_secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        if self.auth.user_token_ttl_minutes <= 0 || self.auth.admin_token_ttl_minutes <= 0 {
            return Err(ServiceError::Config(
                "token lifetimes must be positive".to_string(),
            ));
        }

        if self.admin.default_page_size == 0 || self.admin.default_page_size > self.admin.max_page_size {
            return Err(ServiceError::Config(
                "default_page_size must be between 1 and max_page_size".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ServiceError::Config(format!("{}: {}", name, e)))
}
