//! Request-level errors

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use security::input_sanitizer::SanitizationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Recipient account not found: {0}")]
    RecipientNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Username already registered: {0}")]
    AccountExists(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Decimal, requested: Decimal },

    #[error("Cannot transfer to yourself")]
    SelfTransfer,

    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Two-factor code required")]
    TwoFactorRequired,

    #[error("Invalid two-factor code")]
    InvalidOtp,

    #[error("Two-factor authentication already enabled")]
    AlreadyEnabled,

    #[error("Two-factor authentication not enabled")]
    NotEnabled,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Could not validate credentials")]
    AuthenticationFailure,

    #[error("Ledger failure: {0}")]
    LedgerFailure(String),

    #[error("Internal storage error: {0}")]
    InternalStorage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ledger_core::Error> for ServiceError {
    fn from(err: ledger_core::Error) -> Self {
        use ledger_core::Error as E;

        match err {
            E::Validation(msg) | E::InvalidAmount(msg) => ServiceError::Validation(msg),
            E::AccountNotFound(name) => ServiceError::AccountNotFound(name),
            E::RecipientNotFound(number) => ServiceError::RecipientNotFound(number),
            E::TransactionNotFound(id) => ServiceError::TransactionNotFound(id),
            E::AccountExists(name) => ServiceError::AccountExists(name),
            E::InsufficientFunds {
                available,
                requested,
            } => ServiceError::InsufficientFunds {
                available,
                requested,
            },
            E::SelfTransfer => ServiceError::SelfTransfer,
            E::TwoFactorAlreadyEnabled => ServiceError::AlreadyEnabled,
            E::TwoFactorNotEnabled => ServiceError::NotEnabled,
            E::LedgerFailure(msg) => ServiceError::LedgerFailure(msg),
            E::Config(msg) => ServiceError::Config(msg),
            other => ServiceError::InternalStorage(other.to_string()),
        }
    }
}

impl From<SanitizationError> for ServiceError {
    fn from(err: SanitizationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    /// HTTP-style status code for transport adapters
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::AccountNotFound(_) => 404,
            ServiceError::RecipientNotFound(_) => 404,
            ServiceError::TransactionNotFound(_) => 404,
            ServiceError::AccountExists(_) => 409,
            ServiceError::InsufficientFunds { .. } => 400,
            ServiceError::SelfTransfer => 400,
            ServiceError::InvalidCredentials => 401,
            ServiceError::AccountLocked { .. } => 423,
            ServiceError::TwoFactorRequired => 401,
            ServiceError::InvalidOtp => 401,
            ServiceError::AlreadyEnabled => 409,
            ServiceError::NotEnabled => 409,
            ServiceError::PermissionDenied(_) => 403,
            ServiceError::AuthenticationFailure => 401,
            ServiceError::LedgerFailure(_) => 500,
            ServiceError::InternalStorage(_) => 500,
            ServiceError::Config(_) => 500,
        }
    }

    /// Stable machine-readable kind
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::AccountNotFound(_) => "not_found",
            ServiceError::RecipientNotFound(_) => "recipient_not_found",
            ServiceError::TransactionNotFound(_) => "not_found",
            ServiceError::AccountExists(_) => "duplicate_error",
            ServiceError::InsufficientFunds { .. } => "insufficient_funds",
            ServiceError::SelfTransfer => "self_transfer",
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::AccountLocked { .. } => "account_locked",
            ServiceError::TwoFactorRequired => "two_factor_required",
            ServiceError::InvalidOtp => "invalid_otp",
            ServiceError::AlreadyEnabled => "already_enabled",
            ServiceError::NotEnabled => "not_enabled",
            ServiceError::PermissionDenied(_) => "permission_denied",
            ServiceError::AuthenticationFailure => "authentication_failure",
            ServiceError::LedgerFailure(_) => "ledger_failure",
            ServiceError::InternalStorage(_) => "internal_error",
            ServiceError::Config(_) => "config_error",
        }
    }
}
