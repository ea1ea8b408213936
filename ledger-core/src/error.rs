//! Error types for the ledger

use rocksdb::ErrorKind;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-positive amount or too many fractional digits
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown account
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// No account carries the recipient number
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    /// Unknown transaction
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Username already taken
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Balance too low for the debit
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at check time
        available: Decimal,
        /// Requested debit
        requested: Decimal,
    },

    /// Sender and recipient are the same account
    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    /// A TOTP secret is already persisted
    #[error("Two-factor authentication already enabled")]
    TwoFactorAlreadyEnabled,

    /// No TOTP secret is persisted
    #[error("Two-factor authentication not enabled")]
    TwoFactorNotEnabled,

    /// Atomic unit could not complete; nothing was applied
    #[error("Ledger failure: {0}")]
    LedgerFailure(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transient RocksDB status (Busy / TryAgain), safe to retry
    #[error("Storage busy: {0}")]
    Busy(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Security log hash chain broken
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            ErrorKind::Busy | ErrorKind::TryAgain => Error::Busy(err.to_string()),
            _ => Error::Storage(err.to_string()),
        }
    }
}

impl From<security::audit_log::AuditError> for Error {
    fn from(err: security::audit_log::AuditError) -> Self {
        Error::Integrity(err.to_string())
    }
}

impl Error {
    /// True for failures of the store rather than of the request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::LedgerFailure(_)
                | Error::Storage(_)
                | Error::Busy(_)
                | Error::Serialization(_)
                | Error::Integrity(_)
                | Error::Concurrency(_)
                | Error::Config(_)
                | Error::Metrics(_)
                | Error::Io(_)
        )
    }
}
