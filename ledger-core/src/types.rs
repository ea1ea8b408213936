//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money, 2 fractional digits)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use security::input_sanitizer::normalize_account_number;
use security::lockout::{LockState, LockoutPolicy};
use security::Role;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

pub use security::AuditRecord as SecurityLogEntry;

/// Derive the account number for a username
///
/// First 16 hex digits of SHA-256(username), upper case, grouped by four:
/// `XXXX-XXXX-XXXX-XXXX`.
pub fn derive_account_number(username: &str) -> String {
    let digest = Sha256::digest(username.as_bytes());
    let raw = hex::encode_upper(&digest[..8]);

    raw.as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Account record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique username (primary key)
    pub username: String,

    /// Derived account number, `XXXX-XXXX-XXXX-XXXX`
    pub account_number: String,

    /// Current balance (never negative)
    pub balance: Decimal,

    /// Opaque password hash
    pub password_hash: String,

    /// Active TOTP secret, present once two-factor is enabled
    pub totp_secret: Option<String>,

    /// Lock expiry; a past value is the same as no lock
    pub lock_until: Option<DateTime<Utc>>,

    /// Access level
    pub role: Role,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last successful login
    pub last_login: Option<DateTime<Utc>>,

    /// Source address of the last successful login
    pub last_login_source: Option<String>,
}

impl Account {
    /// Lock state at `now`
    pub fn lock_state(&self, now: DateTime<Utc>) -> LockState {
        LockState::at(self.lock_until, now)
    }

    /// True while a lock is in force
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_state(now).is_locked()
    }

    /// True once a TOTP secret is persisted
    pub fn two_factor_enabled(&self) -> bool {
        self.totp_secret.is_some()
    }

    /// Account number without separators
    pub fn normalized_number(&self) -> String {
        normalize_account_number(&self.account_number)
    }
}

/// Input for account creation
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Validated username
    pub username: String,

    /// Hash of the initial password
    pub password_hash: String,

    /// Access level
    pub role: Role,
}

/// Mutation of a single account record, applied by the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountUpdate {
    /// Persist a confirmed TOTP secret
    EnableTwoFactor {
        /// Base32 secret
        secret: String,
    },

    /// Clear the TOTP secret
    DisableTwoFactor,

    /// Lock until the given instant
    Lock {
        /// Lock expiry
        until: DateTime<Utc>,
    },

    /// Clear any lock
    Unlock,

    /// Replace the password hash
    SetPasswordHash {
        /// New opaque hash
        hash: String,
    },

    /// Successful login bookkeeping (also clears any lock)
    RecordLogin {
        /// Login time
        at: DateTime<Utc>,
        /// Source address
        source: Option<String>,
    },
}

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Cash in
    Deposit,
    /// Cash out
    Withdrawal,
    /// Outgoing leg of a transfer
    TransferSent,
    /// Incoming leg of a transfer
    TransferReceived,
}

impl TransactionKind {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TransferSent => "transfer_sent",
            TransactionKind::TransferReceived => "transfer_received",
        }
    }

    /// True for kinds that reduce the balance
    pub fn is_debit(&self) -> bool {
        matches!(self, TransactionKind::Withdrawal | TransactionKind::TransferSent)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one balance change
///
/// `flagged` is the only field that changes after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Globally unique, time ordered (UUIDv7)
    pub id: Uuid,

    /// Store-assigned insertion sequence
    pub seq: u64,

    /// Account owner
    pub username: String,

    /// Kind
    pub kind: TransactionKind,

    /// Signed amount (credits positive, debits negative)
    pub amount: Decimal,

    /// Balance right after this change
    pub balance_after: Decimal,

    /// Counterparty account number (transfers only)
    pub counterparty: Option<String>,

    /// Human readable description
    pub description: String,

    /// Commit timestamp
    pub timestamp: DateTime<Utc>,

    /// Admin review flag
    pub flagged: bool,
}

/// Both legs of a committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Sender's `transfer_sent` record
    pub sent: Transaction,

    /// Recipient's `transfer_received` record
    pub received: Transaction,
}

/// One login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    /// Attempt ID (UUIDv7)
    pub id: Uuid,

    /// Username as submitted
    pub username: String,

    /// Source address
    pub source: Option<String>,

    /// Outcome
    pub success: bool,

    /// Attempt time
    pub timestamp: DateTime<Utc>,
}

/// Runtime-tunable security settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSettings {
    /// First lockout tier threshold (failures in 15 minutes)
    pub max_login_attempts: u32,

    /// First lockout tier lock length
    pub lockout_duration_minutes: u32,

    /// Admin logins require an enrolled second factor
    pub require_admin_2fa: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_duration_minutes: 5,
            require_admin_2fa: false,
        }
    }
}

impl SystemSettings {
    /// Check value ranges
    pub fn validate(&self) -> crate::Result<()> {
        // Above 9 the first tier could never fire before the second
        if !(1..=9).contains(&self.max_login_attempts) {
            return Err(crate::Error::Validation(
                "max_login_attempts must be between 1 and 9".to_string(),
            ));
        }

        if !(1..=1440).contains(&self.lockout_duration_minutes) {
            return Err(crate::Error::Validation(
                "lockout_duration_minutes must be between 1 and 1440".to_string(),
            ));
        }

        Ok(())
    }

    /// Lockout tiers for these settings
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::tiered(self.max_login_attempts, i64::from(self.lockout_duration_minutes))
    }
}

/// Admin transaction listing filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "filter", content = "threshold")]
pub enum TransactionFilter {
    /// Everything
    All,
    /// Committed since UTC midnight
    Today,
    /// Flagged for review
    Flagged,
    /// Absolute amount at or above the threshold
    LargeAmount(Decimal),
}

impl TransactionFilter {
    /// Does `tx` pass the filter
    pub fn matches(&self, tx: &Transaction, day_start: DateTime<Utc>) -> bool {
        match self {
            TransactionFilter::All => true,
            TransactionFilter::Today => tx.timestamp >= day_start,
            TransactionFilter::Flagged => tx.flagged,
            TransactionFilter::LargeAmount(threshold) => tx.amount.abs() >= *threshold,
        }
    }
}

/// A page of results plus the total match count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,

    /// Matches across all pages
    pub total: u64,

    /// Zero-based page index
    pub page: u32,

    /// Page size used
    pub page_size: u32,
}

/// Admin dashboard aggregates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Regular user accounts
    pub total_users: u64,

    /// Accounts created since UTC midnight
    pub users_today: u64,

    /// Transactions committed since UTC midnight
    pub transactions_today: u64,

    /// Sum of absolute amounts committed since UTC midnight
    pub volume_today: Decimal,

    /// Failed login attempts in the last 24 hours
    pub failed_logins_24h: u64,

    /// Accounts currently locked
    pub locked_accounts: u64,
}

/// Counts removed by a purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Login attempts removed
    pub attempts_removed: u64,

    /// Security log entries removed
    pub log_entries_removed: u64,
}

/// Counts affected by a test-data reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    /// Transactions removed
    pub transactions_removed: u64,

    /// Login attempts removed
    pub attempts_removed: u64,

    /// Accounts whose balance was zeroed
    pub accounts_reset: u64,
}
