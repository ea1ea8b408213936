//! Security Audit Trail
//!
//! Event taxonomy and tamper evidence for the security log:
//! - Authentication events (failed logins, blocked attempts, admin logins)
//! - Lockout events (automatic and manual locks, unlocks)
//! - Credential events (password change/reset, two-factor enrollment)
//! - Administrative actions (flags, settings, purges, test-data reset)
//!
//! Records are sealed into a SHA-256 hash chain: each record's hash covers
//! its own fields plus the previous record's hash. Persistence lives with
//! the store; this module only builds, seals and verifies records.
//!
//! Purging old records leaves the first retained record pointing at a hash
//! that no longer exists. [`verify_chain`] treats that `prev_hash` as the
//! chain anchor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Audit trail errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuditError {
    #[error("Integrity check failed: {0}")]
    IntegrityFailure(String),
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Security event type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    // Account lifecycle
    AccountCreated,
    AdminCreated,

    // Authentication
    LoginFailed,
    LoginBlocked,
    AdminLogin,
    AdminLoginDenied,

    // Lockout
    UserLocked,
    UserUnlocked,

    // Credentials
    PasswordChanged,
    PasswordReset,
    TwoFactorEnabled,
    TwoFactorDisabled,

    // Administrative
    TransactionFlagged,
    TransactionUnflagged,
    SettingsUpdated,
    LogsPurged,
    TestDataReset,
}

impl SecurityEventType {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::AccountCreated => "account_created",
            SecurityEventType::AdminCreated => "admin_created",
            SecurityEventType::LoginFailed => "login_failed",
            SecurityEventType::LoginBlocked => "login_blocked",
            SecurityEventType::AdminLogin => "admin_login",
            SecurityEventType::AdminLoginDenied => "admin_login_denied",
            SecurityEventType::UserLocked => "user_locked",
            SecurityEventType::UserUnlocked => "user_unlocked",
            SecurityEventType::PasswordChanged => "password_changed",
            SecurityEventType::PasswordReset => "password_reset",
            SecurityEventType::TwoFactorEnabled => "two_factor_enabled",
            SecurityEventType::TwoFactorDisabled => "two_factor_disabled",
            SecurityEventType::TransactionFlagged => "transaction_flagged",
            SecurityEventType::TransactionUnflagged => "transaction_unflagged",
            SecurityEventType::SettingsUpdated => "settings_updated",
            SecurityEventType::LogsPurged => "logs_purged",
            SecurityEventType::TestDataReset => "test_data_reset",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit severity level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Unsealed security event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Event type
    pub event_type: SecurityEventType,

    /// Severity level
    pub severity: Severity,

    /// Username the event concerns
    pub username: Option<String>,

    /// Source address of the request
    pub source: Option<String>,

    /// Free-text detail
    pub detail: String,
}

impl SecurityEvent {
    /// Create new security event
    pub fn new(event_type: SecurityEventType, severity: Severity, detail: impl Into<String>) -> Self {
        Self {
            event_type,
            severity,
            username: None,
            source: None,
            detail: detail.into(),
        }
    }

    /// Builder methods
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_source(mut self, source: Option<&str>) -> Self {
        self.source = source.map(str::to_string);
        self
    }
}

/// Sealed, hash-chained security log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the log (strictly increasing)
    pub seq: u64,

    /// Record timestamp
    pub timestamp: DateTime<Utc>,

    /// The event itself
    pub event: SecurityEvent,

    /// Previous record hash (for hash chain)
    pub prev_hash: String,

    /// Current record hash
    pub hash: String,
}

impl AuditRecord {
    /// Seal an event at `seq` on top of `prev_hash`
    pub fn seal(seq: u64, timestamp: DateTime<Utc>, event: SecurityEvent, prev_hash: String) -> Self {
        let mut record = Self {
            seq,
            timestamp,
            event,
            prev_hash,
            hash: String::new(),
        };
        record.hash = record.compute_hash();
        record
    }

    /// Compute record hash
    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();

        // Unit separator between fields keeps adjacent fields unambiguous
        let mut field = |bytes: &[u8]| {
            hasher.update(bytes);
            hasher.update([0x1f]);
        };

        field(&self.seq.to_be_bytes());
        field(self.timestamp.to_rfc3339().as_bytes());
        field(self.event.event_type.as_str().as_bytes());
        field(self.event.severity.as_str().as_bytes());
        field(self.event.username.as_deref().unwrap_or("").as_bytes());
        field(self.event.source.as_deref().unwrap_or("").as_bytes());
        field(self.event.detail.as_bytes());
        field(self.prev_hash.as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Verify record hash
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Verify a run of records in ascending `seq` order
pub fn verify_chain<'a, I>(records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a AuditRecord>,
{
    let mut previous: Option<&AuditRecord> = None;

    for record in records {
        if !record.verify_hash() {
            return Err(AuditError::IntegrityFailure(format!(
                "Record hash mismatch at seq {}",
                record.seq
            )));
        }

        if let Some(prev) = previous {
            if record.seq <= prev.seq {
                return Err(AuditError::IntegrityFailure(format!(
                    "Sequence not increasing at seq {}",
                    record.seq
                )));
            }
            if record.prev_hash != prev.hash {
                return Err(AuditError::IntegrityFailure(format!(
                    "Hash chain broken at seq {}",
                    record.seq
                )));
            }
        }

        previous = Some(record);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: u64) -> Vec<AuditRecord> {
        let mut records: Vec<AuditRecord> = Vec::new();
        for seq in 1..=n {
            let prev = records.last().map(|r| r.hash.clone()).unwrap_or_default();
            let event = SecurityEvent::new(SecurityEventType::LoginFailed, Severity::Low, "bad password")
                .with_username(format!("user{}", seq))
                .with_source(Some("10.0.0.1"));
            records.push(AuditRecord::seal(seq, Utc::now(), event, prev));
        }
        records
    }

    #[test]
    fn test_record_hash() {
        let record = &chain(1)[0];
        assert!(record.verify_hash());
        assert_eq!(record.hash.len(), 64);
    }

    #[test]
    fn test_hash_chain() {
        let records = chain(5);
        assert!(verify_chain(&records).is_ok());
    }

    #[test]
    fn test_tampered_detail_detected() {
        let mut records = chain(3);
        records[1].event.detail = "nothing to see".to_string();

        let err = verify_chain(&records).unwrap_err();
        assert_eq!(err, AuditError::IntegrityFailure("Record hash mismatch at seq 2".to_string()));
    }

    #[test]
    fn test_removed_record_detected() {
        let mut records = chain(4);
        records.remove(2);
        assert!(verify_chain(&records).is_err());
    }

    #[test]
    fn test_purged_prefix_still_verifies() {
        let records = chain(6);
        assert!(verify_chain(&records[3..]).is_ok());
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(SecurityEventType::UserLocked.to_string(), "user_locked");
        assert_eq!(
            serde_json::to_string(&SecurityEventType::TwoFactorEnabled).unwrap(),
            "\"two_factor_enabled\""
        );
        assert!(Severity::Critical > Severity::High);
    }
}
