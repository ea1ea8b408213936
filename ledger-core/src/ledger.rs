//! Main ledger orchestration layer
//!
//! This module ties together storage, the single writer and metrics into a
//! high-level API for accounts, balances and the append-only logs.
//!
//! Mutations go through the writer; single-record reads hit storage
//! directly and multi-record reads use a RocksDB snapshot.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger, NewAccount};
//! use rust_decimal::Decimal;
//! use security::Role;
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     ledger
//!         .create_account(NewAccount {
//!             username: "alice".to_string(),
//!             password_hash: "...".to_string(),
//!             role: Role::User,
//!         })
//!         .await?;
//!
//!     let tx = ledger.deposit("alice", Decimal::new(10000, 2)).await?;
//!     assert_eq!(tx.balance_after, Decimal::new(10000, 2));
//!
//!     ledger.shutdown().await
//! }
//! ```

#[cfg(any(test, feature = "fault-injection"))]
use crate::actor::FaultPoint;
use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    types::{
        Account, AccountUpdate, DashboardStats, LoginAttempt, NewAccount, Page, PurgeReport,
        ResetReport, SecurityLogEntry, SystemSettings, Transaction, TransactionFilter,
        TransferReceipt,
    },
    Config, Error, Result, Storage,
};
use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use security::input_sanitizer::{MAX_SOURCE_LEN, MAX_USERNAME_LEN};
use security::{audit_log, Clock, InputSanitizer, SecurityEvent, SystemClock};
use std::sync::Arc;
use uuid::Uuid;

/// Largest page a listing may request
pub const MAX_LIST_LIMIT: usize = 100;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Direct storage access (for reads and append-only logs)
    storage: Arc<Storage>,

    /// Time source shared with the writer
    clock: Arc<dyn Clock>,

    /// Amount validation
    sanitizer: InputSanitizer,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Open ledger with an explicit time source
    pub async fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        // Open storage
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()?;
        let sanitizer = InputSanitizer::new().map_err(|e| Error::Config(e.to_string()))?;

        // Spawn writer
        let handle = spawn_ledger_actor(storage.clone(), clock.clone(), metrics.clone(), &config.writer);

        tracing::info!(
            service = %config.service_name,
            timeout_ms = config.writer.request_timeout_ms,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            storage,
            clock,
            sanitizer,
            metrics,
            config,
        })
    }

    /// Current time on the ledger clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Shared time source
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Accounts

    /// Create an account with a zero balance
    pub async fn create_account(&self, account: NewAccount) -> Result<Account> {
        self.handle.create_account(account).await
    }

    /// Account by username
    pub fn account(&self, username: &str) -> Result<Account> {
        self.find_account(username)?
            .ok_or_else(|| Error::AccountNotFound(username.to_string()))
    }

    /// Account by username, if any
    pub fn find_account(&self, username: &str) -> Result<Option<Account>> {
        self.storage.get_account(username)
    }

    /// Account by number (separators and case ignored)
    pub fn account_by_number(&self, account_number: &str) -> Result<Account> {
        let username = self
            .storage
            .username_for_number(account_number)?
            .ok_or_else(|| Error::AccountNotFound(account_number.to_string()))?;
        self.account(&username)
    }

    /// Apply a non-monetary account mutation
    pub async fn update_account(&self, username: &str, update: AccountUpdate) -> Result<Account> {
        self.handle.update_account(username.to_string(), update).await
    }

    /// Accounts page, newest first
    pub fn list_accounts(&self, page: u32, page_size: u32) -> Result<Page<Account>> {
        let mut accounts = self.storage.all_accounts()?;
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.username.cmp(&b.username)));

        let total = accounts.len() as u64;
        let items = accounts
            .into_iter()
            .skip(page as usize * page_size as usize)
            .take(page_size as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    // Money movement

    /// Credit an account; returns the committed transaction
    pub async fn deposit(&self, username: &str, amount: Decimal) -> Result<Transaction> {
        let amount = self.validate_amount(amount)?;
        self.handle.deposit(username.to_string(), amount).await
    }

    /// Debit an account; fails with `InsufficientFunds` when the balance is too low
    pub async fn withdraw(&self, username: &str, amount: Decimal) -> Result<Transaction> {
        let amount = self.validate_amount(amount)?;
        self.handle.withdraw(username.to_string(), amount).await
    }

    /// Move funds to the account carrying `to_account_number`
    ///
    /// Checks run in order: amount, self-transfer, recipient, funds. Both
    /// legs commit together or not at all.
    pub async fn transfer(
        &self,
        username: &str,
        to_account_number: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let amount = self.validate_amount(amount)?;
        self.handle
            .transfer(username.to_string(), to_account_number.to_string(), amount)
            .await
    }

    fn sanitize_field(&self, input: &str, max_length: usize) -> Result<String> {
        self.sanitizer
            .sanitize_text(input, max_length)
            .map_err(|e| Error::Validation(e.to_string()))
    }

    fn validate_amount(&self, amount: Decimal) -> Result<Decimal> {
        self.sanitizer.sanitize_amount(amount).map_err(|e| {
            self.metrics.record_rejected();
            Error::InvalidAmount(e.to_string())
        })
    }

    // Transactions

    /// Most recent `limit` transactions of an account, newest first
    pub fn list_transactions(&self, username: &str, limit: usize) -> Result<Vec<Transaction>> {
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }

        // Unknown usernames are an error, not an empty history
        self.account(username)?;
        self.storage.account_transactions(username, limit)
    }

    /// Transaction by ID
    pub fn transaction(&self, id: Uuid) -> Result<Transaction> {
        self.storage
            .get_transaction(id)?
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))
    }

    /// Set or clear the review flag
    pub async fn set_transaction_flag(&self, id: Uuid, flagged: bool) -> Result<Transaction> {
        self.handle.set_transaction_flag(id, flagged).await
    }

    /// Filtered listing across all accounts, newest first
    pub fn list_all_transactions(
        &self,
        filter: TransactionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Transaction>> {
        self.storage
            .list_transactions(filter, day_start(self.now()), page, page_size)
    }

    /// True when the balance equals the sum of the account's transaction amounts
    pub fn check_balance_invariant(&self, username: &str) -> Result<bool> {
        let account = self.account(username)?;
        let total: Decimal = self
            .storage
            .account_transactions(username, usize::MAX)?
            .iter()
            .map(|tx| tx.amount)
            .sum();

        Ok(total == account.balance)
    }

    // Login attempts

    /// Append a login attempt stamped with the ledger clock
    ///
    /// The username need not exist, so both it and the source are bounded
    /// free text here rather than checked against the account rules.
    pub fn record_attempt(
        &self,
        username: &str,
        source: Option<&str>,
        success: bool,
    ) -> Result<LoginAttempt> {
        let username = self.sanitize_field(username, MAX_USERNAME_LEN)?;
        let source = source
            .map(|source| self.sanitize_field(source, MAX_SOURCE_LEN))
            .transpose()?;

        let attempt = LoginAttempt {
            id: Uuid::now_v7(),
            username,
            source,
            success,
            timestamp: self.now(),
        };
        self.storage.append_attempt(&attempt)?;
        Ok(attempt)
    }

    /// Attempts for `username` at or after `since`, oldest first
    pub fn attempts_since(&self, username: &str, since: DateTime<Utc>) -> Result<Vec<LoginAttempt>> {
        self.storage.attempts_since(username, since)
    }

    // Security log

    /// Append a security event stamped with the ledger clock
    pub fn log_security_event(&self, event: SecurityEvent) -> Result<SecurityLogEntry> {
        self.storage.append_security_event(event, self.now())
    }

    /// Security log page, newest first
    pub fn security_log(&self, page: u32, page_size: u32) -> Result<Page<SecurityLogEntry>> {
        self.storage.security_log(page, page_size)
    }

    /// Verify the security log hash chain; returns the number of entries checked
    pub fn verify_security_log(&self) -> Result<usize> {
        let entries = self.storage.security_log_entries()?;
        audit_log::verify_chain(&entries)?;
        Ok(entries.len())
    }

    // Administration

    /// Dashboard aggregates
    pub fn dashboard(&self) -> Result<DashboardStats> {
        let now = self.now();
        self.storage.dashboard(now, day_start(now))
    }

    /// Current settings
    pub fn settings(&self) -> Result<SystemSettings> {
        self.storage.settings()
    }

    /// Validate and store new settings
    pub fn update_settings(&self, settings: SystemSettings) -> Result<SystemSettings> {
        settings.validate()?;
        self.storage.put_settings(&settings)?;
        tracing::info!(
            max_login_attempts = settings.max_login_attempts,
            lockout_duration_minutes = settings.lockout_duration_minutes,
            require_admin_2fa = settings.require_admin_2fa,
            "Settings updated"
        );
        Ok(settings)
    }

    /// Delete attempts and security log entries older than `days`
    pub fn purge_older_than(&self, days: u32) -> Result<PurgeReport> {
        if days == 0 {
            return Err(Error::Validation("days must be at least 1".to_string()));
        }

        let cutoff = self.now() - chrono::Duration::days(i64::from(days));
        let report = self.storage.purge_before(cutoff)?;
        tracing::info!(
            days,
            attempts = report.attempts_removed,
            log_entries = report.log_entries_removed,
            "Purged old records"
        );
        Ok(report)
    }

    /// Delete all transactions and attempts and zero every balance
    pub async fn reset_test_data(&self) -> Result<ResetReport> {
        let report = self.handle.reset_test_data().await?;
        tracing::warn!(
            transactions = report.transactions_removed,
            attempts = report.attempts_removed,
            accounts = report.accounts_reset,
            "Test data reset"
        );
        Ok(report)
    }

    // Control

    /// Arm a one-shot writer fault
    #[cfg(any(test, feature = "fault-injection"))]
    pub async fn arm_fault(&self, fault: FaultPoint) -> Result<()> {
        self.handle.arm_fault(fault).await
    }

    /// Storage reachable
    pub fn health(&self) -> Result<()> {
        self.storage.ping()
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

/// UTC midnight of the day containing `now`
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}
