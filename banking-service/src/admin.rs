//! Admin oversight
//!
//! Every operation takes an [`Identity`] from
//! [`BankingService::authorize_admin`] and checks its role before touching
//! anything. Mutations leave a security log entry.
//!
//! Roles: `admin` reads everything and manages regular users;
//! `superadmin` additionally manages admins, creates admins and may wipe
//! test data.

use crate::auth::Identity;
use crate::error::{Result, ServiceError};
use crate::service::BankingService;
use chrono::{DateTime, Duration, Utc};
use ledger_core::{
    Account, AccountUpdate, DashboardStats, Page, PurgeReport, ResetReport, SecurityLogEntry,
    SystemSettings, Transaction, TransactionFilter,
};
use rust_decimal::Decimal;
use security::input_sanitizer::generate_temporary_password;
use security::{Role, SecurityEvent, SecurityEventType, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest manual lock (one year)
pub const MAX_LOCK_MINUTES: u32 = 525_600;

/// Account row in admin listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
    pub account_number: String,
    pub balance: Decimal,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_locked: bool,
    pub two_factor_enabled: bool,
}

impl UserSummary {
    fn from_account(account: &Account, now: DateTime<Utc>) -> Self {
        Self {
            username: account.username.clone(),
            account_number: account.account_number.clone(),
            balance: account.balance,
            role: account.role,
            created_at: account.created_at,
            last_login: account.last_login,
            is_locked: account.is_locked(now),
            two_factor_enabled: account.two_factor_enabled(),
        }
    }
}

/// Single-user inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub summary: UserSummary,
    pub lock_until: Option<DateTime<Utc>>,
    pub last_login_source: Option<String>,
    pub failed_attempts_24h: u64,
    pub recent_transactions: Vec<Transaction>,
}

impl BankingService {
    /// Dashboard aggregates
    pub fn admin_dashboard(&self, admin: &Identity) -> Result<DashboardStats> {
        require(admin, Role::Admin)?;
        Ok(self.ledger.dashboard()?)
    }

    /// Accounts, newest first
    pub fn admin_list_users(
        &self,
        admin: &Identity,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<Page<UserSummary>> {
        require(admin, Role::Admin)?;
        let page_size = self.page_size(page_size)?;
        let accounts = self.ledger.list_accounts(page, page_size)?;
        let now = self.ledger.now();

        Ok(Page {
            items: accounts
                .items
                .iter()
                .map(|account| UserSummary::from_account(account, now))
                .collect(),
            total: accounts.total,
            page: accounts.page,
            page_size: accounts.page_size,
        })
    }

    /// One account with its recent activity
    pub fn admin_user_detail(&self, admin: &Identity, username: &str) -> Result<UserDetail> {
        require(admin, Role::Admin)?;
        let account = self.ledger.account(username)?;
        let now = self.ledger.now();

        let failed_attempts_24h = self
            .ledger
            .attempts_since(username, now - Duration::hours(24))?
            .iter()
            .filter(|attempt| !attempt.success)
            .count() as u64;

        Ok(UserDetail {
            summary: UserSummary::from_account(&account, now),
            lock_until: account.lock_until.filter(|until| *until > now),
            last_login_source: account.last_login_source.clone(),
            failed_attempts_24h,
            recent_transactions: self.ledger.list_transactions(username, 10)?,
        })
    }

    /// Lock an account for `minutes`
    pub async fn admin_lock_user(&self, admin: &Identity, username: &str, minutes: u32) -> Result<Account> {
        require(admin, Role::Admin)?;
        if !(1..=MAX_LOCK_MINUTES).contains(&minutes) {
            return Err(ServiceError::Validation(format!(
                "lock duration must be between 1 and {} minutes",
                MAX_LOCK_MINUTES
            )));
        }

        let target = self.ledger.account(username)?;
        require_outranks(admin, &target)?;

        let until = self.ledger.now() + Duration::minutes(i64::from(minutes));
        let account = self
            .ledger
            .update_account(username, AccountUpdate::Lock { until })
            .await?;

        tracing::info!(admin = %admin.username(), username = %username, %until, "User locked by admin");
        self.audit(
            SecurityEvent::new(
                SecurityEventType::UserLocked,
                Severity::Medium,
                format!("Locked by {} for {} minutes", admin.username(), minutes),
            )
            .with_username(username),
        );
        Ok(account)
    }

    /// Clear any lock
    pub async fn admin_unlock_user(&self, admin: &Identity, username: &str) -> Result<Account> {
        require(admin, Role::Admin)?;
        let account = self
            .ledger
            .update_account(username, AccountUpdate::Unlock)
            .await?;

        tracing::info!(admin = %admin.username(), username = %username, "User unlocked by admin");
        self.audit(
            SecurityEvent::new(
                SecurityEventType::UserUnlocked,
                Severity::Info,
                format!("Unlocked by {}", admin.username()),
            )
            .with_username(username),
        );
        Ok(account)
    }

    /// Replace the password with a generated one, returned once
    pub async fn admin_reset_password(&self, admin: &Identity, username: &str) -> Result<String> {
        require(admin, Role::Admin)?;
        let target = self.ledger.account(username)?;
        require_outranks(admin, &target)?;

        let temporary = generate_temporary_password(self.config.auth.temp_password_length);
        let hash = self.hash_password(&temporary).await?;
        self.ledger
            .update_account(username, AccountUpdate::SetPasswordHash { hash })
            .await?;

        tracing::info!(admin = %admin.username(), username = %username, "Password reset by admin");
        self.audit(
            SecurityEvent::new(
                SecurityEventType::PasswordReset,
                Severity::High,
                format!("Password reset by {}", admin.username()),
            )
            .with_username(username),
        );
        Ok(temporary)
    }

    /// Filtered transaction listing, newest first
    pub fn admin_list_transactions(
        &self,
        admin: &Identity,
        filter: TransactionFilter,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<Page<Transaction>> {
        require(admin, Role::Admin)?;
        if let TransactionFilter::LargeAmount(threshold) = filter {
            if threshold <= Decimal::ZERO {
                return Err(ServiceError::Validation(
                    "threshold must be positive".to_string(),
                ));
            }
        }

        let page_size = self.page_size(page_size)?;
        Ok(self.ledger.list_all_transactions(filter, page, page_size)?)
    }

    /// Set or clear the review flag of a transaction
    pub async fn admin_flag_transaction(
        &self,
        admin: &Identity,
        id: Uuid,
        flagged: bool,
    ) -> Result<Transaction> {
        require(admin, Role::Admin)?;
        let tx = self.ledger.set_transaction_flag(id, flagged).await?;

        let (event_type, verb) = if flagged {
            (SecurityEventType::TransactionFlagged, "flagged")
        } else {
            (SecurityEventType::TransactionUnflagged, "unflagged")
        };
        self.audit(
            SecurityEvent::new(
                event_type,
                Severity::Low,
                format!("Transaction {} {} by {}", id, verb, admin.username()),
            )
            .with_username(tx.username.clone()),
        );
        Ok(tx)
    }

    /// Security log, newest first
    pub fn admin_security_log(
        &self,
        admin: &Identity,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<Page<SecurityLogEntry>> {
        require(admin, Role::Admin)?;
        let page_size = self.page_size(page_size)?;
        Ok(self.ledger.security_log(page, page_size)?)
    }

    /// Check the security log hash chain; returns the entries verified
    pub fn admin_verify_security_log(&self, admin: &Identity) -> Result<usize> {
        require(admin, Role::Admin)?;
        Ok(self.ledger.verify_security_log()?)
    }

    /// Current settings
    pub fn admin_settings(&self, admin: &Identity) -> Result<SystemSettings> {
        require(admin, Role::Admin)?;
        Ok(self.ledger.settings()?)
    }

    /// Replace settings
    pub fn admin_update_settings(
        &self,
        admin: &Identity,
        settings: SystemSettings,
    ) -> Result<SystemSettings> {
        require(admin, Role::Admin)?;
        let settings = self.ledger.update_settings(settings)?;

        self.audit(
            SecurityEvent::new(
                SecurityEventType::SettingsUpdated,
                Severity::Medium,
                format!(
                    "Settings updated by {}: max_login_attempts={} lockout_duration_minutes={} require_admin_2fa={}",
                    admin.username(),
                    settings.max_login_attempts,
                    settings.lockout_duration_minutes,
                    settings.require_admin_2fa
                ),
            )
            .with_username(admin.username()),
        );
        Ok(settings)
    }

    /// Delete attempts and security log entries older than `days` (default retention when `None`)
    pub fn admin_purge_logs(&self, admin: &Identity, days: Option<u32>) -> Result<PurgeReport> {
        require(admin, Role::Admin)?;
        let days = days.unwrap_or(self.config.admin.log_retention_days);
        let report = self.ledger.purge_older_than(days)?;

        // Written after the purge so the record survives it
        self.audit(
            SecurityEvent::new(
                SecurityEventType::LogsPurged,
                Severity::Medium,
                format!(
                    "Purged {} attempts and {} log entries older than {} days",
                    report.attempts_removed, report.log_entries_removed, days
                ),
            )
            .with_username(admin.username()),
        );
        Ok(report)
    }

    /// Create an admin account (superadmin only)
    pub async fn admin_create_admin(
        &self,
        admin: &Identity,
        username: &str,
        password: &str,
    ) -> Result<Account> {
        require(admin, Role::SuperAdmin)?;
        let account = self.register(username, password, Role::Admin).await?;

        tracing::info!(admin = %admin.username(), username = %account.username, "Admin created");
        self.audit(
            SecurityEvent::new(
                SecurityEventType::AdminCreated,
                Severity::High,
                format!("Admin created by {}", admin.username()),
            )
            .with_username(account.username.clone()),
        );
        Ok(account)
    }

    /// Delete all transactions and attempts and zero balances (superadmin only)
    pub async fn admin_reset_test_data(&self, admin: &Identity) -> Result<ResetReport> {
        require(admin, Role::SuperAdmin)?;
        let report = self.ledger.reset_test_data().await?;

        self.audit(
            SecurityEvent::new(
                SecurityEventType::TestDataReset,
                Severity::Critical,
                format!(
                    "Test data reset by {}: {} transactions, {} attempts, {} balances",
                    admin.username(),
                    report.transactions_removed,
                    report.attempts_removed,
                    report.accounts_reset
                ),
            )
            .with_username(admin.username()),
        );
        Ok(report)
    }

    fn page_size(&self, requested: Option<u32>) -> Result<u32> {
        let size = requested.unwrap_or(self.config.admin.default_page_size);
        if size == 0 || size > self.config.admin.max_page_size {
            return Err(ServiceError::Validation(format!(
                "page_size must be between 1 and {}",
                self.config.admin.max_page_size
            )));
        }
        Ok(size)
    }
}

fn require(identity: &Identity, role: Role) -> Result<()> {
    if identity.role().permits(role) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(format!("{} role required", role)))
    }
}

/// Lock and reset only reach strictly lower roles
fn require_outranks(admin: &Identity, target: &Account) -> Result<()> {
    if admin.role() > target.role {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(format!(
            "cannot act on a {} account",
            target.role
        )))
    }
}
