//! Banking service: accounts and money movement for authenticated callers
//!
//! [`BankingService`] owns the ledger handle and the credential primitives.
//! Authentication lives in [`crate::auth`], enrollment in
//! [`crate::two_factor`] and oversight in [`crate::admin`]; all of them are
//! `impl BankingService` blocks over the same state.

use crate::auth::Identity;
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use chrono::Duration;
use ledger_core::{Account, AccountUpdate, Ledger, NewAccount, Transaction, TransferReceipt};
use rust_decimal::Decimal;
use security::{
    Argon2PasswordHasher, Clock, InputSanitizer, JwtTokenSigner, OtpProvider, PasswordHasher,
    Role, SecurityEvent, SecurityEventType, Severity, SystemClock, TokenSigner, TotpProvider,
};
use std::sync::Arc;

/// Pluggable credential primitives
#[derive(Debug, Clone)]
pub struct Primitives {
    /// Password hash/verify
    pub hasher: Arc<dyn PasswordHasher>,

    /// Bearer credential sign/verify
    pub signer: Arc<dyn TokenSigner>,

    /// One-time codes
    pub otp: Arc<dyn OtpProvider>,
}

impl Primitives {
    /// Argon2id, HS256 JWT and RFC 6238 TOTP
    pub fn defaults(config: &ServiceConfig) -> Self {
        Self {
            hasher: Arc::new(Argon2PasswordHasher::new()),
            signer: Arc::new(JwtTokenSigner::new(
                config.auth.token_secret.as_bytes(),
                config.auth.issuer.clone(),
            )),
            otp: Arc::new(TotpProvider::default()),
        }
    }
}

/// Public view of another account, resolved by number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDirectoryEntry {
    /// Owner
    pub username: String,

    /// Account number
    pub account_number: String,
}

/// Account ledger service with password + OTP authentication
#[derive(Debug)]
pub struct BankingService {
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) hasher: Arc<dyn PasswordHasher>,
    pub(crate) signer: Arc<dyn TokenSigner>,
    pub(crate) otp: Arc<dyn OtpProvider>,
    pub(crate) sanitizer: InputSanitizer,
    pub(crate) config: ServiceConfig,
}

impl BankingService {
    /// Open the ledger and wire the default primitives
    pub async fn open(config: ServiceConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Same as [`BankingService::open`] with an explicit time source
    pub async fn open_with_clock(config: ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let ledger = Arc::new(Ledger::open_with_clock(config.ledger.clone(), clock).await?);
        let primitives = Primitives::defaults(&config);
        Self::with_components(ledger, config, primitives)
    }

    /// Assemble from an open ledger and explicit primitives
    pub fn with_components(
        ledger: Arc<Ledger>,
        config: ServiceConfig,
        primitives: Primitives,
    ) -> Result<Self> {
        config.validate()?;
        let sanitizer = InputSanitizer::new().map_err(|e| ServiceError::Config(e.to_string()))?;

        Ok(Self {
            ledger,
            hasher: primitives.hasher,
            signer: primitives.signer,
            otp: primitives.otp,
            sanitizer,
            config,
        })
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Configuration in use
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Create the configured superadmin if it does not exist yet
    pub async fn bootstrap_superadmin(&self) -> Result<Option<Account>> {
        let bootstrap = match &self.config.bootstrap {
            Some(bootstrap) => bootstrap,
            None => return Ok(None),
        };

        if self.ledger.find_account(&bootstrap.username)?.is_some() {
            return Ok(None);
        }

        let account = self
            .register(&bootstrap.username, &bootstrap.password, Role::SuperAdmin)
            .await?;
        self.audit(
            SecurityEvent::new(
                SecurityEventType::AdminCreated,
                Severity::High,
                "Superadmin bootstrapped",
            )
            .with_username(account.username.clone()),
        );
        tracing::info!(username = %account.username, "Bootstrapped superadmin");

        Ok(Some(account))
    }

    /// Sign up a regular user
    pub async fn create_account(&self, username: &str, password: &str) -> Result<Account> {
        let account = self.register(username, password, Role::User).await?;
        self.audit(
            SecurityEvent::new(SecurityEventType::AccountCreated, Severity::Info, "Account created")
                .with_username(account.username.clone()),
        );
        Ok(account)
    }

    /// Validate, hash and store a new account
    pub(crate) async fn register(&self, username: &str, password: &str, role: Role) -> Result<Account> {
        let username = self.sanitizer.sanitize_username(username)?;
        self.sanitizer.check_password_complexity(password)?;
        let password_hash = self.hash_password(password).await?;

        let account = self
            .ledger
            .create_account(NewAccount {
                username,
                password_hash,
                role,
            })
            .await?;

        Ok(account)
    }

    /// Current balance
    pub fn balance(&self, identity: &Identity) -> Result<Decimal> {
        Ok(self.ledger.account(identity.username())?.balance)
    }

    /// Own profile
    pub fn me(&self, identity: &Identity) -> Result<Account> {
        Ok(self.ledger.account(identity.username())?)
    }

    /// Deposit into the caller's account
    pub async fn deposit(&self, identity: &Identity, amount: Decimal) -> Result<Transaction> {
        let tx = self.ledger.deposit(identity.username(), amount).await?;
        tracing::info!(username = %identity.username(), amount = %amount, "Deposit");
        Ok(tx)
    }

    /// Withdraw from the caller's account
    pub async fn withdraw(&self, identity: &Identity, amount: Decimal) -> Result<Transaction> {
        let tx = self.ledger.withdraw(identity.username(), amount).await?;
        tracing::info!(username = %identity.username(), amount = %amount, "Withdrawal");
        Ok(tx)
    }

    /// Transfer from the caller's account to an account number
    pub async fn transfer(
        &self,
        identity: &Identity,
        to_account_number: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let receipt = self
            .ledger
            .transfer(identity.username(), to_account_number, amount)
            .await?;
        tracing::info!(
            username = %identity.username(),
            to = %receipt.received.username,
            amount = %amount,
            "Transfer"
        );
        Ok(receipt)
    }

    /// Most recent transactions of the caller, newest first
    pub fn list_transactions(&self, identity: &Identity, limit: usize) -> Result<Vec<Transaction>> {
        Ok(self.ledger.list_transactions(identity.username(), limit)?)
    }

    /// Resolve an account number to its owner
    pub fn account_by_number(
        &self,
        _identity: &Identity,
        account_number: &str,
    ) -> Result<AccountDirectoryEntry> {
        let account = self.ledger.account_by_number(account_number)?;
        Ok(AccountDirectoryEntry {
            username: account.username,
            account_number: account.account_number,
        })
    }

    /// Replace the caller's password after checking the current one
    pub async fn change_password(
        &self,
        identity: &Identity,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let account = self.ledger.account(identity.username())?;
        if !self.verify_password(current_password, &account.password_hash).await? {
            return Err(ServiceError::InvalidCredentials);
        }

        self.sanitizer.check_password_complexity(new_password)?;
        let hash = self.hash_password(new_password).await?;
        self.ledger
            .update_account(identity.username(), AccountUpdate::SetPasswordHash { hash })
            .await?;

        self.audit(
            SecurityEvent::new(SecurityEventType::PasswordChanged, Severity::Medium, "Password changed")
                .with_username(identity.username()),
        );
        Ok(())
    }

    /// Store reachable
    pub fn health(&self) -> Result<()> {
        Ok(self.ledger.health()?)
    }

    /// Stop the ledger writer once no other handle remains
    pub async fn shutdown(self) -> Result<()> {
        match Arc::try_unwrap(self.ledger) {
            Ok(ledger) => Ok(ledger.shutdown().await?),
            Err(_) => {
                tracing::warn!("Ledger still shared, writer stops with the last handle");
                Ok(())
            }
        }
    }

    /// Argon2 is CPU bound; run it off the async workers
    pub(crate) async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::InternalStorage(format!("Hashing task failed: {}", e)))?
            .map_err(|e| ServiceError::InternalStorage(e.to_string()))
    }

    pub(crate) async fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| ServiceError::InternalStorage(format!("Verify task failed: {}", e)))
    }

    pub(crate) fn user_token_ttl(&self) -> Duration {
        Duration::minutes(self.config.auth.user_token_ttl_minutes)
    }

    pub(crate) fn admin_token_ttl(&self) -> Duration {
        Duration::minutes(self.config.auth.admin_token_ttl_minutes)
    }

    /// Append to the security log; failures are logged, never propagated
    pub(crate) fn audit(&self, event: SecurityEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.ledger.log_security_event(event) {
            tracing::warn!(event = %event_type, error = %e, "Security log write failed");
        }
    }
}
