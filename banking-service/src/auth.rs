//! Authentication, lockout and authorization
//!
//! Login pipeline, shared by users and admins:
//!
//! 1. lock check: a live `lock_until` rejects the attempt before the
//!    password is looked at (the attempt still counts as a failure)
//! 2. password check
//! 3. OTP check when a secret is enrolled
//! 4. success bookkeeping: record the attempt, clear any lock, stamp the
//!    last login
//!
//! Every failure in steps 1 to 3 is appended to the attempt log first and
//! then run through the tiered [`LockoutPolicy`](security::LockoutPolicy).
//! Only failures newer than the latest success count, and a lock is only
//! ever extended.

use crate::error::{Result, ServiceError};
use crate::service::BankingService;
use chrono::{DateTime, Duration, Utc};
use ledger_core::{Account, AccountUpdate, LoginAttempt};
use security::input_sanitizer::{MAX_SOURCE_LEN, MAX_USERNAME_LEN};
use security::{Claims, LockState, Role, SecurityEvent, SecurityEventType, Severity};
use serde::{Deserialize, Serialize};

/// Authorized caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    username: String,
    role: Role,
}

impl Identity {
    pub(crate) fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    /// Account owner
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Role granted by the presented credential
    pub fn role(&self) -> Role {
        self.role
    }
}

/// Signed bearer credential handed to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Opaque credential
    pub access_token: String,

    /// Always `bearer`
    pub token_type: String,

    /// Expiry
    pub expires_at: DateTime<Utc>,

    /// Role claim (admin credentials only)
    pub role: Option<Role>,
}

impl BankingService {
    /// Log a user in and issue a user credential
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        otp: Option<&str>,
        source: Option<&str>,
    ) -> Result<IssuedToken> {
        let account = self.verify_login(username, password, otp, source).await?;
        self.issue_token(&account.username, None, self.user_token_ttl())
    }

    /// Log an admin in and issue an admin credential carrying the role claim
    pub async fn authenticate_admin(
        &self,
        username: &str,
        password: &str,
        otp: Option<&str>,
        source: Option<&str>,
    ) -> Result<IssuedToken> {
        let account = self.verify_login(username, password, otp, source).await?;

        if !account.role.is_staff() {
            self.audit(
                SecurityEvent::new(
                    SecurityEventType::AdminLoginDenied,
                    Severity::High,
                    "Admin login without admin role",
                )
                .with_username(account.username.clone())
                .with_source(source),
            );
            return Err(ServiceError::PermissionDenied("admin role required".to_string()));
        }

        let settings = self.ledger.settings()?;
        if settings.require_admin_2fa && !account.two_factor_enabled() {
            self.audit(
                SecurityEvent::new(
                    SecurityEventType::AdminLoginDenied,
                    Severity::Medium,
                    "Admin login without enrolled two-factor",
                )
                .with_username(account.username.clone())
                .with_source(source),
            );
            return Err(ServiceError::PermissionDenied(
                "two-factor enrollment required for admin access".to_string(),
            ));
        }

        self.audit(
            SecurityEvent::new(SecurityEventType::AdminLogin, Severity::Info, "Admin login")
                .with_username(account.username.clone())
                .with_source(source),
        );

        self.issue_token(&account.username, Some(account.role), self.admin_token_ttl())
    }

    /// Resolve a bearer credential to an identity
    pub fn authorize(&self, token: &str) -> Result<Identity> {
        let (claims, account) = self.resolve(token)?;

        // Admin credentials act with the lower of claimed and stored role
        let role = match claims.role {
            Some(claimed) => claimed.min(account.role),
            None => Role::User,
        };
        Ok(Identity::new(account.username, role))
    }

    /// Resolve a bearer credential that must carry an admin role claim
    pub fn authorize_admin(&self, token: &str) -> Result<Identity> {
        let identity = self.authorize(token)?;
        if !identity.role().is_staff() {
            return Err(ServiceError::PermissionDenied(
                "admin credential required".to_string(),
            ));
        }
        Ok(identity)
    }

    fn resolve(&self, token: &str) -> Result<(Claims, Account)> {
        let claims = self
            .signer
            .verify(token, self.ledger.now())
            .map_err(|e| {
                tracing::debug!(error = %e, "Credential rejected");
                ServiceError::AuthenticationFailure
            })?;

        let account = self
            .ledger
            .find_account(&claims.sub)?
            .ok_or(ServiceError::AuthenticationFailure)?;

        Ok((claims, account))
    }

    fn issue_token(&self, username: &str, role: Option<Role>, ttl: Duration) -> Result<IssuedToken> {
        let claims = Claims::new(username, role, self.config.auth.issuer.clone(), self.ledger.now(), ttl);
        let access_token = self
            .signer
            .sign(&claims)
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        Ok(IssuedToken {
            access_token,
            token_type: "bearer".to_string(),
            expires_at: claims.expires_at(),
            role,
        })
    }

    /// Lock check, password, OTP, then success bookkeeping
    async fn verify_login(
        &self,
        username: &str,
        password: &str,
        otp: Option<&str>,
        source: Option<&str>,
    ) -> Result<Account> {
        let username = self.sanitizer.sanitize_text(username, MAX_USERNAME_LEN)?;
        let source = source
            .map(|source| self.sanitizer.sanitize_text(source, MAX_SOURCE_LEN))
            .transpose()?;
        let (username, source) = (username.as_str(), source.as_deref());

        let now = self.ledger.now();
        let account = self.ledger.find_account(username)?;

        if let Some(account) = &account {
            if let LockState::Locked { until } = account.lock_state(now) {
                let event = SecurityEvent::new(
                    SecurityEventType::LoginBlocked,
                    Severity::Medium,
                    format!("Login attempt while locked until {}", until),
                );
                let until = self
                    .register_failure(username, source, event)
                    .await?
                    .unwrap_or(until);
                return Err(ServiceError::AccountLocked { until });
            }
        }

        let verified = match &account {
            Some(account) => self.verify_password(password, &account.password_hash).await?,
            None => false,
        };
        let account = match account {
            Some(account) if verified => account,
            _ => {
                let event =
                    SecurityEvent::new(SecurityEventType::LoginFailed, Severity::Low, "Invalid password");
                self.register_failure(username, source, event).await?;
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if let Some(secret) = &account.totp_secret {
            let code = otp
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .ok_or(ServiceError::TwoFactorRequired)?;

            if !self
                .otp
                .verify(secret, code, now, self.config.auth.otp_tolerance_steps)
            {
                let event = SecurityEvent::new(
                    SecurityEventType::LoginFailed,
                    Severity::Low,
                    "Invalid two-factor code",
                );
                self.register_failure(username, source, event).await?;
                return Err(ServiceError::InvalidOtp);
            }
        }

        self.ledger.record_attempt(username, source, true)?;
        let account = self
            .ledger
            .update_account(
                username,
                AccountUpdate::RecordLogin {
                    at: now,
                    source: source.map(str::to_string),
                },
            )
            .await?;

        tracing::info!(username = %account.username, source = ?source, "Login succeeded");
        Ok(account)
    }

    /// Record a failed attempt and run it through the lockout tiers
    ///
    /// Runs for every failure, including rejections while locked. A fired
    /// tier only ever moves `lock_until` later; the new expiry is returned
    /// when it did.
    async fn register_failure(
        &self,
        username: &str,
        source: Option<&str>,
        event: SecurityEvent,
    ) -> Result<Option<DateTime<Utc>>> {
        let attempt = self.ledger.record_attempt(username, source, false)?;
        self.audit(event.with_username(username).with_source(source));

        let policy = self.ledger.settings()?.lockout_policy();
        let now = attempt.timestamp;
        let recent = self.ledger.attempts_since(username, now - policy.horizon())?;
        let failures = failures_since_last_success(&recent);

        let decision = match policy.evaluate(now, &failures) {
            Some(decision) => decision,
            None => return Ok(None),
        };

        // Unknown usernames have nothing to lock
        let account = match self.ledger.find_account(username)? {
            Some(account) => account,
            None => return Ok(None),
        };
        if account.lock_until.map_or(false, |current| current >= decision.until) {
            return Ok(None);
        }

        self.ledger
            .update_account(username, AccountUpdate::Lock { until: decision.until })
            .await?;

        tracing::warn!(
            username = %username,
            failures = decision.failures,
            tier = decision.tier,
            until = %decision.until,
            "Account locked"
        );
        self.audit(
            SecurityEvent::new(
                SecurityEventType::UserLocked,
                Severity::High,
                format!(
                    "Locked for {} minutes after {} failed logins",
                    decision.lock_for.num_minutes(),
                    decision.failures
                ),
            )
            .with_username(username)
            .with_source(source),
        );

        Ok(Some(decision.until))
    }
}

/// Failure timestamps after the latest successful attempt (input oldest first)
pub fn failures_since_last_success(attempts: &[LoginAttempt]) -> Vec<DateTime<Utc>> {
    let start = attempts
        .iter()
        .rposition(|attempt| attempt.success)
        .map_or(0, |index| index + 1);

    attempts[start..]
        .iter()
        .filter(|attempt| !attempt.success)
        .map(|attempt| attempt.timestamp)
        .collect()
}
