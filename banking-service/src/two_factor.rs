//! Two-factor enrollment
//!
//! `Disabled → PendingSecret → Enabled`, and `Enabled → Disabled`.
//!
//! The pending secret is never stored. [`BankingService::begin_enrollment`]
//! hands it to the caller, who must send it back with a valid code to
//! [`BankingService::confirm_enrollment`]. An abandoned enrollment leaves no
//! state behind.

use crate::auth::Identity;
use crate::error::{Result, ServiceError};
use crate::service::BankingService;
use ledger_core::AccountUpdate;
use security::{SecurityEvent, SecurityEventType, Severity};
use serde::{Deserialize, Serialize};

/// Fresh secret for the caller to load into an authenticator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Base32 secret (160 bits)
    pub secret: String,

    /// `otpauth://` URI for QR rendering
    pub provisioning_uri: String,
}

impl BankingService {
    /// Generate a pending secret; nothing is persisted
    pub fn begin_enrollment(&self, identity: &Identity) -> Result<Enrollment> {
        let account = self.ledger.account(identity.username())?;
        if account.two_factor_enabled() {
            return Err(ServiceError::AlreadyEnabled);
        }

        let secret = self.otp.generate_secret();
        let provisioning_uri =
            self.otp
                .provisioning_uri(&secret, &account.username, &self.config.auth.issuer);

        Ok(Enrollment {
            secret,
            provisioning_uri,
        })
    }

    /// Persist `secret` once `code` proves the authenticator has it
    pub async fn confirm_enrollment(&self, identity: &Identity, secret: &str, code: &str) -> Result<()> {
        let account = self.ledger.account(identity.username())?;
        if account.two_factor_enabled() {
            return Err(ServiceError::AlreadyEnabled);
        }

        let secret = secret.trim();
        if !self.verify_code(secret, code) {
            return Err(ServiceError::InvalidOtp);
        }

        // The writer rejects the update if a secret appeared meanwhile
        self.ledger
            .update_account(
                identity.username(),
                AccountUpdate::EnableTwoFactor {
                    secret: secret.to_string(),
                },
            )
            .await?;

        tracing::info!(username = %identity.username(), "Two-factor enabled");
        self.audit(
            SecurityEvent::new(
                SecurityEventType::TwoFactorEnabled,
                Severity::Info,
                "Two-factor authentication enabled",
            )
            .with_username(identity.username()),
        );
        Ok(())
    }

    /// Clear the secret after checking a code against it
    pub async fn disable_two_factor(&self, identity: &Identity, code: &str) -> Result<()> {
        let account = self.ledger.account(identity.username())?;
        let secret = account.totp_secret.ok_or(ServiceError::NotEnabled)?;

        if !self.verify_code(&secret, code) {
            return Err(ServiceError::InvalidOtp);
        }

        self.ledger
            .update_account(identity.username(), AccountUpdate::DisableTwoFactor)
            .await?;

        tracing::info!(username = %identity.username(), "Two-factor disabled");
        self.audit(
            SecurityEvent::new(
                SecurityEventType::TwoFactorDisabled,
                Severity::Medium,
                "Two-factor authentication disabled",
            )
            .with_username(identity.username()),
        );
        Ok(())
    }

    /// Whether a secret is enrolled
    pub fn two_factor_status(&self, identity: &Identity) -> Result<bool> {
        Ok(self.ledger.account(identity.username())?.two_factor_enabled())
    }

    fn verify_code(&self, secret: &str, code: &str) -> bool {
        self.otp.verify(
            secret,
            code,
            self.ledger.now(),
            self.config.auth.otp_tolerance_steps,
        )
    }
}
