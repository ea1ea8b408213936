//! Time-based one-time codes (RFC 6238)
//!
//! Secrets are 160-bit random values exchanged as unpadded base32, the form
//! authenticator apps expect. Codes are HMAC-SHA1 truncations over a 30 s
//! step counter. Verification accepts codes from `tolerance_steps` steps
//! either side of the current one and compares in constant time.

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Secret length in bytes
const SECRET_BYTES: usize = 20;

/// OTP errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OtpError {
    #[error("Invalid secret encoding: {0}")]
    InvalidSecret(String),

    #[error("HMAC failure: {0}")]
    Mac(String),
}

pub type Result<T> = std::result::Result<T, OtpError>;

/// Opaque generate/verify capability for one-time codes
pub trait OtpProvider: Send + Sync + fmt::Debug {
    /// Fresh random secret, base32
    fn generate_secret(&self) -> String;

    /// Code valid for the step containing `at`
    fn code_at(&self, secret: &str, at: DateTime<Utc>) -> Result<String>;

    /// True if `code` matches any step within `tolerance_steps` of `at`
    fn verify(&self, secret: &str, code: &str, at: DateTime<Utc>, tolerance_steps: u32) -> bool;

    /// `otpauth://` URI for enrolling the secret in an authenticator app.
    /// `account` and `issuer` must already be URI-safe.
    fn provisioning_uri(&self, secret: &str, account: &str, issuer: &str) -> String;
}

/// TOTP parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpConfig {
    /// Code length
    pub digits: u32,

    /// Step length (seconds)
    pub step_seconds: u64,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            digits: 6,
            step_seconds: 30,
        }
    }
}

/// RFC 6238 TOTP provider
#[derive(Debug, Clone, Default)]
pub struct TotpProvider {
    config: TotpConfig,
}

impl TotpProvider {
    /// Provider with explicit parameters
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    fn decode_secret(secret: &str) -> Result<Vec<u8>> {
        let normalized: String = secret
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        BASE32_NOPAD
            .decode(normalized.as_bytes())
            .map_err(|e| OtpError::InvalidSecret(e.to_string()))
    }

    fn counter_at(&self, at: DateTime<Utc>) -> u64 {
        at.timestamp().max(0) as u64 / self.config.step_seconds
    }

    fn hotp(&self, key: &[u8], counter: u64) -> Result<String> {
        let mut mac = HmacSha1::new_from_slice(key).map_err(|e| OtpError::Mac(e.to_string()))?;
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        // Dynamic truncation
        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = (u32::from(digest[offset] & 0x7f) << 24)
            | (u32::from(digest[offset + 1]) << 16)
            | (u32::from(digest[offset + 2]) << 8)
            | u32::from(digest[offset + 3]);

        let code = binary % 10u32.pow(self.config.digits);
        Ok(format!("{:0width$}", code, width = self.config.digits as usize))
    }
}

impl OtpProvider for TotpProvider {
    fn generate_secret(&self) -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE32_NOPAD.encode(&bytes)
    }

    fn code_at(&self, secret: &str, at: DateTime<Utc>) -> Result<String> {
        let key = Self::decode_secret(secret)?;
        self.hotp(&key, self.counter_at(at))
    }

    fn verify(&self, secret: &str, code: &str, at: DateTime<Utc>, tolerance_steps: u32) -> bool {
        let code = code.trim();
        if code.len() != self.config.digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let key = match Self::decode_secret(secret) {
            Ok(key) => key,
            Err(_) => return false,
        };

        let current = self.counter_at(at);
        let first = current.saturating_sub(u64::from(tolerance_steps));
        let last = current.saturating_add(u64::from(tolerance_steps));

        let mut matched = false;
        for counter in first..=last {
            match self.hotp(&key, counter) {
                Ok(expected) => {
                    matched |= bool::from(expected.as_bytes().ct_eq(code.as_bytes()));
                }
                Err(_) => return false,
            }
        }
        matched
    }

    fn provisioning_uri(&self, secret: &str, account: &str, issuer: &str) -> String {
        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={}&period={}",
            self.config.digits, self.config.step_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// RFC 6238 appendix B seed ("12345678901234567890") in base32
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_rfc6238_vectors() {
        let provider = TotpProvider::new(TotpConfig {
            digits: 8,
            step_seconds: 30,
        });

        assert_eq!(provider.code_at(RFC_SECRET, at(59)).unwrap(), "94287082");
        assert_eq!(provider.code_at(RFC_SECRET, at(1111111109)).unwrap(), "07081804");
        assert_eq!(provider.code_at(RFC_SECRET, at(1234567890)).unwrap(), "89005924");
        assert_eq!(provider.code_at(RFC_SECRET, at(2000000000)).unwrap(), "69279037");
    }

    #[test]
    fn test_generated_secret_decodes() {
        let provider = TotpProvider::default();
        let secret = provider.generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(provider.code_at(&secret, Utc::now()).is_ok());
    }

    #[test]
    fn test_tolerance_window() {
        let provider = TotpProvider::default();
        let secret = provider.generate_secret();
        let now = at(1_700_000_010);
        let code = provider.code_at(&secret, now).unwrap();

        // One step either side is accepted
        assert!(provider.verify(&secret, &code, now, 1));
        assert!(provider.verify(&secret, &code, now + Duration::seconds(30), 1));
        assert!(provider.verify(&secret, &code, now - Duration::seconds(30), 1));

        // Two steps away is not
        assert!(!provider.verify(&secret, &code, now + Duration::seconds(60), 1));
        assert!(!provider.verify(&secret, &code, now - Duration::seconds(60), 1));

        // Zero tolerance only accepts the current step
        assert!(!provider.verify(&secret, &code, now + Duration::seconds(30), 0));
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let provider = TotpProvider::default();
        let secret = provider.generate_secret();
        let now = Utc::now();

        assert!(!provider.verify(&secret, "", now, 1));
        assert!(!provider.verify(&secret, "12345", now, 1));
        assert!(!provider.verify(&secret, "abcdef", now, 1));
        assert!(!provider.verify("not base32!", "123456", now, 1));
    }

    #[test]
    fn test_lowercase_secret_accepted() {
        let provider = TotpProvider::default();
        let secret = provider.generate_secret();
        let now = Utc::now();
        let code = provider.code_at(&secret, now).unwrap();
        assert!(provider.verify(&secret.to_lowercase(), &code, now, 1));
    }

    #[test]
    fn test_provisioning_uri() {
        let uri = TotpProvider::default().provisioning_uri("ABC", "alice", "SimpleBank");
        assert!(uri.starts_with("otpauth://totp/SimpleBank:alice?secret=ABC"));
        assert!(uri.contains("period=30"));
    }
}
