//! Security Module for the SimpleBank ledger
//!
//! Provides the security capabilities the account service is built on:
//! - Password hashing (Argon2id behind the `PasswordHasher` trait)
//! - Bearer credentials (HS256 JWT behind the `TokenSigner` trait)
//! - Time-based one-time codes (RFC 6238 behind the `OtpProvider` trait)
//! - Brute-force lockout tiers
//! - Role-based access levels
//! - Security audit trail with tamper detection
//! - Input sanitization and validation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Security Layer                      │
//! ├─────────────────────────────────────────────────────┤
//! │  Password  │  Token  │  OTP  │  Clock               │
//! │  Lockout   │  RBAC   │  Audit Log │ Sanitizer       │
//! └─────────────────────────────────────────────────────┘
//!                          ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Application Services                    │
//! │        Banking Service  │  Ledger Core              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! ## Credential Verification (`password`, `token`, `otp`)
//! - Opaque traits; the service never depends on a concrete algorithm
//! - Constant-time OTP comparison
//! - Token expiry checked against an injected [`Clock`]
//!
//! ## Lockout (`lockout`)
//! - Three escalating (window, threshold, duration) tiers
//! - Lock state derived lazily from a stored expiry
//!
//! ## Audit Logging (`audit_log`)
//! - Hash-chained records
//! - Tamper detection
//!
//! ## Input Sanitization (`input_sanitizer`)
//! - Username and password policy
//! - Amount validation with exact decimals
//! - Account number normalization
//!
//! # Usage Examples
//!
//! ## Lockout
//!
//! ```rust
//! use security::lockout::LockoutPolicy;
//! use chrono::{Duration, Utc};
//!
//! let policy = LockoutPolicy::default();
//! let now = Utc::now();
//! let failures: Vec<_> = (0..5).map(|i| now - Duration::seconds(i)).collect();
//!
//! let decision = policy.evaluate(now, &failures).unwrap();
//! assert_eq!(decision.until, now + Duration::minutes(5));
//! ```
//!
//! ## One-time codes
//!
//! ```rust
//! use security::otp::{OtpProvider, TotpProvider};
//! use chrono::Utc;
//!
//! let totp = TotpProvider::default();
//! let secret = totp.generate_secret();
//! let code = totp.code_at(&secret, Utc::now()).unwrap();
//! assert!(totp.verify(&secret, &code, Utc::now(), 1));
//! ```
//!
//! ## Input Sanitization
//!
//! ```rust
//! use security::input_sanitizer::InputSanitizer;
//! use rust_decimal::Decimal;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sanitizer = InputSanitizer::new()?;
//!
//! let username = sanitizer.sanitize_username("alice")?;
//! sanitizer.check_password_complexity("Str0ng!pass")?;
//! let amount = sanitizer.sanitize_amount(Decimal::new(10000, 2))?; // $100.00
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod audit_log;
pub mod clock;
pub mod input_sanitizer;
pub mod lockout;
pub mod otp;
pub mod password;
pub mod rbac;
pub mod token;

// Re-exports for convenience
pub use audit_log::{AuditRecord, SecurityEvent, SecurityEventType, Severity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use input_sanitizer::InputSanitizer;
pub use lockout::{LockDecision, LockState, LockoutPolicy};
pub use otp::{OtpProvider, TotpProvider};
pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use rbac::Role;
pub use token::{Claims, JwtTokenSigner, TokenSigner};
