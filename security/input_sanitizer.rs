//! Input Sanitization and Validation
//!
//! Validation for everything a caller can type:
//! - Usernames (length and character set)
//! - Password complexity
//! - Monetary amounts (positive, at most 2 decimal places)
//! - Account numbers (separator and case normalization)
//! - Free text (control characters, length)
//!
//! Also generates temporary passwords that satisfy the complexity policy.

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

/// Special characters accepted by the complexity policy
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*()-_=+[]{}|;:'\",.<>?/`~";

/// Minimum password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum password length
pub const MAX_PASSWORD_LEN: usize = 128;

/// Username length bounds
pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;

/// Longest request source (address and port) kept in the logs
pub const MAX_SOURCE_LEN: usize = 64;

/// Sanitization errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SanitizationError {
    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Input too long: max {max}, got {actual}")]
    TooLong { max: usize, actual: usize },

    #[error("Input too short: min {min}, got {actual}")]
    TooShort { min: usize, actual: usize },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Forbidden character: {0:?}")]
    ForbiddenCharacter(char),

    #[error("Password must be at least 8 characters with uppercase, lowercase, number, and special character")]
    WeakPassword,

    #[error("Invalid pattern: {0}")]
    Pattern(String),
}

pub type Result<T> = std::result::Result<T, SanitizationError>;

/// Input sanitizer
#[derive(Debug, Clone)]
pub struct InputSanitizer {
    /// Regex for usernames
    username_regex: Regex,

    /// One regex per required password character class
    password_classes: Vec<Regex>,
}

impl InputSanitizer {
    /// Create new input sanitizer
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|e| SanitizationError::Pattern(e.to_string()));

        let username_regex = compile(r"^[A-Za-z0-9_.\-]+$")?;
        let password_classes = vec![
            compile(r"[a-z]")?,
            compile(r"[A-Z]")?,
            compile(r"[0-9]")?,
            compile(&format!("[{}]", regex::escape(PASSWORD_SPECIALS)))?,
        ];

        Ok(Self {
            username_regex,
            password_classes,
        })
    }

    /// Validate a username (trimmed, case preserved)
    pub fn sanitize_username(&self, username: &str) -> Result<String> {
        let username = username.trim();
        let len = username.chars().count();

        if len < MIN_USERNAME_LEN {
            return Err(SanitizationError::TooShort {
                min: MIN_USERNAME_LEN,
                actual: len,
            });
        }

        if len > MAX_USERNAME_LEN {
            return Err(SanitizationError::TooLong {
                max: MAX_USERNAME_LEN,
                actual: len,
            });
        }

        if !self.username_regex.is_match(username) {
            return Err(SanitizationError::InvalidFormat(
                "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
            ));
        }

        Ok(username.to_string())
    }

    /// Check a new password against the complexity policy
    pub fn check_password_complexity(&self, password: &str) -> Result<()> {
        let len = password.chars().count();

        if len > MAX_PASSWORD_LEN {
            return Err(SanitizationError::TooLong {
                max: MAX_PASSWORD_LEN,
                actual: len,
            });
        }

        if len < MIN_PASSWORD_LEN || !self.password_classes.iter().all(|class| class.is_match(password)) {
            return Err(SanitizationError::WeakPassword);
        }

        Ok(())
    }

    /// Validate a monetary amount
    pub fn sanitize_amount(&self, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(SanitizationError::Invalid(
                "Amount must be positive".to_string(),
            ));
        }

        // Trailing zeros do not count as precision
        let amount = amount.normalize();
        if amount.scale() > 2 {
            return Err(SanitizationError::InvalidFormat(
                "Amount cannot have more than 2 decimal places".to_string(),
            ));
        }

        let mut amount = amount;
        amount.rescale(2);
        Ok(amount)
    }

    /// Sanitize free text (no control characters, bounded length)
    pub fn sanitize_text(&self, input: &str, max_length: usize) -> Result<String> {
        let input = input.trim();
        let len = input.chars().count();

        if len > max_length {
            return Err(SanitizationError::TooLong {
                max: max_length,
                actual: len,
            });
        }

        if let Some(ch) = input.chars().find(|c| c.is_control()) {
            return Err(SanitizationError::ForbiddenCharacter(ch));
        }

        Ok(input.to_string())
    }
}

/// Strip separators and upper-case an account number for comparison
pub fn normalize_account_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Random password of `len` characters that passes the complexity policy
pub fn generate_temporary_password(len: usize) -> String {
    const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const DIGITS: &[u8] = b"23456789";
    const SPECIALS: &[u8] = b"!@#$%^&*-_=+";

    let len = len.max(MIN_PASSWORD_LEN);
    let mut rng = rand::thread_rng();
    let pick = |rng: &mut rand::rngs::ThreadRng, set: &[u8]| set[rng.gen_range(0..set.len())];

    // One from each class, the rest from the union
    let mut bytes = vec![
        pick(&mut rng, LOWER),
        pick(&mut rng, UPPER),
        pick(&mut rng, DIGITS),
        pick(&mut rng, SPECIALS),
    ];
    let all: Vec<u8> = [LOWER, UPPER, DIGITS, SPECIALS].concat();
    while bytes.len() < len {
        bytes.push(pick(&mut rng, &all));
    }
    bytes.shuffle(&mut rng);

    bytes.into_iter().map(char::from).collect()
}
