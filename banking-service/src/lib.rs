//! Banking Service
//!
//! Account service with password + OTP authentication on top of
//! [`ledger_core`].
//!
//! # Components
//!
//! - **Service** (`service`): account creation, balances, deposits,
//!   withdrawals and transfers for an authorized [`Identity`]
//! - **Auth** (`auth`): login pipeline with tiered brute-force lockout,
//!   bearer credential issue and verification
//! - **Two-Factor** (`two_factor`): enrollment with an ephemeral pending
//!   secret
//! - **Admin** (`admin`): role-gated oversight and mutations, each one
//!   recorded in the security log
//! - **API** (`api`): serde request/response contracts and a dispatcher
//!   for transport adapters
//!
//! Credential primitives (password hashing, token signing, one-time codes)
//! are the traits in [`security`]; [`Primitives`] picks the implementations.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod service;
pub mod two_factor;

pub use admin::{UserDetail, UserSummary};
pub use api::{dispatch, ApiRequest, ApiResponse};
pub use auth::{Identity, IssuedToken};
pub use config::{AdminConfig, AuthConfig, BootstrapAdmin, ServiceConfig};
pub use error::{Result, ServiceError};
pub use service::{AccountDirectoryEntry, BankingService, Primitives};
pub use two_factor::Enrollment;
