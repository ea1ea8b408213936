//! Ledger Core
//!
//! Account store and transaction ledger on embedded RocksDB.
//!
//! # Architecture
//!
//! - **Single Writer**: One writer task serializes every account mutation
//! - **Atomic Commits**: Each operation is one RocksDB `WriteBatch`
//! - **Snapshot Reads**: Listings and aggregates read a consistent snapshot
//! - **Hash-Chained Audit**: Security log entries link to their predecessor
//!
//! # Invariants
//!
//! - Balance equals the sum of the account's signed transaction amounts
//! - Balances never go negative
//! - Account numbers are derived from the username and never change
//! - Transactions are immutable apart from the review flag
//! - A transfer's two legs become visible together or not at all

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    derive_account_number, Account, AccountUpdate, DashboardStats, LoginAttempt, NewAccount, Page,
    PurgeReport, ResetReport, SecurityLogEntry, SystemSettings, Transaction, TransactionFilter,
    TransactionKind, TransferReceipt,
};
#[cfg(any(test, feature = "fault-injection"))]
pub use actor::FaultPoint;
pub use ledger::{day_start, Ledger, MAX_LIST_LIMIT};
pub use metrics::Metrics;
pub use storage::Storage;
pub use config::Config;
