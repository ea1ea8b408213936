//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One writer task owns every account mutation, so read-modify-write
//!   cycles never interleave
//! - Each request is staged into [`PendingWrites`] and committed as one
//!   RocksDB `WriteBatch`
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              Request tasks (many)                     │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │      Sends messages, bounded by request timeout      │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  read current state → validate → stage writes        │
//! │                       │                               │
//! │                       ▼                               │
//! │   claim request (unless abandoned) → Storage::commit()│
//! │     (atomic WriteBatch, retried on Busy/TryAgain)     │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::config::WriterConfig;
use crate::metrics::Metrics;
use crate::storage::PendingWrites;
use crate::types::{
    derive_account_number, Account, AccountUpdate, NewAccount, ResetReport, Transaction,
    TransactionKind, TransferReceipt,
};
use crate::{Error, Result, Storage};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use security::input_sanitizer::normalize_account_number;
use security::Clock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use uuid::Uuid;

/// Injected failure points, used to exercise atomicity
#[cfg(any(test, feature = "fault-injection"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Fail a transfer after the debit leg is staged
    AfterTransferDebit,

    /// Fail the next operation right before its commit
    BeforeCommit,

    /// Hold the writer before it claims the next request (milliseconds)
    StallWriter(u64),

    /// Sleep inside the next commit, after the request is claimed (milliseconds)
    DelayCommit(u64),
}

const REPLY_PENDING: u8 = 0;
const REPLY_CLAIMED: u8 = 1;
const REPLY_ABANDONED: u8 = 2;

/// Answer slot for one request
///
/// The writer claims the slot before committing and a timed-out caller
/// abandons it. Whichever happens first decides whether the work may commit,
/// so a caller that reports failure never sees its writes land later.
#[derive(Debug)]
pub struct Reply<T> {
    sender: oneshot::Sender<Result<T>>,
    state: Arc<AtomicU8>,
}

impl<T> Reply<T> {
    fn channel() -> (Self, Arc<AtomicU8>, oneshot::Receiver<Result<T>>) {
        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(AtomicU8::new(REPLY_PENDING));
        let reply = Self {
            sender,
            state: state.clone(),
        };
        (reply, state, receiver)
    }

    /// Take ownership of the commit; false when the caller already gave up
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(REPLY_PENDING, REPLY_CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn send(self, result: Result<T>) {
        let _ = self.sender.send(result);
    }
}

/// Give up on a request; false when the writer has already claimed it
fn abandon(state: &AtomicU8) -> bool {
    state
        .compare_exchange(REPLY_PENDING, REPLY_ABANDONED, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Create a new account with a zero balance
    CreateAccount {
        account: NewAccount,
        response: Reply<Account>,
    },

    /// Credit an account
    Deposit {
        username: String,
        amount: Decimal,
        response: Reply<Transaction>,
    },

    /// Debit an account
    Withdraw {
        username: String,
        amount: Decimal,
        response: Reply<Transaction>,
    },

    /// Move funds between two accounts
    Transfer {
        username: String,
        to_account_number: String,
        amount: Decimal,
        response: Reply<TransferReceipt>,
    },

    /// Apply a non-monetary account mutation
    UpdateAccount {
        username: String,
        update: AccountUpdate,
        response: Reply<Account>,
    },

    /// Set or clear the review flag of a transaction
    SetTransactionFlag {
        id: Uuid,
        flagged: bool,
        response: Reply<Transaction>,
    },

    /// Delete all transactions and attempts, zero every balance
    ResetTestData {
        response: Reply<ResetReport>,
    },

    /// Arm a one-shot fault
    #[cfg(any(test, feature = "fault-injection"))]
    ArmFault {
        fault: FaultPoint,
        response: oneshot::Sender<()>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Metrics
    metrics: Metrics,

    /// Commit retries on transient storage statuses
    max_commit_retries: u32,

    /// Last timestamp handed out (keeps transaction time non-decreasing)
    last_timestamp: DateTime<Utc>,

    /// Armed fault, consumed on use
    #[cfg(any(test, feature = "fault-injection"))]
    fault: Option<FaultPoint>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        max_commit_retries: u32,
    ) -> Self {
        Self {
            storage,
            mailbox,
            clock,
            metrics,
            max_commit_retries,
            last_timestamp: DateTime::<Utc>::MIN_UTC,
            #[cfg(any(test, feature = "fault-injection"))]
            fault: None,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!("Ledger writer shutting down");
                break;
            }
            self.handle_message(msg).await;
        }
    }

    /// Handle a single message
    async fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::CreateAccount { account, response } => {
                let staged = self.stage_create_account(account);
                self.complete(staged, response).await;
            }

            LedgerMessage::Deposit {
                username,
                amount,
                response,
            } => {
                let staged = self.stage_balance_change(&username, amount, TransactionKind::Deposit);
                if self.complete(staged, response).await {
                    self.metrics.deposits_total.inc();
                }
            }

            LedgerMessage::Withdraw {
                username,
                amount,
                response,
            } => {
                let staged =
                    self.stage_balance_change(&username, amount, TransactionKind::Withdrawal);
                if self.complete(staged, response).await {
                    self.metrics.withdrawals_total.inc();
                }
            }

            LedgerMessage::Transfer {
                username,
                to_account_number,
                amount,
                response,
            } => {
                let staged = self.stage_transfer(&username, &to_account_number, amount);
                if self.complete(staged, response).await {
                    self.metrics.transfers_total.inc();
                }
            }

            LedgerMessage::UpdateAccount {
                username,
                update,
                response,
            } => {
                let staged = self.stage_update(&username, update);
                self.complete(staged, response).await;
            }

            LedgerMessage::SetTransactionFlag {
                id,
                flagged,
                response,
            } => {
                let staged = self.stage_flag(id, flagged);
                self.complete(staged, response).await;
            }

            LedgerMessage::ResetTestData { response } => {
                let mut writes = PendingWrites::new();
                let staged = self
                    .storage
                    .stage_reset(&mut writes)
                    .map(|report| (writes, report));
                self.complete(staged, response).await;
            }

            #[cfg(any(test, feature = "fault-injection"))]
            LedgerMessage::ArmFault { fault, response } => {
                tracing::warn!(?fault, "Fault armed");
                self.fault = Some(fault);
                let _ = response.send(());
            }

            LedgerMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }

    /// Commit staged writes and answer the caller; true when committed
    async fn complete<T>(
        &mut self,
        staged: Result<(PendingWrites, T)>,
        response: Reply<T>,
    ) -> bool {
        let (writes, output) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                if !e.is_internal() {
                    self.metrics.record_rejected();
                }
                response.send(Err(e));
                return false;
            }
        };

        #[cfg(any(test, feature = "fault-injection"))]
        if let Some(FaultPoint::StallWriter(ms)) = self.fault {
            self.fault = None;
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        // Caller timed out first: nothing may become visible
        if !response.claim() {
            tracing::debug!(ops = writes.len(), "Request abandoned, dropping staged writes");
            return false;
        }

        #[cfg(any(test, feature = "fault-injection"))]
        if self.take_fault(FaultPoint::BeforeCommit) {
            response.send(Err(Error::LedgerFailure(
                "Injected fault before commit".to_string(),
            )));
            return false;
        }

        // Claimed: the caller waits for this outcome even past its timeout
        let result = self.commit(&writes).await.map(|_| output);
        let committed = result.is_ok();
        response.send(result);
        committed
    }

    /// Commit with bounded retries on transient statuses
    async fn commit(&mut self, writes: &PendingWrites) -> Result<()> {
        let started = Instant::now();
        let mut retries = 0u32;

        #[cfg(any(test, feature = "fault-injection"))]
        if let Some(FaultPoint::DelayCommit(ms)) = self.fault {
            self.fault = None;
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        loop {
            match self.storage.commit(writes) {
                Ok(()) => {
                    self.metrics
                        .record_commit_duration(started.elapsed().as_secs_f64());
                    tracing::debug!(ops = writes.len(), retries, "Committed write batch");
                    return Ok(());
                }
                Err(Error::Busy(msg)) if retries < self.max_commit_retries => {
                    retries += 1;
                    self.metrics.record_retry();
                    tracing::warn!(retries, error = %msg, "Storage busy, retrying commit");
                    tokio::time::sleep(Duration::from_millis(5 << retries)).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, retries, "Commit failed");
                    return Err(Error::LedgerFailure(format!("Commit failed: {}", e)));
                }
            }
        }
    }

    #[cfg(any(test, feature = "fault-injection"))]
    fn take_fault(&mut self, point: FaultPoint) -> bool {
        if self.fault == Some(point) {
            self.fault = None;
            true
        } else {
            false
        }
    }

    /// Non-decreasing commit timestamp
    fn now(&mut self) -> DateTime<Utc> {
        let now = self.clock.now().max(self.last_timestamp);
        self.last_timestamp = now;
        now
    }

    fn load_account(&self, username: &str) -> Result<Account> {
        self.storage
            .get_account(username)?
            .ok_or_else(|| Error::AccountNotFound(username.to_string()))
    }

    fn stage_create_account(&mut self, new: NewAccount) -> Result<(PendingWrites, Account)> {
        if self.storage.get_account(&new.username)?.is_some() {
            return Err(Error::AccountExists(new.username));
        }

        let account_number = derive_account_number(&new.username);
        if self.storage.username_for_number(&account_number)?.is_some() {
            return Err(Error::LedgerFailure(format!(
                "Account number collision for {}",
                new.username
            )));
        }

        let account = Account {
            username: new.username,
            account_number,
            balance: Decimal::new(0, 2),
            password_hash: new.password_hash,
            totp_secret: None,
            lock_until: None,
            role: new.role,
            created_at: self.now(),
            last_login: None,
            last_login_source: None,
        };

        let mut writes = PendingWrites::new();
        writes.put_account(&account)?;
        writes.put_account_number(&account);

        tracing::info!(
            username = %account.username,
            account_number = %account.account_number,
            role = %account.role,
            "Account created"
        );

        Ok((writes, account))
    }

    fn stage_balance_change(
        &mut self,
        username: &str,
        amount: Decimal,
        kind: TransactionKind,
    ) -> Result<(PendingWrites, Transaction)> {
        let mut account = self.load_account(username)?;

        let signed = if kind.is_debit() {
            if amount > account.balance {
                return Err(Error::InsufficientFunds {
                    available: account.balance,
                    requested: amount,
                });
            }
            -amount
        } else {
            amount
        };

        account.balance = apply(account.balance, signed)?;

        let description = match kind {
            TransactionKind::Withdrawal => format!("Withdrawal: ${}", amount),
            _ => format!("Deposit: ${}", amount),
        };

        let tx = Transaction {
            id: Uuid::now_v7(),
            seq: self.storage.next_tx_seq(),
            username: account.username.clone(),
            kind,
            amount: signed,
            balance_after: account.balance,
            counterparty: None,
            description,
            timestamp: self.now(),
            flagged: false,
        };

        let mut writes = PendingWrites::new();
        writes.put_account(&account)?;
        writes.put_transaction(&tx)?;

        Ok((writes, tx))
    }

    fn stage_transfer(
        &mut self,
        username: &str,
        to_account_number: &str,
        amount: Decimal,
    ) -> Result<(PendingWrites, TransferReceipt)> {
        let mut sender = self.load_account(username)?;

        if sender.normalized_number() == normalize_account_number(to_account_number) {
            return Err(Error::SelfTransfer);
        }

        let recipient_name = self
            .storage
            .username_for_number(to_account_number)?
            .ok_or_else(|| Error::RecipientNotFound(to_account_number.to_string()))?;

        let mut recipient = self.storage.get_account(&recipient_name)?.ok_or_else(|| {
            Error::LedgerFailure(format!("Index points at missing account {}", recipient_name))
        })?;

        if amount > sender.balance {
            return Err(Error::InsufficientFunds {
                available: sender.balance,
                requested: amount,
            });
        }

        let timestamp = self.now();
        let mut writes = PendingWrites::new();

        // Debit leg
        sender.balance = apply(sender.balance, -amount)?;
        let sent = Transaction {
            id: Uuid::now_v7(),
            seq: self.storage.next_tx_seq(),
            username: sender.username.clone(),
            kind: TransactionKind::TransferSent,
            amount: -amount,
            balance_after: sender.balance,
            counterparty: Some(recipient.account_number.clone()),
            description: format!("Transfer to {}", recipient.account_number),
            timestamp,
            flagged: false,
        };
        writes.put_account(&sender)?;
        writes.put_transaction(&sent)?;

        #[cfg(any(test, feature = "fault-injection"))]
        if self.take_fault(FaultPoint::AfterTransferDebit) {
            return Err(Error::LedgerFailure(
                "Injected fault between transfer legs".to_string(),
            ));
        }

        // Credit leg
        recipient.balance = apply(recipient.balance, amount)?;
        let received = Transaction {
            id: Uuid::now_v7(),
            seq: self.storage.next_tx_seq(),
            username: recipient.username.clone(),
            kind: TransactionKind::TransferReceived,
            amount,
            balance_after: recipient.balance,
            counterparty: Some(sender.account_number.clone()),
            description: format!("Transfer from {}", sender.account_number),
            timestamp,
            flagged: false,
        };
        writes.put_account(&recipient)?;
        writes.put_transaction(&received)?;

        Ok((writes, TransferReceipt { sent, received }))
    }

    fn stage_update(
        &mut self,
        username: &str,
        update: AccountUpdate,
    ) -> Result<(PendingWrites, Account)> {
        let mut account = self.load_account(username)?;

        match update {
            AccountUpdate::EnableTwoFactor { secret } => {
                if account.two_factor_enabled() {
                    return Err(Error::TwoFactorAlreadyEnabled);
                }
                account.totp_secret = Some(secret);
            }
            AccountUpdate::DisableTwoFactor => {
                if !account.two_factor_enabled() {
                    return Err(Error::TwoFactorNotEnabled);
                }
                account.totp_secret = None;
            }
            AccountUpdate::Lock { until } => account.lock_until = Some(until),
            AccountUpdate::Unlock => account.lock_until = None,
            AccountUpdate::SetPasswordHash { hash } => account.password_hash = hash,
            AccountUpdate::RecordLogin { at, source } => {
                account.last_login = Some(at);
                account.last_login_source = source;
                account.lock_until = None;
            }
        }

        let mut writes = PendingWrites::new();
        writes.put_account(&account)?;
        Ok((writes, account))
    }

    fn stage_flag(&mut self, id: Uuid, flagged: bool) -> Result<(PendingWrites, Transaction)> {
        let mut tx = self
            .storage
            .get_transaction(id)?
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))?;

        tx.flagged = flagged;

        let mut writes = PendingWrites::new();
        writes.put_transaction(&tx)?;
        Ok((writes, tx))
    }
}

fn apply(balance: Decimal, delta: Decimal) -> Result<Decimal> {
    let mut next = balance
        .checked_add(delta)
        .ok_or_else(|| Error::LedgerFailure("Balance overflow".to_string()))?;
    next.rescale(2);
    Ok(next)
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
    request_timeout: Duration,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>, request_timeout: Duration) -> Self {
        Self {
            sender,
            request_timeout,
        }
    }

    /// Send one request and wait for its answer, bounded by the request timeout
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (reply, state, mut rx) = Reply::channel();

        let exchange = async {
            self.sender
                .send(build(reply))
                .await
                .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

            (&mut rx)
                .await
                .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
        };
        let outcome = tokio::time::timeout(self.request_timeout, exchange).await;

        match outcome {
            Ok(result) => result,
            Err(_) if abandon(&state) => Err(Error::LedgerFailure(format!(
                "Request timed out after {} ms",
                self.request_timeout.as_millis()
            ))),
            // The writer claimed the request in time; its outcome stands
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Commit outlived request timeout, awaiting outcome"
                );
                rx.await
                    .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
            }
        }
    }

    /// Create an account
    pub async fn create_account(&self, account: NewAccount) -> Result<Account> {
        self.request(|response| LedgerMessage::CreateAccount { account, response })
            .await
    }

    /// Deposit into an account
    pub async fn deposit(&self, username: String, amount: Decimal) -> Result<Transaction> {
        self.request(|response| LedgerMessage::Deposit {
            username,
            amount,
            response,
        })
        .await
    }

    /// Withdraw from an account
    pub async fn withdraw(&self, username: String, amount: Decimal) -> Result<Transaction> {
        self.request(|response| LedgerMessage::Withdraw {
            username,
            amount,
            response,
        })
        .await
    }

    /// Transfer to another account by number
    pub async fn transfer(
        &self,
        username: String,
        to_account_number: String,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        self.request(|response| LedgerMessage::Transfer {
            username,
            to_account_number,
            amount,
            response,
        })
        .await
    }

    /// Apply an account update
    pub async fn update_account(&self, username: String, update: AccountUpdate) -> Result<Account> {
        self.request(|response| LedgerMessage::UpdateAccount {
            username,
            update,
            response,
        })
        .await
    }

    /// Flag or unflag a transaction
    pub async fn set_transaction_flag(&self, id: Uuid, flagged: bool) -> Result<Transaction> {
        self.request(|response| LedgerMessage::SetTransactionFlag {
            id,
            flagged,
            response,
        })
        .await
    }

    /// Wipe transactions and attempts
    pub async fn reset_test_data(&self) -> Result<ResetReport> {
        self.request(|response| LedgerMessage::ResetTestData { response })
            .await
    }

    /// Arm a one-shot fault
    #[cfg(any(test, feature = "fault-injection"))]
    pub async fn arm_fault(&self, fault: FaultPoint) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::ArmFault { fault, response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    config: &WriterConfig,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1)); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, clock, metrics, config.max_commit_retries);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx, Duration::from_millis(config.request_timeout_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use security::{Role, SystemClock};

    fn spawn_test_actor(temp_dir: &tempfile::TempDir) -> (LedgerHandle, Arc<Storage>) {
        let config = Config::with_data_dir(temp_dir.path());
        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_ledger_actor(
            storage.clone(),
            Arc::new(SystemClock),
            Metrics::new().unwrap(),
            &config.writer,
        );
        (handle, storage)
    }

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (handle, _storage) = spawn_test_actor(&temp_dir);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_deposit_and_withdraw() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (handle, storage) = spawn_test_actor(&temp_dir);

        handle.create_account(new_account("alice")).await.unwrap();

        let tx = handle
            .deposit("alice".to_string(), Decimal::new(10000, 2))
            .await
            .unwrap();
        assert_eq!(tx.balance_after, Decimal::new(10000, 2));
        assert_eq!(tx.description, "Deposit: $100.00");

        let err = handle
            .withdraw("alice".to_string(), Decimal::new(10001, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));

        let tx = handle
            .withdraw("alice".to_string(), Decimal::new(2550, 2))
            .await
            .unwrap();
        assert_eq!(tx.amount, Decimal::new(-2550, 2));

        let account = storage.get_account("alice").unwrap().unwrap();
        assert_eq!(account.balance, Decimal::new(7450, 2));
        assert_eq!(storage.account_transactions("alice", 10).unwrap().len(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_account() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (handle, _storage) = spawn_test_actor(&temp_dir);

        handle.create_account(new_account("alice")).await.unwrap();
        let err = handle.create_account(new_account("alice")).await.unwrap_err();
        assert!(matches!(err, Error::AccountExists(_)));
    }

    #[tokio::test]
    async fn test_two_factor_updates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (handle, _storage) = spawn_test_actor(&temp_dir);
        handle.create_account(new_account("alice")).await.unwrap();

        let enable = AccountUpdate::EnableTwoFactor {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
        };
        let account = handle
            .update_account("alice".to_string(), enable.clone())
            .await
            .unwrap();
        assert!(account.two_factor_enabled());

        let err = handle
            .update_account("alice".to_string(), enable)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TwoFactorAlreadyEnabled));

        handle
            .update_account("alice".to_string(), AccountUpdate::DisableTwoFactor)
            .await
            .unwrap();
        let err = handle
            .update_account("alice".to_string(), AccountUpdate::DisableTwoFactor)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TwoFactorNotEnabled));
    }

    fn spawn_with_timeout(
        temp_dir: &tempfile::TempDir,
        timeout_ms: u64,
    ) -> (LedgerHandle, Arc<Storage>) {
        let mut config = Config::with_data_dir(temp_dir.path());
        config.writer.request_timeout_ms = timeout_ms;
        config.rocksdb.sync_writes = false;

        let storage = Arc::new(Storage::open(&config).unwrap());
        let handle = spawn_ledger_actor(
            storage.clone(),
            Arc::new(SystemClock),
            Metrics::new().unwrap(),
            &config.writer,
        );
        (handle, storage)
    }

    #[tokio::test]
    async fn test_timed_out_request_is_not_committed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (handle, storage) = spawn_with_timeout(&temp_dir, 50);

        handle.create_account(new_account("alice")).await.unwrap();
        handle.arm_fault(FaultPoint::StallWriter(200)).await.unwrap();

        let err = handle
            .deposit("alice".to_string(), Decimal::new(500, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LedgerFailure(_)));

        // Let the writer reach the claim and drop the work
        tokio::time::sleep(Duration::from_millis(300)).await;

        let account = storage.get_account("alice").unwrap().unwrap();
        assert!(account.balance.is_zero());
        assert!(storage.account_transactions("alice", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_commit_reports_its_outcome() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (handle, storage) = spawn_with_timeout(&temp_dir, 50);

        handle.create_account(new_account("alice")).await.unwrap();
        handle.arm_fault(FaultPoint::DelayCommit(200)).await.unwrap();

        // Claimed before the timeout, so the caller waits for the commit
        let result = handle
            .deposit("alice".to_string(), Decimal::new(500, 2))
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let account = storage.get_account("alice").unwrap().unwrap();
        match result {
            Ok(tx) => assert_eq!(account.balance, tx.balance_after),
            Err(e) => panic!("claimed commit reported {:?}", e),
        }
        assert_eq!(account.balance, Decimal::new(500, 2));
        assert_eq!(storage.account_transactions("alice", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_never_commits_later() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (handle, storage) = spawn_with_timeout(&temp_dir, 20);
        handle.create_account(new_account("alice")).await.unwrap();

        let mut expected = Decimal::ZERO;
        for delay in [0, 10, 19, 20, 21, 40] {
            handle.arm_fault(FaultPoint::StallWriter(delay)).await.unwrap();
            match handle.deposit("alice".to_string(), Decimal::ONE).await {
                Ok(_) => expected += Decimal::ONE,
                Err(e) => assert!(matches!(e, Error::LedgerFailure(_)), "{:?}", e),
            }

            tokio::time::sleep(Duration::from_millis(60)).await;
            let account = storage.get_account("alice").unwrap().unwrap();
            assert_eq!(account.balance, expected, "stall {} ms", delay);
        }
    }
}
