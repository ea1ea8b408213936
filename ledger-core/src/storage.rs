//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: username)
//! - `transactions` - Transaction log (key: seq, big endian)
//! - `indices` - Secondary indices, tagged by first byte:
//!   - `a` || username || 0x00 || seq -> empty (account history)
//!   - `t` || transaction id -> seq
//!   - `n` || normalized account number -> username
//! - `login_attempts` - Attempt log (key: username || 0x00 || millis || attempt id)
//! - `security_log` - Hash-chained audit records (key: seq, big endian)
//! - `settings` - System settings (single key)
//!
//! Account and transaction mutations are staged in [`PendingWrites`] and
//! committed as one `WriteBatch` by the single writer. The attempt log,
//! security log and settings are written directly.

use crate::{
    error::{Error, Result},
    types::{
        Account, DashboardStats, LoginAttempt, Page, PurgeReport, ResetReport, SecurityLogEntry,
        SystemSettings, Transaction, TransactionFilter, TransactionKind,
    },
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use rust_decimal::Decimal;
use security::input_sanitizer::normalize_account_number;
use security::{AuditRecord, SecurityEvent, Role};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";
const CF_LOGIN_ATTEMPTS: &str = "login_attempts";
const CF_SECURITY_LOG: &str = "security_log";
const CF_SETTINGS: &str = "settings";

/// Index tags
const IDX_ACCOUNT_TX: u8 = b'a';
const IDX_TX_ID: u8 = b't';
const IDX_ACCOUNT_NUMBER: u8 = b'n';

const SETTINGS_KEY: &[u8] = b"system";

/// One staged write
#[derive(Debug, Clone)]
enum WriteOp {
    Put {
        cf: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: &'static str,
        key: Vec<u8>,
    },
}

/// Writes staged for one atomic commit
///
/// Kept as plain data so a commit can be rebuilt into a fresh `WriteBatch`
/// when RocksDB asks for a retry.
#[derive(Debug, Clone, Default)]
pub struct PendingWrites {
    ops: Vec<WriteOp>,
}

impl PendingWrites {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is staged
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Stage an account record
    pub fn put_account(&mut self, account: &Account) -> Result<()> {
        self.ops.push(WriteOp::Put {
            cf: CF_ACCOUNTS,
            key: account.username.as_bytes().to_vec(),
            value: bincode::serialize(account)?,
        });
        Ok(())
    }

    /// Stage the account-number index entry for a new account
    pub fn put_account_number(&mut self, account: &Account) {
        self.ops.push(WriteOp::Put {
            cf: CF_INDICES,
            key: Storage::index_key_account_number(&account.normalized_number()),
            value: account.username.as_bytes().to_vec(),
        });
    }

    /// Stage a transaction with its indices
    pub fn put_transaction(&mut self, tx: &Transaction) -> Result<()> {
        self.ops.push(WriteOp::Put {
            cf: CF_TRANSACTIONS,
            key: tx.seq.to_be_bytes().to_vec(),
            value: bincode::serialize(tx)?,
        });
        self.ops.push(WriteOp::Put {
            cf: CF_INDICES,
            key: Storage::index_key_account_tx(&tx.username, tx.seq),
            value: Vec::new(),
        });
        self.ops.push(WriteOp::Put {
            cf: CF_INDICES,
            key: Storage::index_key_tx_id(tx.id),
            value: tx.seq.to_be_bytes().to_vec(),
        });
        Ok(())
    }

    /// Stage removal of a transaction and its indices
    pub fn delete_transaction(&mut self, tx: &Transaction) {
        self.ops.push(WriteOp::Delete {
            cf: CF_TRANSACTIONS,
            key: tx.seq.to_be_bytes().to_vec(),
        });
        self.ops.push(WriteOp::Delete {
            cf: CF_INDICES,
            key: Storage::index_key_account_tx(&tx.username, tx.seq),
        });
        self.ops.push(WriteOp::Delete {
            cf: CF_INDICES,
            key: Storage::index_key_tx_id(tx.id),
        });
    }

    fn delete_attempt(&mut self, key: Vec<u8>) {
        self.ops.push(WriteOp::Delete {
            cf: CF_LOGIN_ATTEMPTS,
            key,
        });
    }
}

/// Security log tail (next sequence, last hash)
#[derive(Debug)]
struct LogTail {
    next_seq: u64,
    last_hash: String,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    write_opts: WriteOptions,
    next_tx_seq: AtomicU64,
    log_tail: Mutex<LogTail>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("next_tx_seq", &self.next_tx_seq.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_point_lookup()),
            ColumnFamilyDescriptor::new(CF_LOGIN_ATTEMPTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_SECURITY_LOG, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_SETTINGS, Options::default()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(config.rocksdb.sync_writes);

        let mut storage = Self {
            db: Arc::new(db),
            write_opts,
            next_tx_seq: AtomicU64::new(1),
            log_tail: Mutex::new(LogTail {
                next_seq: 1,
                last_hash: String::new(),
            }),
        };
        storage.restore_counters()?;

        tracing::info!(
            path = ?path,
            next_tx_seq = storage.next_tx_seq.load(Ordering::Relaxed),
            "Opened RocksDB"
        );

        Ok(storage)
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_point_lookup() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    /// Reload sequence counters and the log tail from the last keys
    fn restore_counters(&mut self) -> Result<()> {
        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        if let Some(item) = self.db.iterator_cf(cf_tx, IteratorMode::End).next() {
            let (key, _) = item?;
            self.next_tx_seq = AtomicU64::new(decode_seq(&key)? + 1);
        }

        let cf_log = self.cf_handle(CF_SECURITY_LOG)?;
        if let Some(item) = self.db.iterator_cf(cf_log, IteratorMode::End).next() {
            let (key, value) = item?;
            let entry: SecurityLogEntry = bincode::deserialize(&value)?;
            self.log_tail = Mutex::new(LogTail {
                next_seq: decode_seq(&key)? + 1,
                last_hash: entry.hash,
            });
        }

        Ok(())
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Commit

    /// Allocate the next transaction sequence number
    pub fn next_tx_seq(&self) -> u64 {
        self.next_tx_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Commit staged writes as one atomic batch
    pub fn commit(&self, writes: &PendingWrites) -> Result<()> {
        let mut batch = WriteBatch::default();

        for op in &writes.ops {
            match op {
                WriteOp::Put { cf, key, value } => {
                    batch.put_cf(self.cf_handle(cf)?, key, value);
                }
                WriteOp::Delete { cf, key } => {
                    batch.delete_cf(self.cf_handle(cf)?, key);
                }
            }
        }

        self.db.write_opt(batch, &self.write_opts)?;
        Ok(())
    }

    // Account operations

    /// Get account by username
    pub fn get_account(&self, username: &str) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, username.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Resolve an account number (any separators, any case) to a username
    pub fn username_for_number(&self, account_number: &str) -> Result<Option<String>> {
        let normalized = normalize_account_number(account_number);
        if normalized.is_empty() {
            return Ok(None);
        }

        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, Self::index_key_account_number(&normalized))? {
            Some(value) => String::from_utf8(value)
                .map(Some)
                .map_err(|e| Error::Storage(format!("Corrupt account number index: {}", e))),
            None => Ok(None),
        }
    }

    /// All accounts, read from one snapshot
    pub fn all_accounts(&self) -> Result<Vec<Account>> {
        let snapshot = self.db.snapshot();
        let cf = self.cf_handle(CF_ACCOUNTS)?;

        let mut accounts = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            accounts.push(bincode::deserialize(&value)?);
        }

        Ok(accounts)
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let cf_idx = self.cf_handle(CF_INDICES)?;
        let seq = match self.db.get_cf(cf_idx, Self::index_key_tx_id(id))? {
            Some(value) => decode_seq(&value)?,
            None => return Ok(None),
        };

        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf_tx, seq.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Most recent `limit` transactions of an account, newest first
    pub fn account_transactions(&self, username: &str, limit: usize) -> Result<Vec<Transaction>> {
        let snapshot = self.db.snapshot();
        let cf_idx = self.cf_handle(CF_INDICES)?;
        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;

        let prefix = Self::index_prefix_account_tx(username);
        let seek = Self::index_key_account_tx(username, u64::MAX);

        let mut transactions = Vec::new();
        for item in snapshot.iterator_cf(cf_idx, IteratorMode::From(&seek, Direction::Reverse)) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) || transactions.len() >= limit {
                break;
            }

            let seq_bytes = &key[prefix.len()..];
            let value = snapshot.get_cf(cf_tx, seq_bytes)?.ok_or_else(|| {
                Error::Storage(format!("Dangling history index for {}", username))
            })?;
            transactions.push(bincode::deserialize(&value)?);
        }

        Ok(transactions)
    }

    /// Filtered transaction listing across all accounts, newest first
    pub fn list_transactions(
        &self,
        filter: TransactionFilter,
        day_start: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Transaction>> {
        let snapshot = self.db.snapshot();
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let skip = u64::from(page) * u64::from(page_size);
        let mut total = 0u64;
        let mut items = Vec::new();

        for item in snapshot.iterator_cf(cf, IteratorMode::End) {
            let (_, value) = item?;
            let tx: Transaction = bincode::deserialize(&value)?;
            if !filter.matches(&tx, day_start) {
                continue;
            }

            if total >= skip && items.len() < page_size as usize {
                items.push(tx);
            }
            total += 1;
        }

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    // Login attempt operations

    /// Append a login attempt
    pub fn append_attempt(&self, attempt: &LoginAttempt) -> Result<()> {
        let cf = self.cf_handle(CF_LOGIN_ATTEMPTS)?;
        let key = Self::attempt_key(&attempt.username, attempt.timestamp, attempt.id);
        self.db
            .put_cf_opt(cf, key, bincode::serialize(attempt)?, &self.write_opts)?;
        Ok(())
    }

    /// Attempts for `username` at or after `since`, oldest first
    pub fn attempts_since(&self, username: &str, since: DateTime<Utc>) -> Result<Vec<LoginAttempt>> {
        let cf = self.cf_handle(CF_LOGIN_ATTEMPTS)?;
        let prefix = Self::attempt_prefix(username);
        let mut seek = prefix.clone();
        seek.extend_from_slice(&encode_millis(since));

        let mut attempts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::From(&seek, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            attempts.push(bincode::deserialize(&value)?);
        }

        Ok(attempts)
    }

    // Security log operations

    /// Seal and append a security event on top of the chain
    pub fn append_security_event(
        &self,
        event: SecurityEvent,
        timestamp: DateTime<Utc>,
    ) -> Result<SecurityLogEntry> {
        let cf = self.cf_handle(CF_SECURITY_LOG)?;

        // Tail lock serializes sealing and the put
        let mut tail = self.log_tail.lock();
        let entry = AuditRecord::seal(tail.next_seq, timestamp, event, tail.last_hash.clone());
        self.db.put_cf_opt(
            cf,
            entry.seq.to_be_bytes(),
            bincode::serialize(&entry)?,
            &self.write_opts,
        )?;

        tail.next_seq += 1;
        tail.last_hash = entry.hash.clone();

        Ok(entry)
    }

    /// Security log page, newest first
    pub fn security_log(&self, page: u32, page_size: u32) -> Result<Page<SecurityLogEntry>> {
        let snapshot = self.db.snapshot();
        let cf = self.cf_handle(CF_SECURITY_LOG)?;

        let skip = u64::from(page) * u64::from(page_size);
        let mut total = 0u64;
        let mut items = Vec::new();

        for item in snapshot.iterator_cf(cf, IteratorMode::End) {
            let (_, value) = item?;
            if total >= skip && items.len() < page_size as usize {
                items.push(bincode::deserialize(&value)?);
            }
            total += 1;
        }

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Entire security log, oldest first
    pub fn security_log_entries(&self) -> Result<Vec<SecurityLogEntry>> {
        let snapshot = self.db.snapshot();
        let cf = self.cf_handle(CF_SECURITY_LOG)?;

        let mut entries = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            entries.push(bincode::deserialize(&value)?);
        }

        Ok(entries)
    }

    // Settings

    /// Current settings (defaults until first update)
    pub fn settings(&self) -> Result<SystemSettings> {
        let cf = self.cf_handle(CF_SETTINGS)?;
        match self.db.get_cf(cf, SETTINGS_KEY)? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(SystemSettings::default()),
        }
    }

    /// Replace settings
    pub fn put_settings(&self, settings: &SystemSettings) -> Result<()> {
        let cf = self.cf_handle(CF_SETTINGS)?;
        self.db
            .put_cf_opt(cf, SETTINGS_KEY, bincode::serialize(settings)?, &self.write_opts)?;
        Ok(())
    }

    // Aggregates and maintenance

    /// Dashboard aggregates from one snapshot
    pub fn dashboard(&self, now: DateTime<Utc>, day_start: DateTime<Utc>) -> Result<DashboardStats> {
        let snapshot = self.db.snapshot();
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_attempts = self.cf_handle(CF_LOGIN_ATTEMPTS)?;

        let mut stats = DashboardStats {
            total_users: 0,
            users_today: 0,
            transactions_today: 0,
            volume_today: Decimal::new(0, 2),
            failed_logins_24h: 0,
            locked_accounts: 0,
        };

        for item in snapshot.iterator_cf(cf_accounts, IteratorMode::Start) {
            let (_, value) = item?;
            let account: Account = bincode::deserialize(&value)?;
            if account.role == Role::User {
                stats.total_users += 1;
                if account.created_at >= day_start {
                    stats.users_today += 1;
                }
            }
            if account.is_locked(now) {
                stats.locked_accounts += 1;
            }
        }

        // Sequence order is timestamp order, so stop at the first older entry
        for item in snapshot.iterator_cf(cf_tx, IteratorMode::End) {
            let (_, value) = item?;
            let tx: Transaction = bincode::deserialize(&value)?;
            if tx.timestamp < day_start {
                break;
            }
            stats.transactions_today += 1;
            // Count each transfer once
            if tx.kind != TransactionKind::TransferReceived {
                stats.volume_today += tx.amount.abs();
            }
        }

        let since = now - chrono::Duration::hours(24);
        for item in snapshot.iterator_cf(cf_attempts, IteratorMode::Start) {
            let (_, value) = item?;
            let attempt: LoginAttempt = bincode::deserialize(&value)?;
            if !attempt.success && attempt.timestamp > since {
                stats.failed_logins_24h += 1;
            }
        }

        Ok(stats)
    }

    /// Delete attempts and security log entries older than `cutoff`
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        let cf_attempts = self.cf_handle(CF_LOGIN_ATTEMPTS)?;
        let cf_log = self.cf_handle(CF_SECURITY_LOG)?;
        let mut batch = WriteBatch::default();
        let mut report = PurgeReport::default();

        for item in self.db.iterator_cf(cf_attempts, IteratorMode::Start) {
            let (key, value) = item?;
            let attempt: LoginAttempt = bincode::deserialize(&value)?;
            if attempt.timestamp < cutoff {
                batch.delete_cf(cf_attempts, &key);
                report.attempts_removed += 1;
            }
        }

        for item in self.db.iterator_cf(cf_log, IteratorMode::Start) {
            let (key, value) = item?;
            let entry: SecurityLogEntry = bincode::deserialize(&value)?;
            if entry.timestamp >= cutoff {
                break;
            }
            batch.delete_cf(cf_log, &key);
            report.log_entries_removed += 1;
        }

        self.db.write_opt(batch, &self.write_opts)?;
        Ok(report)
    }

    /// Stage a test-data reset: all transactions and attempts go, balances drop to zero
    pub fn stage_reset(&self, writes: &mut PendingWrites) -> Result<ResetReport> {
        let snapshot = self.db.snapshot();
        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_attempts = self.cf_handle(CF_LOGIN_ATTEMPTS)?;
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        let mut report = ResetReport::default();

        for item in snapshot.iterator_cf(cf_tx, IteratorMode::Start) {
            let (_, value) = item?;
            let tx: Transaction = bincode::deserialize(&value)?;
            writes.delete_transaction(&tx);
            report.transactions_removed += 1;
        }

        for item in snapshot.iterator_cf(cf_attempts, IteratorMode::Start) {
            let (key, _) = item?;
            writes.delete_attempt(key.to_vec());
            report.attempts_removed += 1;
        }

        for item in snapshot.iterator_cf(cf_accounts, IteratorMode::Start) {
            let (_, value) = item?;
            let mut account: Account = bincode::deserialize(&value)?;
            if !account.balance.is_zero() {
                account.balance = Decimal::new(0, 2);
                writes.put_account(&account)?;
                report.accounts_reset += 1;
            }
        }

        Ok(report)
    }

    /// Cheap read used for health checks
    pub fn ping(&self) -> Result<()> {
        self.settings().map(|_| ())
    }

    // Key helpers

    fn index_prefix_account_tx(username: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(username.len() + 2);
        key.push(IDX_ACCOUNT_TX);
        key.extend_from_slice(username.as_bytes());
        key.push(0);
        key
    }

    fn index_key_account_tx(username: &str, seq: u64) -> Vec<u8> {
        let mut key = Self::index_prefix_account_tx(username);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn index_key_tx_id(id: Uuid) -> Vec<u8> {
        let mut key = vec![IDX_TX_ID];
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn index_key_account_number(normalized: &str) -> Vec<u8> {
        let mut key = vec![IDX_ACCOUNT_NUMBER];
        key.extend_from_slice(normalized.as_bytes());
        key
    }

    fn attempt_prefix(username: &str) -> Vec<u8> {
        let mut key = username.as_bytes().to_vec();
        key.push(0);
        key
    }

    fn attempt_key(username: &str, timestamp: DateTime<Utc>, id: Uuid) -> Vec<u8> {
        let mut key = Self::attempt_prefix(username);
        key.extend_from_slice(&encode_millis(timestamp));
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

/// Order-preserving encoding of a timestamp
fn encode_millis(ts: DateTime<Utc>) -> [u8; 8] {
    ((ts.timestamp_millis() as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Bad sequence key of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}
