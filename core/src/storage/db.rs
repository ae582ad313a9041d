//! # WalletDb — Persistent Storage Engine
//!
//! The persistence layer for the wallet service, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees", each an independent B+ tree
//! with its own keyspace:
//!
//! | Tree            | Key                                   | Value                        |
//! |-----------------|---------------------------------------|------------------------------|
//! | `wallets`       | `user_id` (UTF-8)                     | `bincode(WalletRecord)`      |
//! | `transactions`  | `tx_id` (16B UUID)                    | `bincode(TransactionRecord)` |
//! | `tx_index`      | `user_id \0 !created_at (8B BE) tx_id`| `tx_id` (16B)                |
//! | `cards`         | `card_id` (16B UUID)                  | `bincode(CustodialAccount)`  |
//! | `cards_by_user` | `user_id \0 card_id`                  | `card_id` (16B)              |
//! | `idempotency`   | `user_id \0 client_key`               | `tx_id` (16B)                |
//!
//! The history index stores the bitwise complement of the creation
//! timestamp (microseconds, big-endian), so sled's ascending key order
//! reads newest-first without a sort.
//!
//! ## Atomicity
//!
//! A ledger posting touches the wallet, the history, the index, and
//! possibly the idempotency tree. [`WalletDb::commit_ledger`] wraps all
//! of it in one serializable sled transaction: either everything lands
//! or nothing does, and two concurrent postings against the same wallet
//! serialize at the storage layer.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use uuid::Uuid;

use crate::custody::CustodialAccount;
use crate::ledger::types::{TransactionRecord, WalletRecord};

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

/// Errors from database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Outcome of a [`commit_ledger`](WalletDb::commit_ledger) attempt:
/// either the domain closure vetoed the update, or the storage layer
/// failed.
#[derive(Debug)]
pub enum CommitError<E> {
    /// The update closure rejected the posting. Nothing was written.
    Domain(E),
    /// The storage layer failed.
    Db(DbError),
}

/// Internal abort reason threaded through the sled transaction.
enum Abort<E> {
    Domain(E),
    Codec(String),
}

// ---------------------------------------------------------------------------
// Key encoding
// ---------------------------------------------------------------------------

/// History index key: `user_id \0 !micros_be tx_id`.
///
/// The complemented timestamp makes lexicographic ascending order equal
/// to reverse-chronological order. The trailing UUID breaks ties between
/// records created in the same microsecond.
fn history_key(user_id: &str, record: &TransactionRecord) -> Vec<u8> {
    let micros = record.created_at.timestamp_micros().max(0) as u64;
    let mut key = Vec::with_capacity(user_id.len() + 1 + 8 + 16);
    key.extend_from_slice(user_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&(u64::MAX - micros).to_be_bytes());
    key.extend_from_slice(record.id.as_bytes());
    key
}

/// Per-user scoped key: `user_id \0 suffix`.
fn scoped_key(user_id: &str, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1 + suffix.len());
    key.extend_from_slice(user_id.as_bytes());
    key.push(0);
    key.extend_from_slice(suffix);
    key
}

/// Prefix for scanning all of a user's entries in a scoped tree.
fn user_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(0);
    prefix
}

// ---------------------------------------------------------------------------
// WalletDb
// ---------------------------------------------------------------------------

/// Persistent storage for wallets, history, cards, and idempotency keys.
///
/// # Thread Safety
///
/// sled is inherently thread-safe — trees support lock-free concurrent
/// reads and serialized writes. `WalletDb` can be shared across threads
/// via `Arc<WalletDb>` without external synchronization.
#[derive(Debug, Clone)]
pub struct WalletDb {
    /// The underlying sled database handle.
    db: Db,
    /// Wallet records keyed by user ID.
    wallets: Tree,
    /// Transaction records keyed by UUID bytes.
    transactions: Tree,
    /// Reverse-chronological per-user history index.
    tx_index: Tree,
    /// Card records keyed by UUID bytes.
    cards: Tree,
    /// Per-user card index.
    cards_by_user: Tree,
    /// Client idempotency keys, scoped per user.
    idempotency: Tree,
}

impl WalletDb {
    /// Opens or creates a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Creates a temporary in-memory database, cleaned up on drop.
    ///
    /// Ideal for tests — no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let wallets = db.open_tree("wallets")?;
        let transactions = db.open_tree("transactions")?;
        let tx_index = db.open_tree("tx_index")?;
        let cards = db.open_tree("cards")?;
        let cards_by_user = db.open_tree("cards_by_user")?;
        let idempotency = db.open_tree("idempotency")?;

        Ok(Self {
            db,
            wallets,
            transactions,
            tx_index,
            cards,
            cards_by_user,
            idempotency,
        })
    }

    // -- Wallet operations ----------------------------------------------------

    /// Fetches a wallet, or `None` if the user has never been seen.
    pub fn wallet(&self, user_id: &str) -> DbResult<Option<WalletRecord>> {
        match self.wallets.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetches a wallet, lazily creating a zero-balance record on first
    /// access.
    ///
    /// Concurrent first accesses race on a compare-and-swap; exactly one
    /// zero wallet wins and everyone reads it back.
    pub fn wallet_or_create(&self, user_id: &str) -> DbResult<WalletRecord> {
        if let Some(existing) = self.wallet(user_id)? {
            return Ok(existing);
        }

        let fresh = WalletRecord::new(user_id);
        let bytes = encode(&fresh)?;
        match self
            .wallets
            .compare_and_swap(user_id.as_bytes(), None::<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(fresh),
            // Lost the race: someone else created it first.
            Err(_) => Ok(self
                .wallet(user_id)?
                .expect("wallet exists after losing creation race")),
        }
    }

    // -- Ledger commit --------------------------------------------------------

    /// Applies one ledger posting atomically.
    ///
    /// Inside a single serializable sled transaction:
    /// 1. Reads (or lazily creates) the user's wallet.
    /// 2. Runs `update` against it; a domain veto aborts with nothing
    ///    written.
    /// 3. Writes the updated wallet, the transaction record, the history
    ///    index entry, and the optional idempotency mapping.
    ///
    /// The closure may run more than once on conflict, so it must be
    /// pure over its input.
    pub fn commit_ledger<E, F>(
        &self,
        record: &TransactionRecord,
        idempotency_key: Option<&str>,
        update: F,
    ) -> Result<WalletRecord, CommitError<E>>
    where
        F: Fn(&mut WalletRecord) -> Result<(), E>,
    {
        let user_id = record.user_id.as_str();
        let record_bytes = encode(record).map_err(CommitError::Db)?;
        let index_key = history_key(user_id, record);
        let idem_key = idempotency_key.map(|k| scoped_key(user_id, k.as_bytes()));

        let result = (
            &self.wallets,
            &self.transactions,
            &self.tx_index,
            &self.idempotency,
        )
            .transaction(|(wallets, transactions, tx_index, idempotency)| {
                let mut wallet = match wallets.get(user_id.as_bytes())? {
                    Some(bytes) => decode::<WalletRecord>(&bytes).map_err(|e| {
                        ConflictableTransactionError::Abort(Abort::Codec(e.to_string()))
                    })?,
                    None => WalletRecord::new(user_id),
                };

                update(&mut wallet)
                    .map_err(|e| ConflictableTransactionError::Abort(Abort::Domain(e)))?;

                let wallet_bytes = encode(&wallet).map_err(|e| {
                    ConflictableTransactionError::Abort(Abort::Codec(e.to_string()))
                })?;
                wallets.insert(user_id.as_bytes(), wallet_bytes)?;
                transactions.insert(record.id.as_bytes(), record_bytes.clone())?;
                tx_index.insert(index_key.clone(), record.id.as_bytes())?;
                if let Some(key) = &idem_key {
                    idempotency.insert(key.clone(), record.id.as_bytes())?;
                }

                Ok(wallet)
            });

        match result {
            Ok(wallet) => {
                self.db.flush().map_err(|e| CommitError::Db(e.into()))?;
                Ok(wallet)
            }
            Err(TransactionError::Abort(Abort::Domain(e))) => Err(CommitError::Domain(e)),
            Err(TransactionError::Abort(Abort::Codec(msg))) => {
                Err(CommitError::Db(DbError::Serialization(msg)))
            }
            Err(TransactionError::Storage(e)) => Err(CommitError::Db(e.into())),
        }
    }

    // -- Transaction operations -----------------------------------------------

    /// Retrieves a transaction record by ID.
    pub fn transaction_record(&self, id: &Uuid) -> DbResult<Option<TransactionRecord>> {
        match self.transactions.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All of a user's transactions, newest first.
    ///
    /// A straight prefix scan over the index: the complemented-timestamp
    /// key encoding means no sort is needed.
    pub fn transactions_for_user(&self, user_id: &str) -> DbResult<Vec<TransactionRecord>> {
        let mut records = Vec::new();
        for entry in self.tx_index.scan_prefix(user_prefix(user_id)) {
            let (_key, id_bytes) = entry?;
            let id = Uuid::from_slice(&id_bytes)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            if let Some(record) = self.transaction_record(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    // -- Card operations ------------------------------------------------------

    /// Persists a card and its per-user index entry.
    pub fn put_card(&self, card: &CustodialAccount) -> DbResult<()> {
        let bytes = encode(card)?;
        self.cards.insert(card.id.as_bytes(), bytes)?;
        self.cards_by_user.insert(
            scoped_key(&card.user_id, card.id.as_bytes()),
            card.id.as_bytes(),
        )?;
        self.db.flush()?;
        Ok(())
    }

    /// Retrieves a card by ID.
    pub fn card(&self, id: &Uuid) -> DbResult<Option<CustodialAccount>> {
        match self.cards.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All of a user's cards, in issue order.
    pub fn cards_for_user(&self, user_id: &str) -> DbResult<Vec<CustodialAccount>> {
        let mut cards = Vec::new();
        for entry in self.cards_by_user.scan_prefix(user_prefix(user_id)) {
            let (_key, id_bytes) = entry?;
            let id = Uuid::from_slice(&id_bytes)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            if let Some(card) = self.card(&id)? {
                cards.push(card);
            }
        }
        cards.sort_by_key(|c| c.created_at);
        Ok(cards)
    }

    // -- Idempotency ----------------------------------------------------------

    /// Looks up a previously committed transaction for a client key.
    pub fn idempotent_replay(
        &self,
        user_id: &str,
        key: &str,
    ) -> DbResult<Option<TransactionRecord>> {
        match self.idempotency.get(scoped_key(user_id, key.as_bytes()))? {
            Some(id_bytes) => {
                let id = Uuid::from_slice(&id_bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                self.transaction_record(&id)
            }
            None => Ok(None),
        }
    }

    // -- Utility --------------------------------------------------------------

    /// Number of wallets stored.
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Number of transaction records stored.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Number of cards stored.
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Blocks until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Address;
    use crate::ledger::types::{Asset, TransactionMeta, TxKind, TxStatus};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn make_record(user_id: &str, amount: &str) -> TransactionRecord {
        TransactionRecord::new(
            user_id,
            TxKind::Topup,
            Asset::Fiat,
            dec(amount),
            TxStatus::Completed,
            TransactionMeta::default(),
        )
    }

    fn make_card(user_id: &str) -> CustodialAccount {
        CustodialAccount::issue(
            user_id,
            "Test Holder",
            Address::from_public_key_bytes([1u8; 32]),
            vec![1, 2, 3],
        )
    }

    #[test]
    fn open_temporary_database() {
        let db = WalletDb::open_temporary().expect("temp db");
        assert_eq!(db.wallet_count(), 0);
        assert_eq!(db.transaction_count(), 0);
        assert_eq!(db.card_count(), 0);
    }

    #[test]
    fn open_persistent_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = WalletDb::open(dir.path()).expect("open");
        db.wallet_or_create("alice").unwrap();
        db.flush().unwrap();
        drop(db);

        let db2 = WalletDb::open(dir.path()).expect("reopen");
        assert!(db2.wallet("alice").unwrap().is_some());
    }

    #[test]
    fn wallet_is_lazily_created_once() {
        let db = WalletDb::open_temporary().unwrap();
        assert!(db.wallet("alice").unwrap().is_none());

        let first = db.wallet_or_create("alice").unwrap();
        assert_eq!(first.fiat_balance, Decimal::ZERO);

        let second = db.wallet_or_create("alice").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(db.wallet_count(), 1);
    }

    #[test]
    fn commit_ledger_writes_everything() {
        let db = WalletDb::open_temporary().unwrap();
        let record = make_record("alice", "50.00");

        let wallet = db
            .commit_ledger::<(), _>(&record, None, |w| {
                w.set_balance(Asset::Fiat, dec("50.00"));
                Ok(())
            })
            .unwrap();

        assert_eq!(wallet.fiat_balance, dec("50.00"));
        assert_eq!(db.wallet("alice").unwrap().unwrap().fiat_balance, dec("50.00"));
        assert!(db.transaction_record(&record.id).unwrap().is_some());
        assert_eq!(db.transactions_for_user("alice").unwrap().len(), 1);
    }

    #[test]
    fn domain_abort_writes_nothing() {
        let db = WalletDb::open_temporary().unwrap();
        let record = make_record("alice", "50.00");

        let result = db.commit_ledger::<&str, _>(&record, None, |_| Err("vetoed"));
        assert!(matches!(result, Err(CommitError::Domain("vetoed"))));

        assert!(db.wallet("alice").unwrap().is_none());
        assert!(db.transaction_record(&record.id).unwrap().is_none());
        assert!(db.transactions_for_user("alice").unwrap().is_empty());
    }

    #[test]
    fn history_reads_newest_first() {
        let db = WalletDb::open_temporary().unwrap();

        for amount in ["1.00", "2.00", "3.00"] {
            let record = make_record("alice", amount);
            db.commit_ledger::<(), _>(&record, None, |_| Ok(())).unwrap();
            // Distinct timestamps for a deterministic order.
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let history = db.transactions_for_user("alice").unwrap();
        let amounts: Vec<_> = history.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![dec("3.00"), dec("2.00"), dec("1.00")]);
    }

    #[test]
    fn history_is_scoped_per_user() {
        let db = WalletDb::open_temporary().unwrap();
        db.commit_ledger::<(), _>(&make_record("alice", "1.00"), None, |_| Ok(()))
            .unwrap();
        db.commit_ledger::<(), _>(&make_record("bob", "2.00"), None, |_| Ok(()))
            .unwrap();

        assert_eq!(db.transactions_for_user("alice").unwrap().len(), 1);
        assert_eq!(db.transactions_for_user("bob").unwrap().len(), 1);
        assert!(db.transactions_for_user("carol").unwrap().is_empty());
    }

    #[test]
    fn card_crud_and_user_index() {
        let db = WalletDb::open_temporary().unwrap();
        let card = make_card("alice");
        db.put_card(&card).unwrap();

        let fetched = db.card(&card.id).unwrap().expect("card exists");
        assert_eq!(fetched, card);

        let listed = db.cards_for_user("alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, card.id);
        assert!(db.cards_for_user("bob").unwrap().is_empty());
    }

    #[test]
    fn card_update_overwrites_in_place() {
        let db = WalletDb::open_temporary().unwrap();
        let mut card = make_card("alice");
        db.put_card(&card).unwrap();

        card.is_frozen = true;
        db.put_card(&card).unwrap();

        assert!(db.card(&card.id).unwrap().unwrap().is_frozen);
        assert_eq!(db.card_count(), 1);
    }

    #[test]
    fn idempotency_mapping_survives_commit() {
        let db = WalletDb::open_temporary().unwrap();
        let record = make_record("alice", "10.00");

        assert!(db.idempotent_replay("alice", "req-1").unwrap().is_none());

        db.commit_ledger::<(), _>(&record, Some("req-1"), |_| Ok(()))
            .unwrap();

        let replay = db
            .idempotent_replay("alice", "req-1")
            .unwrap()
            .expect("replayable");
        assert_eq!(replay.id, record.id);

        // Keys are scoped per user.
        assert!(db.idempotent_replay("bob", "req-1").unwrap().is_none());
    }

    #[test]
    fn concurrent_commits_serialize() {
        use std::sync::Arc;
        use std::thread;

        let db = Arc::new(WalletDb::open_temporary().unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let record = make_record("alice", "1.00");
                        db.commit_ledger::<(), _>(&record, None, |w| {
                            let current = w.balance(Asset::Fiat);
                            w.set_balance(Asset::Fiat, current + dec("1.00"));
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("writer thread");
        }

        // 40 increments of 1.00, no lost updates.
        let wallet = db.wallet("alice").unwrap().unwrap();
        assert_eq!(wallet.fiat_balance, dec("40.00"));
        assert_eq!(db.transactions_for_user("alice").unwrap().len(), 40);
    }
}
