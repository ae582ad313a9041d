//! # Ledger Postings
//!
//! The single mutating operation of the balance ledger:
//! [`Ledger::apply_transaction`].
//!
//! ## Contract
//!
//! 1. The amount must be strictly positive after quantization.
//! 2. The kind fixes the direction: `Send`/`Payment` debit,
//!    `Receive`/`Topup` credit, `Request` records without touching the
//!    balance.
//! 3. Debits answer to the [`OverdraftPolicy`]: `Reject` refuses an
//!    overdraw, `ClampToZero` floors the balance at zero while the record
//!    still carries the full requested amount.
//! 4. Wallet update and history append land in one storage transaction;
//!    there is no state where one exists without the other.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use super::types::{
    Asset, Direction, TransactionMeta, TransactionRecord, TxKind, TxStatus, WalletRecord,
};
use crate::storage::{CommitError, DbError, WalletDb};

/// What a debit does when it exceeds the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverdraftPolicy {
    /// Refuse the posting. Nothing is recorded.
    #[default]
    Reject,
    /// Floor the balance at zero and record the requested amount.
    ClampToZero,
}

/// Errors from ledger postings.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The amount was zero, negative, or not a number the asset can hold.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// A debit exceeded the balance under the `Reject` policy.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    /// The storage layer failed. The posting did not happen.
    #[error("ledger storage error: {0}")]
    Storage(#[from] DbError),
}

/// The balance-ledger state machine.
///
/// Thin and stateless over [`WalletDb`]: policy plus posting rules. All
/// durability and atomicity concerns live in the storage layer.
pub struct Ledger {
    db: WalletDb,
    policy: OverdraftPolicy,
}

impl Ledger {
    /// A ledger with the default `Reject` overdraft policy.
    pub fn new(db: WalletDb) -> Self {
        Self {
            db,
            policy: OverdraftPolicy::default(),
        }
    }

    /// A ledger with an explicit overdraft policy.
    pub fn with_policy(db: WalletDb, policy: OverdraftPolicy) -> Self {
        Self { db, policy }
    }

    /// The active overdraft policy.
    pub fn policy(&self) -> OverdraftPolicy {
        self.policy
    }

    /// Read access to the backing store.
    pub fn db(&self) -> &WalletDb {
        &self.db
    }

    /// The user's wallet, lazily created at zero.
    pub fn wallet(&self, user_id: &str) -> Result<WalletRecord, LedgerError> {
        Ok(self.db.wallet_or_create(user_id)?)
    }

    /// The user's transaction history, newest first.
    pub fn transactions(&self, user_id: &str) -> Result<Vec<TransactionRecord>, LedgerError> {
        Ok(self.db.transactions_for_user(user_id)?)
    }

    /// Applies one transaction under the ledger's policy.
    pub fn apply_transaction(
        &self,
        user_id: &str,
        kind: TxKind,
        asset: Asset,
        amount: Decimal,
        meta: TransactionMeta,
    ) -> Result<TransactionRecord, LedgerError> {
        self.apply_with_policy(user_id, kind, asset, amount, meta, None, self.policy)
    }

    /// Applies a transaction with an explicit policy override and an
    /// optional idempotency key, committed in the same transaction.
    ///
    /// The orchestrator uses this for on-chain mirror debits, which clamp
    /// regardless of the ledger's own policy: a confirmed chain transfer
    /// must never be dropped from history because the mirror ran dry.
    pub fn apply_with_policy(
        &self,
        user_id: &str,
        kind: TxKind,
        asset: Asset,
        amount: Decimal,
        meta: TransactionMeta,
        idempotency_key: Option<&str>,
        policy: OverdraftPolicy,
    ) -> Result<TransactionRecord, LedgerError> {
        let amount = asset.quantize(amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let record = TransactionRecord::new(
            user_id,
            kind,
            asset,
            amount,
            TxStatus::Completed,
            meta,
        );

        let committed = self
            .db
            .commit_ledger(&record, idempotency_key, |wallet| {
                apply_direction(wallet, kind, asset, amount, policy)
            });

        match committed {
            Ok(wallet) => {
                debug!(
                    user_id,
                    kind = ?kind,
                    asset = ?asset,
                    %amount,
                    balance = %wallet.balance(asset),
                    "ledger posting applied"
                );
                Ok(record)
            }
            Err(CommitError::Domain(e)) => Err(e),
            Err(CommitError::Db(e)) => Err(e.into()),
        }
    }
}

/// Pure balance arithmetic for one posting. Runs inside the storage
/// transaction and may be retried, so it must not observe anything but
/// its arguments.
fn apply_direction(
    wallet: &mut WalletRecord,
    kind: TxKind,
    asset: Asset,
    amount: Decimal,
    policy: OverdraftPolicy,
) -> Result<(), LedgerError> {
    let balance = wallet.balance(asset);
    match kind.direction() {
        Direction::Credit => {
            wallet.set_balance(asset, balance + amount);
        }
        Direction::Debit => {
            if amount > balance {
                match policy {
                    OverdraftPolicy::Reject => {
                        return Err(LedgerError::InsufficientFunds {
                            requested: amount,
                            available: balance,
                        });
                    }
                    OverdraftPolicy::ClampToZero => {
                        wallet.set_balance(asset, Decimal::ZERO);
                    }
                }
            } else {
                wallet.set_balance(asset, balance - amount);
            }
        }
        Direction::None => {}
    }
    Ok(())
}
