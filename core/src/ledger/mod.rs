//! # Balance Ledger
//!
//! The off-chain mirror of every user's money: a three-asset wallet
//! record plus an append-only transaction history.
//!
//! The ledger is bookkeeping, not settlement. On-chain truth lives on the
//! chain; the ledger records what the service believes happened and is
//! reconciled against confirmed chain events by the orchestrator.
//!
//! `types` defines the records and asset arithmetic; `posting` holds the
//! single mutating operation, `apply_transaction`.

pub mod posting;
pub mod types;

pub use posting::{Ledger, LedgerError, OverdraftPolicy};
pub use types::{
    Asset, Direction, TransactionMeta, TransactionRecord, TxKind, TxStatus, WalletRecord,
};
