//! # Persistent Storage
//!
//! The sled-backed store for wallets, transaction history, cards, and
//! idempotency records. All on-disk data flows through [`WalletDb`].

pub mod db;

pub use db::{CommitError, DbError, DbResult, WalletDb};
