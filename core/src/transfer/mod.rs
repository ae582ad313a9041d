//! # Transfer Engine
//!
//! Policy checks, key unsealing, and on-chain dispatch for custodial
//! sends. The engine talks to the vault and the chain and to nothing
//! else — ledger bookkeeping is the orchestrator's problem.

pub mod engine;

pub use engine::{TransferEngine, TransferError, TransferReceipt};
