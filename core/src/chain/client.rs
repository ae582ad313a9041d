//! # Chain Client Trait
//!
//! The async seam between the wallet service and the settlement chain.
//!
//! Everything above this trait is backend-agnostic: the transfer engine
//! and service layer talk to `dyn ChainClient` and cannot tell the HTTP
//! transport from the test mock. Amounts at this boundary are base units
//! (`u64`) — the decimal-to-base-unit conversion happens in the callers,
//! who know each asset's scale.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::address::Address;
use super::keys::ChainKeypair;

/// Failures when talking to the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The address is not structurally valid and was never sent to the
    /// chain.
    #[error("invalid chain address: {0}")]
    InvalidAddress(String),

    /// The sending account does not hold enough on-chain funds for the
    /// transfer plus fees.
    #[error("insufficient on-chain funds")]
    InsufficientFunds,

    /// The chain could not be reached, or a submitted transaction was
    /// not confirmed before the deadline. The transaction may or may not
    /// have landed — callers must not assume either way.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// The chain actively rejected the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// A confirmed transaction submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// The chain's transaction signature, base58.
    pub signature: String,
    /// Whether a destination token account had to be created as part of
    /// this submission. Always `false` for native transfers.
    pub created_token_account: bool,
}

/// Async access to the settlement chain.
///
/// Implementations: [`HttpChainClient`](super::HttpChainClient) for the
/// real thing, [`MockChainClient`](super::MockChainClient) for tests.
///
/// All `transfer_*` methods block until the transaction is confirmed or
/// the confirmation deadline passes. A returned [`Submission`] means the
/// chain has durably applied the transfer.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native coin balance of `address`, in base units.
    async fn native_balance(&self, address: &Address) -> Result<u64, ChainError>;

    /// Token balance held by `owner` for `mint`, in token base units.
    /// An owner with no token account has a balance of zero, not an error.
    async fn token_balance(&self, owner: &Address, mint: &Address) -> Result<u64, ChainError>;

    /// Transfers native coin from the custodial keypair to `to`.
    async fn transfer_native(
        &self,
        from: &ChainKeypair,
        to: &Address,
        base_units: u64,
    ) -> Result<Submission, ChainError>;

    /// Transfers `mint` tokens from the custodial keypair's token account
    /// to the recipient's. When the recipient has no token account yet,
    /// its creation is folded into the same submission, paid by the sender.
    async fn transfer_token(
        &self,
        from: &ChainKeypair,
        to: &Address,
        mint: &Address,
        base_units: u64,
    ) -> Result<Submission, ChainError>;
}
