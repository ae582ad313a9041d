//! # Transfer Execution
//!
//! [`TransferEngine::execute`] turns a card and a destination into a
//! confirmed on-chain transfer, or a typed refusal.
//!
//! ## Check order
//!
//! Frozen card, then address validity, then amount validity, then key
//! unsealing, then dispatch. The order is part of the contract: a frozen
//! card reports `Frozen` even when the address is garbage too, so a
//! client can rely on the first error it sees.
//!
//! ## What the engine never does
//!
//! No retries — a failed submission surfaces as-is and the caller
//! decides. No ledger access — the engine's success means the chain
//! moved money, nothing more.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::chain::{Address, ChainClient, ChainError, ChainKeypair};
use crate::config::TOKEN_MINT;
use crate::custody::CustodialAccount;
use crate::ledger::Asset;
use crate::vault::KeyVault;

/// Errors from transfer execution.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The card is frozen. Nothing was attempted.
    #[error("card is frozen")]
    Frozen,

    /// The destination address is not structurally valid.
    #[error("invalid destination address: {0}")]
    InvalidAddress(String),

    /// The amount is not positive, exceeds the asset's precision, or the
    /// asset has no on-chain form.
    #[error("invalid transfer amount: {0}")]
    InvalidAmount(Decimal),

    /// The card's private key could not be unsealed. Corrupt blob or
    /// wrong process secret.
    #[error("signing key unavailable")]
    KeyUnavailable,

    /// The card's on-chain balance does not cover the transfer.
    #[error("insufficient on-chain funds")]
    InsufficientOnChainFunds,

    /// The chain could not be reached or the transfer was not confirmed
    /// in time. Retryable by the caller.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// The chain rejected the transfer.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

impl From<ChainError> for TransferError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::InvalidAddress(addr) => TransferError::InvalidAddress(addr),
            ChainError::InsufficientFunds => TransferError::InsufficientOnChainFunds,
            ChainError::Unavailable(msg) => TransferError::Unavailable(msg),
            ChainError::Rejected(msg) => TransferError::Rejected(msg),
        }
    }
}

/// Proof of a confirmed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// The chain's transaction signature.
    pub signature: String,
    /// The asset that moved.
    pub asset: Asset,
    /// The quantized amount that moved.
    pub amount: Decimal,
    /// Where it went.
    pub to_address: Address,
}

/// Executes custodial transfers: unseal, sign, submit, confirm.
pub struct TransferEngine {
    vault: Arc<KeyVault>,
    chain: Arc<dyn ChainClient>,
}

impl TransferEngine {
    /// Builds an engine over a vault and a chain client.
    pub fn new(vault: Arc<KeyVault>, chain: Arc<dyn ChainClient>) -> Self {
        Self { vault, chain }
    }

    /// Executes one transfer from a card.
    ///
    /// On `Ok`, the chain has confirmed the transfer. On `Err`, either
    /// nothing was submitted, or (for [`TransferError::Unavailable`]
    /// after submission) the outcome is unknown and the caller must not
    /// assume success.
    pub async fn execute(
        &self,
        account: &CustodialAccount,
        asset: Asset,
        to_address: &Address,
        amount: Decimal,
    ) -> Result<TransferReceipt, TransferError> {
        if account.is_frozen {
            return Err(TransferError::Frozen);
        }
        if !to_address.is_valid() {
            return Err(TransferError::InvalidAddress(to_address.to_string()));
        }

        let amount = asset.quantize(amount);
        if amount <= Decimal::ZERO {
            return Err(TransferError::InvalidAmount(amount));
        }
        let base_units = asset
            .to_base_units(amount)
            .ok_or(TransferError::InvalidAmount(amount))?;

        let secret = self
            .vault
            .decrypt(&account.encrypted_private_key)
            .map_err(|_| TransferError::KeyUnavailable)?;
        let keypair = ChainKeypair::from_secret_key_bytes(secret.expose())
            .map_err(|_| TransferError::KeyUnavailable)?;

        let submission = match asset {
            Asset::Native => {
                self.chain
                    .transfer_native(&keypair, to_address, base_units)
                    .await?
            }
            Asset::Token => {
                let mint = Address::new(TOKEN_MINT);
                self.chain
                    .transfer_token(&keypair, to_address, &mint, base_units)
                    .await?
            }
            // to_base_units returned None above; unreachable in practice.
            Asset::Fiat => return Err(TransferError::InvalidAmount(amount)),
        };

        info!(
            card_id = %account.id,
            asset = ?asset,
            %amount,
            to = %to_address,
            signature = %submission.signature,
            created_token_account = submission.created_token_account,
            "transfer confirmed"
        );

        Ok(TransferReceipt {
            signature: submission.signature,
            asset,
            amount,
            to_address: to_address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::vault::MasterSecret;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Fixture {
        engine: TransferEngine,
        chain: Arc<MockChainClient>,
        card: CustodialAccount,
        card_keypair: ChainKeypair,
    }

    fn fixture() -> Fixture {
        let vault = Arc::new(KeyVault::new(&MasterSecret::from_passphrase(
            "engine-test-secret",
        )));
        let chain = Arc::new(MockChainClient::new());

        let keypair = ChainKeypair::generate();
        let sealed = vault.encrypt(&keypair.secret_key_bytes()).unwrap();
        let card = CustodialAccount::issue("user-1", "Test Holder", keypair.address(), sealed);

        Fixture {
            engine: TransferEngine::new(vault, chain.clone() as Arc<dyn ChainClient>),
            chain,
            card,
            card_keypair: keypair,
        }
    }

    fn destination() -> Address {
        Address::from_public_key_bytes([9u8; 32])
    }

    #[tokio::test]
    async fn native_transfer_succeeds() {
        let fx = fixture();
        fx.chain
            .set_native_balance(&fx.card_keypair.address(), 2_000_000_000);

        let receipt = fx
            .engine
            .execute(&fx.card, Asset::Native, &destination(), dec("1.5"))
            .await
            .unwrap();

        assert_eq!(receipt.asset, Asset::Native);
        assert_eq!(receipt.amount, dec("1.5"));
        assert_eq!(receipt.to_address, destination());

        let transfers = fx.chain.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].base_units, 1_500_000_000);
        assert_eq!(transfers[0].mint, None);
    }

    #[tokio::test]
    async fn token_transfer_uses_the_pinned_mint() {
        let fx = fixture();
        let mint = Address::new(TOKEN_MINT);
        fx.chain
            .set_token_balance(&fx.card_keypair.address(), &mint, 5_000_000);

        let receipt = fx
            .engine
            .execute(&fx.card, Asset::Token, &destination(), dec("2.5"))
            .await
            .unwrap();

        assert_eq!(receipt.asset, Asset::Token);
        let transfers = fx.chain.transfers();
        assert_eq!(transfers[0].mint, Some(mint));
        assert_eq!(transfers[0].base_units, 2_500_000);
    }

    #[tokio::test]
    async fn frozen_beats_every_other_check() {
        let mut fx = fixture();
        fx.card.is_frozen = true;

        // Even with a garbage address and a garbage amount, frozen wins.
        let err = fx
            .engine
            .execute(&fx.card, Asset::Native, &Address::new("junk"), dec("-5"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Frozen));
        assert!(fx.chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn invalid_address_is_checked_before_amount() {
        let fx = fixture();
        let err = fx
            .engine
            .execute(&fx.card, Asset::Native, &Address::new("junk"), dec("-5"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_refused() {
        let fx = fixture();
        for bad in ["0", "-1"] {
            let err = fx
                .engine
                .execute(&fx.card, Asset::Native, &destination(), dec(bad))
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::InvalidAmount(_)));
        }
        assert!(fx.chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn fiat_cannot_move_on_chain() {
        let fx = fixture();
        let err = fx
            .engine
            .execute(&fx.card, Asset::Fiat, &destination(), dec("10.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn corrupt_sealed_key_is_key_unavailable() {
        let mut fx = fixture();
        fx.card.encrypted_private_key[20] ^= 0xFF;
        fx.chain
            .set_native_balance(&fx.card_keypair.address(), 2_000_000_000);

        let err = fx
            .engine
            .execute(&fx.card, Asset::Native, &destination(), dec("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::KeyUnavailable));
        assert!(fx.chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn chain_errors_map_to_transfer_errors() {
        let fx = fixture();

        // Empty on-chain balance.
        let err = fx
            .engine
            .execute(&fx.card, Asset::Native, &destination(), dec("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientOnChainFunds));

        fx.chain
            .set_native_balance(&fx.card_keypair.address(), 2_000_000_000);
        fx.chain
            .fail_next(ChainError::Unavailable("node down".into()));
        let err = fx
            .engine
            .execute(&fx.card, Asset::Native, &destination(), dec("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Unavailable(_)));

        fx.chain.fail_next(ChainError::Rejected("bad sig".into()));
        let err = fx
            .engine
            .execute(&fx.card, Asset::Native, &destination(), dec("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Rejected(_)));
    }

    #[tokio::test]
    async fn no_retry_after_failure() {
        let fx = fixture();
        fx.chain
            .set_native_balance(&fx.card_keypair.address(), 2_000_000_000);
        fx.chain
            .fail_next(ChainError::Unavailable("transient".into()));

        let _ = fx
            .engine
            .execute(&fx.card, Asset::Native, &destination(), dec("1"))
            .await;

        // One failure, one call. The queued error was the only chain
        // interaction.
        assert!(fx.chain.transfers().is_empty());
    }
}
