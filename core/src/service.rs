//! # WalletService — The Orchestrator
//!
//! Composes the ledger, the custody store, the vault, and the transfer
//! engine into the operations the API exposes.
//!
//! ## The commit rule
//!
//! For on-chain sends, the chain is the source of truth and the ledger
//! is its mirror. The service writes ledger records only after the chain
//! confirms. A chain failure leaves zero new records. A ledger failure
//! after chain success is a reconciliation gap: money moved on chain but
//! the mirror missed it — logged at ERROR with the chain signature and
//! surfaced as its own error, never swallowed.
//!
//! ## Ownership
//!
//! Every card operation resolves the card and checks `user_id` first.
//! A card that exists but belongs to someone else reports
//! [`ServiceError::NotOwner`], distinct from not-found.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::{Address, ChainClient, ChainError, ChainKeypair};
use crate::config::TOKEN_MINT;
use crate::custody::{CardPublic, CustodialAccount};
use crate::ledger::{
    Asset, Ledger, LedgerError, OverdraftPolicy, TransactionMeta, TransactionRecord, TxKind,
    WalletRecord,
};
use crate::storage::{DbError, WalletDb};
use crate::transfer::{TransferEngine, TransferError};
use crate::vault::{KeyVault, VaultError};

/// Errors from service operations. The HTTP layer maps these to status
/// codes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No such card, or the card is inactive.
    #[error("card not found: {0}")]
    CardNotFound(Uuid),

    /// The card exists but belongs to a different user.
    #[error("card {0} is not owned by the requesting user")]
    NotOwner(Uuid),

    /// The card is frozen; outbound transfers are refused.
    #[error("card is frozen")]
    CardFrozen,

    /// Ledger posting failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Transfer execution failure. The chain did not move money.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Chain query failure outside the transfer path.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Vault failure while sealing a fresh card key.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Storage failure outside the ledger path.
    #[error(transparent)]
    Storage(#[from] DbError),

    /// The chain confirmed a transfer but the ledger mirror failed to
    /// record it. The signature identifies the on-chain truth.
    #[error("reconciliation gap: chain transfer {signature} confirmed but not recorded: {source}")]
    ReconciliationGap {
        signature: String,
        #[source]
        source: LedgerError,
    },
}

/// On-chain balances of one card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardBalances {
    /// The card's chain address.
    pub address: Address,
    /// Native coin balance, in coins.
    pub native: Decimal,
    /// Token balance, in whole tokens.
    pub token: Decimal,
}

/// Outcome of an on-chain send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    /// The ledger record of the send.
    pub record: TransactionRecord,
    /// The chain signature. `None` on an idempotent replay, where only
    /// the record was retained.
    pub signature: Option<String>,
    /// Whether this response was replayed from an idempotency key.
    pub replayed: bool,
}

/// The wallet service: every API operation goes through here.
pub struct WalletService {
    ledger: Ledger,
    engine: TransferEngine,
    vault: Arc<KeyVault>,
    chain: Arc<dyn ChainClient>,
}

impl WalletService {
    /// Assembles the service from its parts.
    pub fn new(
        db: WalletDb,
        vault: Arc<KeyVault>,
        chain: Arc<dyn ChainClient>,
        policy: OverdraftPolicy,
    ) -> Self {
        Self {
            ledger: Ledger::with_policy(db, policy),
            engine: TransferEngine::new(vault.clone(), chain.clone()),
            vault,
            chain,
        }
    }

    // -- Wallet & history -----------------------------------------------------

    /// The user's wallet, lazily created at zero balances.
    pub fn wallet(&self, user_id: &str) -> Result<WalletRecord, ServiceError> {
        Ok(self.ledger.wallet(user_id)?)
    }

    /// The user's transaction history, newest first.
    pub fn transactions(&self, user_id: &str) -> Result<Vec<TransactionRecord>, ServiceError> {
        Ok(self.ledger.transactions(user_id)?)
    }

    /// Records an off-chain transaction: topups, fiat payments, requests.
    pub fn record_off_chain(
        &self,
        user_id: &str,
        kind: TxKind,
        asset: Asset,
        amount: Decimal,
        meta: TransactionMeta,
    ) -> Result<TransactionRecord, ServiceError> {
        Ok(self
            .ledger
            .apply_transaction(user_id, kind, asset, amount, meta)?)
    }

    // -- Cards ----------------------------------------------------------------

    /// Issues a card: fresh keypair, key sealed into the vault, record
    /// persisted. The sealed key never appears in the return value.
    pub fn create_card(
        &self,
        user_id: &str,
        card_holder: &str,
    ) -> Result<CardPublic, ServiceError> {
        let keypair = ChainKeypair::generate();
        let sealed = self.vault.encrypt(&keypair.secret_key_bytes())?;
        let card = CustodialAccount::issue(user_id, card_holder, keypair.address(), sealed);
        self.ledger.db().put_card(&card)?;

        info!(user_id, card_id = %card.id, address = %card.public_address, "card issued");
        Ok(CardPublic::from(&card))
    }

    /// The user's cards, in issue order.
    pub fn cards(&self, user_id: &str) -> Result<Vec<CardPublic>, ServiceError> {
        Ok(self
            .ledger
            .db()
            .cards_for_user(user_id)?
            .iter()
            .map(CardPublic::from)
            .collect())
    }

    /// On-chain balances of a card.
    pub async fn card_balances(
        &self,
        user_id: &str,
        card_id: &Uuid,
    ) -> Result<CardBalances, ServiceError> {
        let card = self.owned_card(user_id, card_id)?;
        let mint = Address::new(TOKEN_MINT);

        let native_units = self.chain.native_balance(&card.public_address).await?;
        let token_units = self
            .chain
            .token_balance(&card.public_address, &mint)
            .await?;

        Ok(CardBalances {
            address: card.public_address,
            native: Asset::Native
                .from_base_units(native_units)
                .unwrap_or(Decimal::ZERO),
            token: Asset::Token
                .from_base_units(token_units)
                .unwrap_or(Decimal::ZERO),
        })
    }

    /// Freezes or unfreezes a card.
    pub fn set_card_frozen(
        &self,
        user_id: &str,
        card_id: &Uuid,
        frozen: bool,
    ) -> Result<CardPublic, ServiceError> {
        let mut card = self.owned_card(user_id, card_id)?;
        card.is_frozen = frozen;
        self.ledger.db().put_card(&card)?;

        info!(user_id, card_id = %card.id, frozen, "card freeze state changed");
        Ok(CardPublic::from(&card))
    }

    /// Updates stored spending limits. Limits are display state and are
    /// not enforced by any transfer path.
    pub fn update_card_limits(
        &self,
        user_id: &str,
        card_id: &Uuid,
        daily: Option<Decimal>,
        monthly: Option<Decimal>,
    ) -> Result<CardPublic, ServiceError> {
        let mut card = self.owned_card(user_id, card_id)?;
        if let Some(daily) = daily {
            card.daily_limit = Asset::Fiat.quantize(daily);
        }
        if let Some(monthly) = monthly {
            card.monthly_limit = Asset::Fiat.quantize(monthly);
        }
        self.ledger.db().put_card(&card)?;
        Ok(CardPublic::from(&card))
    }

    // -- On-chain sends -------------------------------------------------------

    /// Sends chain assets from a card.
    ///
    /// Commit order: ownership and frozen checks, idempotency replay,
    /// engine execute (chain confirms or the whole call fails with zero
    /// records), then the ledger mirror debit and idempotency mapping in
    /// one storage transaction.
    ///
    /// The mirror debit clamps to zero regardless of the ledger's policy:
    /// a confirmed chain transfer must appear in history even when the
    /// mirror balance ran behind.
    ///
    /// Idempotency is best-effort: the replay check happens before the
    /// chain call, so two concurrent sends racing on the same key can
    /// both miss it and submit twice. The key guards sequential retries
    /// (the common client behavior after a timeout), not concurrent
    /// submission of the same request.
    pub async fn send_on_chain(
        &self,
        user_id: &str,
        card_id: &Uuid,
        asset: Asset,
        to_address: &Address,
        amount: Decimal,
        idempotency_key: Option<&str>,
    ) -> Result<SendOutcome, ServiceError> {
        let card = self.owned_card(user_id, card_id)?;
        if card.is_frozen {
            return Err(ServiceError::CardFrozen);
        }

        if let Some(key) = idempotency_key {
            if let Some(record) = self.ledger.db().idempotent_replay(user_id, key)? {
                info!(user_id, card_id = %card.id, key, "idempotent replay");
                return Ok(SendOutcome {
                    record,
                    signature: None,
                    replayed: true,
                });
            }
        }

        let receipt = self
            .engine
            .execute(&card, asset, to_address, amount)
            .await?;

        let meta = TransactionMeta {
            counterparty: Some(to_address.to_string()),
            sender_address: Some(card.public_address.to_string()),
            note: None,
            category: None,
        };

        match self.ledger.apply_with_policy(
            user_id,
            TxKind::Send,
            asset,
            receipt.amount,
            meta,
            idempotency_key,
            OverdraftPolicy::ClampToZero,
        ) {
            Ok(record) => Ok(SendOutcome {
                record,
                signature: Some(receipt.signature),
                replayed: false,
            }),
            Err(source) => {
                error!(
                    user_id,
                    card_id = %card.id,
                    signature = %receipt.signature,
                    %source,
                    "reconciliation gap: confirmed chain transfer not recorded"
                );
                Err(ServiceError::ReconciliationGap {
                    signature: receipt.signature,
                    source,
                })
            }
        }
    }

    // -- Internal -------------------------------------------------------------

    fn owned_card(
        &self,
        user_id: &str,
        card_id: &Uuid,
    ) -> Result<CustodialAccount, ServiceError> {
        let card = self
            .ledger
            .db()
            .card(card_id)?
            .filter(|c| c.is_active)
            .ok_or(ServiceError::CardNotFound(*card_id))?;
        if card.user_id != user_id {
            warn!(user_id, card_id = %card_id, "card access denied");
            return Err(ServiceError::NotOwner(*card_id));
        }
        Ok(card)
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
        service: WalletService,
        chain: Arc<MockChainClient>,
    }

    fn fixture(policy: OverdraftPolicy) -> Fixture {
        let vault = Arc::new(KeyVault::new(&MasterSecret::from_passphrase(
            "service-test-secret",
        )));
        let chain = Arc::new(MockChainClient::new());
        let db = WalletDb::open_temporary().unwrap();
        Fixture {
            service: WalletService::new(db, vault, chain.clone() as Arc<dyn ChainClient>, policy),
            chain,
        }
    }

    /// Issues a card and seeds its native on-chain balance.
    fn funded_card(fx: &Fixture, user: &str, native_units: u64) -> CardPublic {
        let card = fx.service.create_card(user, "Test Holder").unwrap();
        fx.chain.set_native_balance(&card.public_address, native_units);
        card
    }

    fn destination() -> Address {
        Address::from_public_key_bytes([4u8; 32])
    }

    #[tokio::test]
    async fn wallet_is_lazily_created() {
        let fx = fixture(OverdraftPolicy::Reject);
        let wallet = fx.service.wallet("alice").unwrap();
        assert_eq!(wallet.fiat_balance, Decimal::ZERO);
        assert_eq!(wallet.user_id, "alice");
    }

    #[tokio::test]
    async fn off_chain_records_flow_through_the_ledger() {
        let fx = fixture(OverdraftPolicy::Reject);

        fx.service
            .record_off_chain(
                "alice",
                TxKind::Topup,
                Asset::Fiat,
                dec("75.00"),
                TransactionMeta::default(),
            )
            .unwrap();

        assert_eq!(fx.service.wallet("alice").unwrap().fiat_balance, dec("75.00"));
        assert_eq!(fx.service.transactions("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn created_card_is_listed_and_key_free() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = fx.service.create_card("alice", "Ada Lovelace").unwrap();

        let listed = fx.service.cards("alice").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, card.id);
        assert_eq!(listed[0].card_holder, "Ada Lovelace");
        assert!(card.public_address.is_valid());

        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("encrypted_private_key"));
    }

    #[tokio::test]
    async fn card_balances_read_the_chain() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 2_500_000_000);
        let mint = Address::new(TOKEN_MINT);
        fx.chain.set_token_balance(&card.public_address, &mint, 1_250_000);

        let balances = fx.service.card_balances("alice", &card.id).await.unwrap();
        assert_eq!(balances.native, dec("2.500000000"));
        assert_eq!(balances.token, dec("1.250000"));
        assert_eq!(balances.address, card.public_address);
    }

    #[tokio::test]
    async fn ownership_is_enforced() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = fx.service.create_card("alice", "Ada").unwrap();

        let err = fx.service.card_balances("mallory", &card.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotOwner(_)));

        let err = fx
            .service
            .send_on_chain(
                "mallory",
                &card.id,
                Asset::Native,
                &destination(),
                dec("1"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotOwner(_)));

        let missing = Uuid::new_v4();
        let err = fx.service.card_balances("alice", &missing).await.unwrap_err();
        assert!(matches!(err, ServiceError::CardNotFound(_)));
    }

    #[tokio::test]
    async fn successful_send_debits_the_mirror_once() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 5_000_000_000);

        // Mirror balance seeded above the send amount.
        fx.service
            .record_off_chain(
                "alice",
                TxKind::Topup,
                Asset::Native,
                dec("5"),
                TransactionMeta::default(),
            )
            .unwrap();

        let outcome = fx
            .service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("1.5"),
                None,
            )
            .await
            .unwrap();

        assert!(!outcome.replayed);
        assert!(outcome.signature.is_some());
        assert_eq!(outcome.record.kind, TxKind::Send);
        assert_eq!(outcome.record.amount, dec("1.500000000"));
        assert_eq!(
            outcome.record.sender_address.as_deref(),
            Some(card.public_address.as_str())
        );

        assert_eq!(fx.service.wallet("alice").unwrap().native_balance, dec("3.500000000"));
        // Exactly one chain transfer, exactly two records (topup + send).
        assert_eq!(fx.chain.transfers().len(), 1);
        assert_eq!(fx.service.transactions("alice").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_send_leaves_zero_records() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 0);

        let err = fx
            .service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("1"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Transfer(TransferError::InsufficientOnChainFunds)
        ));

        assert!(fx.service.transactions("alice").unwrap().is_empty());
        assert_eq!(fx.service.wallet("alice").unwrap().native_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn chain_outage_surfaces_without_records() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 5_000_000_000);
        fx.chain
            .fail_next(ChainError::Unavailable("node down".into()));

        let err = fx
            .service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("1"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Transfer(TransferError::Unavailable(_))
        ));
        assert!(fx.service.transactions("alice").unwrap().is_empty());
    }

    #[tokio::test]
    async fn frozen_card_refuses_sends_until_unfrozen() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 5_000_000_000);

        fx.service.set_card_frozen("alice", &card.id, true).unwrap();

        for amount in ["0.1", "2", "999"] {
            let err = fx
                .service
                .send_on_chain(
                    "alice",
                    &card.id,
                    Asset::Native,
                    &destination(),
                    dec(amount),
                    None,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::CardFrozen));
        }
        assert!(fx.chain.transfers().is_empty());

        fx.service.set_card_frozen("alice", &card.id, false).unwrap();
        fx.service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("1"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(fx.chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn mirror_debit_clamps_even_under_reject_policy() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 5_000_000_000);

        // Mirror knows about less than the card really holds.
        fx.service
            .record_off_chain(
                "alice",
                TxKind::Topup,
                Asset::Native,
                dec("1"),
                TransactionMeta::default(),
            )
            .unwrap();

        let outcome = fx
            .service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("3"),
                None,
            )
            .await
            .unwrap();

        // The chain moved 3; the mirror floors at zero and the record
        // carries the full amount.
        assert_eq!(outcome.record.amount, dec("3.000000000"));
        assert_eq!(fx.service.wallet("alice").unwrap().native_balance, Decimal::ZERO);
        assert_eq!(fx.chain.transfers()[0].base_units, 3_000_000_000);
    }

    #[tokio::test]
    async fn idempotency_key_replays_without_resending() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 5_000_000_000);

        let first = fx
            .service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("1"),
                Some("req-42"),
            )
            .await
            .unwrap();
        assert!(!first.replayed);

        let second = fx
            .service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("1"),
                Some("req-42"),
            )
            .await
            .unwrap();
        assert!(second.replayed);
        assert_eq!(second.record.id, first.record.id);

        // One chain transfer, one ledger record.
        assert_eq!(fx.chain.transfers().len(), 1);
        assert_eq!(fx.service.transactions("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn limit_updates_are_stored_not_enforced() {
        let fx = fixture(OverdraftPolicy::Reject);
        let card = funded_card(&fx, "alice", 5_000_000_000);

        let updated = fx
            .service
            .update_card_limits("alice", &card.id, Some(dec("0.01")), None)
            .unwrap();
        assert_eq!(updated.daily_limit, dec("0.01"));
        assert_eq!(updated.monthly_limit, card.monthly_limit);

        // A send far above the stored limit still goes through.
        fx.service
            .send_on_chain(
                "alice",
                &card.id,
                Asset::Native,
                &destination(),
                dec("2"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(fx.chain.transfers().len(), 1);
    }
}
