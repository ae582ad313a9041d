//! # Mock Chain Client
//!
//! A scriptable in-memory chain for tests. Balances are seeded by the
//! test, transfers move them, and every failure mode of the real client
//! can be injected on demand.
//!
//! The mock applies transfers synchronously, so "confirmed" means the
//! moment the call returns. Queued failures are consumed by the next
//! chain call regardless of which method it is, which makes ordering in
//! tests explicit.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;

use super::address::Address;
use super::client::{ChainClient, ChainError, Submission};
use super::keys::ChainKeypair;

/// A transfer the mock has accepted, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    /// Sender address.
    pub from: Address,
    /// Recipient address.
    pub to: Address,
    /// Token mint, `None` for native transfers.
    pub mint: Option<Address>,
    /// Amount in base units.
    pub base_units: u64,
}

#[derive(Default)]
struct MockState {
    native: HashMap<Address, u64>,
    token: HashMap<(Address, Address), u64>,
    token_accounts: HashSet<Address>,
    queued_failures: VecDeque<ChainError>,
    transfers: Vec<RecordedTransfer>,
    next_signature: u64,
}

/// In-memory [`ChainClient`] for tests. Cheap to construct, shareable
/// behind an `Arc`, and fully deterministic.
#[derive(Default)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl MockChainClient {
    /// An empty chain: every balance is zero, no token accounts exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a native balance.
    pub fn set_native_balance(&self, address: &Address, base_units: u64) {
        self.state.lock().native.insert(address.clone(), base_units);
    }

    /// Seeds a token balance and marks the owner's token account as
    /// existing.
    pub fn set_token_balance(&self, owner: &Address, mint: &Address, base_units: u64) {
        let mut state = self.state.lock();
        state
            .token
            .insert((owner.clone(), mint.clone()), base_units);
        if let Some(account) = owner.derive_token_account(mint) {
            state.token_accounts.insert(account);
        }
    }

    /// Marks a recipient's token account as already existing, without
    /// giving it a balance.
    pub fn create_token_account(&self, owner: &Address, mint: &Address) {
        if let Some(account) = owner.derive_token_account(mint) {
            self.state.lock().token_accounts.insert(account);
        }
    }

    /// Queues an error: the next chain call returns it instead of
    /// executing.
    pub fn fail_next(&self, error: ChainError) {
        self.state.lock().queued_failures.push_back(error);
    }

    /// All transfers accepted so far, in order.
    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.state.lock().transfers.clone()
    }

    fn take_failure(&self) -> Option<ChainError> {
        self.state.lock().queued_failures.pop_front()
    }

    fn next_signature(&self) -> String {
        let mut state = self.state.lock();
        state.next_signature += 1;
        format!("mock-signature-{}", state.next_signature)
    }

    fn validated(address: &Address) -> Result<(), ChainError> {
        if address.is_valid() {
            Ok(())
        } else {
            Err(ChainError::InvalidAddress(address.to_string()))
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn native_balance(&self, address: &Address) -> Result<u64, ChainError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Self::validated(address)?;
        Ok(self
            .state
            .lock()
            .native
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn token_balance(&self, owner: &Address, mint: &Address) -> Result<u64, ChainError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Self::validated(owner)?;
        Self::validated(mint)?;
        Ok(self
            .state
            .lock()
            .token
            .get(&(owner.clone(), mint.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn transfer_native(
        &self,
        from: &ChainKeypair,
        to: &Address,
        base_units: u64,
    ) -> Result<Submission, ChainError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Self::validated(to)?;

        let from_addr = from.address();
        {
            let mut state = self.state.lock();
            let available = state.native.get(&from_addr).copied().unwrap_or(0);
            if available < base_units {
                return Err(ChainError::InsufficientFunds);
            }
            state.native.insert(from_addr.clone(), available - base_units);
            *state.native.entry(to.clone()).or_insert(0) += base_units;
            state.transfers.push(RecordedTransfer {
                from: from_addr,
                to: to.clone(),
                mint: None,
                base_units,
            });
        }

        Ok(Submission {
            signature: self.next_signature(),
            created_token_account: false,
        })
    }

    async fn transfer_token(
        &self,
        from: &ChainKeypair,
        to: &Address,
        mint: &Address,
        base_units: u64,
    ) -> Result<Submission, ChainError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Self::validated(to)?;
        Self::validated(mint)?;

        let from_addr = from.address();
        let recipient_account = to
            .derive_token_account(mint)
            .ok_or_else(|| ChainError::InvalidAddress(to.to_string()))?;

        let created = {
            let mut state = self.state.lock();
            let key = (from_addr.clone(), mint.clone());
            let available = state.token.get(&key).copied().unwrap_or(0);
            if available < base_units {
                return Err(ChainError::InsufficientFunds);
            }
            state.token.insert(key, available - base_units);
            *state
                .token
                .entry((to.clone(), mint.clone()))
                .or_insert(0) += base_units;

            let created = !state.token_accounts.contains(&recipient_account);
            state.token_accounts.insert(recipient_account);
            state.transfers.push(RecordedTransfer {
                from: from_addr,
                to: to.clone(),
                mint: Some(mint.clone()),
                base_units,
            });
            created
        };

        Ok(Submission {
            signature: self.next_signature(),
            created_token_account: created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TOKEN_MINT;

    #[tokio::test]
    async fn native_transfer_moves_balance() {
        let chain = MockChainClient::new();
        let sender = ChainKeypair::generate();
        let recipient = Address::from_public_key_bytes([9u8; 32]);

        chain.set_native_balance(&sender.address(), 1_000);
        let submission = chain
            .transfer_native(&sender, &recipient, 400)
            .await
            .unwrap();

        assert!(!submission.created_token_account);
        assert_eq!(chain.native_balance(&sender.address()).await.unwrap(), 600);
        assert_eq!(chain.native_balance(&recipient).await.unwrap(), 400);
        assert_eq!(chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn native_transfer_rejects_overdraft() {
        let chain = MockChainClient::new();
        let sender = ChainKeypair::generate();
        let recipient = Address::from_public_key_bytes([9u8; 32]);

        chain.set_native_balance(&sender.address(), 100);
        let err = chain
            .transfer_native(&sender, &recipient, 101)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientFunds));
        // Nothing moved.
        assert_eq!(chain.native_balance(&sender.address()).await.unwrap(), 100);
        assert!(chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn first_token_transfer_creates_recipient_account() {
        let chain = MockChainClient::new();
        let sender = ChainKeypair::generate();
        let recipient = Address::from_public_key_bytes([5u8; 32]);
        let mint = Address::new(TOKEN_MINT);

        chain.set_token_balance(&sender.address(), &mint, 2_000_000);

        let first = chain
            .transfer_token(&sender, &recipient, &mint, 500_000)
            .await
            .unwrap();
        assert!(first.created_token_account);

        let second = chain
            .transfer_token(&sender, &recipient, &mint, 500_000)
            .await
            .unwrap();
        assert!(!second.created_token_account);

        assert_eq!(
            chain.token_balance(&recipient, &mint).await.unwrap(),
            1_000_000
        );
    }

    #[tokio::test]
    async fn queued_failure_hits_next_call() {
        let chain = MockChainClient::new();
        let sender = ChainKeypair::generate();

        chain.set_native_balance(&sender.address(), 1_000);
        chain.fail_next(ChainError::Unavailable("node down".into()));

        let err = chain.native_balance(&sender.address()).await.unwrap_err();
        assert!(matches!(err, ChainError::Unavailable(_)));

        // The failure was consumed; the chain is healthy again.
        assert_eq!(chain.native_balance(&sender.address()).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn invalid_address_never_reaches_state() {
        let chain = MockChainClient::new();
        let sender = ChainKeypair::generate();
        chain.set_native_balance(&sender.address(), 1_000);

        let err = chain
            .transfer_native(&sender, &Address::new("bogus"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidAddress(_)));
        assert!(chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn signatures_are_unique() {
        let chain = MockChainClient::new();
        let sender = ChainKeypair::generate();
        let recipient = Address::from_public_key_bytes([9u8; 32]);
        chain.set_native_balance(&sender.address(), 1_000);

        let a = chain.transfer_native(&sender, &recipient, 1).await.unwrap();
        let b = chain.transfer_native(&sender, &recipient, 1).await.unwrap();
        assert_ne!(a.signature, b.signature);
    }
}
