//! # Addresses
//!
//! Base58-encoded 32-byte addresses, plus deterministic token-account
//! derivation.
//!
//! An [`Address`] is structurally valid when it decodes from base58 to
//! exactly 32 bytes. We deliberately do not check that the bytes form a
//! valid curve point: token accounts are derived off-curve by design, and
//! the chain itself is the final authority on whether an address exists.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::{PUBKEY_LENGTH, TOKEN_ACCOUNT_DOMAIN};

/// A base58 chain address.
///
/// Thin newtype over the string representation. Comparison and hashing
/// work on the canonical base58 form, which is what appears on the wire
/// and in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps a string without validation. Use [`is_valid`](Self::is_valid)
    /// before trusting user input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Encodes raw public key bytes as a base58 address.
    pub fn from_public_key_bytes(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    /// Structural validity: base58-decodes to exactly 32 bytes.
    pub fn is_valid(&self) -> bool {
        match bs58::decode(&self.0).into_vec() {
            Ok(bytes) => bytes.len() == PUBKEY_LENGTH,
            Err(_) => false,
        }
    }

    /// Decodes to raw bytes, or `None` when structurally invalid.
    pub fn to_bytes(&self) -> Option<[u8; PUBKEY_LENGTH]> {
        let decoded = bs58::decode(&self.0).into_vec().ok()?;
        decoded.as_slice().try_into().ok()
    }

    /// Derives the token account that holds `mint` tokens for this owner.
    ///
    /// Deterministic: SHA-256 over a domain tag, the owner's raw public
    /// key, and the mint's raw public key, re-encoded as base58. The same
    /// (owner, mint) pair always maps to the same account, so both sides
    /// of a transfer can compute it independently.
    ///
    /// Returns `None` when either address is structurally invalid.
    pub fn derive_token_account(&self, mint: &Address) -> Option<Address> {
        let owner = self.to_bytes()?;
        let mint_bytes = mint.to_bytes()?;

        let mut hasher = Sha256::new();
        hasher.update(TOKEN_ACCOUNT_DOMAIN);
        hasher.update(owner);
        hasher.update(mint_bytes);
        let digest: [u8; 32] = hasher.finalize().into();

        Some(Self::from_public_key_bytes(digest))
    }

    /// The base58 string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TOKEN_MINT;

    fn some_address() -> Address {
        Address::from_public_key_bytes([7u8; 32])
    }

    #[test]
    fn valid_address_roundtrips_through_bytes() {
        let addr = some_address();
        assert!(addr.is_valid());
        assert_eq!(addr.to_bytes(), Some([7u8; 32]));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(!Address::new("not-base58-0OIl").is_valid());
        assert!(!Address::new("").is_valid());
        // Valid base58 but wrong decoded length.
        assert!(!Address::new("abc").is_valid());
    }

    #[test]
    fn token_mint_constant_is_valid() {
        assert!(Address::new(TOKEN_MINT).is_valid());
    }

    #[test]
    fn token_account_derivation_is_deterministic() {
        let owner = some_address();
        let mint = Address::new(TOKEN_MINT);

        let a = owner.derive_token_account(&mint).unwrap();
        let b = owner.derive_token_account(&mint).unwrap();
        assert_eq!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn different_owners_get_different_token_accounts() {
        let mint = Address::new(TOKEN_MINT);
        let a = Address::from_public_key_bytes([1u8; 32])
            .derive_token_account(&mint)
            .unwrap();
        let b = Address::from_public_key_bytes([2u8; 32])
            .derive_token_account(&mint)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn token_account_differs_from_owner() {
        let owner = some_address();
        let derived = owner
            .derive_token_account(&Address::new(TOKEN_MINT))
            .unwrap();
        assert_ne!(derived, owner);
    }

    #[test]
    fn derivation_rejects_invalid_inputs() {
        let owner = some_address();
        assert!(owner.derive_token_account(&Address::new("junk")).is_none());
        assert!(Address::new("junk")
            .derive_token_account(&Address::new(TOKEN_MINT))
            .is_none());
    }
}
