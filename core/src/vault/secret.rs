//! # Master Secret
//!
//! The single symmetric secret that protects every custodial key at rest.
//! It is provisioned through the execution environment (see
//! [`config::WALLET_SECRET_ENV`](crate::config::WALLET_SECRET_ENV)),
//! read exactly once at startup, and stretched into a 256-bit cipher key
//! with SHA-256.
//!
//! The passphrase itself can be any non-empty string; the derivation makes
//! the cipher key uniform regardless of passphrase shape. The derived key
//! is zeroized when the [`MasterSecret`] is dropped.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::VaultError;
use crate::config::{AES_KEY_LENGTH, WALLET_SECRET_ENV};

/// The process-wide wallet encryption secret, already derived into a
/// 256-bit AES key.
///
/// Construct once in `main()` and hand to [`KeyVault`](super::KeyVault).
/// There is intentionally no way to read the passphrase back out.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    key: [u8; AES_KEY_LENGTH],
}

impl MasterSecret {
    /// Reads the secret from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingSecret`] when the variable is unset or
    /// empty. Treat this as fatal at startup: a wallet service that cannot
    /// decrypt its keys has no business accepting transfer requests.
    pub fn from_env() -> Result<Self, VaultError> {
        match std::env::var(WALLET_SECRET_ENV) {
            Ok(s) if !s.is_empty() => Ok(Self::from_passphrase(&s)),
            _ => Err(VaultError::MissingSecret(WALLET_SECRET_ENV)),
        }
    }

    /// Derives the cipher key from an explicit passphrase.
    ///
    /// Exposed for tests and for deployments that source the secret from
    /// something other than a plain environment variable.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        let digest = hasher.finalize();

        let mut key = [0u8; AES_KEY_LENGTH];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// The derived 256-bit cipher key. Crate-private: only the cipher
    /// needs it, and it stays that way.
    pub(crate) fn cipher_key(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even partially.
        write!(f, "MasterSecret(..)")
    }
}
