//! # AES-256-GCM Key Sealing
//!
//! Authenticated encryption for custodial private keys. AES-GCM gives us
//! confidentiality and integrity in one pass, so a flipped bit anywhere in
//! a stored blob fails decryption instead of yielding a plausible-looking
//! wrong key — which, for signing keys, is the difference between an error
//! page and lost funds.
//!
//! ## Blob format
//!
//! `encrypt()` returns `nonce || ciphertext` as a single `Vec<u8>`: the
//! first 12 bytes are a fresh random nonce, the remainder is the
//! ciphertext with the 16-byte GCM tag appended. Each blob is therefore
//! self-describing and `decrypt()` needs nothing beyond the blob and the
//! process-wide key.
//!
//! ## Nonce discipline
//!
//! GCM is unforgiving about nonce reuse, so every encryption draws a
//! random 96-bit nonce from the OS CSPRNG. At the rate a wallet encrypts
//! keys (once per card creation) the birthday bound is not a concern.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{MasterSecret, VaultError};
use crate::config::AES_NONCE_LENGTH;

// ---------------------------------------------------------------------------
// SecretBytes
// ---------------------------------------------------------------------------

/// Decrypted key material with a guaranteed wipe.
///
/// The bytes are zeroized when the guard drops, so the plaintext key
/// lives exactly as long as the signing call that needed it. Do not clone
/// the contents out; `Clone` is deliberately not implemented.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Borrow the plaintext bytes for the duration of a signing call.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Length of the plaintext.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the plaintext is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.0.len())
    }
}

// ---------------------------------------------------------------------------
// KeyVault
// ---------------------------------------------------------------------------

/// Seals and unseals raw private-key bytes under the process-wide secret.
///
/// Stateless apart from the derived cipher key; safe to share behind an
/// `Arc` and call concurrently.
pub struct KeyVault {
    cipher: Aes256Gcm,
}

impl KeyVault {
    /// Builds a vault from the master secret.
    pub fn new(secret: &MasterSecret) -> Self {
        let cipher = Aes256Gcm::new_from_slice(secret.cipher_key())
            .expect("derived cipher key has the exact AES-256 length");
        Self { cipher }
    }

    /// Convenience constructor: read the secret from the environment.
    ///
    /// # Errors
    ///
    /// [`VaultError::MissingSecret`] when the environment variable is
    /// unset — fatal at startup.
    pub fn from_env() -> Result<Self, VaultError> {
        Ok(Self::new(&MasterSecret::from_env()?))
    }

    /// Encrypts raw key bytes into a self-describing blob.
    ///
    /// Returns `nonce || ciphertext+tag`. The blob is opaque to every
    /// other module: the custody layer stores it, the transfer engine
    /// hands it back, nobody parses it.
    pub fn encrypt(&self, raw_key: &[u8]) -> Result<Vec<u8>, VaultError> {
        let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, raw_key)
            .map_err(|_| VaultError::Corrupt)?;

        let mut blob = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// [`VaultError::Corrupt`] when the blob is too short, has been
    /// modified anywhere (nonce, ciphertext, or tag), or was sealed under
    /// a different secret. The cases are intentionally indistinguishable.
    pub fn decrypt(&self, blob: &[u8]) -> Result<SecretBytes, VaultError> {
        if blob.len() < AES_NONCE_LENGTH {
            return Err(VaultError::Corrupt);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(AES_NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::Corrupt)?;

        Ok(SecretBytes(plaintext))
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyVault(..)")
    }
}
