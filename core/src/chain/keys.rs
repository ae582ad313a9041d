//! # Custodial Keypairs
//!
//! Ed25519 keypair generation and signing for custodial accounts.
//!
//! Every card the service issues owns exactly one of these. The secret
//! half never leaves the process unencrypted — it goes straight into the
//! vault at creation time and comes back out only for the duration of a
//! signing call.
//!
//! ## Security considerations
//!
//! - Key generation uses the OS CSPRNG (`OsRng`). If that is broken,
//!   custodial keys are the least of your worries.
//! - Key bytes are never logged. If you add logging to this module,
//!   you will be asked to leave.

use ed25519_dalek::{Signature, Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::address::Address;

/// Errors from keypair reconstruction.
///
/// Intentionally vague about *why* the bytes were bad — leaking details
/// about key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The supplied secret key bytes have the wrong length.
    #[error("invalid secret key bytes: expected {SECRET_KEY_LENGTH} bytes")]
    InvalidSecretKey,
}

/// An Ed25519 keypair backing a custodial account.
///
/// The `SigningKey` is the crown jewel. `ChainKeypair` intentionally does
/// NOT implement `Serialize`/`Deserialize` — persisting a private key is a
/// deliberate act that goes through the vault, not something that happens
/// because someone shoved a keypair into a JSON response. Use
/// `secret_key_bytes()` explicitly and encrypt the result.
pub struct ChainKeypair {
    signing_key: SigningKey,
}

impl ChainKeypair {
    /// Generates a fresh keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a keypair from raw 32-byte secret key material.
    ///
    /// The public key is re-derived from the secret, so the pair is
    /// consistent by construction.
    pub fn from_secret_key_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let seed: [u8; SECRET_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// The on-chain address of this keypair: base58 of the public key.
    pub fn address(&self) -> Address {
        Address::from_public_key_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Raw public key bytes. Safe to share, log, tattoo on your arm.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Exports the raw 32-byte secret key material.
    ///
    /// **Handle with extreme care.** The only legitimate consumer is the
    /// vault, immediately after generation. Don't log it. Don't send it
    /// anywhere in plaintext.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Signs a message. Ed25519 signatures are deterministic — no nonce
    /// management, no RNG needed at signing time.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl fmt::Debug for ChainKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material in debug output. Not even
        // "partially" — a partial leak is still a leak.
        write!(f, "ChainKeypair(addr={})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Verifier, VerifyingKey};

    #[test]
    fn generate_produces_valid_keypair() {
        let kp = ChainKeypair::generate();
        assert_eq!(kp.public_key_bytes().len(), 32);
        assert_eq!(kp.secret_key_bytes().len(), 32);
    }

    #[test]
    fn two_generated_keypairs_are_different() {
        // If this fails, your RNG is broken and you should panic (the
        // emotion, not the macro). Well, actually, both.
        let a = ChainKeypair::generate();
        let b = ChainKeypair::generate();
        assert_ne!(a.public_key_bytes(), b.public_key_bytes());
    }

    #[test]
    fn secret_key_roundtrip() {
        let kp = ChainKeypair::generate();
        let restored = ChainKeypair::from_secret_key_bytes(&kp.secret_key_bytes()).unwrap();
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
        assert_eq!(kp.address(), restored.address());
    }

    #[test]
    fn wrong_length_secret_is_rejected() {
        assert!(ChainKeypair::from_secret_key_bytes(&[0u8; 16]).is_err());
        assert!(ChainKeypair::from_secret_key_bytes(&[0u8; 64]).is_err());
        assert!(ChainKeypair::from_secret_key_bytes(&[]).is_err());
    }

    #[test]
    fn signatures_verify_against_public_key() {
        let kp = ChainKeypair::generate();
        let msg = b"transfer 1.5 to destination";
        let sig = kp.sign(msg);

        let vk = VerifyingKey::from_bytes(&kp.public_key_bytes()).unwrap();
        assert!(vk.verify(msg, &sig).is_ok());
        assert!(vk.verify(b"a different message", &sig).is_err());
    }

    #[test]
    fn signatures_are_deterministic() {
        let kp = ChainKeypair::generate();
        let s1 = kp.sign(b"same message");
        let s2 = kp.sign(b"same message");
        assert_eq!(s1.to_bytes(), s2.to_bytes());
    }

    #[test]
    fn address_is_valid_base58_of_public_key() {
        let kp = ChainKeypair::generate();
        let decoded = bs58::decode(kp.address().as_str()).into_vec().unwrap();
        assert_eq!(decoded, kp.public_key_bytes());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = ChainKeypair::generate();
        let rendered = format!("{:?}", kp);
        assert!(rendered.starts_with("ChainKeypair(addr="));
        assert!(!rendered.contains(&hex::encode(kp.secret_key_bytes())));
    }
}
