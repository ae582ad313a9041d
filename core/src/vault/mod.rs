//! # Vault Module — Key Material at Rest
//!
//! Every custodial private key ARCA holds is encrypted before it touches
//! disk and decrypted only transiently, inside the transfer engine, for
//! the duration of one signing operation. This module owns that boundary.
//!
//! ```text
//! secret.rs — the process-wide master secret and key derivation
//! cipher.rs — AES-256-GCM sealing/unsealing of raw key bytes
//! ```
//!
//! ## Contract
//!
//! - The master secret comes from the environment, is read once at
//!   startup, and is never mutated. A process without a secret must not
//!   serve any key-dependent route.
//! - Each encryption uses a fresh random nonce stored as a blob prefix,
//!   so every blob is self-describing: `nonce || ciphertext+tag`.
//! - Decrypted key bytes come back in a [`SecretBytes`] guard that
//!   zeroizes its contents on drop. Callers must not copy them out beyond
//!   the signing call.
//! - The vault never logs plaintext key material. Neither do you.

pub mod cipher;
pub mod secret;

pub use cipher::{KeyVault, SecretBytes};
pub use secret::MasterSecret;

use thiserror::Error;

/// Errors that can occur inside the vault.
///
/// Deliberately vague: the difference between "wrong key" and "truncated
/// blob" is nobody's business outside this module.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The process-wide encryption secret is not configured. Fatal — the
    /// process must refuse to serve key-dependent routes.
    #[error("wallet encryption secret is not set (expected in {0})")]
    MissingSecret(&'static str),

    /// A blob could not be parsed or decrypted: tampered, truncated, or
    /// encrypted under a different secret.
    #[error("encrypted key blob is corrupt or was sealed under a different secret")]
    Corrupt,
}
