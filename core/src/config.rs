//! # Configuration & Constants
//!
//! Every magic number in ARCA lives here. Balance scales, cipher sizes,
//! wire timeouts, environment variable names — if you find one hardcoded
//! anywhere else, move it.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Asset Scales
// ---------------------------------------------------------------------------

/// Fractional digits for the fiat balance. Cents.
pub const FIAT_SCALE: u32 = 2;

/// Fractional digits for the native coin. The chain's base unit is
/// one billionth of a coin, so every native amount carries nine digits.
pub const NATIVE_SCALE: u32 = 9;

/// Fractional digits for the token asset. The token mint is configured
/// with six decimals, the common choice for fiat-pegged tokens.
pub const TOKEN_SCALE: u32 = 6;

/// Base units per native coin (10^9).
pub const NATIVE_UNITS_PER_COIN: u64 = 1_000_000_000;

/// Base units per whole token (10^6).
pub const TOKEN_UNITS_PER_TOKEN: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Chain Parameters
// ---------------------------------------------------------------------------

/// The fixed identity of the token mint this wallet moves. Everything in
/// the token path — balance reads, account derivation, transfers — is
/// pinned to this one mint.
pub const TOKEN_MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

/// Default chain RPC endpoint when none is configured.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";

/// Ed25519 public keys are 32 bytes; addresses are their base58 encoding.
pub const PUBKEY_LENGTH: usize = 32;

/// Ed25519 secret keys are 32 bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Domain-separation prefix for deriving an owner's token-holding account
/// address from the owner key and the token mint. Changing this orphans
/// every existing token account, so don't.
pub const TOKEN_ACCOUNT_DOMAIN: &[u8] = b"arca:token-account";

/// Upper bound on the whole submit-and-confirm exchange with the RPC
/// endpoint. Expiry is reported as a retryable `Unavailable`, never as
/// success.
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(45);

/// Connect/read timeout for plain balance queries.
pub const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Vault Parameters
// ---------------------------------------------------------------------------

/// Environment variable holding the process-wide wallet encryption secret.
/// Must be set before the first request; a missing secret is fatal for the
/// key-dependent surface.
pub const WALLET_SECRET_ENV: &str = "ARCA_WALLET_SECRET";

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. 96 bits, the standard GCM nonce
/// size and the only one we use.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Custody Parameters
// ---------------------------------------------------------------------------

/// Default daily spending limit assigned to a fresh card, in fiat units.
pub const DEFAULT_DAILY_LIMIT: &str = "1000";

/// Default monthly spending limit assigned to a fresh card, in fiat units.
pub const DEFAULT_MONTHLY_LIMIT: &str = "10000";

/// Years until a freshly issued card's display expiry date.
pub const CARD_EXPIRY_YEARS: i32 = 3;
