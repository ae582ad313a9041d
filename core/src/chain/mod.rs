//! # Chain Access Layer
//!
//! Everything that touches the settlement chain lives here: keypairs,
//! addresses, the async client trait, the JSON-RPC transport, and a mock
//! client for tests.
//!
//! The chain is the source of truth for on-chain balances. The rest of
//! the crate treats it as an async oracle behind [`ChainClient`] and never
//! assumes a particular backend — the HTTP client and the in-memory mock
//! are interchangeable.
//!
//! ## Module Map
//!
//! | Module     | Responsibility                                      |
//! |-----------|-----------------------------------------------------|
//! | `keys`     | Ed25519 keypairs for custodial accounts             |
//! | `address`  | Base58 addresses and token-account derivation       |
//! | `client`   | The `ChainClient` trait and `ChainError`            |
//! | `rpc`      | JSON-RPC 2.0 envelope types and the HTTP transport  |
//! | `mock`     | Scriptable in-memory chain for tests                |

pub mod address;
pub mod client;
pub mod keys;
pub mod mock;
pub mod rpc;

pub use address::Address;
pub use client::{ChainClient, ChainError, Submission};
pub use keys::ChainKeypair;
pub use mock::MockChainClient;
pub use rpc::HttpChainClient;
