// Copyright (c) 2026 ARCA Contributors. MIT License.
// See LICENSE for details.

//! # ARCA — Custodial Wallet Core
//!
//! The core library behind the ARCA wallet service: each user holds an
//! off-chain ledger balance in one fiat unit plus two chain-native assets
//! (the chain's base coin and a fungible token issued on it), and zero or
//! more custodially-held keypairs ("cards") that can move the chain assets
//! on-chain.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! custodial wallet:
//!
//! - **vault** — AES-256-GCM encryption of private key material at rest.
//!   Plaintext keys exist only transiently and are wiped on drop.
//! - **chain** — A thin, stateless facade over the external chain RPC:
//!   balance reads, address validation, signed transfer submission.
//! - **ledger** — The off-chain accounting state machine: three-asset
//!   wallet balances and an append-only transaction history, mutated only
//!   through one atomic operation.
//! - **custody** — Custodial accounts ("cards"): a generated keypair, an
//!   encrypted private key, spending limits, and a freeze switch.
//! - **transfer** — The signing and transfer engine: decrypt, build, sign,
//!   submit, report. Policy-agnostic and ledger-free by design.
//! - **service** — The orchestration layer that composes all of the above
//!   and enforces the one rule that matters: the ledger never shows a
//!   completed on-chain send that did not actually happen on-chain.
//! - **storage** — Persistent storage over sled.
//! - **config** — Constants and environment names.
//!
//! ## Design Philosophy
//!
//! 1. Money is decimal. Balances and amounts are exact fixed-scale
//!    decimals end to end — binary floating point never touches a balance.
//! 2. The chain is the source of truth for on-chain funds; the ledger is a
//!    mirror. Commit to the mirror only after the chain has confirmed.
//! 3. If it touches key material, it zeroizes. If it touches money, it has
//!    tests. Plural.

pub mod chain;
pub mod config;
pub mod custody;
pub mod ledger;
pub mod service;
pub mod storage;
pub mod transfer;
pub mod vault;
