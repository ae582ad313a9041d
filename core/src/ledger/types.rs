//! # Ledger Records
//!
//! The wallet record, the transaction record, and the asset arithmetic
//! that keeps decimal money exact.
//!
//! ## Invariants
//!
//! - Every amount is a `rust_decimal::Decimal`, quantized to the asset's
//!   scale on entry. Binary floats never touch money.
//! - Balances are non-negative. The ledger enforces it; these types just
//!   store what the ledger decided.
//! - `TransactionRecord.amount` is what the user asked for, not what the
//!   balance moved by. A clamped debit still records the requested amount.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{FIAT_SCALE, NATIVE_SCALE, TOKEN_SCALE};

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// The three balances a wallet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// Off-chain fiat balance. Two fractional digits, no chain presence.
    Fiat,
    /// The chain's native coin. Nine fractional digits.
    Native,
    /// The pinned fungible token. Six fractional digits.
    Token,
}

impl Asset {
    /// Fractional digits for this asset.
    pub fn scale(&self) -> u32 {
        match self {
            Asset::Fiat => FIAT_SCALE,
            Asset::Native => NATIVE_SCALE,
            Asset::Token => TOKEN_SCALE,
        }
    }

    /// Quantizes an amount to this asset's scale. Excess precision is
    /// rounded half-even, the usual choice for money.
    pub fn quantize(&self, amount: Decimal) -> Decimal {
        amount.round_dp(self.scale())
    }

    /// Converts a decimal amount to on-chain base units.
    ///
    /// Returns `None` for `Fiat` (no chain presence), for negative
    /// amounts, for amounts with sub-base-unit precision, and for
    /// amounts that overflow `u64`.
    pub fn to_base_units(&self, amount: Decimal) -> Option<u64> {
        if matches!(self, Asset::Fiat) {
            return None;
        }
        let factor = Decimal::from(10u64.pow(self.scale()));
        let scaled = amount.checked_mul(factor)?;
        if scaled.is_sign_negative() || !scaled.fract().is_zero() {
            return None;
        }
        scaled.to_u64()
    }

    /// Converts on-chain base units back to a decimal amount at this
    /// asset's scale. `Fiat` has no base units. Values past `i64::MAX`
    /// are unrepresentable and read as `None`, never as a negative.
    pub fn from_base_units(&self, base_units: u64) -> Option<Decimal> {
        if matches!(self, Asset::Fiat) {
            return None;
        }
        let units = i64::try_from(base_units).ok()?;
        Some(Decimal::new(units, self.scale()))
    }
}

// ---------------------------------------------------------------------------
// Transaction kinds and status
// ---------------------------------------------------------------------------

/// What a transaction record means for the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Outbound transfer. Debits.
    Send,
    /// Inbound transfer. Credits.
    Receive,
    /// Purchase or bill. Debits.
    Payment,
    /// Funding event. Credits.
    Topup,
    /// A request for money. Metadata only, never moves a balance.
    Request,
}

/// Which way a kind moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Balance goes down.
    Debit,
    /// Balance goes up.
    Credit,
    /// Record only.
    None,
}

impl TxKind {
    /// The balance direction of this kind. Fixed by the ledger contract.
    pub fn direction(&self) -> Direction {
        match self {
            TxKind::Send | TxKind::Payment => Direction::Debit,
            TxKind::Receive | TxKind::Topup => Direction::Credit,
            TxKind::Request => Direction::None,
        }
    }
}

/// Settlement status of a recorded transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Settled. The balance effect has been applied.
    Completed,
    /// In flight.
    Pending,
    /// Terminal failure.
    Failed,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Per-user wallet state: one balance per asset.
///
/// Created lazily with zero balances the first time a user is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Stable wallet identifier.
    pub id: Uuid,
    /// The owning user.
    pub user_id: String,
    /// Off-chain fiat balance. Never negative.
    pub fiat_balance: Decimal,
    /// Mirrored native coin balance. Never negative.
    pub native_balance: Decimal,
    /// Mirrored token balance. Never negative.
    pub token_balance: Decimal,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last balance change.
    pub updated_at: DateTime<Utc>,
}

impl WalletRecord {
    /// A fresh wallet with zero balances.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            fiat_balance: Decimal::ZERO,
            native_balance: Decimal::ZERO,
            token_balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// The balance for one asset.
    pub fn balance(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Fiat => self.fiat_balance,
            Asset::Native => self.native_balance,
            Asset::Token => self.token_balance,
        }
    }

    /// Replaces the balance for one asset and bumps `updated_at`.
    pub fn set_balance(&mut self, asset: Asset, value: Decimal) {
        match asset {
            Asset::Fiat => self.fiat_balance = value,
            Asset::Native => self.native_balance = value,
            Asset::Token => self.token_balance = value,
        }
        self.updated_at = Utc::now();
    }
}

/// Free-text context attached to a transaction record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMeta {
    /// The other party, as the client named them.
    pub counterparty: Option<String>,
    /// Sending card address for on-chain sends.
    pub sender_address: Option<String>,
    /// User note.
    pub note: Option<String>,
    /// Client-side category label.
    pub category: Option<String>,
}

/// One line of the append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Stable record identifier.
    pub id: Uuid,
    /// The owning user.
    pub user_id: String,
    /// Balance semantics of this record.
    pub kind: TxKind,
    /// Which balance it touched.
    pub asset: Asset,
    /// The requested amount, quantized. Positive.
    pub amount: Decimal,
    /// The other party, if the client named one.
    pub counterparty: Option<String>,
    /// Sending card address for on-chain sends.
    pub sender_address: Option<String>,
    /// User note.
    pub note: Option<String>,
    /// Client-side category label.
    pub category: Option<String>,
    /// Settlement status.
    pub status: TxStatus,
    /// Record time. Also the history sort key.
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Builds a record at the current time.
    pub fn new(
        user_id: impl Into<String>,
        kind: TxKind,
        asset: Asset,
        amount: Decimal,
        status: TxStatus,
        meta: TransactionMeta,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            asset,
            amount,
            counterparty: meta.counterparty,
            sender_address: meta.sender_address,
            note: meta.note,
            category: meta.category,
            status,
            created_at: Utc::now(),
        }
    }
}
