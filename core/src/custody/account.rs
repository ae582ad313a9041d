//! # Custodial Accounts
//!
//! The stored card record and its API-safe projection.
//!
//! ## Two shapes, one rule
//!
//! [`CustodialAccount`] is the storage record: it carries the encrypted
//! private key and is only ever bincode-encoded into sled. [`CardPublic`]
//! is what leaves the process. The encrypted blob does not appear in
//! `CardPublic` at all — omitting the field beats trusting every caller
//! to skip it.
//!
//! ## Limits
//!
//! Daily and monthly limits are stored and editable but not enforced by
//! any transfer path. They are client-display state.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::chain::Address;
use crate::config::{CARD_EXPIRY_YEARS, DEFAULT_DAILY_LIMIT, DEFAULT_MONTHLY_LIMIT};

/// A custodial card: one user-owned chain keypair plus card presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodialAccount {
    /// Stable card identifier.
    pub id: Uuid,
    /// The owning user. Every card operation checks this first.
    pub user_id: String,
    /// The card keypair's base58 chain address.
    pub public_address: Address,
    /// The card's private key, sealed by the vault. Opaque here.
    pub encrypted_private_key: Vec<u8>,
    /// Sixteen-digit display number. Presentation only, not a real PAN.
    pub card_number: String,
    /// Holder name as supplied at issue time.
    pub card_holder: String,
    /// Display expiry, `MM/YY`.
    pub expiry_date: String,
    /// Card class. Currently always `"virtual"`.
    pub card_type: String,
    /// Stored daily spending limit. Not enforced.
    pub daily_limit: Decimal,
    /// Stored monthly spending limit. Not enforced.
    pub monthly_limit: Decimal,
    /// Frozen cards refuse every outbound transfer.
    pub is_frozen: bool,
    /// Soft-delete flag.
    pub is_active: bool,
    /// Issue time.
    pub created_at: DateTime<Utc>,
}

impl CustodialAccount {
    /// Issues a card for a freshly generated keypair.
    ///
    /// The caller generates the keypair and seals the secret through the
    /// vault; this constructor only assembles the record.
    pub fn issue(
        user_id: impl Into<String>,
        card_holder: impl Into<String>,
        public_address: Address,
        encrypted_private_key: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            public_address,
            encrypted_private_key,
            card_number: generate_card_number(),
            card_holder: card_holder.into(),
            expiry_date: expiry_from(Utc::now()),
            card_type: "virtual".to_string(),
            daily_limit: Decimal::from_str(DEFAULT_DAILY_LIMIT)
                .unwrap_or(Decimal::ZERO),
            monthly_limit: Decimal::from_str(DEFAULT_MONTHLY_LIMIT)
                .unwrap_or(Decimal::ZERO),
            is_frozen: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// The card shape that leaves the process. No key material, sealed or
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPublic {
    /// Stable card identifier.
    pub id: Uuid,
    /// The owning user.
    pub user_id: String,
    /// The card's chain address.
    pub public_address: Address,
    /// Sixteen-digit display number.
    pub card_number: String,
    /// Holder name.
    pub card_holder: String,
    /// Display expiry, `MM/YY`.
    pub expiry_date: String,
    /// Card class.
    pub card_type: String,
    /// Stored daily limit.
    pub daily_limit: Decimal,
    /// Stored monthly limit.
    pub monthly_limit: Decimal,
    /// Whether the card is frozen.
    pub is_frozen: bool,
    /// Whether the card is active.
    pub is_active: bool,
    /// Issue time.
    pub created_at: DateTime<Utc>,
}

impl From<&CustodialAccount> for CardPublic {
    fn from(account: &CustodialAccount) -> Self {
        Self {
            id: account.id,
            user_id: account.user_id.clone(),
            public_address: account.public_address.clone(),
            card_number: account.card_number.clone(),
            card_holder: account.card_holder.clone(),
            expiry_date: account.expiry_date.clone(),
            card_type: account.card_type.clone(),
            daily_limit: account.daily_limit,
            monthly_limit: account.monthly_limit,
            is_frozen: account.is_frozen,
            is_active: account.is_active,
            created_at: account.created_at,
        }
    }
}

/// Sixteen random decimal digits.
fn generate_card_number() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

/// `MM/YY` a fixed number of years past `now`.
fn expiry_from(now: DateTime<Utc>) -> String {
    let year = now.year() + CARD_EXPIRY_YEARS;
    format!("{:02}/{:02}", now.month(), year % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issue_test_card() -> CustodialAccount {
        CustodialAccount::issue(
            "user-1",
            "Ada Lovelace",
            Address::from_public_key_bytes([7u8; 32]),
            vec![0xDE, 0xAD],
        )
    }

    #[test]
    fn fresh_card_defaults() {
        let card = issue_test_card();
        assert_eq!(card.card_type, "virtual");
        assert!(!card.is_frozen);
        assert!(card.is_active);
        assert_eq!(card.daily_limit, Decimal::from(1000));
        assert_eq!(card.monthly_limit, Decimal::from(10000));
    }

    #[test]
    fn card_number_is_sixteen_digits() {
        let card = issue_test_card();
        assert_eq!(card.card_number.len(), 16);
        assert!(card.card_number.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn card_numbers_vary() {
        let a = issue_test_card();
        let b = issue_test_card();
        // 10^16 possibilities; a collision here means a broken RNG.
        assert_ne!(a.card_number, b.card_number);
    }

    #[test]
    fn expiry_is_three_years_out() {
        let issued = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();
        assert_eq!(expiry_from(issued), "08/29");

        let december = Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(expiry_from(december), "12/29");
    }

    #[test]
    fn public_view_has_no_key_material() {
        let card = issue_test_card();
        let view = CardPublic::from(&card);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("encrypted_private_key"));
        assert!(!json.contains("dead"));
        assert_eq!(view.id, card.id);
        assert_eq!(view.public_address, card.public_address);
    }

    #[test]
    fn storage_record_keeps_the_sealed_key() {
        let card = issue_test_card();
        let bytes = bincode::serialize(&card).unwrap();
        let back: CustodialAccount = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.encrypted_private_key, vec![0xDE, 0xAD]);
        assert_eq!(back, card);
    }
}
