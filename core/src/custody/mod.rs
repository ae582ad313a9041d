//! # Custody
//!
//! Custodial accounts ("cards"): the service-held keypairs that move
//! chain assets on a user's behalf.
//!
//! A card pairs a chain keypair with card-shaped presentation: a display
//! number, a holder name, an expiry date, spending limits. The private
//! key is stored only as a vault-sealed blob and never appears in any
//! API-facing shape.

pub mod account;

pub use account::{CardPublic, CustodialAccount};
