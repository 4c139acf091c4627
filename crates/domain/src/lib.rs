//! Domain building blocks for the balance sweeper: configuration, amounts and
//! transfer plans, account addresses, key derivation, transaction encoding,
//! and the traits the engine uses to reach the ledger and notification channel.

pub mod address;
pub mod config;
pub mod keys;
pub mod ledger;
pub mod model;
pub mod services;
pub mod transaction;

pub use address::{AccountAddress, AddressError};
pub use keys::{derive_keypair, DerivationPath, KeyError, Keypair, RecoveryPhrase};
pub use ledger::{LedgerClient, LedgerError, LedgerResult, Notifier};
pub use model::*;
pub use transaction::{NetworkId, PaymentTransaction, SignedTransaction};
