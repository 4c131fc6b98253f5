//! Persistent chip balances.
//!
//! Every balance change is a [`ChipTransaction`] recorded atomically by the
//! repository with an idempotency key, so retried buy-ins or cash-outs are
//! never applied twice.

pub mod manager;
pub mod models;

pub use manager::ChipLedger;
pub use models::{ChipTransaction, NewTransaction, TransactionCause};
