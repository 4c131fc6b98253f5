//! Cash games: one table, chips bought in from and cashed out to the
//! player's ledger balance.

pub mod manager;
pub mod models;

pub use manager::CashGameManager;
pub use models::{CashGame, CashGameConfig, CashGameId, CashGameStatus};
