//! Chip ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::entities::PlayerId;

/// Why a player's balance changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCause {
    BuyIn,
    Rebuy,
    CashOut,
    TournamentBuyIn,
    TournamentRefund,
    TournamentPrize,
    Bonus,
    AdminAdjust,
}

impl std::fmt::Display for TransactionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionCause::BuyIn => write!(f, "buy_in"),
            TransactionCause::Rebuy => write!(f, "rebuy"),
            TransactionCause::CashOut => write!(f, "cash_out"),
            TransactionCause::TournamentBuyIn => write!(f, "tournament_buy_in"),
            TransactionCause::TournamentRefund => write!(f, "tournament_refund"),
            TransactionCause::TournamentPrize => write!(f, "tournament_prize"),
            TransactionCause::Bonus => write!(f, "bonus"),
            TransactionCause::AdminAdjust => write!(f, "admin_adjust"),
        }
    }
}

impl std::str::FromStr for TransactionCause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy_in" => Ok(TransactionCause::BuyIn),
            "rebuy" => Ok(TransactionCause::Rebuy),
            "cash_out" => Ok(TransactionCause::CashOut),
            "tournament_buy_in" => Ok(TransactionCause::TournamentBuyIn),
            "tournament_refund" => Ok(TransactionCause::TournamentRefund),
            "tournament_prize" => Ok(TransactionCause::TournamentPrize),
            "bonus" => Ok(TransactionCause::Bonus),
            "admin_adjust" => Ok(TransactionCause::AdminAdjust),
            other => Err(format!("unknown transaction cause '{other}'")),
        }
    }
}

/// Immutable ledger entry. The only way a persistent balance changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipTransaction {
    pub id: i64,
    pub player_id: PlayerId,
    /// Signed: negative for debits
    pub amount: i64,
    pub balance_after: i64,
    pub cause: TransactionCause,
    /// Game the movement relates to, e.g. `cash-game-3`
    pub reference: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry to be recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub player_id: PlayerId,
    pub amount: i64,
    pub cause: TransactionCause,
    pub reference: Option<String>,
    pub idempotency_key: String,
}
