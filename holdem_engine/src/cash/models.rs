//! Cash game data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    game::{
        constants::{MAX_BUY_IN, MAX_PLAYERS, MIN_PLAYERS},
        entities::{Chips, PlayerId, TableId},
    },
    table::config::{TableConfig, TableSpeed},
};

pub type CashGameId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashGameStatus {
    /// Created, waiting for a second player
    Open,
    /// Hands are being dealt
    Running,
    Closed,
}

impl std::fmt::Display for CashGameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CashGameStatus::Open => write!(f, "open"),
            CashGameStatus::Running => write!(f, "running"),
            CashGameStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashGameConfig {
    pub name: String,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub ante: Chips,
    pub min_buy_in: Chips,
    pub max_buy_in: Chips,
    pub max_players: usize,
    pub speed: TableSpeed,
}

impl Default for CashGameConfig {
    fn default() -> Self {
        Self {
            name: "Cash Game".to_string(),
            small_blind: 10,
            big_blind: 20,
            ante: 0,
            min_buy_in: 400,
            max_buy_in: 2_000,
            max_players: 9,
            speed: TableSpeed::Normal,
        }
    }
}

impl CashGameConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.table_config().validate()?;

        if self.min_buy_in < self.big_blind {
            return Err("Min buy-in must cover at least one big blind".to_string());
        }

        if self.max_buy_in < self.min_buy_in {
            return Err("Max buy-in must be at least min buy-in".to_string());
        }

        if self.max_buy_in > MAX_BUY_IN {
            return Err(format!("Max buy-in cannot exceed {MAX_BUY_IN}"));
        }

        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.max_players) {
            return Err(format!(
                "Max players must be between {MIN_PLAYERS} and {MAX_PLAYERS}"
            ));
        }

        Ok(())
    }

    /// Configuration of the game's single table
    pub fn table_config(&self) -> TableConfig {
        TableConfig {
            name: self.name.clone(),
            max_players: self.max_players,
            small_blind: self.small_blind,
            big_blind: self.big_blind,
            ante: self.ante,
            speed: self.speed,
            auto_deal: true,
        }
    }
}

/// Persistent cash game record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashGame {
    pub id: CashGameId,
    pub creator: PlayerId,
    pub config: CashGameConfig,
    pub status: CashGameStatus,
    pub table_id: TableId,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CashGameConfig::default().validate().is_ok());
    }

    #[test]
    fn test_buy_in_bounds_checked() {
        let config = CashGameConfig {
            min_buy_in: 1_000,
            max_buy_in: 500,
            ..CashGameConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CashGameConfig {
            min_buy_in: 10,
            ..CashGameConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CashGameConfig {
            max_buy_in: MAX_BUY_IN + 1,
            ..CashGameConfig::default()
        };
        assert!(config.validate().is_err());
        let config = CashGameConfig {
            max_buy_in: MAX_BUY_IN,
            ..CashGameConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_table_config_mirrors_blinds() {
        let config = CashGameConfig {
            ante: 5,
            ..CashGameConfig::default()
        };
        let table = config.table_config();
        assert_eq!(table.blinds().ante, 5);
        assert_eq!(table.max_players, 9);
        assert!(table.auto_deal);
    }
}
