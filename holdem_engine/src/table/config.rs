//! Table configuration models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::{
    constants::{MAX_PLAYERS, MIN_PLAYERS},
    entities::{Blinds, Chips},
};

/// Turn clock presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSpeed {
    Normal,
    Turbo,
    Hyper,
    /// No turn clock; the table waits for every player.
    Unlimited,
    /// Turn clock in milliseconds.
    Custom(u64),
}

impl std::fmt::Display for TableSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableSpeed::Normal => write!(f, "normal"),
            TableSpeed::Turbo => write!(f, "turbo"),
            TableSpeed::Hyper => write!(f, "hyper"),
            TableSpeed::Unlimited => write!(f, "unlimited"),
            TableSpeed::Custom(ms) => write!(f, "custom ({ms}ms)"),
        }
    }
}

/// Table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name
    pub name: String,

    /// Seat capacity (2-10)
    pub max_players: usize,

    /// Small blind amount
    pub small_blind: Chips,

    /// Big blind amount
    pub big_blind: Chips,

    /// Per-player ante, zero for none
    pub ante: Chips,

    /// Turn clock
    pub speed: TableSpeed,

    /// Deal the next hand automatically once one completes
    pub auto_deal: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "Default Table".to_string(),
            max_players: 9,
            small_blind: 10,
            big_blind: 20,
            ante: 0,
            speed: TableSpeed::Normal,
            auto_deal: true,
        }
    }
}

impl TableConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.small_blind == 0 {
            return Err("Small blind must be greater than 0".to_string());
        }

        if self.big_blind <= self.small_blind {
            return Err("Big blind must be greater than small blind".to_string());
        }

        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.max_players) {
            return Err(format!(
                "Max players must be between {MIN_PLAYERS} and {MAX_PLAYERS}"
            ));
        }

        if let TableSpeed::Custom(ms) = self.speed
            && ms < 1_000
        {
            return Err("Custom turn clock must be at least 1000ms".to_string());
        }

        Ok(())
    }

    pub fn blinds(&self) -> Blinds {
        Blinds {
            small: self.small_blind,
            big: self.big_blind,
            ante: self.ante,
        }
    }

    /// Turn clock for this table, `None` when unlimited
    pub fn action_timeout(&self) -> Option<Duration> {
        match self.speed {
            TableSpeed::Normal => Some(Duration::from_secs(30)),
            TableSpeed::Turbo => Some(Duration::from_secs(15)),
            TableSpeed::Hyper => Some(Duration::from_secs(5)),
            TableSpeed::Unlimited => None,
            TableSpeed::Custom(ms) => Some(Duration::from_millis(ms)),
        }
    }
}
