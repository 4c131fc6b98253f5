//! Tournament data models for Sit-n-Go tournaments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{
    game::{
        constants::{DEFAULT_COUNTDOWN_SECS, DEFAULT_LEVEL_DURATION_SECS, MAX_PLAYERS, MIN_PLAYERS},
        entities::{Blinds, Chips, PlayerId, TableId},
    },
    table::config::TableSpeed,
};

/// Tournament ID type
pub type TournamentId = i64;

/// Tournament state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentState {
    /// Accepting registrations (a countdown may be running)
    Registering,
    /// Tournament in progress
    Running,
    /// One player left
    Complete,
    /// Cancelled before start; buy-ins refunded
    Cancelled,
}

impl std::fmt::Display for TournamentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TournamentState::Registering => write!(f, "registering"),
            TournamentState::Running => write!(f, "running"),
            TournamentState::Complete => write!(f, "complete"),
            TournamentState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Blind structure for tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindLevel {
    /// Level number (1-indexed)
    pub level: u32,
    /// Small blind amount
    pub small_blind: Chips,
    /// Big blind amount
    pub big_blind: Chips,
    /// Ante amount (optional)
    pub ante: Option<Chips>,
    /// Duration of this level in seconds
    pub duration_secs: u64,
}

impl BlindLevel {
    /// Create a new blind level
    pub fn new(level: u32, small_blind: Chips, big_blind: Chips, duration_secs: u64) -> Self {
        Self {
            level,
            small_blind,
            big_blind,
            ante: None,
            duration_secs,
        }
    }

    /// Create a blind level with ante
    pub fn with_ante(mut self, ante: Chips) -> Self {
        self.ante = Some(ante);
        self
    }

    pub fn blinds(&self) -> Blinds {
        Blinds {
            small: self.small_blind,
            big: self.big_blind,
            ante: self.ante.unwrap_or(0),
        }
    }
}

/// Prize structure for tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeStructure {
    /// Total prize pool
    pub total_pool: i64,
    /// Payouts by position (1st, 2nd, 3rd, etc.)
    pub payouts: Vec<i64>,
}

impl PrizeStructure {
    /// Create standard prize structure for given number of players
    ///
    /// Standard structures:
    /// - 2-5 players: Winner takes all
    /// - 6-9 players: 60/40 split
    /// - 10+ players: 50/30/20 split
    ///
    /// Chips lost to integer division go to first place, so the payouts
    /// always sum to the pool.
    pub fn standard(total_players: usize, buy_in: i64) -> Self {
        let total_pool = (total_players as i64) * buy_in;
        let percentages: &[i64] = match total_players {
            0..=5 => &[100],
            6..=9 => &[60, 40],
            _ => &[50, 30, 20],
        };
        let mut payouts: Vec<i64> = percentages
            .iter()
            .map(|pct| total_pool * pct / 100)
            .collect();
        let remainder = total_pool - payouts.iter().sum::<i64>();
        if let Some(first) = payouts.first_mut() {
            *first += remainder;
        }

        Self {
            total_pool,
            payouts,
        }
    }

    /// Get payout for a specific position (1-indexed)
    pub fn payout_for_position(&self, position: usize) -> Option<i64> {
        if position == 0 {
            return None;
        }
        self.payouts.get(position - 1).copied()
    }
}

/// Tournament configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentConfig {
    /// Tournament name
    pub name: String,
    /// Buy-in amount, debited from the ledger at registration
    pub buy_in: i64,
    /// Minimum players required to start
    pub min_players: usize,
    /// Maximum players allowed; reaching it starts the countdown
    pub max_players: usize,
    /// Seats per table
    pub table_size: usize,
    /// Starting chip stack for each player
    pub starting_stack: Chips,
    /// Blind level structure
    pub blind_levels: Vec<BlindLevel>,
    /// Countdown length once started
    pub countdown_secs: u64,
    /// Start as soon as every registrant has marked ready
    pub ready_check: bool,
    /// Turn clock on the tournament's tables
    pub speed: TableSpeed,
}

impl TournamentConfig {
    /// Create a standard Sit-n-Go configuration
    pub fn sit_and_go(name: String, max_players: usize, buy_in: i64) -> Self {
        let d = DEFAULT_LEVEL_DURATION_SECS;
        let blind_levels = vec![
            BlindLevel::new(1, 10, 20, d),
            BlindLevel::new(2, 15, 30, d),
            BlindLevel::new(3, 20, 40, d),
            BlindLevel::new(4, 30, 60, d),
            BlindLevel::new(5, 40, 80, d).with_ante(10),
            BlindLevel::new(6, 60, 120, d).with_ante(15),
            BlindLevel::new(7, 80, 160, d).with_ante(20),
            BlindLevel::new(8, 120, 240, d).with_ante(30),
            BlindLevel::new(9, 160, 320, d).with_ante(40),
            BlindLevel::new(10, 240, 480, d).with_ante(60),
        ];

        Self {
            name,
            buy_in,
            min_players: MIN_PLAYERS,
            max_players,
            table_size: max_players.clamp(MIN_PLAYERS, 9),
            starting_stack: 1_500,
            blind_levels,
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            ready_check: false,
            speed: TableSpeed::Normal,
        }
    }

    /// Create a turbo Sit-n-Go (faster blind increases)
    pub fn turbo_sit_and_go(name: String, max_players: usize, buy_in: i64) -> Self {
        let mut config = Self::sit_and_go(name, max_players, buy_in);
        // Turbo: 3-minute levels
        for level in &mut config.blind_levels {
            level.duration_secs = 180;
        }
        config.speed = TableSpeed::Turbo;
        config
    }

    /// Get blind level by number
    pub fn get_blind_level(&self, level: u32) -> Option<&BlindLevel> {
        self.blind_levels.iter().find(|bl| bl.level == level)
    }

    /// Blinds for `level`, holding at the last defined level once the
    /// structure runs out.
    pub fn blinds_at(&self, level: u32) -> Blinds {
        self.get_blind_level(level)
            .or_else(|| self.blind_levels.last())
            .map(BlindLevel::blinds)
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.buy_in < 0 {
            return Err("Buy-in cannot be negative".to_string());
        }

        if self.min_players < MIN_PLAYERS {
            return Err(format!("Minimum players must be at least {MIN_PLAYERS}"));
        }

        if self.max_players < self.min_players {
            return Err("Max players must be at least min players".to_string());
        }

        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.table_size) {
            return Err(format!(
                "Table size must be between {MIN_PLAYERS} and {MAX_PLAYERS}"
            ));
        }

        if self.starting_stack == 0 {
            return Err("Starting stack must be greater than 0".to_string());
        }

        // Every chip in the field may end up at one table.
        let field = u64::from(self.starting_stack).saturating_mul(self.max_players as u64);
        if field > u64::from(Chips::MAX) {
            return Err(format!(
                "Starting stack times max players cannot exceed {}",
                Chips::MAX
            ));
        }

        if self.blind_levels.is_empty() {
            return Err("At least one blind level is required".to_string());
        }

        if self
            .blind_levels
            .iter()
            .any(|bl| bl.small_blind == 0 || bl.big_blind <= bl.small_blind || bl.duration_secs == 0)
        {
            return Err("Every blind level needs 0 < small < big and a duration".to_string());
        }

        if self.countdown_secs == 0 {
            return Err("Countdown must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// A running pre-start countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
}

impl Countdown {
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + chrono::TimeDelta::seconds(self.duration_secs as i64)
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }
}

/// Tournament registration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRegistration {
    pub player_id: PlayerId,
    pub registered_at: DateTime<Utc>,
    /// Marked ready for the ready-check start
    pub ready: bool,
    /// Finishing position (None while still playing)
    pub finish_position: Option<usize>,
    /// Prize paid (None if not in the money)
    pub prize_amount: Option<i64>,
}

/// Final placing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub player_id: PlayerId,
    pub position: usize,
    pub prize: i64,
}

/// Persistent tournament record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub creator: PlayerId,
    pub config: TournamentConfig,
    pub state: TournamentState,
    pub registrations: Vec<TournamentRegistration>,
    pub current_level: u32,
    pub players_remaining: usize,
    pub countdown: Option<Countdown>,
    /// Early-start vote, open while `Some`
    pub early_start_votes: Option<BTreeSet<PlayerId>>,
    pub tables: Vec<TableId>,
    pub prize_structure: Option<PrizeStructure>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub level_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Tournament {
    pub fn new(id: TournamentId, creator: PlayerId, config: TournamentConfig) -> Self {
        Self {
            id,
            creator,
            config,
            state: TournamentState::Registering,
            registrations: Vec::new(),
            current_level: 1,
            players_remaining: 0,
            countdown: None,
            early_start_votes: None,
            tables: Vec::new(),
            prize_structure: None,
            created_at: Utc::now(),
            started_at: None,
            level_started_at: None,
            completed_at: None,
        }
    }

    pub fn is_registered(&self, player_id: PlayerId) -> bool {
        self.registrations.iter().any(|r| r.player_id == player_id)
    }

    pub fn registered_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn registration_mut(&mut self, player_id: PlayerId) -> Option<&mut TournamentRegistration> {
        self.registrations
            .iter_mut()
            .find(|r| r.player_id == player_id)
    }

    pub fn current_blinds(&self) -> Blinds {
        self.config.blinds_at(self.current_level)
    }

    /// Placings so far, best first.
    pub fn standings(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> = self
            .registrations
            .iter()
            .filter_map(|r| {
                r.finish_position.map(|position| Standing {
                    player_id: r.player_id,
                    position,
                    prize: r.prize_amount.unwrap_or(0),
                })
            })
            .collect();
        standings.sort_by_key(|s| s.position);
        standings
    }
}
