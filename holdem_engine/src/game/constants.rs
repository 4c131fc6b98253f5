//! Engine-wide constants.

use super::entities::Chips;

/// Seats per table. 10 players use 20 hole cards + 5 board cards.
pub const MAX_PLAYERS: usize = 10;

/// Players needed to deal a hand or start a tournament.
pub const MIN_PLAYERS: usize = 2;

/// Largest cash buy-in; a full table of them still fits in `Chips`.
pub const MAX_BUY_IN: Chips = Chips::MAX / MAX_PLAYERS as Chips;

pub const HOLE_CARDS: usize = 2;
pub const MAX_BOARD_CARDS: usize = 5;

/// Sit-n-go countdown once the creator starts it or the field fills.
pub const DEFAULT_COUNTDOWN_SECS: u64 = 20;

pub const DEFAULT_LEVEL_DURATION_SECS: u64 = 300;

/// Events retained per table for poll reconciliation.
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 512;

/// Pause between the end of one hand and the deal of the next.
pub const DEFAULT_NEXT_HAND_DELAY_MS: u64 = 2_000;

pub const DEFAULT_TABLE_INBOX_CAPACITY: usize = 100;
