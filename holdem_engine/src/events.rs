//! Engine events and the per-table event log.
//!
//! Every event is wrapped in an [`EventEnvelope`] carrying a sequence
//! number and a random idempotency key so clients can deduplicate events
//! that arrive both by push and by poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::{
    cash::CashGameId,
    game::{
        entities::{Blinds, Card, Chips, PlayerId, SeatIndex, SubHand, TableId},
        hand::{ActionRecord, BlindPost, HandId, HandPhase, HandResult},
        pot::{PotAward, SidePot},
    },
    tournament::{Standing, TournamentId},
};

pub fn table_channel(id: TableId) -> String {
    format!("table-{id}")
}

pub fn tournament_channel(id: TournamentId) -> String {
    format!("tournament-{id}")
}

pub fn cash_game_channel(id: CashGameId) -> String {
    format!("cash-game-{id}")
}

/// Event names as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    HandStarted,
    Action,
    PotUpdated,
    StreetDealt,
    TurnStarted,
    CardsShown,
    Showdown,
    HandComplete,
    PlayerSeated,
    PlayerLeft,
    TournamentCreated,
    TournamentStarted,
    LevelAdvanced,
    PlayerEliminated,
    TournamentComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    HandStarted {
        table_id: TableId,
        hand_id: HandId,
        hand_number: u64,
        dealer_seat: SeatIndex,
        small_blind_seat: SeatIndex,
        big_blind_seat: SeatIndex,
        blinds: Blinds,
        posts: Vec<BlindPost>,
    },
    Action {
        table_id: TableId,
        hand_id: HandId,
        action: ActionRecord,
    },
    PotUpdated {
        table_id: TableId,
        hand_id: HandId,
        pot: Chips,
        delta: Chips,
        pots: Vec<SidePot>,
    },
    StreetDealt {
        table_id: TableId,
        hand_id: HandId,
        phase: HandPhase,
        cards: Vec<Card>,
        board: Vec<Card>,
    },
    TurnStarted {
        table_id: TableId,
        hand_id: HandId,
        seat: SeatIndex,
        player_id: PlayerId,
        deadline: Option<DateTime<Utc>>,
    },
    CardsShown {
        table_id: TableId,
        hand_id: HandId,
        seat: SeatIndex,
        player_id: PlayerId,
        cards: Vec<Card>,
        best: SubHand,
    },
    Showdown {
        table_id: TableId,
        hand_id: HandId,
        awards: Vec<PotAward>,
    },
    HandComplete {
        table_id: TableId,
        hand_id: HandId,
        result: Option<HandResult>,
        /// True when the hand was cancelled and contributions returned
        voided: bool,
        stacks: Vec<(SeatIndex, PlayerId, Chips)>,
    },
    PlayerSeated {
        table_id: TableId,
        seat: SeatIndex,
        player_id: PlayerId,
        stack: Chips,
    },
    PlayerLeft {
        table_id: TableId,
        seat: SeatIndex,
        player_id: PlayerId,
        stack: Chips,
    },
    TournamentCreated {
        tournament_id: TournamentId,
        name: String,
        buy_in: i64,
        max_players: usize,
    },
    TournamentStarted {
        tournament_id: TournamentId,
        tables: Vec<TableId>,
        players: usize,
    },
    LevelAdvanced {
        tournament_id: TournamentId,
        level: u32,
        blinds: Blinds,
    },
    PlayerEliminated {
        tournament_id: TournamentId,
        player_id: PlayerId,
        position: usize,
    },
    TournamentComplete {
        tournament_id: TournamentId,
        standings: Vec<Standing>,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::HandStarted { .. } => EventKind::HandStarted,
            EngineEvent::Action { .. } => EventKind::Action,
            EngineEvent::PotUpdated { .. } => EventKind::PotUpdated,
            EngineEvent::StreetDealt { .. } => EventKind::StreetDealt,
            EngineEvent::TurnStarted { .. } => EventKind::TurnStarted,
            EngineEvent::CardsShown { .. } => EventKind::CardsShown,
            EngineEvent::Showdown { .. } => EventKind::Showdown,
            EngineEvent::HandComplete { .. } => EventKind::HandComplete,
            EngineEvent::PlayerSeated { .. } => EventKind::PlayerSeated,
            EngineEvent::PlayerLeft { .. } => EventKind::PlayerLeft,
            EngineEvent::TournamentCreated { .. } => EventKind::TournamentCreated,
            EngineEvent::TournamentStarted { .. } => EventKind::TournamentStarted,
            EngineEvent::LevelAdvanced { .. } => EventKind::LevelAdvanced,
            EngineEvent::PlayerEliminated { .. } => EventKind::PlayerEliminated,
            EngineEvent::TournamentComplete { .. } => EventKind::TournamentComplete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Position in the emitting log, starting at 1
    pub event_id: u64,
    pub idempotency_key: Uuid,
    pub channel: String,
    /// Hand version after the transition that produced the event
    pub hand_version: Option<u64>,
    pub emitted_at: DateTime<Utc>,
    pub event: EngineEvent,
}

/// Events a poller has not seen yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTail {
    pub events: Vec<EventEnvelope>,
    /// The caller is behind the retained window and should reload the
    /// full state instead of replaying.
    pub snapshot_required: bool,
    pub last_event_id: u64,
}

/// Bounded, strictly ordered event log.
#[derive(Debug)]
pub struct EventLog {
    channel: String,
    capacity: usize,
    next_id: u64,
    events: VecDeque<EventEnvelope>,
}

impl EventLog {
    pub fn new(channel: impl Into<String>, capacity: usize) -> Self {
        Self {
            channel: channel.into(),
            capacity: capacity.max(1),
            next_id: 1,
            events: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn last_event_id(&self) -> u64 {
        self.next_id - 1
    }

    /// Append an event, evicting the oldest once full.
    pub fn push(&mut self, hand_version: Option<u64>, event: EngineEvent) -> EventEnvelope {
        let envelope = EventEnvelope {
            event_id: self.next_id,
            idempotency_key: Uuid::new_v4(),
            channel: self.channel.clone(),
            hand_version,
            emitted_at: Utc::now(),
            event,
        };
        self.next_id += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(envelope.clone());
        envelope
    }

    /// Events after `since_event_id` (0 or `None` for everything retained).
    pub fn since(&self, since_event_id: Option<u64>) -> EventTail {
        let since = since_event_id.unwrap_or(0);
        let oldest = self.events.front().map_or(self.next_id, |e| e.event_id);
        EventTail {
            events: self
                .events
                .iter()
                .filter(|e| e.event_id > since)
                .cloned()
                .collect(),
            snapshot_required: since + 1 < oldest,
            last_event_id: self.last_event_id(),
        }
    }
}
