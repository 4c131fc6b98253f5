//! Table actor message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::models::TableView;
use crate::{
    errors::EngineResult,
    events::EventEnvelope,
    game::{
        entities::{Action, Chips, PlayerId, SeatIndex, TableId},
        hand::{HandId, HandView},
    },
};

/// Messages that can be sent to a TableActor
#[derive(Debug)]
pub enum TableMessage {
    /// Player action, checked against the caller's last known hand version
    SubmitAction {
        player_id: PlayerId,
        action: Action,
        expected_version: Option<u64>,
        response: oneshot::Sender<EngineResult<ActionOutcome>>,
    },

    /// Everything the caller has not seen since the given version/event
    Poll {
        viewer: Option<PlayerId>,
        since_version: Option<u64>,
        since_event_id: Option<u64>,
        response: oneshot::Sender<PollResponse>,
    },

    /// Current table view for a viewer
    Snapshot {
        viewer: Option<PlayerId>,
        response: oneshot::Sender<TableView>,
    },

    /// Seat a player with `stack` chips already taken from their balance
    SeatPlayer {
        player_id: PlayerId,
        stack: Chips,
        preferred_seat: Option<SeatIndex>,
        response: oneshot::Sender<EngineResult<SeatIndex>>,
    },

    /// Unseat a player, returning their stack
    RemoveSeat {
        player_id: PlayerId,
        response: oneshot::Sender<EngineResult<Chips>>,
    },

    /// Top up a stack between hands, never past `cap`. Responds with the
    /// chips actually added.
    AddChips {
        player_id: PlayerId,
        amount: Chips,
        cap: Option<Chips>,
        response: oneshot::Sender<EngineResult<Chips>>,
    },

    /// Unseat any one player not holding chips in a live hand (balancing)
    ReleasePlayer {
        response: oneshot::Sender<Option<(PlayerId, Chips)>>,
    },

    /// Deal a new hand
    StartHand {
        response: oneshot::Sender<EngineResult<HandView>>,
    },

    /// Internal: turn clock ran out for the hand at `version`
    TurnExpired { hand_id: HandId, version: u64 },

    /// Internal: auto-deal after the previous hand
    DealNextHand,

    /// Void any live hand and stop. Responds with final stacks.
    Close {
        response: oneshot::Sender<Vec<(PlayerId, Chips)>>,
    },
}

/// Result of an accepted action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub hand: HandView,
    pub events: Vec<EventEnvelope>,
    pub phase_changed: bool,
    pub next_actor: Option<SeatIndex>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed: bool,
}

/// Reconciliation payload for clients that missed pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub table: TableView,
    pub hand_version: Option<u64>,
    /// Hand version differs from the caller's
    pub changed: bool,
    pub events: Vec<EventEnvelope>,
    /// The caller is behind the retained event window; use `table` instead
    pub snapshot_required: bool,
    pub last_event_id: u64,
}

/// Sent to the owning game manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableNotice {
    HandComplete {
        table_id: TableId,
        hand_number: u64,
        /// Players left with no chips, with their stack at the start of
        /// the hand
        busted: Vec<(PlayerId, Chips)>,
        stacks: Vec<(PlayerId, Chips)>,
        /// Seats still at the table
        remaining: usize,
    },
}
