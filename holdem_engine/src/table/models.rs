//! Table records and per-viewer projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::TableConfig;
use crate::{
    cash::CashGameId,
    game::{
        entities::{Blinds, Card, Chips, PlayerId, Seat, SeatIndex, SeatStatus, Seats, TableId},
        hand::{Hand, HandId, HandView},
        validator::ActionChoice,
    },
    tournament::TournamentId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    /// No hand in progress
    Waiting,
    /// A hand is being played
    Active,
    /// Owning game finished; the table accepts nothing further
    Complete,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableStatus::Waiting => write!(f, "waiting"),
            TableStatus::Active => write!(f, "active"),
            TableStatus::Complete => write!(f, "complete"),
        }
    }
}

/// The game a table belongs to. A table has exactly one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TableOwner {
    Tournament(TournamentId),
    CashGame(CashGameId),
}

impl TableOwner {
    pub fn is_tournament(&self) -> bool {
        matches!(self, TableOwner::Tournament(_))
    }

    /// Broadcast channel of the owning game.
    pub fn channel(&self) -> String {
        match self {
            TableOwner::Tournament(id) => crate::events::tournament_channel(*id),
            TableOwner::CashGame(id) => crate::events::cash_game_channel(*id),
        }
    }
}

/// Persistent table record. Seats live here; the hand borrows them while
/// it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub config: TableConfig,
    pub owner: TableOwner,
    pub status: TableStatus,
    pub seats: Seats,
    /// Blinds used for the most recent deal
    pub blinds: Blinds,
    pub dealer_seat: Option<SeatIndex>,
    pub hands_played: u64,
    pub current_hand: Option<HandId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Table {
    pub fn new(id: TableId, config: TableConfig, owner: TableOwner) -> Self {
        let now = Utc::now();
        Self {
            id,
            blinds: config.blinds(),
            config,
            owner,
            status: TableStatus::Waiting,
            seats: Seats::new(),
            dealer_seat: None,
            hands_played: 0,
            current_hand: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.max_players
    }

    pub fn seat_of(&self, player_id: PlayerId) -> Option<SeatIndex> {
        self.seats
            .values()
            .find(|seat| seat.player_id == player_id)
            .map(|seat| seat.seat_index)
    }

    /// `preferred` if it is open, else the lowest open seat. Seats in
    /// `reserved` count as taken.
    pub fn open_seat(
        &self,
        preferred: Option<SeatIndex>,
        reserved: &[SeatIndex],
    ) -> Option<SeatIndex> {
        let is_open = |seat: &SeatIndex| {
            *seat < self.capacity() && !self.seats.contains_key(seat) && !reserved.contains(seat)
        };
        preferred
            .filter(|seat| is_open(seat))
            .or_else(|| (0..self.capacity()).find(|seat| is_open(seat)))
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.capacity()
    }

    /// Seats that can be dealt into the next hand.
    pub fn playable_seats(&self) -> usize {
        self.seats.values().filter(|seat| seat.can_play()).count()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Snapshot for `viewer`. Hole cards are visible to their owner and,
    /// once revealed at showdown, to everyone.
    pub fn view(&self, hand: Option<&Hand>, viewer: Option<PlayerId>) -> TableView {
        let seats = self
            .seats
            .values()
            .map(|seat| SeatView::of(seat, viewer))
            .collect();
        let legal_actions = match (hand, viewer.and_then(|p| self.seat_of(p))) {
            (Some(hand), Some(seat)) => hand.legal_actions(&self.seats, seat),
            _ => Vec::new(),
        };
        TableView {
            table_id: self.id,
            name: self.config.name.clone(),
            status: self.status,
            owner: self.owner,
            capacity: self.capacity(),
            blinds: self.blinds,
            dealer_seat: self.dealer_seat,
            seats,
            hand: hand.map(HandView::from),
            legal_actions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatView {
    pub seat_index: SeatIndex,
    pub player_id: PlayerId,
    pub stack: Chips,
    pub status: SeatStatus,
    pub current_bet: Chips,
    pub has_cards: bool,
    /// Present only when the viewer may see them
    pub hole_cards: Option<Vec<Card>>,
}

impl SeatView {
    fn of(seat: &Seat, viewer: Option<PlayerId>) -> Self {
        let visible = seat.showing || viewer == Some(seat.player_id);
        Self {
            seat_index: seat.seat_index,
            player_id: seat.player_id,
            stack: seat.stack,
            status: seat.status,
            current_bet: seat.current_bet,
            has_cards: !seat.hole_cards.is_empty(),
            hole_cards: (visible && !seat.hole_cards.is_empty()).then(|| seat.hole_cards.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    pub table_id: TableId,
    pub name: String,
    pub status: TableStatus,
    pub owner: TableOwner,
    pub capacity: usize,
    pub blinds: Blinds,
    pub dealer_seat: Option<SeatIndex>,
    pub seats: Vec<SeatView>,
    pub hand: Option<HandView>,
    /// Legal actions for the viewer, empty unless it is their turn
    pub legal_actions: Vec<ActionChoice>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Suit;

    fn table() -> Table {
        let mut table = Table::new(1, TableConfig::default(), TableOwner::CashGame(7));
        let mut a = Seat::new(10, 0, 500);
        a.hole_cards = vec![Card(14, Suit::Spade), Card(13, Suit::Spade)];
        let mut b = Seat::new(11, 2, 500);
        b.hole_cards = vec![Card(2, Suit::Club), Card(7, Suit::Heart)];
        table.seats.insert(0, a);
        table.seats.insert(2, b);
        table
    }

    #[test]
    fn test_open_seat_fills_gaps() {
        let table = table();
        assert_eq!(table.open_seat(None, &[]), Some(1));
        assert_eq!(table.open_seat(Some(4), &[]), Some(4));
        assert_eq!(table.open_seat(Some(2), &[]), Some(1));
        assert_eq!(table.open_seat(Some(1), &[1]), Some(3));
        assert_eq!(table.seat_of(11), Some(2));
        assert_eq!(table.seat_of(99), None);
    }

    #[test]
    fn test_view_hides_other_hole_cards() {
        let table = table();
        let view = table.view(None, Some(10));
        assert!(view.seats[0].hole_cards.is_some());
        assert!(view.seats[1].hole_cards.is_none());
        assert!(view.seats[1].has_cards);

        let observer = table.view(None, None);
        assert!(observer.seats.iter().all(|s| s.hole_cards.is_none()));
    }

    #[test]
    fn test_revealed_cards_visible_to_all() {
        let mut table = table();
        if let Some(seat) = table.seats.get_mut(&2) {
            seat.showing = true;
        }
        let view = table.view(None, None);
        assert!(view.seats[1].hole_cards.is_some());
    }

    #[test]
    fn test_owner_channel() {
        assert_eq!(TableOwner::CashGame(7).channel(), "cash-game-7");
        assert_eq!(TableOwner::Tournament(3).channel(), "tournament-3");
    }
}
