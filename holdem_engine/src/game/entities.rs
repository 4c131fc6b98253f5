use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::errors::{EngineError, EngineResult};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values.
pub type Value = u8;

/// A card is a tuple of a u8 value (two=2u8 ... ace=14u8) and a suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            14 => "A",
            13 => "K",
            12 => "Q",
            11 => "J",
            v => &v.to_string(),
        };
        let repr = format!("{value}/{}", self.1);
        write!(f, "{repr:>4}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "high card",
            Self::OnePair => "one pair",
            Self::TwoPair => "two pair",
            Self::ThreeOfAKind => "three of a kind",
            Self::Straight => "straight",
            Self::Flush => "flush",
            Self::FullHouse => "full house",
            Self::FourOfAKind => "four of a kind",
            Self::StraightFlush => "straight flush",
        };
        write!(f, "{repr}")
    }
}

/// An evaluated 5-card hand. Ordering compares rank first, then the
/// tie-break values from most to least significant.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SubHand {
    pub rank: Rank,
    pub values: Vec<Value>,
}

/// A shuffled deck. Serializable so a persisted hand can keep dealing
/// from where it left off.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Deck {
    cards: Vec<Card>,
    pub deck_idx: usize,
}

impl Deck {
    /// Shuffle a fresh deck deterministically from `seed`.
    pub fn shuffled(seed: u64) -> Self {
        let mut deck = Self::default();
        let mut rng = StdRng::seed_from_u64(seed);
        deck.cards.shuffle(&mut rng);
        deck
    }

    pub fn deal_card(&mut self) -> Card {
        let card = self.cards[self.deck_idx];
        self.deck_idx += 1;
        card
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.deck_idx
    }
}

impl Default for Deck {
    fn default() -> Self {
        let mut cards = Vec::with_capacity(52);
        for value in 2u8..=14u8 {
            for suit in [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart] {
                cards.push(Card(value, suit));
            }
        }
        Self { cards, deck_idx: 0 }
    }
}

/// Type alias for table chips. Stacks and bets are whole chips and never
/// negative.
pub type Chips = u32;

pub type PlayerId = i64;

/// Type alias for seat positions at a table.
pub type SeatIndex = usize;

pub type TableId = i64;

/// Seats keyed by index; ascending index order is clockwise.
pub type Seats = BTreeMap<SeatIndex, Seat>;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Blinds {
    pub small: Chips,
    pub big: Chips,
    pub ante: Chips,
}

impl fmt::Display for Blinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ante > 0 {
            write!(f, "{}/{} (ante {})", self.small, self.big, self.ante)
        } else {
            write!(f, "{}/{}", self.small, self.big)
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    /// Seated, waiting for the next deal.
    Waiting,
    /// In the current hand and able to act.
    Active,
    Folded,
    /// In the current hand with no chips behind.
    AllIn,
    SittingOut,
    Eliminated,
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Folded => "folded",
            Self::AllIn => "all-in",
            Self::SittingOut => "sitting out",
            Self::Eliminated => "eliminated",
        };
        write!(f, "{repr}")
    }
}

/// A player's seat at a table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Seat {
    pub player_id: PlayerId,
    pub seat_index: SeatIndex,
    pub stack: Chips,
    pub status: SeatStatus,
    /// Chips put in on the current street.
    pub current_bet: Chips,
    pub hole_cards: Vec<Card>,
    /// Whether the seat has acted since the last bet or raise on this street.
    pub has_acted: bool,
    /// Hole cards revealed at showdown.
    pub showing: bool,
}

impl Seat {
    #[must_use]
    pub fn new(player_id: PlayerId, seat_index: SeatIndex, stack: Chips) -> Self {
        Self {
            player_id,
            seat_index,
            stack,
            status: SeatStatus::Waiting,
            current_bet: 0,
            hole_cards: Vec::with_capacity(2),
            has_acted: false,
            showing: false,
        }
    }

    /// Can be dealt into the next hand.
    pub fn can_play(&self) -> bool {
        self.stack > 0 && !matches!(self.status, SeatStatus::SittingOut | SeatStatus::Eliminated)
    }

    /// Holds chips in a hand that is still being played.
    pub fn is_live(&self) -> bool {
        matches!(self.status, SeatStatus::Active | SeatStatus::AllIn)
    }

    pub fn reset_for_hand(&mut self) {
        self.status = SeatStatus::Active;
        self.current_bet = 0;
        self.hole_cards.clear();
        self.has_acted = false;
        self.showing = false;
    }
}

/// Canonical action names.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
}

/// Every spelling accepted at the boundary, mapped to its canonical kind.
const ACTION_VOCABULARY: &[(&str, ActionKind)] = &[
    ("fold", ActionKind::Fold),
    ("check", ActionKind::Check),
    ("call", ActionKind::Call),
    ("bet", ActionKind::Bet),
    ("raise", ActionKind::Raise),
    ("all_in", ActionKind::AllIn),
    ("all-in", ActionKind::AllIn),
    ("allin", ActionKind::AllIn),
    ("all in", ActionKind::AllIn),
    ("shove", ActionKind::AllIn),
];

impl FromStr for ActionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ACTION_VOCABULARY
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| EngineError::Validation(format!("unknown action '{s}'")))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Fold => "fold",
            Self::Check => "check",
            Self::Call => "call",
            Self::Bet => "bet",
            Self::Raise => "raise",
            Self::AllIn => "all_in",
        };
        write!(f, "{repr}")
    }
}

/// A player action. `Bet` and `Raise` carry the street total the seat is
/// betting or raising to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Action {
    Fold,
    Check,
    Call,
    Bet(Chips),
    Raise(Chips),
    AllIn,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Fold => ActionKind::Fold,
            Self::Check => ActionKind::Check,
            Self::Call => ActionKind::Call,
            Self::Bet(_) => ActionKind::Bet,
            Self::Raise(_) => ActionKind::Raise,
            Self::AllIn => ActionKind::AllIn,
        }
    }

    /// Build an action from boundary input.
    ///
    /// # Errors
    ///
    /// * `EngineError::Validation` - unknown action name, or a bet/raise
    ///   without a positive amount
    pub fn from_wire(kind: &str, amount: Option<Chips>) -> EngineResult<Self> {
        let kind: ActionKind = kind.parse()?;
        match kind {
            ActionKind::Fold => Ok(Self::Fold),
            ActionKind::Check => Ok(Self::Check),
            ActionKind::Call => Ok(Self::Call),
            ActionKind::AllIn => Ok(Self::AllIn),
            ActionKind::Bet | ActionKind::Raise => {
                let amount = amount
                    .filter(|amount| *amount > 0)
                    .ok_or_else(|| EngineError::Validation(format!("{kind} requires an amount")))?;
                Ok(if kind == ActionKind::Bet {
                    Self::Bet(amount)
                } else {
                    Self::Raise(amount)
                })
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Fold => write!(f, "folds"),
            Self::Check => write!(f, "checks"),
            Self::Call => write!(f, "calls"),
            Self::Bet(amount) => write!(f, "bets {amount}"),
            Self::Raise(amount) => write!(f, "raises to {amount}"),
            Self::AllIn => write!(f, "goes all-in"),
        }
    }
}
