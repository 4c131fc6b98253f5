//! Hold'em rules: cards, hand evaluation, action validation, pot
//! accounting and the per-hand state machine.
//!
//! Nothing in here does I/O or knows about time beyond stamping action
//! deadlines, so every piece can be driven directly from tests.

pub mod constants;
pub mod entities;
pub mod functional;
pub mod hand;
pub mod pot;
pub mod validator;

pub use entities::{
    Action, ActionKind, Blinds, Card, Chips, Deck, PlayerId, Rank, Seat, SeatIndex, SeatStatus,
    Seats, SubHand, Suit, TableId,
};
pub use hand::{
    ActionRecord, BlindPost, Hand, HandId, HandPhase, HandResult, HandSetup, HandTransition,
    HandView, Payout, PostKind, RevealedHand, StreetDeal, VoidRefunds,
};
pub use pot::{Contribution, PotAward, SidePot, compute_pots, split_pot};
pub use validator::{ActionChoice, ActionContext, Commitment, legal_actions, validate};
