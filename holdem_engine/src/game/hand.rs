//! One hand of Hold'em, from blinds to settlement.
//!
//! The hand owns its phase, betting state and deck; seats live on the table
//! and are passed in mutably so the hand is the only code that touches
//! stacks, bets and statuses while it runs. Every accepted mutation bumps
//! `version` by exactly one and returns a [`HandTransition`] describing what
//! changed, which the table turns into events.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use uuid::Uuid;

use super::{
    constants::{HOLE_CARDS, MIN_PLAYERS},
    entities::{
        Action, ActionKind, Blinds, Card, Chips, Deck, PlayerId, SeatIndex, SeatStatus, Seats,
        SubHand, TableId,
    },
    functional::eval,
    pot::{Contribution, PotAward, SidePot, award_pots, compute_pots},
    validator::{ActionChoice, ActionContext, legal_actions, validate},
};
use crate::errors::{EngineError, EngineResult};

pub type HandId = Uuid;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandPhase {
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Complete,
}

impl HandPhase {
    pub fn is_betting(&self) -> bool {
        matches!(self, Self::Preflop | Self::Flop | Self::Turn | Self::River)
    }

    fn next_street(&self) -> Option<Self> {
        match self {
            Self::Preflop => Some(Self::Flop),
            Self::Flop => Some(Self::Turn),
            Self::Turn => Some(Self::River),
            _ => None,
        }
    }
}

impl fmt::Display for HandPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
            Self::Complete => "complete",
        };
        write!(f, "{repr}")
    }
}

/// Parameters for dealing a new hand.
#[derive(Clone, Debug)]
pub struct HandSetup {
    pub table_id: TableId,
    pub hand_number: u64,
    /// Button position of the previous hand, if any.
    pub previous_dealer: Option<SeatIndex>,
    pub blinds: Blinds,
    pub capacity: usize,
    pub seed: u64,
    /// `None` means the table has no turn clock.
    pub turn_timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Ante,
    SmallBlind,
    BigBlind,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlindPost {
    pub seat: SeatIndex,
    pub player_id: PlayerId,
    pub kind: PostKind,
    pub amount: Chips,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionRecord {
    pub seat: SeatIndex,
    pub player_id: PlayerId,
    pub kind: ActionKind,
    /// Chips moved into the pot by this action.
    pub chips: Chips,
    /// The seat's street total afterwards.
    pub street_total: Chips,
    pub all_in: bool,
    /// Synthesized by the turn clock.
    pub automatic: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StreetDeal {
    pub phase: HandPhase,
    pub cards: Vec<Card>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RevealedHand {
    pub seat: SeatIndex,
    pub player_id: PlayerId,
    pub cards: Vec<Card>,
    pub best: SubHand,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Payout {
    pub seat: SeatIndex,
    pub player_id: PlayerId,
    pub amount: Chips,
}

/// Settlement of a finished hand.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandResult {
    /// False when everyone else folded.
    pub showdown: bool,
    pub awards: Vec<PotAward>,
    pub payouts: Vec<Payout>,
}

/// Contributions handed back when a hand is voided.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoidRefunds {
    /// Returned to the contributor's stack.
    pub returned: Vec<(PlayerId, Chips)>,
    /// Owed to contributors who have since left their seat.
    pub departed: Vec<(PlayerId, Chips)>,
}

/// What one accepted mutation changed.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct HandTransition {
    pub version: u64,
    pub posts: Vec<BlindPost>,
    pub action: Option<ActionRecord>,
    pub streets: Vec<StreetDeal>,
    pub phase_changed: bool,
    pub pot: Chips,
    pub pot_delta: Chips,
    pub pots: Vec<SidePot>,
    pub next_actor: Option<SeatIndex>,
    pub deadline: Option<DateTime<Utc>>,
    pub revealed: Vec<RevealedHand>,
    pub result: Option<HandResult>,
    pub completed: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Hand {
    pub id: HandId,
    pub table_id: TableId,
    pub hand_number: u64,
    pub version: u64,
    pub phase: HandPhase,
    pub community_cards: Vec<Card>,
    /// Total committed this hand, antes included.
    pub pot: Chips,
    pub pots: Vec<SidePot>,
    pub current_bet: Chips,
    pub min_raise: Chips,
    /// Street total set by the last full bet or raise.
    #[serde(default)]
    pub full_raise_to: Chips,
    pub current_actor: Option<SeatIndex>,
    pub action_deadline: Option<DateTime<Utc>>,
    pub dealer_seat: SeatIndex,
    pub small_blind_seat: SeatIndex,
    pub big_blind_seat: SeatIndex,
    pub blinds: Blinds,
    pub capacity: usize,
    pub turn_timeout_ms: Option<u64>,
    /// Seats dealt in, ascending.
    pub participants: Vec<SeatIndex>,
    pub players: BTreeMap<SeatIndex, PlayerId>,
    pub starting_stacks: BTreeMap<SeatIndex, Chips>,
    /// Kept apart from seats so a folded seat can leave without
    /// disturbing the pot.
    pub contributions: BTreeMap<SeatIndex, Chips>,
    pub folded: BTreeSet<SeatIndex>,
    pub result: Option<HandResult>,
    pub seed: u64,
    deck: Deck,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Sum of every stack at the table. Bounding it bounds every pot, bet
/// and award built from those stacks.
fn chips_in_play(seats: &Seats) -> EngineResult<Chips> {
    seats
        .values()
        .try_fold(0 as Chips, |total, seat| total.checked_add(seat.stack))
        .ok_or_else(|| {
            EngineError::Validation(format!("chips at the table exceed {}", Chips::MAX))
        })
}

/// First seat in `order` strictly after `from`, wrapping around.
fn next_in(order: &[SeatIndex], from: SeatIndex) -> SeatIndex {
    order
        .iter()
        .copied()
        .find(|seat| *seat > from)
        .unwrap_or(order[0])
}

impl Hand {
    /// Deal a new hand: move the button, post antes and blinds, deal hole
    /// cards and find the first actor.
    ///
    /// # Errors
    ///
    /// * `EngineError::StateConflict` - fewer than two seats can play
    /// * `EngineError::Validation` - big blind is zero, or the stacks at
    ///   the table add up to more than `Chips` can hold
    pub fn start(setup: HandSetup, seats: &mut Seats) -> EngineResult<(Self, HandTransition)> {
        if setup.blinds.big == 0 {
            return Err(EngineError::Validation("big blind must be positive".to_string()));
        }
        let participants: Vec<SeatIndex> = seats
            .values()
            .filter(|seat| seat.can_play())
            .map(|seat| seat.seat_index)
            .collect();
        if participants.len() < MIN_PLAYERS {
            return Err(EngineError::StateConflict(format!(
                "need at least {MIN_PLAYERS} players with chips to deal"
            )));
        }
        chips_in_play(seats)?;

        let dealer = setup
            .previous_dealer
            .and_then(|prev| participants.iter().copied().find(|seat| *seat > prev))
            .unwrap_or(participants[0]);
        let (small_blind_seat, big_blind_seat) = if participants.len() == 2 {
            (dealer, next_in(&participants, dealer))
        } else {
            let sb = next_in(&participants, dealer);
            (sb, next_in(&participants, sb))
        };

        for seat in seats.values_mut() {
            if participants.contains(&seat.seat_index) {
                seat.reset_for_hand();
            } else {
                seat.current_bet = 0;
                seat.hole_cards.clear();
                seat.has_acted = false;
                seat.showing = false;
            }
        }

        let mut hand = Self {
            id: Uuid::new_v4(),
            table_id: setup.table_id,
            hand_number: setup.hand_number,
            version: 1,
            phase: HandPhase::Preflop,
            community_cards: Vec::with_capacity(5),
            pot: 0,
            pots: Vec::new(),
            current_bet: 0,
            min_raise: setup.blinds.big,
            full_raise_to: 0,
            current_actor: None,
            action_deadline: None,
            dealer_seat: dealer,
            small_blind_seat,
            big_blind_seat,
            blinds: setup.blinds,
            capacity: setup.capacity,
            turn_timeout_ms: setup.turn_timeout_ms,
            players: participants
                .iter()
                .filter_map(|s| seats.get(s).map(|seat| (*s, seat.player_id)))
                .collect(),
            starting_stacks: participants
                .iter()
                .filter_map(|s| seats.get(s).map(|seat| (*s, seat.stack)))
                .collect(),
            contributions: participants.iter().map(|s| (*s, 0)).collect(),
            participants,
            folded: BTreeSet::new(),
            result: None,
            seed: setup.seed,
            deck: Deck::shuffled(setup.seed),
            started_at: Utc::now(),
            completed_at: None,
        };

        let mut transition = HandTransition::default();
        if hand.blinds.ante > 0 {
            for seat in hand.participants.clone() {
                let post = hand.post(seats, seat, PostKind::Ante);
                transition.posts.push(post);
            }
        }
        let small = hand.post(seats, small_blind_seat, PostKind::SmallBlind);
        let big = hand.post(seats, big_blind_seat, PostKind::BigBlind);
        transition.posts.extend([small, big]);
        hand.current_bet = hand
            .participants
            .iter()
            .filter_map(|s| seats.get(s))
            .map(|seat| seat.current_bet)
            .max()
            .unwrap_or(0);
        hand.full_raise_to = hand.current_bet;

        let deal_order = hand.order_after(dealer);
        for _ in 0..HOLE_CARDS {
            for seat in &deal_order {
                let card = hand.deck.deal_card();
                if let Some(seat) = seats.get_mut(seat) {
                    seat.hole_cards.push(card);
                }
            }
        }

        hand.pots = compute_pots(&hand.contribution_list(seats));
        transition.pot_delta = hand.pot;
        hand.advance(seats, big_blind_seat, &mut transition);
        hand.fill(&mut transition);
        Ok((hand, transition))
    }

    pub fn is_active(&self) -> bool {
        self.phase != HandPhase::Complete
    }

    /// Seat still holds chips in this hand.
    pub fn holds_chips(&self, seats: &Seats, seat: SeatIndex) -> bool {
        self.is_active()
            && self.participants.contains(&seat)
            && seats.get(&seat).is_some_and(|s| s.is_live())
    }

    /// Legal actions for `seat`; empty unless it is that seat's turn.
    pub fn legal_actions(&self, seats: &Seats, seat: SeatIndex) -> Vec<ActionChoice> {
        match (self.current_actor, seats.get(&seat)) {
            (Some(actor), Some(_)) if actor == seat => match self.context(seats, seat) {
                Some(ctx) => legal_actions(&ctx),
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Apply a player action.
    ///
    /// Checks run in order: hand still live, version matches, caller's
    /// turn, action legal. Nothing is mutated unless all pass.
    ///
    /// # Errors
    ///
    /// * `EngineError::StateConflict` - the hand is over
    /// * `EngineError::VersionConflict` - `expected_version` is stale
    /// * `EngineError::InvalidAction` - not the seat's turn, or illegal action
    /// * `EngineError::NotSeated` - the seat is gone
    pub fn apply_action(
        &mut self,
        seats: &mut Seats,
        seat: SeatIndex,
        action: Action,
        expected_version: Option<u64>,
    ) -> EngineResult<HandTransition> {
        self.apply(seats, seat, action, expected_version, false)
    }

    /// Act for the current actor when its clock runs out: check if legal,
    /// otherwise fold. Returns `None` if there is no actor.
    pub fn apply_timeout(&mut self, seats: &mut Seats) -> Option<HandTransition> {
        let seat = self.current_actor?;
        let action = self.timeout_action(seats)?;
        self.apply(seats, seat, action, Some(self.version), true).ok()
    }

    pub fn timeout_action(&self, seats: &Seats) -> Option<Action> {
        let actor = seats.get(&self.current_actor?)?;
        Some(if actor.current_bet >= self.current_bet {
            Action::Check
        } else {
            Action::Fold
        })
    }

    fn apply(
        &mut self,
        seats: &mut Seats,
        seat: SeatIndex,
        action: Action,
        expected_version: Option<u64>,
        automatic: bool,
    ) -> EngineResult<HandTransition> {
        if !self.phase.is_betting() {
            return Err(EngineError::StateConflict(format!(
                "hand {} is {}",
                self.hand_number, self.phase
            )));
        }
        if let Some(expected) = expected_version
            && expected != self.version
        {
            return Err(EngineError::VersionConflict {
                expected,
                actual: self.version,
            });
        }
        if self.current_actor != Some(seat) {
            return Err(EngineError::InvalidAction("not your turn".to_string()));
        }
        let ctx = self.context(seats, seat).ok_or(EngineError::NotSeated)?;
        let commitment = validate(&ctx, action)?;

        let Some(actor) = seats.get_mut(&seat) else {
            return Err(EngineError::NotSeated);
        };
        let contributed = self.contributions.get(&seat).copied().unwrap_or(0);
        let (Some(contributed), Some(pot)) = (
            contributed.checked_add(commitment.chips),
            self.pot.checked_add(commitment.chips),
        ) else {
            return Err(EngineError::Validation(
                "chip total exceeds what the pot can hold".to_string(),
            ));
        };
        if commitment.kind == ActionKind::Fold {
            actor.status = SeatStatus::Folded;
            self.folded.insert(seat);
        } else {
            actor.stack -= commitment.chips;
            actor.current_bet = commitment.street_total;
            if commitment.all_in {
                actor.status = SeatStatus::AllIn;
            }
            self.contributions.insert(seat, contributed);
            self.pot = pot;
        }
        actor.has_acted = true;
        let player_id = actor.player_id;

        if commitment.street_total > self.current_bet {
            let increment = commitment.street_total - self.current_bet;
            // An all-in short of a full raise keeps the old increment
            // and does not reopen the betting.
            if increment >= self.min_raise {
                self.min_raise = increment;
                self.full_raise_to = commitment.street_total;
            }
            self.current_bet = commitment.street_total;
        }
        self.version += 1;
        self.pots = compute_pots(&self.contribution_list(seats));

        let mut transition = HandTransition {
            action: Some(ActionRecord {
                seat,
                player_id,
                kind: commitment.kind,
                chips: commitment.chips,
                street_total: commitment.street_total,
                all_in: commitment.all_in,
                automatic,
            }),
            pot_delta: commitment.chips,
            ..HandTransition::default()
        };
        self.advance(seats, seat, &mut transition);
        self.fill(&mut transition);
        Ok(transition)
    }

    /// Cancel the hand and give every contribution back to the player who
    /// made it. A contributor still in their seat gets it on their stack.
    pub fn void(&mut self, seats: &mut Seats) -> VoidRefunds {
        let mut refunds = VoidRefunds::default();
        for (seat_index, amount) in &self.contributions {
            let Some(&player_id) = self.players.get(seat_index) else {
                continue;
            };
            match seats
                .get_mut(seat_index)
                .filter(|seat| seat.player_id == player_id)
            {
                Some(seat) => {
                    seat.stack = seat.stack.saturating_add(*amount);
                    seat.current_bet = 0;
                    seat.hole_cards.clear();
                    seat.has_acted = false;
                    if seat.is_live() || seat.status == SeatStatus::Folded {
                        seat.status = SeatStatus::Waiting;
                    }
                    if *amount > 0 {
                        refunds.returned.push((player_id, *amount));
                    }
                }
                None if *amount > 0 => refunds.departed.push((player_id, *amount)),
                None => {}
            }
        }
        self.pot = 0;
        self.pots.clear();
        self.version += 1;
        self.phase = HandPhase::Complete;
        self.current_actor = None;
        self.action_deadline = None;
        self.completed_at = Some(Utc::now());
        refunds
    }

    fn context(&self, seats: &Seats, seat: SeatIndex) -> Option<ActionContext> {
        let seat = seats.get(&seat)?;
        Some(ActionContext {
            status: seat.status,
            stack: seat.stack,
            seat_bet: seat.current_bet,
            current_bet: self.current_bet,
            min_raise: self.min_raise,
            big_blind: self.blinds.big,
            can_raise: !seat.has_acted || self.full_raise_to > seat.current_bet,
        })
    }

    fn post(&mut self, seats: &mut Seats, seat_index: SeatIndex, kind: PostKind) -> BlindPost {
        let amount = match kind {
            PostKind::Ante => self.blinds.ante,
            PostKind::SmallBlind => self.blinds.small,
            PostKind::BigBlind => self.blinds.big,
        };
        let Some(seat) = seats.get_mut(&seat_index) else {
            return BlindPost {
                seat: seat_index,
                player_id: 0,
                kind,
                amount: 0,
            };
        };
        let paid = amount.min(seat.stack);
        seat.stack -= paid;
        if kind != PostKind::Ante {
            seat.current_bet += paid;
        }
        if seat.stack == 0 {
            seat.status = SeatStatus::AllIn;
        }
        *self.contributions.entry(seat_index).or_insert(0) += paid;
        self.pot += paid;
        BlindPost {
            seat: seat_index,
            player_id: seat.player_id,
            kind,
            amount: paid,
        }
    }

    /// Participants clockwise, starting with the seat after `from`.
    fn order_after(&self, from: SeatIndex) -> Vec<SeatIndex> {
        let (before, after): (Vec<SeatIndex>, Vec<SeatIndex>) =
            self.participants.iter().partition(|seat| **seat <= from);
        after.into_iter().chain(before).collect()
    }

    fn live_seats(&self, seats: &Seats) -> Vec<SeatIndex> {
        self.participants
            .iter()
            .copied()
            .filter(|s| seats.get(s).is_some_and(|seat| seat.is_live()))
            .collect()
    }

    fn contribution_list(&self, seats: &Seats) -> Vec<Contribution> {
        let live = self.live_seats(seats);
        self.contributions
            .iter()
            .map(|(seat, amount)| Contribution {
                seat: *seat,
                amount: *amount,
                folded: !live.contains(seat),
            })
            .collect()
    }

    fn round_closed(&self, seats: &Seats) -> bool {
        let actionable: Vec<_> = self
            .participants
            .iter()
            .filter_map(|s| seats.get(s))
            .filter(|seat| seat.status == SeatStatus::Active && seat.stack > 0)
            .collect();
        match actionable.as_slice() {
            [] => true,
            [only] if only.current_bet >= self.current_bet => true,
            _ => !actionable
                .iter()
                .any(|seat| !seat.has_acted || seat.current_bet < self.current_bet),
        }
    }

    fn next_to_act(&self, seats: &Seats, from: SeatIndex) -> Option<SeatIndex> {
        self.order_after(from).into_iter().find(|s| {
            seats.get(s).is_some_and(|seat| {
                seat.status == SeatStatus::Active
                    && seat.stack > 0
                    && (!seat.has_acted || seat.current_bet < self.current_bet)
            })
        })
    }

    fn advance(&mut self, seats: &mut Seats, mut from: SeatIndex, t: &mut HandTransition) {
        loop {
            let live = self.live_seats(seats);
            if live.len() <= 1 {
                self.finish_fold_out(seats, live.first().copied(), t);
                return;
            }
            let next = if self.round_closed(seats) {
                None
            } else {
                self.next_to_act(seats, from)
            };
            if let Some(seat) = next {
                self.current_actor = Some(seat);
                self.action_deadline = self
                    .turn_timeout_ms
                    .and_then(|ms| TimeDelta::try_milliseconds(ms as i64))
                    .map(|timeout| Utc::now() + timeout);
                return;
            }
            match self.phase.next_street() {
                Some(street) => {
                    self.deal_street(seats, street, t);
                    from = self.dealer_seat;
                }
                None => {
                    self.finish_showdown(seats, t);
                    return;
                }
            }
        }
    }

    fn deal_street(&mut self, seats: &mut Seats, street: HandPhase, t: &mut HandTransition) {
        let count = if street == HandPhase::Flop { 3 } else { 1 };
        // Burn one.
        self.deck.deal_card();
        let cards: Vec<Card> = (0..count).map(|_| self.deck.deal_card()).collect();
        self.community_cards.extend(&cards);
        self.phase = street;
        self.current_bet = 0;
        self.min_raise = self.blinds.big;
        self.full_raise_to = 0;
        for index in &self.participants {
            if let Some(seat) = seats.get_mut(index) {
                seat.current_bet = 0;
                seat.has_acted = false;
            }
        }
        t.phase_changed = true;
        t.streets.push(StreetDeal {
            phase: street,
            cards,
        });
    }

    fn finish_fold_out(&mut self, seats: &mut Seats, winner: Option<SeatIndex>, t: &mut HandTransition) {
        self.pots = compute_pots(&self.contribution_list(seats));
        let mut awards = Vec::new();
        if let Some(winner) = winner {
            if let Some(seat) = seats.get_mut(&winner) {
                seat.stack += self.pot;
            }
            awards = self
                .pots
                .iter()
                .enumerate()
                .map(|(pot_index, pot)| PotAward {
                    pot_index,
                    amount: pot.amount,
                    winners: vec![winner],
                    shares: vec![(winner, pot.amount)],
                })
                .collect();
        }
        self.complete(false, awards, t);
    }

    fn finish_showdown(&mut self, seats: &mut Seats, t: &mut HandTransition) {
        self.phase = HandPhase::Showdown;
        t.phase_changed = true;

        let mut hands = BTreeMap::new();
        for seat_index in self.order_after(self.dealer_seat) {
            let Some(seat) = seats.get_mut(&seat_index) else {
                continue;
            };
            if !seat.is_live() {
                continue;
            }
            seat.showing = true;
            let mut cards = seat.hole_cards.clone();
            cards.extend(&self.community_cards);
            let best = eval(&cards);
            t.revealed.push(RevealedHand {
                seat: seat_index,
                player_id: seat.player_id,
                cards: seat.hole_cards.clone(),
                best: best.clone(),
            });
            hands.insert(seat_index, best);
        }

        self.pots = compute_pots(&self.contribution_list(seats));
        let awards = award_pots(&self.pots, &hands, self.dealer_seat, self.capacity);
        for (seat_index, amount) in awards.iter().flat_map(|award| award.shares.iter()) {
            if let Some(seat) = seats.get_mut(seat_index) {
                seat.stack += amount;
            }
        }
        self.complete(true, awards, t);
    }

    fn complete(&mut self, showdown: bool, awards: Vec<PotAward>, t: &mut HandTransition) {
        let mut totals: BTreeMap<SeatIndex, Chips> = BTreeMap::new();
        for (seat, amount) in awards.iter().flat_map(|award| award.shares.iter()) {
            *totals.entry(*seat).or_insert(0) += amount;
        }
        let payouts = totals
            .into_iter()
            .map(|(seat, amount)| Payout {
                seat,
                player_id: self.players.get(&seat).copied().unwrap_or_default(),
                amount,
            })
            .collect();
        let result = HandResult {
            showdown,
            awards,
            payouts,
        };
        self.phase = HandPhase::Complete;
        self.current_actor = None;
        self.action_deadline = None;
        self.completed_at = Some(Utc::now());
        self.result = Some(result.clone());
        t.phase_changed = true;
        t.completed = true;
        t.result = Some(result);
    }

    fn fill(&self, t: &mut HandTransition) {
        t.version = self.version;
        t.pot = self.pot;
        t.pots = self.pots.clone();
        t.next_actor = self.current_actor;
        t.deadline = self.action_deadline;
    }
}

/// A hand as observers see it: no deck, no seed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandView {
    pub id: HandId,
    pub hand_number: u64,
    pub version: u64,
    pub phase: HandPhase,
    pub community_cards: Vec<Card>,
    pub pot: Chips,
    pub pots: Vec<SidePot>,
    pub current_bet: Chips,
    pub min_raise: Chips,
    pub current_actor: Option<SeatIndex>,
    pub action_deadline: Option<DateTime<Utc>>,
    pub dealer_seat: SeatIndex,
    pub small_blind_seat: SeatIndex,
    pub big_blind_seat: SeatIndex,
    pub blinds: Blinds,
    pub result: Option<HandResult>,
}

impl From<&Hand> for HandView {
    fn from(hand: &Hand) -> Self {
        Self {
            id: hand.id,
            hand_number: hand.hand_number,
            version: hand.version,
            phase: hand.phase,
            community_cards: hand.community_cards.clone(),
            pot: hand.pot,
            pots: hand.pots.clone(),
            current_bet: hand.current_bet,
            min_raise: hand.min_raise,
            current_actor: hand.current_actor,
            action_deadline: hand.action_deadline,
            dealer_seat: hand.dealer_seat,
            small_blind_seat: hand.small_blind_seat,
            big_blind_seat: hand.big_blind_seat,
            blinds: hand.blinds,
            result: hand.result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Seat;

    fn seats(stacks: &[Chips]) -> Seats {
        stacks
            .iter()
            .enumerate()
            .map(|(i, stack)| (i, Seat::new(100 + i as PlayerId, i, *stack)))
            .collect()
    }

    fn setup(blinds: Blinds) -> HandSetup {
        HandSetup {
            table_id: 1,
            hand_number: 1,
            previous_dealer: None,
            blinds,
            capacity: 6,
            seed: 42,
            turn_timeout_ms: None,
        }
    }

    fn blinds(small: Chips, big: Chips) -> Blinds {
        Blinds { small, big, ante: 0 }
    }

    fn stacks_total(seats: &Seats) -> Chips {
        seats.values().map(|seat| seat.stack).sum()
    }

    #[test]
    fn test_start_posts_blinds_and_deals() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (hand, transition) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        assert_eq!(hand.version, 1);
        assert_eq!(hand.dealer_seat, 0);
        assert_eq!(hand.small_blind_seat, 1);
        assert_eq!(hand.big_blind_seat, 2);
        assert_eq!(hand.pot, 30);
        assert_eq!(hand.current_bet, 20);
        assert_eq!(hand.min_raise, 20);
        // Three-handed the button is first to act preflop.
        assert_eq!(hand.current_actor, Some(0));
        assert_eq!(transition.posts.len(), 2);
        assert!(seats.values().all(|seat| seat.hole_cards.len() == 2));
        assert!(hand.action_deadline.is_none());
    }

    #[test]
    fn test_heads_up_dealer_posts_small_blind() {
        let mut seats = seats(&[500, 500]);
        let (hand, _) = Hand::start(setup(blinds(5, 10)), &mut seats).unwrap();
        assert_eq!(hand.small_blind_seat, hand.dealer_seat);
        assert_eq!(hand.current_actor, Some(hand.dealer_seat));
    }

    #[test]
    fn test_button_moves_clockwise() {
        let mut seats = seats(&[500, 500, 500]);
        let mut s = setup(blinds(5, 10));
        s.previous_dealer = Some(2);
        let (hand, _) = Hand::start(s, &mut seats).unwrap();
        assert_eq!(hand.dealer_seat, 0);

        let mut s = setup(blinds(5, 10));
        s.previous_dealer = Some(0);
        let (hand, _) = Hand::start(s, &mut seats).unwrap();
        assert_eq!(hand.dealer_seat, 1);
    }

    #[test]
    fn test_antes_are_dead_money() {
        let mut seats = seats(&[500, 500, 500]);
        let (hand, transition) = Hand::start(
            setup(Blinds {
                small: 10,
                big: 20,
                ante: 5,
            }),
            &mut seats,
        )
        .unwrap();
        assert_eq!(hand.pot, 45);
        assert_eq!(hand.current_bet, 20);
        assert_eq!(transition.posts.len(), 5);
        assert_eq!(seats[&2].current_bet, 20);
    }

    #[test]
    fn test_not_enough_players() {
        let mut seats = seats(&[500, 0]);
        assert!(matches!(
            Hand::start(setup(blinds(5, 10)), &mut seats),
            Err(EngineError::StateConflict(_))
        ));
    }

    #[test]
    fn test_version_increments_once_per_action() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        let t = hand
            .apply_action(&mut seats, 0, Action::Call, Some(1))
            .unwrap();
        assert_eq!(t.version, 2);
        let t = hand.apply_action(&mut seats, 1, Action::Call, None).unwrap();
        assert_eq!(t.version, 3);
    }

    #[test]
    fn test_stale_version_rejected_without_mutation() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        hand.apply_action(&mut seats, 0, Action::Call, Some(1))
            .unwrap();
        let before = seats.clone();
        let err = hand
            .apply_action(&mut seats, 1, Action::Call, Some(1))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::VersionConflict {
                expected: 1,
                actual: 2
            }
        ));
        assert_eq!(seats, before);
        assert_eq!(hand.version, 2);
    }

    #[test]
    fn test_out_of_turn_rejected() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        assert!(matches!(
            hand.apply_action(&mut seats, 2, Action::Check, None),
            Err(EngineError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_fold_out_awards_pot_without_reveal() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        hand.apply_action(&mut seats, 0, Action::Fold, None).unwrap();
        let t = hand.apply_action(&mut seats, 1, Action::Fold, None).unwrap();
        assert!(t.completed);
        assert!(t.revealed.is_empty());
        let result = t.result.unwrap();
        assert!(!result.showdown);
        assert_eq!(result.payouts[0].seat, 2);
        assert_eq!(result.payouts[0].amount, 30);
        assert_eq!(seats[&2].stack, 1010);
        assert_eq!(stacks_total(&seats), 3000);
        assert_eq!(hand.phase, HandPhase::Complete);
        assert_eq!(hand.current_actor, None);
    }

    #[test]
    fn test_checked_down_hand_reaches_showdown() {
        let mut seats = seats(&[1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        let mut last = hand
            .apply_action(&mut seats, hand.dealer_seat, Action::Call, None)
            .unwrap();
        while let Some(actor) = last.next_actor {
            last = hand
                .apply_action(&mut seats, actor, Action::Check, None)
                .unwrap();
        }
        assert!(last.completed);
        assert_eq!(hand.community_cards.len(), 5);
        assert_eq!(last.revealed.len(), 2);
        assert!(last.result.unwrap().showdown);
        assert_eq!(stacks_total(&seats), 2000);
    }

    #[test]
    fn test_min_raise_tracks_last_full_raise() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        hand.apply_action(&mut seats, 0, Action::Raise(100), None)
            .unwrap();
        assert_eq!(hand.current_bet, 100);
        assert_eq!(hand.min_raise, 80);
        assert!(
            hand.apply_action(&mut seats, 1, Action::Raise(150), None)
                .is_err()
        );
        hand.apply_action(&mut seats, 1, Action::Raise(180), None)
            .unwrap();
        assert_eq!(hand.min_raise, 80);
    }

    #[test]
    fn test_short_all_in_keeps_min_raise() {
        let mut seats = seats(&[1000, 1000, 110]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        hand.apply_action(&mut seats, 0, Action::Raise(100), None)
            .unwrap();
        hand.apply_action(&mut seats, 1, Action::Fold, None).unwrap();
        // Big blind shoves 110 total, 10 over the raise.
        hand.apply_action(&mut seats, 2, Action::AllIn, None).unwrap();
        assert_eq!(hand.current_bet, 110);
        assert_eq!(hand.min_raise, 80);
        assert_eq!(hand.current_actor, Some(0));
    }

    #[test]
    fn test_timeout_checks_when_free() {
        let mut seats = seats(&[1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        assert_eq!(hand.timeout_action(&seats), Some(Action::Fold));
        hand.apply_action(&mut seats, hand.dealer_seat, Action::Call, None)
            .unwrap();
        assert_eq!(hand.timeout_action(&seats), Some(Action::Check));
        let t = hand.apply_timeout(&mut seats).unwrap();
        assert!(t.action.unwrap().automatic);
        assert!(t.phase_changed);
    }

    #[test]
    fn test_void_refunds_contributions() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        hand.apply_action(&mut seats, 0, Action::Raise(60), None)
            .unwrap();
        let refunds = hand.void(&mut seats);
        assert_eq!(refunds.returned, vec![(100, 60), (101, 10), (102, 20)]);
        assert!(refunds.departed.is_empty());
        assert!(seats.values().all(|seat| seat.stack == 1000));
        assert!(!hand.is_active());
    }

    #[test]
    fn test_void_owes_departed_contributor_not_new_occupant() {
        let mut seats = seats(&[1000, 1000, 1000]);
        let (mut hand, _) = Hand::start(setup(blinds(10, 20)), &mut seats).unwrap();
        // Small blind folds and leaves; someone else sits in that seat
        hand.apply_action(&mut seats, 0, Action::Call, None).unwrap();
        hand.apply_action(&mut seats, 1, Action::Fold, None).unwrap();
        seats.remove(&1);
        seats.insert(1, Seat::new(900, 1, 400));

        let refunds = hand.void(&mut seats);
        assert_eq!(refunds.returned, vec![(100, 20), (102, 20)]);
        assert_eq!(refunds.departed, vec![(101, 10)]);
        assert_eq!(seats[&1].stack, 400);
        assert_eq!(seats[&0].stack, 1000);
    }

    #[test]
    fn test_deadline_set_when_clock_enabled() {
        let mut seats = seats(&[1000, 1000]);
        let mut s = setup(blinds(10, 20));
        s.turn_timeout_ms = Some(30_000);
        let (hand, transition) = Hand::start(s, &mut seats).unwrap();
        assert!(hand.action_deadline.is_some());
        assert_eq!(transition.deadline, hand.action_deadline);
    }
}
