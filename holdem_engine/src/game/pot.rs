//! Main/side pot construction and pot splitting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    entities::{Chips, SeatIndex, SubHand},
    functional::argmax,
};

/// Chips a seat has committed over the whole hand, antes included.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Contribution {
    pub seat: SeatIndex,
    pub amount: Chips,
    pub folded: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SidePot {
    pub amount: Chips,
    /// Non-folded seats that can win this pot, ascending.
    pub eligible_seats: Vec<SeatIndex>,
}

/// Result of settling one pot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PotAward {
    pub pot_index: usize,
    pub amount: Chips,
    pub winners: Vec<SeatIndex>,
    pub shares: Vec<(SeatIndex, Chips)>,
}

/// Build the main pot followed by side pots.
///
/// Each distinct contribution level carves a slice worth
/// `(level - previous) * contributors at or above level`, eligible to the
/// non-folded seats at or above that level. Adjacent slices with the same
/// eligible set are merged. A slice nobody can win (it was put in only by
/// folded seats) is folded into the neighbouring pot.
pub fn compute_pots(contributions: &[Contribution]) -> Vec<SidePot> {
    let mut levels: Vec<Chips> = contributions
        .iter()
        .map(|c| c.amount)
        .filter(|amount| *amount > 0)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots: Vec<SidePot> = Vec::new();
    let mut orphaned: Chips = 0;
    let mut previous: Chips = 0;
    for level in levels {
        let contributors = contributions.iter().filter(|c| c.amount >= level).count();
        let slice = (level - previous).saturating_mul(contributors as Chips);
        previous = level;

        let mut eligible: Vec<SeatIndex> = contributions
            .iter()
            .filter(|c| c.amount >= level && !c.folded)
            .map(|c| c.seat)
            .collect();
        eligible.sort_unstable();

        if eligible.is_empty() {
            match pots.last_mut() {
                Some(last) => last.amount = last.amount.saturating_add(slice),
                None => orphaned = orphaned.saturating_add(slice),
            }
            continue;
        }

        match pots.last_mut() {
            Some(last) if last.eligible_seats == eligible => {
                last.amount = last.amount.saturating_add(slice);
            }
            _ => pots.push(SidePot {
                amount: slice.saturating_add(orphaned),
                eligible_seats: eligible,
            }),
        }
        orphaned = 0;
    }

    if orphaned > 0 {
        // Nobody is live; keep the chips accounted for.
        pots.push(SidePot {
            amount: orphaned,
            eligible_seats: Vec::new(),
        });
    }
    pots
}

/// Clockwise distance from the seat left of the dealer.
fn seat_order(seat: SeatIndex, dealer: SeatIndex, capacity: usize) -> usize {
    (seat + capacity - (dealer + 1) % capacity) % capacity
}

/// Split `amount` evenly among `winners`. Odd chips go out one at a time
/// starting with the first winner left of the dealer.
pub fn split_pot(
    amount: Chips,
    winners: &[SeatIndex],
    dealer: SeatIndex,
    capacity: usize,
) -> Vec<(SeatIndex, Chips)> {
    if winners.is_empty() {
        return Vec::new();
    }
    let mut ordered = winners.to_vec();
    ordered.sort_by_key(|seat| seat_order(*seat, dealer, capacity.max(1)));

    let n = ordered.len() as Chips;
    let share = amount / n;
    let remainder = (amount % n) as usize;
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, seat)| (seat, share + Chips::from(i < remainder)))
        .collect()
}

/// Award each pot to the best hand(s) among its eligible seats.
pub fn award_pots(
    pots: &[SidePot],
    hands: &BTreeMap<SeatIndex, SubHand>,
    dealer: SeatIndex,
    capacity: usize,
) -> Vec<PotAward> {
    pots.iter()
        .enumerate()
        .filter(|(_, pot)| pot.amount > 0)
        .map(|(pot_index, pot)| {
            let contenders: Vec<SeatIndex> = pot
                .eligible_seats
                .iter()
                .copied()
                .filter(|seat| hands.contains_key(seat))
                .collect();
            let winners: Vec<SeatIndex> = if contenders.len() <= 1 {
                contenders
            } else {
                let ranked: Vec<SubHand> =
                    contenders.iter().map(|seat| hands[seat].clone()).collect();
                argmax(&ranked).into_iter().map(|i| contenders[i]).collect()
            };
            let shares = split_pot(pot.amount, &winners, dealer, capacity);
            PotAward {
                pot_index,
                amount: pot.amount,
                winners,
                shares,
            }
        })
        .collect()
}
