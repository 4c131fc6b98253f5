//! Hand evaluation.

use super::entities::{Card, Rank, SubHand, Value};

/// Evaluate the best 5-card hand that can be made from `cards`.
///
/// Accepts any number of cards; with more than five every 5-card
/// combination is scored and the strongest kept. With fewer than five
/// only pairs/trips/quads and high cards can be made.
pub fn eval(cards: &[Card]) -> SubHand {
    if cards.len() <= 5 {
        return score(cards);
    }

    let n = cards.len();
    let mut best: Option<SubHand> = None;
    let mut five = Vec::with_capacity(5);
    for mask in 0u32..(1 << n) {
        if mask.count_ones() != 5 {
            continue;
        }
        five.clear();
        five.extend((0..n).filter(|i| mask & (1 << i) != 0).map(|i| cards[i]));
        let candidate = score(&five);
        if best.as_ref().is_none_or(|b| candidate > *b) {
            best = Some(candidate);
        }
    }
    best.unwrap_or_else(|| score(cards))
}

/// Indices of every hand tied for the best.
pub fn argmax(hands: &[SubHand]) -> Vec<usize> {
    let Some(best) = hands.iter().max() else {
        return Vec::new();
    };
    hands
        .iter()
        .enumerate()
        .filter(|(_, hand)| *hand == best)
        .map(|(i, _)| i)
        .collect()
}

fn score(cards: &[Card]) -> SubHand {
    let mut values: Vec<Value> = cards.iter().map(|card| card.0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.len() == 5 && cards.iter().all(|card| card.1 == cards[0].1);
    let straight_high = straight_high(&values);

    // (count, value), largest groups first, then highest value.
    let mut groups: Vec<(usize, Value)> = Vec::with_capacity(5);
    for value in &values {
        match groups.iter_mut().find(|(_, v)| v == value) {
            Some(group) => group.0 += 1,
            None => groups.push((1, *value)),
        }
    }
    groups.sort_unstable_by(|a, b| b.cmp(a));
    let pattern: Vec<usize> = groups.iter().map(|(count, _)| *count).collect();
    let grouped: Vec<Value> = groups.iter().map(|(_, value)| *value).collect();

    let (rank, values) = match (is_flush, straight_high, pattern.as_slice()) {
        (true, Some(high), _) => (Rank::StraightFlush, vec![high]),
        (_, _, [4, ..]) => (Rank::FourOfAKind, grouped),
        (_, _, [3, 2]) => (Rank::FullHouse, grouped),
        (true, None, _) => (Rank::Flush, values),
        (false, Some(high), _) => (Rank::Straight, vec![high]),
        (_, _, [3, ..]) => (Rank::ThreeOfAKind, grouped),
        (_, _, [2, 2, ..]) => (Rank::TwoPair, grouped),
        (_, _, [2, ..]) => (Rank::OnePair, grouped),
        _ => (Rank::HighCard, values),
    };
    SubHand { rank, values }
}

/// High card of a 5-card straight, with the wheel (A-2-3-4-5) playing
/// five-high. Expects values sorted descending.
fn straight_high(values: &[Value]) -> Option<Value> {
    if values.len() != 5 {
        return None;
    }
    if values.windows(2).any(|pair| pair[0] == pair[1]) {
        return None;
    }
    if values[0] - values[4] == 4 {
        return Some(values[0]);
    }
    if values == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}
