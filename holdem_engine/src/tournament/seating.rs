//! Initial seat draw and table balancing plans.

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::{cmp::Reverse, collections::BTreeMap};

use crate::game::{
    constants::MIN_PLAYERS,
    entities::{PlayerId, TableId},
};

/// Shuffle players and deal them round-robin onto as few tables of
/// `table_size` as will hold them. Table sizes differ by at most one.
pub fn initial_seating(players: &[PlayerId], table_size: usize, seed: u64) -> Vec<Vec<PlayerId>> {
    if players.is_empty() {
        return Vec::new();
    }
    let table_count = players.len().div_ceil(table_size.max(MIN_PLAYERS));
    let mut drawn = players.to_vec();
    drawn.shuffle(&mut StdRng::seed_from_u64(seed));

    let mut tables = vec![Vec::new(); table_count];
    for (i, player) in drawn.into_iter().enumerate() {
        tables[i % table_count].push(player);
    }
    tables
}

/// One player moving between tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatMove {
    pub from: TableId,
    pub to: TableId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalancePlan {
    /// Applied in order
    pub moves: Vec<SeatMove>,
    /// Tables emptied by the moves
    pub close: Vec<TableId>,
}

impl RebalancePlan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.close.is_empty()
    }
}

/// Plan moves for the given `(table, players seated)` counts.
///
/// Tables are broken, smallest first, while the players fit on fewer
/// tables. Then single players move from the largest table to the
/// smallest until no two tables differ by more than one. Ties go to the
/// lowest table id.
pub fn plan_rebalance(counts: &[(TableId, usize)], table_size: usize) -> RebalancePlan {
    let mut counts: BTreeMap<TableId, usize> = counts.iter().copied().collect();
    let mut plan = RebalancePlan::default();
    let total: usize = counts.values().sum();
    let needed = total.div_ceil(table_size.max(MIN_PLAYERS)).max(1);

    while counts.len() > needed {
        let Some((&victim, &seated)) = counts.iter().min_by_key(|(id, n)| (**n, Reverse(**id)))
        else {
            break;
        };
        counts.remove(&victim);
        plan.close.push(victim);
        for _ in 0..seated {
            let Some((&to, _)) = counts.iter().min_by_key(|(id, n)| (**n, **id)) else {
                break;
            };
            plan.moves.push(SeatMove { from: victim, to });
            *counts.entry(to).or_insert(0) += 1;
        }
    }

    loop {
        let largest = counts.iter().max_by_key(|(id, n)| (**n, Reverse(**id)));
        let smallest = counts.iter().min_by_key(|(id, n)| (**n, **id));
        let (Some((&from, &high)), Some((&to, &low))) = (largest, smallest) else {
            break;
        };
        if high <= low + 1 {
            break;
        }
        plan.moves.push(SeatMove { from, to });
        *counts.entry(from).or_insert(0) -= 1;
        *counts.entry(to).or_insert(0) += 1;
    }
    plan
}
