//! In-memory `Repository` for tests and single-process deployments.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::Mutex;

use super::repository::{IdKind, Repository};
use crate::{
    cash::{CashGame, CashGameId},
    errors::{EngineError, EngineResult},
    game::{
        entities::{PlayerId, TableId},
        hand::{Hand, HandId},
    },
    ledger::{ChipTransaction, NewTransaction},
    table::Table,
    tournament::{Tournament, TournamentId},
};

#[derive(Default)]
struct MemoryState {
    next_ids: HashMap<IdKind, i64>,
    tables: HashMap<TableId, Table>,
    hands: HashMap<HandId, Hand>,
    tournaments: HashMap<TournamentId, Tournament>,
    cash_games: HashMap<CashGameId, CashGame>,
    balances: HashMap<PlayerId, i64>,
    transactions: Vec<ChipTransaction>,
    idempotency_keys: HashSet<String>,
}

/// Keeps everything in a single mutex-guarded map set.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every record save fail with a timeout, to exercise the paths
    /// where storage is down. Ledger writes are unaffected.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> EngineResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Timeout(std::time::Duration::ZERO));
        }
        Ok(())
    }

    /// Number of hands stored for `table_id`.
    pub async fn hand_count(&self, table_id: TableId) -> usize {
        self.state
            .lock()
            .await
            .hands
            .values()
            .filter(|hand| hand.table_id == table_id)
            .count()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn next_id(&self, kind: IdKind) -> EngineResult<i64> {
        let mut state = self.state.lock().await;
        let next = state.next_ids.entry(kind).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn save_table(&self, table: &Table) -> EngineResult<()> {
        self.check_writable()?;
        self.state
            .lock()
            .await
            .tables
            .insert(table.id, table.clone());
        Ok(())
    }

    async fn load_table(&self, id: TableId) -> EngineResult<Option<Table>> {
        Ok(self.state.lock().await.tables.get(&id).cloned())
    }

    async fn save_hand(&self, hand: &Hand) -> EngineResult<()> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let stale = state
            .hands
            .get(&hand.id)
            .is_some_and(|stored| stored.version > hand.version);
        if !stale {
            state.hands.insert(hand.id, hand.clone());
        }
        Ok(())
    }

    async fn load_hand(&self, id: HandId) -> EngineResult<Option<Hand>> {
        Ok(self.state.lock().await.hands.get(&id).cloned())
    }

    async fn save_tournament(&self, tournament: &Tournament) -> EngineResult<()> {
        self.check_writable()?;
        self.state
            .lock()
            .await
            .tournaments
            .insert(tournament.id, tournament.clone());
        Ok(())
    }

    async fn load_tournament(&self, id: TournamentId) -> EngineResult<Option<Tournament>> {
        Ok(self.state.lock().await.tournaments.get(&id).cloned())
    }

    async fn save_cash_game(&self, game: &CashGame) -> EngineResult<()> {
        self.check_writable()?;
        self.state
            .lock()
            .await
            .cash_games
            .insert(game.id, game.clone());
        Ok(())
    }

    async fn load_cash_game(&self, id: CashGameId) -> EngineResult<Option<CashGame>> {
        Ok(self.state.lock().await.cash_games.get(&id).cloned())
    }

    async fn balance(&self, player_id: PlayerId) -> EngineResult<i64> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(&player_id)
            .copied()
            .unwrap_or(0))
    }

    async fn record_transaction(&self, new: &NewTransaction) -> EngineResult<ChipTransaction> {
        let mut state = self.state.lock().await;
        if state.idempotency_keys.contains(&new.idempotency_key) {
            return Err(EngineError::DuplicateTransaction(new.idempotency_key.clone()));
        }
        let available = state.balances.get(&new.player_id).copied().unwrap_or(0);
        let balance_after = available + new.amount;
        if balance_after < 0 {
            return Err(EngineError::InsufficientChips {
                required: -new.amount,
                available,
            });
        }

        state.balances.insert(new.player_id, balance_after);
        state.idempotency_keys.insert(new.idempotency_key.clone());
        let transaction = ChipTransaction {
            id: state.transactions.len() as i64 + 1,
            player_id: new.player_id,
            amount: new.amount,
            balance_after,
            cause: new.cause,
            reference: new.reference.clone(),
            idempotency_key: new.idempotency_key.clone(),
            created_at: Utc::now(),
        };
        state.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn transactions(
        &self,
        player_id: PlayerId,
        limit: usize,
    ) -> EngineResult<Vec<ChipTransaction>> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.player_id == player_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
