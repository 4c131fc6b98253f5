//! Cash game sessions: buy-ins, rebuys and cash-outs around one table.

use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};

use super::models::{CashGame, CashGameConfig, CashGameId, CashGameStatus};
use crate::{
    db::{IdKind, Repository},
    errors::{EngineError, EngineResult},
    events::cash_game_channel,
    game::entities::{Chips, PlayerId, SeatIndex},
    ledger::{ChipLedger, TransactionCause},
    table::{TableHandle, TableManager, TableOwner},
};

/// Cash game manager
pub struct CashGameManager {
    repository: Arc<dyn Repository>,
    ledger: ChipLedger,
    tables: Arc<TableManager>,
    games: Arc<RwLock<HashMap<CashGameId, Arc<Mutex<CashGame>>>>>,
}

impl CashGameManager {
    pub fn new(repository: Arc<dyn Repository>, ledger: ChipLedger, tables: Arc<TableManager>) -> Self {
        Self {
            repository,
            ledger,
            tables,
            games: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a cash game and open its table
    ///
    /// # Errors
    ///
    /// * `EngineError::Validation` - invalid configuration
    pub async fn create(&self, creator: PlayerId, config: CashGameConfig) -> EngineResult<CashGame> {
        config.validate().map_err(EngineError::Validation)?;

        let id = self.repository.next_id(IdKind::CashGame).await?;
        let handle = self
            .tables
            .create_table(config.table_config(), TableOwner::CashGame(id), None, None)
            .await?;
        let game = CashGame {
            id,
            creator,
            config,
            status: CashGameStatus::Open,
            table_id: handle.table_id(),
            created_at: Utc::now(),
            closed_at: None,
        };
        self.persist(&game).await;
        self.games
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(game.clone())));

        log::info!("Cash game {id} '{}' created on table {}", game.config.name, game.table_id);
        Ok(game)
    }

    pub async fn get(&self, game_id: CashGameId) -> EngineResult<CashGame> {
        let game = self.game(game_id).await?;
        let game = game.lock().await;
        Ok(game.clone())
    }

    /// Buy in and take a seat. Deals as soon as two players are seated.
    ///
    /// # Errors
    ///
    /// * `EngineError::Validation` - buy-in outside the game's bounds
    /// * `EngineError::InsufficientChips` - balance does not cover the buy-in
    /// * `EngineError::StateConflict` - game closed, table full or already seated
    pub async fn join(
        &self,
        game_id: CashGameId,
        player_id: PlayerId,
        buy_in: Chips,
        preferred_seat: Option<SeatIndex>,
    ) -> EngineResult<SeatIndex> {
        let game = self.game(game_id).await?;
        let mut game = game.lock().await;
        let handle = self.open_table(&game).await?;

        let config = &game.config;
        if !(config.min_buy_in..=config.max_buy_in).contains(&buy_in) {
            return Err(EngineError::Validation(format!(
                "buy-in must be between {} and {}",
                config.min_buy_in, config.max_buy_in
            )));
        }

        self.ledger
            .debit(
                player_id,
                i64::from(buy_in),
                TransactionCause::BuyIn,
                Some(cash_game_channel(game_id)),
            )
            .await?;
        let seat = match handle.seat_player(player_id, buy_in, preferred_seat).await {
            Ok(seat) => seat,
            Err(e) => {
                self.refund(player_id, buy_in, TransactionCause::BuyIn, game_id)
                    .await;
                return Err(e);
            }
        };
        log::info!("Player {player_id} joined cash game {game_id} at seat {seat} with {buy_in}");

        if let Err(e) = handle.start_hand().await {
            log::debug!("Cash game {game_id}: no hand started after join: {e}");
        }
        if game.status == CashGameStatus::Open && handle.snapshot(None).await?.seats.len() >= 2 {
            game.status = CashGameStatus::Running;
            self.persist(&game).await;
        }
        Ok(seat)
    }

    /// Add chips to a seated player's stack, up to the max buy-in, and
    /// deal if the table was waiting for a player. Returns the chips
    /// added; anything over the cap goes back to the player's balance.
    pub async fn rebuy(&self, game_id: CashGameId, player_id: PlayerId, amount: Chips) -> EngineResult<Chips> {
        if amount == 0 {
            return Err(EngineError::Validation("rebuy must be positive".to_string()));
        }
        let game = self.game(game_id).await?;
        let game = game.lock().await;
        let handle = self.open_table(&game).await?;

        self.ledger
            .debit(
                player_id,
                i64::from(amount),
                TransactionCause::Rebuy,
                Some(cash_game_channel(game_id)),
            )
            .await?;
        let added = match handle
            .add_chips(player_id, amount, Some(game.config.max_buy_in))
            .await
        {
            Ok(added) => added,
            Err(e) => {
                self.refund(player_id, amount, TransactionCause::Rebuy, game_id)
                    .await;
                return Err(e);
            }
        };
        if added < amount {
            self.refund(player_id, amount - added, TransactionCause::Rebuy, game_id)
                .await;
        }
        log::info!("Player {player_id} rebought {added} in cash game {game_id}");

        // A busted player coming back may be what the table needs to deal
        if let Err(e) = handle.start_hand().await {
            log::debug!("Cash game {game_id}: no hand started after rebuy: {e}");
        }
        Ok(added)
    }

    /// Stand up and cash out the stack. Returns the chips cashed out.
    pub async fn leave(&self, game_id: CashGameId, player_id: PlayerId) -> EngineResult<Chips> {
        let game = self.game(game_id).await?;
        let game = game.lock().await;
        let handle = self.open_table(&game).await?;

        let stack = handle.remove_seat(player_id).await?;
        if stack > 0 {
            self.ledger
                .credit(
                    player_id,
                    i64::from(stack),
                    TransactionCause::CashOut,
                    Some(cash_game_channel(game_id)),
                )
                .await?;
        }
        log::info!("Player {player_id} left cash game {game_id} with {stack}");
        Ok(stack)
    }

    /// Close the game, voiding any live hand and cashing everyone out
    /// (creator only)
    pub async fn close(&self, game_id: CashGameId, caller: PlayerId) -> EngineResult<CashGame> {
        let game = self.game(game_id).await?;
        let mut game = game.lock().await;
        if game.creator != caller {
            return Err(EngineError::Forbidden(
                "only the creator may close a cash game".to_string(),
            ));
        }
        if game.status == CashGameStatus::Closed {
            return Err(EngineError::StateConflict(format!(
                "cash game {game_id} is already closed"
            )));
        }

        let stacks = self.tables.close_table(game.table_id).await?;
        for (player_id, stack) in stacks {
            if stack == 0 {
                continue;
            }
            if let Err(e) = self
                .ledger
                .credit(
                    player_id,
                    i64::from(stack),
                    TransactionCause::CashOut,
                    Some(cash_game_channel(game_id)),
                )
                .await
            {
                log::error!("Cash game {game_id}: cash-out of {stack} to {player_id} failed: {e}");
            }
        }

        game.status = CashGameStatus::Closed;
        game.closed_at = Some(Utc::now());
        self.persist(&game).await;
        log::info!("Cash game {game_id} closed");
        Ok(game.clone())
    }

    async fn game(&self, game_id: CashGameId) -> EngineResult<Arc<Mutex<CashGame>>> {
        if let Some(game) = self.games.read().await.get(&game_id) {
            return Ok(game.clone());
        }
        let game = self
            .repository
            .load_cash_game(game_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CashGame", game_id))?;
        Ok(self
            .games
            .write()
            .await
            .entry(game_id)
            .or_insert_with(|| Arc::new(Mutex::new(game)))
            .clone())
    }

    async fn open_table(&self, game: &CashGame) -> EngineResult<TableHandle> {
        if game.status == CashGameStatus::Closed {
            return Err(EngineError::StateConflict(format!(
                "cash game {} is closed",
                game.id
            )));
        }
        self.tables.get(game.table_id).await
    }

    async fn refund(&self, player_id: PlayerId, amount: Chips, cause: TransactionCause, game_id: CashGameId) {
        if let Err(e) = self
            .ledger
            .credit(player_id, i64::from(amount), cause, Some(cash_game_channel(game_id)))
            .await
        {
            log::error!("Cash game {game_id}: refund of {amount} to {player_id} failed: {e}");
        }
    }

    async fn persist(&self, game: &CashGame) {
        if let Err(e) = self.repository.save_cash_game(game).await {
            log::error!("Failed to save cash game {}: {e}", game.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broadcast::NoopBroadcaster, config::EngineConfig, db::InMemoryRepository,
    };

    async fn setup() -> (CashGameManager, ChipLedger, Arc<TableManager>) {
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let ledger = ChipLedger::new(repository.clone());
        let tables = Arc::new(TableManager::new(
            repository.clone(),
            Arc::new(NoopBroadcaster),
            EngineConfig::default(),
        ));
        for player in 1..=4 {
            ledger.grant(player, 5_000).await.unwrap();
        }
        (
            CashGameManager::new(repository, ledger.clone(), tables.clone()),
            ledger,
            tables,
        )
    }

    #[tokio::test]
    async fn test_join_debits_and_starts_game() {
        let (manager, ledger, tables) = setup().await;
        let game = manager.create(1, CashGameConfig::default()).await.unwrap();
        assert_eq!(game.status, CashGameStatus::Open);

        manager.join(game.id, 1, 1_000, None).await.unwrap();
        assert_eq!(manager.get(game.id).await.unwrap().status, CashGameStatus::Open);
        manager.join(game.id, 2, 1_000, None).await.unwrap();
        assert_eq!(ledger.balance(1).await.unwrap(), 4_000);
        assert_eq!(manager.get(game.id).await.unwrap().status, CashGameStatus::Running);

        let view = tables.get(game.table_id).await.unwrap().snapshot(None).await.unwrap();
        assert!(view.hand.is_some());
    }

    #[tokio::test]
    async fn test_buy_in_bounds() {
        let (manager, ledger, _) = setup().await;
        let game = manager.create(1, CashGameConfig::default()).await.unwrap();
        assert!(matches!(
            manager.join(game.id, 1, 100, None).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            manager.join(game.id, 1, 3_000, None).await,
            Err(EngineError::Validation(_))
        ));
        assert_eq!(ledger.balance(1).await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_failed_seat_refunds_buy_in() {
        let (manager, ledger, _) = setup().await;
        let game = manager.create(1, CashGameConfig::default()).await.unwrap();
        manager.join(game.id, 1, 1_000, None).await.unwrap();
        assert!(matches!(
            manager.join(game.id, 1, 1_000, None).await,
            Err(EngineError::StateConflict(_))
        ));
        assert_eq!(ledger.balance(1).await.unwrap(), 4_000);
    }

    #[tokio::test]
    async fn test_rebuy_capped_at_max() {
        let (manager, ledger, _) = setup().await;
        let game = manager.create(1, CashGameConfig::default()).await.unwrap();
        manager.join(game.id, 1, 1_500, None).await.unwrap();

        assert_eq!(manager.rebuy(game.id, 1, 1_000).await.unwrap(), 500);
        assert_eq!(ledger.balance(1).await.unwrap(), 3_000);
        assert!(matches!(
            manager.rebuy(game.id, 1, 100).await,
            Err(EngineError::StateConflict(_))
        ));
        assert_eq!(ledger.balance(1).await.unwrap(), 3_000);
    }

    #[tokio::test]
    async fn test_leave_cashes_out() {
        let (manager, ledger, _) = setup().await;
        let game = manager.create(1, CashGameConfig::default()).await.unwrap();
        manager.join(game.id, 3, 800, None).await.unwrap();
        assert_eq!(manager.leave(game.id, 3).await.unwrap(), 800);
        assert_eq!(ledger.balance(3).await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_close_refunds_stacks() {
        let (manager, ledger, _) = setup().await;
        let game = manager.create(1, CashGameConfig::default()).await.unwrap();
        manager.join(game.id, 1, 1_000, None).await.unwrap();
        manager.join(game.id, 2, 1_000, None).await.unwrap();

        assert!(matches!(
            manager.close(game.id, 2).await,
            Err(EngineError::Forbidden(_))
        ));
        let game = manager.close(game.id, 1).await.unwrap();
        assert_eq!(game.status, CashGameStatus::Closed);
        // the live hand is voided, so blinds come back
        assert_eq!(ledger.balance(1).await.unwrap(), 5_000);
        assert_eq!(ledger.balance(2).await.unwrap(), 5_000);

        assert!(matches!(
            manager.join(game.id, 3, 1_000, None).await,
            Err(EngineError::StateConflict(_))
        ));
    }
}
