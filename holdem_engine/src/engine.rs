//! Engine facade: the boundary operations by id, for an authenticated
//! caller.

use std::sync::Arc;

use crate::{
    broadcast::Broadcaster,
    cash::{CashGame, CashGameConfig, CashGameId, CashGameManager},
    config::EngineConfig,
    db::Repository,
    errors::{EngineError, EngineResult},
    events::EventTail,
    game::entities::{Action, Chips, PlayerId, SeatIndex, TableId},
    ledger::{ChipLedger, ChipTransaction},
    table::{ActionOutcome, PollResponse, TableManager, TableView},
    tournament::{Tournament, TournamentConfig, TournamentId, TournamentManager},
};

/// Resolve the session's player, or refuse the call.
fn authenticated(caller: Option<PlayerId>) -> EngineResult<PlayerId> {
    caller.ok_or(EngineError::NotAuthenticated)
}

/// Everything the engine runs, wired to one repository and broadcaster
#[derive(Clone)]
pub struct Engine {
    ledger: ChipLedger,
    tables: Arc<TableManager>,
    tournaments: TournamentManager,
    cash_games: Arc<CashGameManager>,
}

impl Engine {
    pub fn new(
        repository: Arc<dyn Repository>,
        broadcaster: Arc<dyn Broadcaster>,
        config: EngineConfig,
    ) -> Self {
        let ledger = ChipLedger::new(repository.clone());
        let tables = Arc::new(TableManager::new(
            repository.clone(),
            broadcaster.clone(),
            config.clone(),
        ));
        let tournaments = TournamentManager::new(
            repository.clone(),
            broadcaster,
            ledger.clone(),
            tables.clone(),
            config,
        );
        let cash_games = Arc::new(CashGameManager::new(
            repository,
            ledger.clone(),
            tables.clone(),
        ));
        Self {
            ledger,
            tables,
            tournaments,
            cash_games,
        }
    }

    pub fn ledger(&self) -> &ChipLedger {
        &self.ledger
    }

    pub fn tables(&self) -> &TableManager {
        &self.tables
    }

    pub fn tournaments(&self) -> &TournamentManager {
        &self.tournaments
    }

    pub fn cash_games(&self) -> &CashGameManager {
        &self.cash_games
    }

    /// Submit an action in the external vocabulary (`fold`, `raise`,
    /// `all-in`, ...). `amount` is the street total for bet and raise.
    ///
    /// # Errors
    ///
    /// * `EngineError::NotAuthenticated` - no caller
    /// * `EngineError::Validation` - unknown action or missing amount
    /// * `EngineError::VersionConflict` - `expected_version` is stale
    /// * `EngineError::InvalidAction` - illegal now or not the caller's turn
    pub async fn submit_action(
        &self,
        table_id: TableId,
        caller: Option<PlayerId>,
        kind: &str,
        amount: Option<Chips>,
        expected_version: Option<u64>,
    ) -> EngineResult<ActionOutcome> {
        let player_id = authenticated(caller)?;
        let action = Action::from_wire(kind, amount)?;
        let table = self.tables.get(table_id).await?;
        table.submit_action(player_id, action, expected_version).await
    }

    /// Everything the caller has not seen on a table yet
    pub async fn poll_table(
        &self,
        table_id: TableId,
        caller: Option<PlayerId>,
        since_version: Option<u64>,
        since_event_id: Option<u64>,
    ) -> EngineResult<PollResponse> {
        let player_id = authenticated(caller)?;
        let table = self.tables.get(table_id).await?;
        table
            .poll(Some(player_id), since_version, since_event_id)
            .await
    }

    pub async fn table_view(&self, table_id: TableId, caller: Option<PlayerId>) -> EngineResult<TableView> {
        let player_id = authenticated(caller)?;
        self.tables.get(table_id).await?.snapshot(Some(player_id)).await
    }

    pub async fn balance(&self, caller: Option<PlayerId>) -> EngineResult<i64> {
        self.ledger.balance(authenticated(caller)?).await
    }

    pub async fn transactions(&self, caller: Option<PlayerId>, limit: usize) -> EngineResult<Vec<ChipTransaction>> {
        self.ledger.history(authenticated(caller)?, limit).await
    }

    pub async fn create_tournament(
        &self,
        caller: Option<PlayerId>,
        config: TournamentConfig,
    ) -> EngineResult<Tournament> {
        self.tournaments.create(authenticated(caller)?, config).await
    }

    pub async fn register(&self, tournament_id: TournamentId, caller: Option<PlayerId>) -> EngineResult<Tournament> {
        self.tournaments
            .register(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn unregister(&self, tournament_id: TournamentId, caller: Option<PlayerId>) -> EngineResult<Tournament> {
        self.tournaments
            .unregister(tournament_id, authenticated(caller)?)
            .await
    }

    /// Creator starts the countdown
    pub async fn start_tournament(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
    ) -> EngineResult<Tournament> {
        self.tournaments
            .start_countdown(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn cancel_countdown(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
    ) -> EngineResult<Tournament> {
        self.tournaments
            .cancel_countdown(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn expire_countdown(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
    ) -> EngineResult<Tournament> {
        self.tournaments
            .expire(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn mark_ready(&self, tournament_id: TournamentId, caller: Option<PlayerId>) -> EngineResult<Tournament> {
        self.tournaments
            .mark_ready(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn open_early_start_vote(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
    ) -> EngineResult<Tournament> {
        self.tournaments
            .open_vote(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn vote_early_start(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
    ) -> EngineResult<Tournament> {
        self.tournaments
            .vote(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn force_start(&self, tournament_id: TournamentId, caller: Option<PlayerId>) -> EngineResult<Tournament> {
        self.tournaments
            .force_start(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn cancel_early_start_vote(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
    ) -> EngineResult<Tournament> {
        self.tournaments
            .cancel_vote(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn cancel_tournament(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
    ) -> EngineResult<Tournament> {
        self.tournaments
            .cancel(tournament_id, authenticated(caller)?)
            .await
    }

    pub async fn tournament_events(
        &self,
        tournament_id: TournamentId,
        caller: Option<PlayerId>,
        since_event_id: Option<u64>,
    ) -> EngineResult<EventTail> {
        authenticated(caller)?;
        self.tournaments.events(tournament_id, since_event_id).await
    }

    pub async fn create_cash_game(&self, caller: Option<PlayerId>, config: CashGameConfig) -> EngineResult<CashGame> {
        self.cash_games
            .create(authenticated(caller)?, config)
            .await
    }

    pub async fn join_cash_game(
        &self,
        game_id: CashGameId,
        caller: Option<PlayerId>,
        buy_in: Chips,
        preferred_seat: Option<SeatIndex>,
    ) -> EngineResult<SeatIndex> {
        self.cash_games
            .join(game_id, authenticated(caller)?, buy_in, preferred_seat)
            .await
    }

    pub async fn rebuy(&self, game_id: CashGameId, caller: Option<PlayerId>, amount: Chips) -> EngineResult<Chips> {
        self.cash_games
            .rebuy(game_id, authenticated(caller)?, amount)
            .await
    }

    pub async fn leave_cash_game(&self, game_id: CashGameId, caller: Option<PlayerId>) -> EngineResult<Chips> {
        self.cash_games
            .leave(game_id, authenticated(caller)?)
            .await
    }

    pub async fn close_cash_game(&self, game_id: CashGameId, caller: Option<PlayerId>) -> EngineResult<CashGame> {
        self.cash_games
            .close(game_id, authenticated(caller)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{broadcast::NoopBroadcaster, db::InMemoryRepository};

    fn engine() -> Engine {
        Engine::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(NoopBroadcaster),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_anonymous_caller_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.balance(None).await,
            Err(EngineError::NotAuthenticated)
        ));
        assert!(matches!(
            engine.submit_action(1, None, "fold", None, None).await,
            Err(EngineError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_unknown_action_is_validation_error() {
        let engine = engine();
        assert!(matches!(
            engine.submit_action(1, Some(1), "limp", None, None).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.submit_action(1, Some(1), "raise", None, None).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.submit_action(1, Some(1), "fold", None, None).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cash_game_through_facade() {
        let engine = engine();
        engine.ledger().grant(1, 1_000).await.unwrap();
        engine.ledger().grant(2, 1_000).await.unwrap();

        let game = engine
            .create_cash_game(Some(1), CashGameConfig::default())
            .await
            .unwrap();
        engine.join_cash_game(game.id, Some(1), 500, None).await.unwrap();
        engine.join_cash_game(game.id, Some(2), 500, None).await.unwrap();

        let view = engine.table_view(game.table_id, Some(1)).await.unwrap();
        let hand = view.hand.unwrap();
        let actor = hand.current_actor.unwrap();
        let player = view
            .seats
            .iter()
            .find(|s| s.seat_index == actor)
            .map(|s| s.player_id)
            .unwrap();

        let outcome = engine
            .submit_action(game.table_id, Some(player), "fold", None, Some(hand.version))
            .await
            .unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.hand.version, hand.version + 1);
    }
}
