//! Tournament manager: registration, countdown and ready-check, early-start
//! voting, blind levels, eliminations, balancing and payouts.

use chrono::{TimeDelta, Utc};
use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{Mutex, RwLock, mpsc, watch},
    task::JoinHandle,
};

use super::{
    models::{
        Countdown, PrizeStructure, Tournament, TournamentConfig, TournamentId,
        TournamentRegistration, TournamentState,
    },
    seating::{SeatMove, initial_seating, plan_rebalance},
};
use crate::{
    broadcast::Broadcaster,
    config::EngineConfig,
    db::{IdKind, Repository},
    errors::{EngineError, EngineResult},
    events::{EngineEvent, EventLog, EventTail, tournament_channel},
    game::{
        constants::MIN_PLAYERS,
        entities::{Blinds, Chips, PlayerId, TableId},
        hand::HandPhase,
    },
    ledger::{ChipLedger, NewTransaction, TransactionCause},
    table::{TableConfig, TableHandle, TableManager, TableNotice, TableOwner},
};

struct TournamentEntry {
    tournament: Tournament,
    log: EventLog,
    /// Blind level shared with the tournament's tables while running
    blinds: Option<watch::Sender<Blinds>>,
    level_clock: Option<JoinHandle<()>>,
}

impl TournamentEntry {
    fn new(tournament: Tournament, log_capacity: usize) -> Self {
        Self {
            log: EventLog::new(tournament_channel(tournament.id), log_capacity),
            tournament,
            blinds: None,
            level_clock: None,
        }
    }
}

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    repository: Arc<dyn Repository>,
    broadcaster: Arc<dyn Broadcaster>,
    ledger: ChipLedger,
    tables: Arc<TableManager>,
    config: EngineConfig,
    tournaments: Arc<RwLock<HashMap<TournamentId, Arc<Mutex<TournamentEntry>>>>>,
}

fn require_state(tournament: &Tournament, state: TournamentState) -> EngineResult<()> {
    if tournament.state != state {
        return Err(EngineError::StateConflict(format!(
            "tournament {} is {}",
            tournament.id, tournament.state
        )));
    }
    Ok(())
}

fn require_creator(tournament: &Tournament, caller: PlayerId, what: &str) -> EngineResult<()> {
    if tournament.creator != caller {
        return Err(EngineError::Forbidden(format!(
            "only the tournament creator may {what}"
        )));
    }
    Ok(())
}

fn require_registered(tournament: &Tournament, player_id: PlayerId) -> EngineResult<()> {
    if !tournament.is_registered(player_id) {
        return Err(EngineError::Forbidden(format!(
            "player {player_id} is not registered for tournament {}",
            tournament.id
        )));
    }
    Ok(())
}

impl TournamentManager {
    pub fn new(
        repository: Arc<dyn Repository>,
        broadcaster: Arc<dyn Broadcaster>,
        ledger: ChipLedger,
        tables: Arc<TableManager>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            broadcaster,
            ledger,
            tables,
            config,
            tournaments: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Sit-n-Go preset using this engine's countdown and level length
    pub fn sit_and_go_config(&self, name: String, max_players: usize, buy_in: i64) -> TournamentConfig {
        let mut config = TournamentConfig::sit_and_go(name, max_players, buy_in);
        config.countdown_secs = self.config.countdown_secs;
        for level in &mut config.blind_levels {
            level.duration_secs = self.config.level_duration_secs;
        }
        config
    }

    /// Create a new tournament
    ///
    /// # Errors
    ///
    /// * `EngineError::Validation` - invalid configuration
    pub async fn create(&self, creator: PlayerId, config: TournamentConfig) -> EngineResult<Tournament> {
        config.validate().map_err(EngineError::Validation)?;

        let id = self.repository.next_id(IdKind::Tournament).await?;
        let tournament = Tournament::new(id, creator, config);
        self.persist(&tournament).await;

        let created = EngineEvent::TournamentCreated {
            tournament_id: id,
            name: tournament.config.name.clone(),
            buy_in: tournament.config.buy_in,
            max_players: tournament.config.max_players,
        };
        let mut entry = TournamentEntry::new(tournament, self.config.event_log_capacity);
        self.emit(&mut entry, created).await;
        let tournament = entry.tournament.clone();
        self.tournaments
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(entry)));

        log::info!("Tournament {id} '{}' created by {creator}", tournament.config.name);
        Ok(tournament)
    }

    pub async fn get(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let entry = entry.lock().await;
        Ok(entry.tournament.clone())
    }

    /// Tournament channel events after `since_event_id`
    pub async fn events(
        &self,
        tournament_id: TournamentId,
        since_event_id: Option<u64>,
    ) -> EngineResult<EventTail> {
        let entry = self.entry(tournament_id).await?;
        let entry = entry.lock().await;
        Ok(entry.log.since(since_event_id))
    }

    /// Register a player, debiting the buy-in. Reaching capacity starts
    /// the countdown.
    ///
    /// # Errors
    ///
    /// * `EngineError::StateConflict` - not registering, already registered or full
    /// * `EngineError::InsufficientChips` - balance does not cover the buy-in
    pub async fn register(&self, tournament_id: TournamentId, player_id: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        let tournament = &entry.tournament;
        require_state(tournament, TournamentState::Registering)?;
        if tournament.is_registered(player_id) {
            return Err(EngineError::StateConflict(format!(
                "player {player_id} is already registered"
            )));
        }
        if tournament.registered_count() >= tournament.config.max_players {
            return Err(EngineError::StateConflict("tournament is full".to_string()));
        }

        let buy_in = tournament.config.buy_in;
        if buy_in > 0 {
            self.ledger
                .debit(
                    player_id,
                    buy_in,
                    TransactionCause::TournamentBuyIn,
                    Some(tournament_channel(tournament_id)),
                )
                .await?;
        }

        let tournament = &mut entry.tournament;
        tournament.registrations.push(TournamentRegistration {
            player_id,
            registered_at: Utc::now(),
            ready: false,
            finish_position: None,
            prize_amount: None,
        });
        log::info!(
            "Player {player_id} registered for tournament {tournament_id} ({}/{})",
            tournament.registered_count(),
            tournament.config.max_players
        );

        if tournament.registered_count() >= tournament.config.max_players
            && tournament.countdown.is_none()
        {
            let countdown = Countdown {
                started_at: Utc::now(),
                duration_secs: tournament.config.countdown_secs,
            };
            tournament.countdown = Some(countdown);
            log::info!("Tournament {tournament_id} full, countdown started");
            self.schedule_countdown(tournament_id, countdown);
        }

        self.persist(&entry.tournament).await;
        Ok(entry.tournament.clone())
    }

    /// Withdraw before the start and refund the buy-in
    pub async fn unregister(&self, tournament_id: TournamentId, player_id: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        require_state(&entry.tournament, TournamentState::Registering)?;
        let Some(index) = entry
            .tournament
            .registrations
            .iter()
            .position(|r| r.player_id == player_id)
        else {
            return Err(EngineError::not_found("Registration", player_id));
        };

        let buy_in = entry.tournament.config.buy_in;
        if buy_in > 0 {
            self.ledger
                .credit(
                    player_id,
                    buy_in,
                    TransactionCause::TournamentRefund,
                    Some(tournament_channel(tournament_id)),
                )
                .await?;
        }

        let tournament = &mut entry.tournament;
        tournament.registrations.remove(index);
        if let Some(votes) = tournament.early_start_votes.as_mut() {
            votes.remove(&player_id);
        }
        if tournament.countdown.is_some()
            && tournament.registered_count() < tournament.config.min_players
        {
            tournament.countdown = None;
            log::info!("Tournament {tournament_id} countdown cancelled, not enough players");
        }
        log::info!("Player {player_id} unregistered from tournament {tournament_id}");

        self.persist(&entry.tournament).await;
        Ok(entry.tournament.clone())
    }

    /// Start the pre-start countdown (creator only)
    pub async fn start_countdown(&self, tournament_id: TournamentId, caller: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        let tournament = &mut entry.tournament;
        require_creator(tournament, caller, "start the countdown")?;
        require_state(tournament, TournamentState::Registering)?;
        if tournament.countdown.is_some() {
            return Err(EngineError::StateConflict(
                "countdown is already running".to_string(),
            ));
        }
        let needed = tournament.config.min_players.max(MIN_PLAYERS);
        if tournament.registered_count() < needed {
            return Err(EngineError::StateConflict(format!(
                "need at least {needed} players, have {}",
                tournament.registered_count()
            )));
        }

        let countdown = Countdown {
            started_at: Utc::now(),
            duration_secs: tournament.config.countdown_secs,
        };
        tournament.countdown = Some(countdown);
        self.schedule_countdown(tournament_id, countdown);
        log::info!(
            "Tournament {tournament_id} countdown started, ends at {}",
            countdown.deadline()
        );

        self.persist(&entry.tournament).await;
        Ok(entry.tournament.clone())
    }

    /// Stop a running countdown (creator only)
    pub async fn cancel_countdown(&self, tournament_id: TournamentId, caller: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        let tournament = &mut entry.tournament;
        require_creator(tournament, caller, "cancel the countdown")?;
        require_state(tournament, TournamentState::Registering)?;
        if tournament.countdown.take().is_none() {
            return Err(EngineError::StateConflict("no countdown is running".to_string()));
        }
        log::info!("Tournament {tournament_id} countdown cancelled by creator");

        self.persist(&entry.tournament).await;
        Ok(entry.tournament.clone())
    }

    /// Start the tournament once its countdown has run out. Any registrant
    /// may call this; calls after the start change nothing.
    pub async fn expire(&self, tournament_id: TournamentId, caller: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        let tournament = &entry.tournament;
        if tournament.creator != caller {
            require_registered(tournament, caller)?;
        }
        match tournament.state {
            TournamentState::Running | TournamentState::Complete => {
                return Ok(tournament.clone());
            }
            TournamentState::Cancelled => {
                return Err(EngineError::StateConflict(format!(
                    "tournament {tournament_id} was cancelled"
                )));
            }
            TournamentState::Registering => {}
        }
        let Some(countdown) = tournament.countdown else {
            return Err(EngineError::StateConflict("no countdown is running".to_string()));
        };
        if !countdown.has_expired(Utc::now()) {
            return Err(EngineError::StateConflict(format!(
                "countdown ends at {}",
                countdown.deadline()
            )));
        }

        self.start_locked(&mut entry).await?;
        Ok(entry.tournament.clone())
    }

    /// Mark a registrant ready. With ready-check enabled, the tournament
    /// starts as soon as everyone is ready.
    pub async fn mark_ready(&self, tournament_id: TournamentId, player_id: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        require_state(&entry.tournament, TournamentState::Registering)?;
        require_registered(&entry.tournament, player_id)?;
        if let Some(registration) = entry.tournament.registration_mut(player_id) {
            registration.ready = true;
        }

        let tournament = &entry.tournament;
        let all_ready = tournament.registrations.iter().all(|r| r.ready);
        let enough = tournament.registered_count() >= tournament.config.min_players.max(MIN_PLAYERS);
        if tournament.config.ready_check && all_ready && enough {
            log::info!("Tournament {tournament_id}: everyone ready, starting");
            self.start_locked(&mut entry).await?;
        } else {
            self.persist(&entry.tournament).await;
        }
        Ok(entry.tournament.clone())
    }

    /// Open an early-start vote (creator only, needs two registrants)
    pub async fn open_vote(&self, tournament_id: TournamentId, caller: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        let tournament = &mut entry.tournament;
        require_creator(tournament, caller, "open an early-start vote")?;
        require_state(tournament, TournamentState::Registering)?;
        if tournament.registered_count() < MIN_PLAYERS {
            return Err(EngineError::StateConflict(format!(
                "early start needs at least {MIN_PLAYERS} players"
            )));
        }
        if tournament.early_start_votes.is_some() {
            return Err(EngineError::StateConflict("a vote is already open".to_string()));
        }
        tournament.early_start_votes = Some(BTreeSet::new());

        self.persist(&entry.tournament).await;
        Ok(entry.tournament.clone())
    }

    /// Vote to start early; the tournament starts once every registrant
    /// has voted.
    pub async fn vote(&self, tournament_id: TournamentId, player_id: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        require_state(&entry.tournament, TournamentState::Registering)?;
        require_registered(&entry.tournament, player_id)?;

        let registered = entry.tournament.registered_count();
        let Some(votes) = entry.tournament.early_start_votes.as_mut() else {
            return Err(EngineError::StateConflict(
                "no early-start vote is open".to_string(),
            ));
        };
        votes.insert(player_id);
        let count = votes.len();
        log::debug!("Tournament {tournament_id}: early-start vote {count}/{registered}");

        if count >= registered && registered >= MIN_PLAYERS {
            self.start_locked(&mut entry).await?;
        } else {
            self.persist(&entry.tournament).await;
        }
        Ok(entry.tournament.clone())
    }

    /// Start now regardless of votes (creator only, needs two registrants)
    pub async fn force_start(&self, tournament_id: TournamentId, caller: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        require_creator(&entry.tournament, caller, "force the start")?;
        require_state(&entry.tournament, TournamentState::Registering)?;
        self.start_locked(&mut entry).await?;
        Ok(entry.tournament.clone())
    }

    /// Close the early-start vote (creator only)
    pub async fn cancel_vote(&self, tournament_id: TournamentId, caller: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        let tournament = &mut entry.tournament;
        require_creator(tournament, caller, "cancel the vote")?;
        require_state(tournament, TournamentState::Registering)?;
        if tournament.early_start_votes.take().is_none() {
            return Err(EngineError::StateConflict(
                "no early-start vote is open".to_string(),
            ));
        }

        self.persist(&entry.tournament).await;
        Ok(entry.tournament.clone())
    }

    /// Cancel before the start and refund every buy-in (creator only)
    pub async fn cancel(&self, tournament_id: TournamentId, caller: PlayerId) -> EngineResult<Tournament> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        require_creator(&entry.tournament, caller, "cancel the tournament")?;
        require_state(&entry.tournament, TournamentState::Registering)?;

        let buy_in = entry.tournament.config.buy_in;
        if buy_in > 0 {
            for registration in &entry.tournament.registrations {
                let refund = NewTransaction {
                    player_id: registration.player_id,
                    amount: buy_in,
                    cause: TransactionCause::TournamentRefund,
                    reference: Some(tournament_channel(tournament_id)),
                    idempotency_key: format!(
                        "tournament_cancel_{tournament_id}_{}",
                        registration.player_id
                    ),
                };
                if let Err(e) = self.ledger.record(refund).await {
                    log::error!(
                        "Tournament {tournament_id}: refund to {} failed: {e}",
                        registration.player_id
                    );
                }
            }
        }

        let tournament = &mut entry.tournament;
        tournament.state = TournamentState::Cancelled;
        tournament.countdown = None;
        tournament.early_start_votes = None;
        tournament.completed_at = Some(Utc::now());
        log::info!("Tournament {tournament_id} cancelled");

        self.persist(&entry.tournament).await;
        Ok(entry.tournament.clone())
    }

    /// Move to the next blind level. Holds at the last level.
    pub async fn advance_level(&self, tournament_id: TournamentId) -> EngineResult<u32> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        require_state(&entry.tournament, TournamentState::Running)?;

        let next = entry.tournament.current_level + 1;
        if entry.tournament.config.get_blind_level(next).is_none() {
            return Ok(entry.tournament.current_level);
        }
        entry.tournament.current_level = next;
        entry.tournament.level_started_at = Some(Utc::now());
        let blinds = entry.tournament.current_blinds();
        if let Some(sender) = &entry.blinds {
            sender.send_replace(blinds);
        }
        log::info!("Tournament {tournament_id} advanced to level {next} ({blinds})");

        self.persist(&entry.tournament).await;
        self.emit(
            &mut entry,
            EngineEvent::LevelAdvanced {
                tournament_id,
                level: next,
                blinds,
            },
        )
        .await;
        Ok(next)
    }

    async fn entry(&self, tournament_id: TournamentId) -> EngineResult<Arc<Mutex<TournamentEntry>>> {
        if let Some(entry) = self.tournaments.read().await.get(&tournament_id) {
            return Ok(entry.clone());
        }
        let tournament = self
            .repository
            .load_tournament(tournament_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Tournament", tournament_id))?;
        let capacity = self.config.event_log_capacity;
        Ok(self
            .tournaments
            .write()
            .await
            .entry(tournament_id)
            .or_insert_with(|| Arc::new(Mutex::new(TournamentEntry::new(tournament, capacity))))
            .clone())
    }

    fn schedule_countdown(&self, tournament_id: TournamentId, countdown: Countdown) {
        let manager = self.clone();
        let wait = (countdown.deadline() - Utc::now())
            .to_std()
            .unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Err(e) = manager.countdown_elapsed(tournament_id, countdown).await {
                log::warn!("Tournament {tournament_id}: start after countdown failed: {e}");
            }
        });
    }

    async fn countdown_elapsed(&self, tournament_id: TournamentId, countdown: Countdown) -> EngineResult<()> {
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        if entry.tournament.state != TournamentState::Registering
            || entry.tournament.countdown != Some(countdown)
        {
            return Ok(());
        }
        self.start_locked(&mut entry).await
    }

    /// Seat everyone, start the level clock and deal the first hands.
    async fn start_locked(&self, entry: &mut TournamentEntry) -> EngineResult<()> {
        let tournament_id = entry.tournament.id;
        let config = entry.tournament.config.clone();
        let players: Vec<PlayerId> = entry
            .tournament
            .registrations
            .iter()
            .map(|r| r.player_id)
            .collect();
        if players.len() < MIN_PLAYERS {
            return Err(EngineError::StateConflict(format!(
                "need at least {MIN_PLAYERS} players to start"
            )));
        }

        let seating = initial_seating(&players, config.table_size, rand::random());
        let blinds = config.blinds_at(1);
        let (blinds_tx, blinds_rx) = watch::channel(blinds);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(seating.len());
        let opened = self
            .open_tables(tournament_id, &config, &seating, &blinds_rx, &notice_tx, &mut handles)
            .await;
        drop(notice_tx);
        if let Err(e) = opened {
            for handle in &handles {
                let _ = self.tables.close_table(handle.table_id()).await;
            }
            return Err(e);
        }

        let now = Utc::now();
        let tournament = &mut entry.tournament;
        tournament.state = TournamentState::Running;
        tournament.current_level = 1;
        tournament.started_at = Some(now);
        tournament.level_started_at = Some(now);
        tournament.players_remaining = players.len();
        tournament.countdown = None;
        tournament.early_start_votes = None;
        tournament.tables = handles.iter().map(TableHandle::table_id).collect();
        tournament.prize_structure = Some(PrizeStructure::standard(players.len(), config.buy_in));
        entry.blinds = Some(blinds_tx);
        log::info!(
            "Tournament {tournament_id} started: {} players on {} tables",
            players.len(),
            handles.len()
        );

        self.persist(&entry.tournament).await;
        let tables = entry.tournament.tables.clone();
        self.emit(
            entry,
            EngineEvent::TournamentStarted {
                tournament_id,
                tables,
                players: players.len(),
            },
        )
        .await;

        self.spawn_notice_listener(tournament_id, notice_rx);
        entry.level_clock = Some(self.spawn_level_clock(tournament_id));
        for handle in &handles {
            if let Err(e) = handle.start_hand().await {
                log::warn!(
                    "Tournament {tournament_id}: first hand on table {} failed: {e}",
                    handle.table_id()
                );
            }
        }
        Ok(())
    }

    async fn open_tables(
        &self,
        tournament_id: TournamentId,
        config: &TournamentConfig,
        seating: &[Vec<PlayerId>],
        blinds: &watch::Receiver<Blinds>,
        notices: &mpsc::UnboundedSender<TableNotice>,
        handles: &mut Vec<TableHandle>,
    ) -> EngineResult<()> {
        let level = *blinds.borrow();
        for (i, group) in seating.iter().enumerate() {
            let table_config = TableConfig {
                name: format!("{} - Table {}", config.name, i + 1),
                max_players: config.table_size,
                small_blind: level.small,
                big_blind: level.big,
                ante: level.ante,
                speed: config.speed,
                auto_deal: true,
            };
            let handle = self
                .tables
                .create_table(
                    table_config,
                    TableOwner::Tournament(tournament_id),
                    Some(blinds.clone()),
                    Some(notices.clone()),
                )
                .await?;
            handles.push(handle.clone());
            for player_id in group {
                handle
                    .seat_player(*player_id, config.starting_stack, None)
                    .await?;
            }
        }
        Ok(())
    }

    fn spawn_notice_listener(
        &self,
        tournament_id: TournamentId,
        mut notices: mpsc::UnboundedReceiver<TableNotice>,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(notice) = notices.recv().await {
                if let Err(e) = manager.on_table_notice(tournament_id, notice).await {
                    log::error!("Tournament {tournament_id}: failed to handle table notice: {e}");
                }
            }
            log::debug!("Tournament {tournament_id}: all tables closed");
        });
    }

    fn spawn_level_clock(&self, tournament_id: TournamentId) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(wait) = manager.time_to_next_level(tournament_id).await {
                tokio::time::sleep(wait).await;
                if let Err(e) = manager.advance_level(tournament_id).await {
                    log::debug!("Tournament {tournament_id}: level clock stopped: {e}");
                    break;
                }
            }
        })
    }

    /// `None` once the tournament stops running or the last level is reached
    async fn time_to_next_level(&self, tournament_id: TournamentId) -> Option<Duration> {
        let entry = self.entry(tournament_id).await.ok()?;
        let entry = entry.lock().await;
        let tournament = &entry.tournament;
        if tournament.state != TournamentState::Running {
            return None;
        }
        let level = tournament.config.get_blind_level(tournament.current_level)?;
        tournament
            .config
            .get_blind_level(tournament.current_level + 1)?;
        let started = tournament.level_started_at.unwrap_or_else(Utc::now);
        let ends = started + TimeDelta::seconds(level.duration_secs as i64);
        Some((ends - Utc::now()).to_std().unwrap_or_default())
    }

    async fn on_table_notice(&self, tournament_id: TournamentId, notice: TableNotice) -> EngineResult<()> {
        let TableNotice::HandComplete { table_id, busted, .. } = notice;
        let entry = self.entry(tournament_id).await?;
        let mut entry = entry.lock().await;
        if entry.tournament.state != TournamentState::Running {
            return Ok(());
        }

        if !busted.is_empty() {
            self.eliminate(&mut entry, busted).await;
        }
        if entry.tournament.players_remaining <= 1 {
            self.complete_locked(&mut entry).await;
            return Ok(());
        }

        let closed = self.rebalance(&entry.tournament).await;
        if !closed.is_empty() {
            entry.tournament.tables.retain(|id| !closed.contains(id));
            log::info!(
                "Tournament {tournament_id}: broke table(s) {closed:?} after hand on table {table_id}"
            );
        }
        self.persist(&entry.tournament).await;
        Ok(())
    }

    /// Assign finishing positions. Players busting in the same hand are
    /// ordered by their stack at the start of it, larger stacks finishing
    /// higher.
    async fn eliminate(&self, entry: &mut TournamentEntry, mut busted: Vec<(PlayerId, Chips)>) {
        let tournament_id = entry.tournament.id;
        busted.sort_by_key(|(player_id, start)| (*start, Reverse(*player_id)));
        for (player_id, _) in busted {
            let already_placed = entry
                .tournament
                .registrations
                .iter()
                .any(|r| r.player_id == player_id && r.finish_position.is_some());
            if already_placed {
                continue;
            }
            let position = entry.tournament.players_remaining;
            let prize = self.award(&mut entry.tournament, player_id, position).await;
            entry.tournament.players_remaining = position.saturating_sub(1);
            log::info!(
                "Tournament {tournament_id}: player {player_id} eliminated in position {position}, prize {prize}"
            );
            self.emit(
                entry,
                EngineEvent::PlayerEliminated {
                    tournament_id,
                    player_id,
                    position,
                },
            )
            .await;
        }
    }

    /// Record a finishing position and pay its prize. Returns the prize.
    async fn award(&self, tournament: &mut Tournament, player_id: PlayerId, position: usize) -> i64 {
        let tournament_id = tournament.id;
        let prize = tournament
            .prize_structure
            .as_ref()
            .and_then(|prizes| prizes.payout_for_position(position))
            .unwrap_or(0);
        if let Some(registration) = tournament.registration_mut(player_id) {
            registration.finish_position = Some(position);
            registration.prize_amount = (prize > 0).then_some(prize);
        }
        if prize > 0 {
            let payout = NewTransaction {
                player_id,
                amount: prize,
                cause: TransactionCause::TournamentPrize,
                reference: Some(tournament_channel(tournament_id)),
                idempotency_key: format!("tournament_prize_{tournament_id}_{player_id}"),
            };
            if let Err(e) = self.ledger.record(payout).await {
                log::error!("Tournament {tournament_id}: prize to {player_id} failed: {e}");
            }
        }
        prize
    }

    async fn complete_locked(&self, entry: &mut TournamentEntry) {
        let tournament_id = entry.tournament.id;
        let winner = entry
            .tournament
            .registrations
            .iter()
            .find(|r| r.finish_position.is_none())
            .map(|r| r.player_id);
        if let Some(winner) = winner {
            self.award(&mut entry.tournament, winner, 1).await;
            log::info!("Tournament {tournament_id} won by player {winner}");
        }

        entry.tournament.state = TournamentState::Complete;
        entry.tournament.completed_at = Some(Utc::now());
        if let Some(clock) = entry.level_clock.take() {
            clock.abort();
        }
        entry.blinds = None;
        for table_id in entry.tournament.tables.clone() {
            if let Err(e) = self.tables.close_table(table_id).await {
                log::debug!("Tournament {tournament_id}: closing table {table_id}: {e}");
            }
        }

        self.persist(&entry.tournament).await;
        let standings = entry.tournament.standings();
        self.emit(
            entry,
            EngineEvent::TournamentComplete {
                tournament_id,
                standings,
            },
        )
        .await;
    }

    /// Even out table sizes. Returns the tables that were closed.
    async fn rebalance(&self, tournament: &Tournament) -> Vec<TableId> {
        if tournament.tables.len() < 2 {
            return Vec::new();
        }
        let counts: Vec<(TableId, usize)> = self
            .tables
            .for_each_ordered(&tournament.tables, |handle| async move {
                handle.snapshot(None).await.map(|view| view.seats.len())
            })
            .await
            .into_iter()
            .filter_map(|(id, seated)| seated.ok().map(|n| (id, n)))
            .collect();

        let plan = plan_rebalance(&counts, tournament.config.table_size);
        if plan.is_empty() {
            return Vec::new();
        }

        let mut receiving = Vec::new();
        for seat_move in &plan.moves {
            if !self.move_player(*seat_move).await {
                log::debug!(
                    "Tournament {}: balancing deferred, table {} is mid-hand",
                    tournament.id,
                    seat_move.from
                );
                break;
            }
            receiving.push(seat_move.to);
        }

        let mut closed = Vec::new();
        for table_id in plan.close {
            let empty = match self.tables.get(table_id).await {
                Ok(handle) => handle
                    .snapshot(None)
                    .await
                    .is_ok_and(|view| view.seats.is_empty()),
                Err(_) => false,
            };
            if empty && self.tables.close_table(table_id).await.is_ok() {
                closed.push(table_id);
            }
        }

        self.tables
            .for_each_ordered(&receiving, |handle| async move {
                let view = handle.snapshot(None).await?;
                let live = view
                    .hand
                    .as_ref()
                    .is_some_and(|hand| hand.phase != HandPhase::Complete);
                if !live && view.seats.len() >= MIN_PLAYERS {
                    handle.start_hand().await?;
                }
                Ok(())
            })
            .await;
        closed
    }

    /// Move one player between tables, one table at a time. Returns false
    /// when no player could be moved.
    async fn move_player(&self, seat_move: SeatMove) -> bool {
        let (Ok(from), Ok(to)) = (
            self.tables.get(seat_move.from).await,
            self.tables.get(seat_move.to).await,
        ) else {
            return false;
        };
        let Ok(Some((player_id, stack))) = from.release_player().await else {
            return false;
        };
        match to.seat_player(player_id, stack, None).await {
            Ok(seat) => {
                log::info!(
                    "Moved player {player_id} from table {} to table {} seat {seat}",
                    seat_move.from,
                    seat_move.to
                );
                true
            }
            Err(e) => {
                log::error!(
                    "Could not seat player {player_id} at table {}: {e}",
                    seat_move.to
                );
                if let Err(e) = from.seat_player(player_id, stack, None).await {
                    log::error!("Player {player_id} lost their seat with {stack} chips: {e}");
                }
                false
            }
        }
    }

    async fn persist(&self, tournament: &Tournament) {
        if let Err(e) = self.repository.save_tournament(tournament).await {
            log::error!("Failed to save tournament {}: {e}", tournament.id);
        }
    }

    async fn emit(&self, entry: &mut TournamentEntry, event: EngineEvent) {
        let envelope = entry.log.push(None, event);
        if let Err(e) = self.broadcaster.publish(entry.log.channel(), &envelope).await {
            log::warn!(
                "Tournament {}: failed to publish {:?}: {e}",
                entry.tournament.id,
                envelope.event.kind()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{broadcast::NoopBroadcaster, db::InMemoryRepository, events::EventKind};

    struct Fixture {
        manager: TournamentManager,
        ledger: ChipLedger,
    }

    async fn fixture() -> Fixture {
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(NoopBroadcaster);
        let ledger = ChipLedger::new(repository.clone());
        let config = EngineConfig::default();
        let tables = Arc::new(TableManager::new(
            repository.clone(),
            broadcaster.clone(),
            config.clone(),
        ));
        for player in 1..=10 {
            ledger.grant(player, 1_000).await.unwrap();
        }
        Fixture {
            manager: TournamentManager::new(repository, broadcaster, ledger.clone(), tables, config),
            ledger,
        }
    }

    fn config(max_players: usize) -> TournamentConfig {
        let mut config = TournamentConfig::sit_and_go("Test SNG".to_string(), max_players, 100);
        config.countdown_secs = 60;
        config
    }

    #[tokio::test]
    async fn test_register_debits_buy_in() {
        let f = fixture().await;
        let t = f.manager.create(1, config(3)).await.unwrap();
        f.manager.register(t.id, 2).await.unwrap();
        assert_eq!(f.ledger.balance(2).await.unwrap(), 900);

        assert!(matches!(
            f.manager.register(t.id, 2).await,
            Err(EngineError::StateConflict(_))
        ));
        assert_eq!(f.ledger.balance(2).await.unwrap(), 900);
    }

    #[tokio::test]
    async fn test_register_without_funds() {
        let f = fixture().await;
        let t = f.manager.create(1, config(3)).await.unwrap();
        assert!(matches!(
            f.manager.register(t.id, 99).await,
            Err(EngineError::InsufficientChips { .. })
        ));
        assert_eq!(f.manager.get(t.id).await.unwrap().registered_count(), 0);
    }

    #[tokio::test]
    async fn test_full_tournament_starts_countdown() {
        let f = fixture().await;
        let t = f.manager.create(1, config(2)).await.unwrap();
        let t1 = f.manager.register(t.id, 1).await.unwrap();
        assert!(t1.countdown.is_none());
        let t2 = f.manager.register(t.id, 2).await.unwrap();
        assert!(t2.countdown.is_some());

        assert!(matches!(
            f.manager.register(t.id, 3).await,
            Err(EngineError::StateConflict(_))
        ));
        assert!(matches!(
            f.manager.expire(t.id, 2).await,
            Err(EngineError::StateConflict(_))
        ));
        assert!(matches!(
            f.manager.expire(t.id, 7).await,
            Err(EngineError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_unregister_refunds() {
        let f = fixture().await;
        let t = f.manager.create(1, config(3)).await.unwrap();
        f.manager.register(t.id, 4).await.unwrap();
        let t = f.manager.unregister(t.id, 4).await.unwrap();
        assert_eq!(t.registered_count(), 0);
        assert_eq!(f.ledger.balance(4).await.unwrap(), 1_000);
        assert!(matches!(
            f.manager.unregister(t.id, 4).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_creator_only_operations() {
        let f = fixture().await;
        let t = f.manager.create(1, config(4)).await.unwrap();
        f.manager.register(t.id, 1).await.unwrap();
        f.manager.register(t.id, 2).await.unwrap();

        assert!(matches!(
            f.manager.start_countdown(t.id, 2).await,
            Err(EngineError::Forbidden(_))
        ));
        assert!(matches!(
            f.manager.open_vote(t.id, 2).await,
            Err(EngineError::Forbidden(_))
        ));
        let t = f.manager.start_countdown(t.id, 1).await.unwrap();
        assert!(t.countdown.is_some());
        let t = f.manager.cancel_countdown(t.id, 1).await.unwrap();
        assert!(t.countdown.is_none());
    }

    #[tokio::test]
    async fn test_early_start_vote() {
        let f = fixture().await;
        let t = f.manager.create(1, config(6)).await.unwrap();
        for player in 1..=3 {
            f.manager.register(t.id, player).await.unwrap();
        }
        assert!(matches!(
            f.manager.vote(t.id, 2).await,
            Err(EngineError::StateConflict(_))
        ));
        f.manager.open_vote(t.id, 1).await.unwrap();
        f.manager.vote(t.id, 1).await.unwrap();
        let t = f.manager.vote(t.id, 2).await.unwrap();
        assert_eq!(t.state, TournamentState::Registering);
        let t = f.manager.vote(t.id, 3).await.unwrap();
        assert_eq!(t.state, TournamentState::Running);
        assert_eq!(t.players_remaining, 3);
        assert_eq!(t.tables.len(), 1);
        assert!(t.early_start_votes.is_none());
    }

    #[tokio::test]
    async fn test_force_start_needs_two() {
        let f = fixture().await;
        let t = f.manager.create(1, config(6)).await.unwrap();
        f.manager.register(t.id, 1).await.unwrap();
        assert!(matches!(
            f.manager.force_start(t.id, 1).await,
            Err(EngineError::StateConflict(_))
        ));
        f.manager.register(t.id, 2).await.unwrap();
        let t = f.manager.force_start(t.id, 1).await.unwrap();
        assert_eq!(t.state, TournamentState::Running);
        assert_eq!(t.prize_structure.map(|p| p.total_pool), Some(200));
    }

    #[tokio::test]
    async fn test_ready_check_starts_when_all_ready() {
        let f = fixture().await;
        let mut cfg = config(4);
        cfg.ready_check = true;
        let t = f.manager.create(1, cfg).await.unwrap();
        f.manager.register(t.id, 1).await.unwrap();
        f.manager.register(t.id, 2).await.unwrap();
        let t = f.manager.mark_ready(t.id, 1).await.unwrap();
        assert_eq!(t.state, TournamentState::Registering);
        let t = f.manager.mark_ready(t.id, 2).await.unwrap();
        assert_eq!(t.state, TournamentState::Running);
    }

    #[tokio::test]
    async fn test_cancel_refunds_everyone() {
        let f = fixture().await;
        let t = f.manager.create(1, config(4)).await.unwrap();
        for player in 2..=4 {
            f.manager.register(t.id, player).await.unwrap();
        }
        assert!(matches!(
            f.manager.cancel(t.id, 2).await,
            Err(EngineError::Forbidden(_))
        ));
        let t = f.manager.cancel(t.id, 1).await.unwrap();
        assert_eq!(t.state, TournamentState::Cancelled);
        for player in 2..=4 {
            assert_eq!(f.ledger.balance(player).await.unwrap(), 1_000);
        }
        assert!(matches!(
            f.manager.register(t.id, 5).await,
            Err(EngineError::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_advance_level_publishes_blinds() {
        let f = fixture().await;
        let t = f.manager.create(1, config(2)).await.unwrap();
        f.manager.register(t.id, 1).await.unwrap();
        f.manager.register(t.id, 2).await.unwrap();
        f.manager.force_start(t.id, 1).await.unwrap();

        assert_eq!(f.manager.advance_level(t.id).await.unwrap(), 2);
        let t = f.manager.get(t.id).await.unwrap();
        assert_eq!(t.current_blinds().big, 30);

        let tail = f.manager.events(t.id, None).await.unwrap();
        let kinds: Vec<EventKind> = tail.events.iter().map(|e| e.event.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::TournamentCreated,
                EventKind::TournamentStarted,
                EventKind::LevelAdvanced
            ]
        );
    }
}
