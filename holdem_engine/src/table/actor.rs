//! Table actor implementation with async message handling.
//!
//! The actor is the only writer of its table's seats and hands. Player
//! actions, turn-clock expiries and seat changes all arrive through the
//! same inbox, so they are applied one at a time.

use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot, watch};

use super::{
    messages::{ActionOutcome, PollResponse, TableMessage, TableNotice},
    models::{Table, TableStatus, TableView},
};
use crate::{
    broadcast::Broadcaster,
    config::EngineConfig,
    db::Repository,
    errors::{EngineError, EngineResult},
    events::{EngineEvent, EventEnvelope, EventLog, table_channel},
    game::{
        constants::{
            DEFAULT_EVENT_LOG_CAPACITY, DEFAULT_NEXT_HAND_DELAY_MS, DEFAULT_TABLE_INBOX_CAPACITY,
            MIN_PLAYERS,
        },
        entities::{Action, Blinds, Chips, PlayerId, Seat, SeatIndex, SeatStatus, Seats, TableId},
        hand::{Hand, HandId, HandSetup, HandTransition, HandView},
    },
};

/// Table actor handle for sending messages
#[derive(Clone, Debug)]
pub struct TableHandle {
    sender: mpsc::Sender<TableMessage>,
    table_id: TableId,
}

impl TableHandle {
    fn new(sender: mpsc::Sender<TableMessage>, table_id: TableId) -> Self {
        Self { sender, table_id }
    }

    /// Get table ID
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Whether the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a raw message to the table
    pub async fn send(&self, message: TableMessage) -> EngineResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TableMessage,
    ) -> EngineResult<T> {
        let (response, receiver) = oneshot::channel();
        self.send(build(response)).await?;
        receiver.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn submit_action(
        &self,
        player_id: PlayerId,
        action: Action,
        expected_version: Option<u64>,
    ) -> EngineResult<ActionOutcome> {
        self.request(|response| TableMessage::SubmitAction {
            player_id,
            action,
            expected_version,
            response,
        })
        .await?
    }

    pub async fn poll(
        &self,
        viewer: Option<PlayerId>,
        since_version: Option<u64>,
        since_event_id: Option<u64>,
    ) -> EngineResult<PollResponse> {
        self.request(|response| TableMessage::Poll {
            viewer,
            since_version,
            since_event_id,
            response,
        })
        .await
    }

    pub async fn snapshot(&self, viewer: Option<PlayerId>) -> EngineResult<TableView> {
        self.request(|response| TableMessage::Snapshot { viewer, response })
            .await
    }

    pub async fn seat_player(
        &self,
        player_id: PlayerId,
        stack: Chips,
        preferred_seat: Option<SeatIndex>,
    ) -> EngineResult<SeatIndex> {
        self.request(|response| TableMessage::SeatPlayer {
            player_id,
            stack,
            preferred_seat,
            response,
        })
        .await?
    }

    pub async fn remove_seat(&self, player_id: PlayerId) -> EngineResult<Chips> {
        self.request(|response| TableMessage::RemoveSeat {
            player_id,
            response,
        })
        .await?
    }

    pub async fn add_chips(
        &self,
        player_id: PlayerId,
        amount: Chips,
        cap: Option<Chips>,
    ) -> EngineResult<Chips> {
        self.request(|response| TableMessage::AddChips {
            player_id,
            amount,
            cap,
            response,
        })
        .await?
    }

    pub async fn release_player(&self) -> EngineResult<Option<(PlayerId, Chips)>> {
        self.request(|response| TableMessage::ReleasePlayer { response })
            .await
    }

    pub async fn start_hand(&self) -> EngineResult<HandView> {
        self.request(|response| TableMessage::StartHand { response })
            .await?
    }

    /// Stop the table. Returns final stacks followed by any voided-hand
    /// contributions owed to players who already left.
    pub async fn close(&self) -> EngineResult<Vec<(PlayerId, Chips)>> {
        self.request(|response| TableMessage::Close { response })
            .await
    }
}

/// How a table actor is wired to its owner
pub struct TableOptions {
    /// Blinds shared with the owning tournament; `None` uses the table
    /// config's fixed blinds
    pub blinds: Option<watch::Receiver<Blinds>>,
    pub notices: Option<mpsc::UnboundedSender<TableNotice>>,
    pub event_log_capacity: usize,
    pub next_hand_delay: Duration,
    pub inbox_capacity: usize,
    /// Seed for per-hand deck seeds; random when `None`
    pub seed: Option<u64>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            blinds: None,
            notices: None,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            next_hand_delay: Duration::from_millis(DEFAULT_NEXT_HAND_DELAY_MS),
            inbox_capacity: DEFAULT_TABLE_INBOX_CAPACITY,
            seed: None,
        }
    }
}

impl TableOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            event_log_capacity: config.event_log_capacity,
            next_hand_delay: config.next_hand_delay(),
            inbox_capacity: config.table_inbox_capacity,
            ..Self::default()
        }
    }
}

/// Table actor managing a single poker table
pub struct TableActor {
    table: Table,

    /// Current or most recently completed hand
    hand: Option<Hand>,

    inbox: mpsc::Receiver<TableMessage>,

    /// Used by timers; never keeps the actor alive
    sender: mpsc::WeakSender<TableMessage>,

    repository: Arc<dyn Repository>,
    broadcaster: Arc<dyn Broadcaster>,
    log: EventLog,
    blinds: Option<watch::Receiver<Blinds>>,
    notices: Option<mpsc::UnboundedSender<TableNotice>>,
    next_hand_delay: Duration,
    rng: StdRng,
    is_closed: bool,
}

impl TableActor {
    /// Create a new table actor
    ///
    /// # Returns
    ///
    /// * `(TableActor, TableHandle)` - Actor and handle for sending messages
    pub fn new(
        table: Table,
        options: TableOptions,
        repository: Arc<dyn Repository>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> (Self, TableHandle) {
        let (sender, inbox) = mpsc::channel(options.inbox_capacity.max(1));
        let weak = sender.downgrade();
        let handle = TableHandle::new(sender, table.id);

        let actor = Self {
            log: EventLog::new(table_channel(table.id), options.event_log_capacity),
            table,
            hand: None,
            inbox,
            sender: weak,
            repository,
            broadcaster,
            blinds: options.blinds,
            notices: options.notices,
            next_hand_delay: options.next_hand_delay,
            rng: StdRng::seed_from_u64(options.seed.unwrap_or_else(rand::random)),
            is_closed: false,
        };

        (actor, handle)
    }

    /// Create the actor and run it on the tokio runtime
    pub fn spawn(
        table: Table,
        options: TableOptions,
        repository: Arc<dyn Repository>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> TableHandle {
        let (actor, handle) = Self::new(table, options, repository, broadcaster);
        tokio::spawn(actor.run());
        handle
    }

    /// Run the table actor event loop
    pub async fn run(mut self) {
        log::info!("Table {} '{}' starting", self.table.id, self.table.config.name);
        self.persist_table().await;

        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message).await;
            if self.is_closed {
                break;
            }
        }

        log::info!("Table {} '{}' stopped", self.table.id, self.table.config.name);
    }

    async fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::SubmitAction {
                player_id,
                action,
                expected_version,
                response,
            } => {
                let result = self.handle_action(player_id, action, expected_version).await;
                let _ = response.send(result);
            }

            TableMessage::Poll {
                viewer,
                since_version,
                since_event_id,
                response,
            } => {
                let _ = response.send(self.poll(viewer, since_version, since_event_id));
            }

            TableMessage::Snapshot { viewer, response } => {
                let _ = response.send(self.table.view(self.hand.as_ref(), viewer));
            }

            TableMessage::SeatPlayer {
                player_id,
                stack,
                preferred_seat,
                response,
            } => {
                let result = self.seat_player(player_id, stack, preferred_seat).await;
                let _ = response.send(result);
            }

            TableMessage::RemoveSeat {
                player_id,
                response,
            } => {
                let result = self.remove_seat(player_id).await;
                let _ = response.send(result);
            }

            TableMessage::AddChips {
                player_id,
                amount,
                cap,
                response,
            } => {
                let result = self.add_chips(player_id, amount, cap).await;
                let _ = response.send(result);
            }

            TableMessage::ReleasePlayer { response } => {
                let released = self.release_player().await;
                let _ = response.send(released);
            }

            TableMessage::StartHand { response } => {
                let result = self.start_hand().await;
                let _ = response.send(result);
            }

            TableMessage::TurnExpired { hand_id, version } => {
                self.turn_expired(hand_id, version).await;
            }

            TableMessage::DealNextHand => {
                self.deal_next_hand().await;
            }

            TableMessage::Close { response } => {
                let stacks = self.close().await;
                let _ = response.send(stacks);
            }
        }
    }

    fn live_hand(&self) -> Option<&Hand> {
        self.hand.as_ref().filter(|hand| hand.is_active())
    }

    fn holds_chips(&self, seat: SeatIndex) -> bool {
        self.live_hand()
            .is_some_and(|hand| hand.holds_chips(&self.table.seats, seat))
    }

    fn current_blinds(&self) -> Blinds {
        self.blinds
            .as_ref()
            .map(|blinds| *blinds.borrow())
            .unwrap_or_else(|| self.table.config.blinds())
    }

    async fn handle_action(
        &mut self,
        player_id: PlayerId,
        action: Action,
        expected_version: Option<u64>,
    ) -> EngineResult<ActionOutcome> {
        let table_id = self.table.id;
        let seat = self.table.seat_of(player_id).ok_or(EngineError::NotSeated)?;
        let Some(hand) = self.hand.as_mut().filter(|hand| hand.is_active()) else {
            return Err(EngineError::StateConflict(
                "no hand in progress".to_string(),
            ));
        };

        let transition =
            match hand.apply_action(&mut self.table.seats, seat, action, expected_version) {
                Ok(transition) => transition,
                Err(e) => {
                    log::debug!("Table {table_id}: rejected {action:?} from player {player_id}: {e}");
                    return Err(e);
                }
            };
        log::debug!(
            "Table {table_id}: player {player_id} {action:?}, hand #{} now at version {}",
            hand.hand_number,
            hand.version
        );
        let view = HandView::from(&*hand);

        let events = self.commit(&transition, Vec::new()).await;
        Ok(ActionOutcome {
            hand: view,
            events,
            phase_changed: transition.phase_changed,
            next_actor: transition.next_actor,
            deadline: transition.deadline,
            completed: transition.completed,
        })
    }

    async fn turn_expired(&mut self, hand_id: HandId, version: u64) {
        let table_id = self.table.id;
        let Some(hand) = self
            .hand
            .as_mut()
            .filter(|hand| hand.is_active() && hand.id == hand_id && hand.version == version)
        else {
            log::debug!("Table {table_id}: ignoring stale turn timer at version {version}");
            return;
        };
        let Some(transition) = hand.apply_timeout(&mut self.table.seats) else {
            return;
        };
        if let Some(action) = &transition.action {
            log::info!(
                "Table {table_id}: seat {} ran out of time, auto {:?}",
                action.seat,
                action.kind
            );
        }
        self.commit(&transition, Vec::new()).await;
    }

    async fn start_hand(&mut self) -> EngineResult<HandView> {
        if self.table.status == TableStatus::Complete {
            return Err(EngineError::StateConflict("table is closed".to_string()));
        }
        if self.live_hand().is_some() {
            return Err(EngineError::StateConflict(
                "a hand is already in progress".to_string(),
            ));
        }

        let blinds = self.current_blinds();
        let setup = HandSetup {
            table_id: self.table.id,
            hand_number: self.table.hands_played + 1,
            previous_dealer: self.table.dealer_seat,
            blinds,
            capacity: self.table.capacity(),
            seed: self.rng.random(),
            turn_timeout_ms: self
                .table
                .config
                .action_timeout()
                .map(|timeout| timeout.as_millis() as u64),
        };
        let (hand, transition) = Hand::start(setup, &mut self.table.seats)?;

        self.table.blinds = blinds;
        self.table.dealer_seat = Some(hand.dealer_seat);
        self.table.hands_played = hand.hand_number;
        self.table.current_hand = Some(hand.id);
        self.table.status = TableStatus::Active;
        log::debug!(
            "Table {}: hand #{} dealt, button on seat {}, blinds {}",
            self.table.id,
            hand.hand_number,
            hand.dealer_seat,
            blinds
        );

        let started = EngineEvent::HandStarted {
            table_id: self.table.id,
            hand_id: hand.id,
            hand_number: hand.hand_number,
            dealer_seat: hand.dealer_seat,
            small_blind_seat: hand.small_blind_seat,
            big_blind_seat: hand.big_blind_seat,
            blinds,
            posts: transition.posts.clone(),
        };
        let view = HandView::from(&hand);
        self.hand = Some(hand);
        self.commit(&transition, vec![started]).await;
        Ok(view)
    }

    async fn deal_next_hand(&mut self) {
        if self.live_hand().is_some() || self.table.playable_seats() < MIN_PLAYERS {
            return;
        }
        if let Err(e) = self.start_hand().await {
            log::debug!("Table {}: auto-deal skipped: {e}", self.table.id);
        }
    }

    /// Persist and publish one hand transition, then arm whatever comes
    /// next (turn clock or next deal).
    async fn commit(
        &mut self,
        transition: &HandTransition,
        mut events: Vec<EngineEvent>,
    ) -> Vec<EventEnvelope> {
        events.extend(self.transition_events(transition));
        let notice = if transition.completed {
            let (closing, notice) = self.settle_hand();
            events.extend(closing);
            Some(notice)
        } else {
            None
        };

        self.persist_table().await;
        self.persist_hand().await;
        let envelopes = self.emit(events).await;

        match notice {
            Some(notice) => {
                self.notify(notice);
                self.schedule_next_hand();
            }
            None => self.schedule_turn_timer(),
        }
        envelopes
    }

    fn transition_events(&self, transition: &HandTransition) -> Vec<EngineEvent> {
        let Some(hand) = &self.hand else {
            return Vec::new();
        };
        let table_id = self.table.id;
        let hand_id = hand.id;
        let mut events = Vec::new();

        if let Some(action) = &transition.action {
            events.push(EngineEvent::Action {
                table_id,
                hand_id,
                action: action.clone(),
            });
        }
        if transition.pot_delta > 0 {
            events.push(EngineEvent::PotUpdated {
                table_id,
                hand_id,
                pot: transition.pot,
                delta: transition.pot_delta,
                pots: transition.pots.clone(),
            });
        }

        let dealt: usize = transition.streets.iter().map(|s| s.cards.len()).sum();
        let mut board_len = hand.community_cards.len().saturating_sub(dealt);
        for street in &transition.streets {
            board_len += street.cards.len();
            events.push(EngineEvent::StreetDealt {
                table_id,
                hand_id,
                phase: street.phase,
                cards: street.cards.clone(),
                board: hand.community_cards.iter().take(board_len).cloned().collect(),
            });
        }

        for shown in &transition.revealed {
            events.push(EngineEvent::CardsShown {
                table_id,
                hand_id,
                seat: shown.seat,
                player_id: shown.player_id,
                cards: shown.cards.clone(),
                best: shown.best.clone(),
            });
        }
        if let Some(result) = &transition.result
            && result.showdown
        {
            events.push(EngineEvent::Showdown {
                table_id,
                hand_id,
                awards: result.awards.clone(),
            });
        }

        if !transition.completed
            && let Some(seat) = transition.next_actor
            && let Some(actor) = self.table.seats.get(&seat)
        {
            events.push(EngineEvent::TurnStarted {
                table_id,
                hand_id,
                seat,
                player_id: actor.player_id,
                deadline: transition.deadline,
            });
        }
        events
    }

    /// Reset seats after a completed hand and deal with busted players:
    /// tournament seats are eliminated and removed, cash seats sit out.
    fn settle_hand(&mut self) -> (Vec<EngineEvent>, TableNotice) {
        let table_id = self.table.id;
        let tournament = self.table.owner.is_tournament();
        let (hand_id, hand_number, result, participants, starting) = match &self.hand {
            Some(hand) => (
                hand.id,
                hand.hand_number,
                hand.result.clone(),
                hand.participants.clone(),
                hand.starting_stacks.clone(),
            ),
            None => Default::default(),
        };

        let mut busted = Vec::new();
        for seat in self.table.seats.values_mut() {
            seat.current_bet = 0;
            seat.has_acted = false;
            if matches!(
                seat.status,
                SeatStatus::Active | SeatStatus::AllIn | SeatStatus::Folded
            ) {
                seat.status = SeatStatus::Waiting;
            }
            if seat.stack == 0 && participants.contains(&seat.seat_index) {
                let start = starting.get(&seat.seat_index).copied().unwrap_or(0);
                busted.push((seat.seat_index, seat.player_id, start));
                seat.status = if tournament {
                    SeatStatus::Eliminated
                } else {
                    SeatStatus::SittingOut
                };
            }
        }

        let mut events = vec![EngineEvent::HandComplete {
            table_id,
            hand_id,
            result,
            voided: false,
            stacks: stack_list(&self.table.seats),
        }];
        if tournament {
            for (seat, player_id, _) in &busted {
                self.table.seats.remove(seat);
                events.push(EngineEvent::PlayerLeft {
                    table_id,
                    seat: *seat,
                    player_id: *player_id,
                    stack: 0,
                });
            }
        }
        self.table.status = TableStatus::Waiting;

        let notice = TableNotice::HandComplete {
            table_id,
            hand_number,
            busted: busted
                .iter()
                .map(|(_, player_id, start)| (*player_id, *start))
                .collect(),
            stacks: self
                .table
                .seats
                .values()
                .map(|seat| (seat.player_id, seat.stack))
                .collect(),
            remaining: self.table.seats.len(),
        };
        (events, notice)
    }

    fn notify(&self, notice: TableNotice) {
        if let Some(notices) = &self.notices
            && notices.send(notice).is_err()
        {
            log::debug!("Table {}: owner stopped listening", self.table.id);
        }
    }

    fn schedule_turn_timer(&self) {
        let Some(hand) = self.live_hand() else {
            return;
        };
        let (Some(_), Some(timeout_ms)) = (hand.current_actor, hand.turn_timeout_ms) else {
            return;
        };
        let (hand_id, version) = (hand.id, hand.version);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender
                    .send(TableMessage::TurnExpired { hand_id, version })
                    .await;
            }
        });
    }

    fn schedule_next_hand(&self) {
        if !self.table.config.auto_deal
            || self.table.status == TableStatus::Complete
            || self.table.playable_seats() < MIN_PLAYERS
        {
            return;
        }
        let sender = self.sender.clone();
        let delay = self.next_hand_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(TableMessage::DealNextHand).await;
            }
        });
    }

    async fn seat_player(
        &mut self,
        player_id: PlayerId,
        stack: Chips,
        preferred_seat: Option<SeatIndex>,
    ) -> EngineResult<SeatIndex> {
        if self.table.status == TableStatus::Complete {
            return Err(EngineError::StateConflict("table is closed".to_string()));
        }
        if stack == 0 {
            return Err(EngineError::Validation(
                "stack must be positive".to_string(),
            ));
        }
        if self.table.seat_of(player_id).is_some() {
            return Err(EngineError::StateConflict(format!(
                "player {player_id} is already seated"
            )));
        }
        self.check_chip_room(stack)?;
        // Seats dealt into the live hand stay reserved until it ends.
        let reserved = self
            .live_hand()
            .map(|hand| hand.participants.clone())
            .unwrap_or_default();
        let seat_index = self
            .table
            .open_seat(preferred_seat, &reserved)
            .ok_or_else(|| EngineError::StateConflict("table is full".to_string()))?;

        self.table
            .seats
            .insert(seat_index, Seat::new(player_id, seat_index, stack));
        log::debug!(
            "Table {}: player {player_id} seated at {seat_index} with {stack}",
            self.table.id
        );

        self.persist_table().await;
        self.emit(vec![EngineEvent::PlayerSeated {
            table_id: self.table.id,
            seat: seat_index,
            player_id,
            stack,
        }])
        .await;
        Ok(seat_index)
    }

    async fn remove_seat(&mut self, player_id: PlayerId) -> EngineResult<Chips> {
        let seat_index = self.table.seat_of(player_id).ok_or(EngineError::NotSeated)?;
        if self.holds_chips(seat_index) {
            return Err(EngineError::StateConflict(
                "cannot leave while holding chips in a live hand".to_string(),
            ));
        }
        let seat = self
            .table
            .seats
            .remove(&seat_index)
            .ok_or(EngineError::NotSeated)?;
        log::debug!(
            "Table {}: player {player_id} left seat {seat_index} with {}",
            self.table.id,
            seat.stack
        );

        self.persist_table().await;
        self.emit(vec![EngineEvent::PlayerLeft {
            table_id: self.table.id,
            seat: seat_index,
            player_id,
            stack: seat.stack,
        }])
        .await;
        Ok(seat.stack)
    }

    async fn add_chips(
        &mut self,
        player_id: PlayerId,
        amount: Chips,
        cap: Option<Chips>,
    ) -> EngineResult<Chips> {
        if amount == 0 {
            return Err(EngineError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        let seat_index = self.table.seat_of(player_id).ok_or(EngineError::NotSeated)?;
        if self.holds_chips(seat_index) {
            return Err(EngineError::StateConflict(
                "cannot add chips during a live hand".to_string(),
            ));
        }
        let seat = self
            .table
            .seats
            .get(&seat_index)
            .ok_or(EngineError::NotSeated)?;
        let added = match cap {
            Some(cap) => amount.min(cap.saturating_sub(seat.stack)),
            None => amount,
        };
        if added == 0 {
            return Err(EngineError::StateConflict(
                "stack is already at the maximum".to_string(),
            ));
        }
        self.check_chip_room(added)?;
        let Some(seat) = self.table.seats.get_mut(&seat_index) else {
            return Err(EngineError::NotSeated);
        };
        seat.stack += added;
        let returning = seat.status == SeatStatus::SittingOut;
        if returning {
            seat.status = SeatStatus::Waiting;
        }
        log::debug!(
            "Table {}: player {player_id} added {added}, stack {}",
            self.table.id,
            seat.stack
        );

        self.persist_table().await;
        if returning && self.live_hand().is_none() {
            self.schedule_next_hand();
        }
        Ok(added)
    }

    /// Every chip on the table, in stacks or in the live pot.
    fn chips_at_table(&self) -> Option<Chips> {
        let pot = self.live_hand().map_or(0, |hand| hand.pot);
        self.table
            .seats
            .values()
            .try_fold(pot, |total, seat| total.checked_add(seat.stack))
    }

    fn check_chip_room(&self, adding: Chips) -> EngineResult<()> {
        self.chips_at_table()
            .and_then(|total| total.checked_add(adding))
            .map(|_| ())
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "a table cannot hold more than {} chips",
                    Chips::MAX
                ))
            })
    }

    async fn release_player(&mut self) -> Option<(PlayerId, Chips)> {
        let seat_index = self
            .table
            .seats
            .keys()
            .rev()
            .copied()
            .find(|seat| !self.holds_chips(*seat))?;
        let seat = self.table.seats.remove(&seat_index)?;

        self.persist_table().await;
        self.emit(vec![EngineEvent::PlayerLeft {
            table_id: self.table.id,
            seat: seat_index,
            player_id: seat.player_id,
            stack: seat.stack,
        }])
        .await;
        Some((seat.player_id, seat.stack))
    }

    async fn close(&mut self) -> Vec<(PlayerId, Chips)> {
        let table_id = self.table.id;
        let mut events = Vec::new();
        let mut departed = Vec::new();
        if let Some(hand) = self.hand.as_mut().filter(|hand| hand.is_active()) {
            let refunds = hand.void(&mut self.table.seats);
            log::info!(
                "Table {table_id}: voided hand #{}, {} contributions returned, {} owed to departed players",
                hand.hand_number,
                refunds.returned.len(),
                refunds.departed.len()
            );
            departed = refunds.departed;
            events.push(EngineEvent::HandComplete {
                table_id,
                hand_id: hand.id,
                result: None,
                voided: true,
                stacks: stack_list(&self.table.seats),
            });
        }
        self.table.status = TableStatus::Complete;

        self.persist_table().await;
        self.persist_hand().await;
        self.emit(events).await;
        self.is_closed = true;

        self.table
            .seats
            .values()
            .map(|seat| (seat.player_id, seat.stack))
            .chain(departed)
            .collect()
    }

    fn poll(
        &self,
        viewer: Option<PlayerId>,
        since_version: Option<u64>,
        since_event_id: Option<u64>,
    ) -> PollResponse {
        let tail = self.log.since(since_event_id);
        let hand_version = self.hand.as_ref().map(|hand| hand.version);
        PollResponse {
            table: self.table.view(self.hand.as_ref(), viewer),
            hand_version,
            changed: hand_version != since_version,
            events: tail.events,
            snapshot_required: tail.snapshot_required,
            last_event_id: tail.last_event_id,
        }
    }

    async fn persist_table(&mut self) {
        self.table.touch();
        if let Err(e) = self.repository.save_table(&self.table).await {
            log::error!("Table {}: failed to save table: {e}", self.table.id);
        }
    }

    async fn persist_hand(&self) {
        if let Some(hand) = &self.hand
            && let Err(e) = self.repository.save_hand(hand).await
        {
            log::error!(
                "Table {}: failed to save hand #{}: {e}",
                self.table.id,
                hand.hand_number
            );
        }
    }

    /// Append to the event log, then publish. Publish failures are logged
    /// and otherwise ignored.
    async fn emit(&mut self, events: Vec<EngineEvent>) -> Vec<EventEnvelope> {
        let version = self.hand.as_ref().map(|hand| hand.version);
        let mut envelopes = Vec::with_capacity(events.len());
        for event in events {
            let envelope = self.log.push(version, event);
            if let Err(e) = self
                .broadcaster
                .publish(self.log.channel(), &envelope)
                .await
            {
                log::warn!(
                    "Table {}: failed to publish {:?}: {e}",
                    self.table.id,
                    envelope.event.kind()
                );
            }
            envelopes.push(envelope);
        }
        envelopes
    }
}

fn stack_list(seats: &Seats) -> Vec<(SeatIndex, PlayerId, Chips)> {
    seats
        .values()
        .map(|seat| (seat.seat_index, seat.player_id, seat.stack))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broadcast::NoopBroadcaster,
        db::InMemoryRepository,
        events::EventKind,
        game::hand::HandPhase,
        table::{
            config::{TableConfig, TableSpeed},
            models::TableOwner,
        },
    };

    fn spawn_table() -> (TableHandle, Arc<InMemoryRepository>) {
        let config = TableConfig {
            name: "Test".to_string(),
            speed: TableSpeed::Unlimited,
            auto_deal: false,
            ..TableConfig::default()
        };
        let repository = Arc::new(InMemoryRepository::new());
        let table = Table::new(1, config, TableOwner::CashGame(1));
        let options = TableOptions {
            seed: Some(7),
            ..TableOptions::default()
        };
        let handle = TableActor::spawn(
            table,
            options,
            repository.clone(),
            Arc::new(NoopBroadcaster),
        );
        (handle, repository)
    }

    async fn heads_up() -> (TableHandle, Arc<InMemoryRepository>) {
        let (handle, repository) = spawn_table();
        handle.seat_player(1, 1_000, None).await.unwrap();
        handle.seat_player(2, 1_000, None).await.unwrap();
        (handle, repository)
    }

    #[tokio::test]
    async fn test_seating_rules() {
        let (handle, _) = spawn_table();
        assert_eq!(handle.seat_player(1, 500, Some(4)).await.unwrap(), 4);
        assert_eq!(handle.seat_player(2, 500, Some(4)).await.unwrap(), 0);
        assert!(matches!(
            handle.seat_player(1, 500, None).await,
            Err(EngineError::StateConflict(_))
        ));
        assert!(matches!(
            handle.seat_player(3, 0, None).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_heads_up_dealer_acts_first() {
        let (handle, _) = heads_up().await;
        let hand = handle.start_hand().await.unwrap();
        assert_eq!(hand.version, 1);
        assert_eq!(hand.phase, HandPhase::Preflop);
        assert_eq!(hand.dealer_seat, 0);
        assert_eq!(hand.current_actor, Some(0));
        assert_eq!(hand.pot, 30);

        assert!(matches!(
            handle.start_hand().await,
            Err(EngineError::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let (handle, _) = heads_up().await;
        handle.start_hand().await.unwrap();

        let outcome = handle.submit_action(1, Action::Call, Some(1)).await.unwrap();
        assert_eq!(outcome.hand.version, 2);
        assert_eq!(outcome.next_actor, Some(1));
        assert!(
            outcome
                .events
                .iter()
                .any(|e| e.event.kind() == EventKind::TurnStarted)
        );

        let err = handle
            .submit_action(2, Action::Check, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::VersionConflict {
                expected: 1,
                actual: 2
            }
        ));
        let view = handle.snapshot(Some(2)).await.unwrap();
        assert_eq!(view.hand.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_not_seated_and_wrong_turn() {
        let (handle, _) = heads_up().await;
        handle.start_hand().await.unwrap();
        assert!(matches!(
            handle.submit_action(9, Action::Fold, None).await,
            Err(EngineError::NotSeated)
        ));
        assert!(matches!(
            handle.submit_action(2, Action::Fold, None).await,
            Err(EngineError::InvalidAction(_))
        ));
    }

    #[tokio::test]
    async fn test_cannot_leave_mid_hand() {
        let (handle, _) = heads_up().await;
        handle.start_hand().await.unwrap();
        assert!(matches!(
            handle.remove_seat(2).await,
            Err(EngineError::StateConflict(_))
        ));
        assert!(matches!(
            handle.add_chips(2, 100, None).await,
            Err(EngineError::StateConflict(_))
        ));

        let outcome = handle.submit_action(1, Action::Fold, None).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(handle.remove_seat(2).await.unwrap(), 1_010);
    }

    #[tokio::test]
    async fn test_add_chips_respects_cap() {
        let (handle, _) = heads_up().await;
        assert_eq!(handle.add_chips(1, 500, Some(1_200)).await.unwrap(), 200);
        assert!(matches!(
            handle.add_chips(1, 500, Some(1_200)).await,
            Err(EngineError::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_close_voids_live_hand() {
        let (handle, repository) = heads_up().await;
        handle.start_hand().await.unwrap();
        handle.submit_action(1, Action::Raise(100), None).await.unwrap();

        let mut stacks = handle.close().await.unwrap();
        stacks.sort();
        assert_eq!(stacks, vec![(1, 1_000), (2, 1_000)]);
        assert!(handle.snapshot(None).await.is_err());

        let table = repository.load_table(1).await.unwrap().unwrap();
        assert_eq!(table.status, TableStatus::Complete);
    }

    #[tokio::test]
    async fn test_poll_returns_tail() {
        let (handle, _) = heads_up().await;
        let before = handle.poll(None, None, None).await.unwrap();
        assert_eq!(before.last_event_id, 2);
        assert!(before.hand_version.is_none());

        handle.start_hand().await.unwrap();
        let after = handle.poll(Some(1), None, Some(2)).await.unwrap();
        assert!(after.changed);
        assert!(!after.snapshot_required);
        assert_eq!(after.events[0].event.kind(), EventKind::HandStarted);
        assert!(after.events.windows(2).all(|w| w[0].event_id < w[1].event_id));
        assert!(after.table.seats[0].hole_cards.is_some());
        assert!(after.table.seats[1].hole_cards.is_none());
    }
}
