//! Store-backed controller for one session.
//!
//! Every operation validates and locks against the live state, then waits its
//! turn at the write gate so only one operation talks to the store at a time.
//! Holding the gate it computes the next state on a copy, pushes the resulting
//! events to the store and only then installs the copy locally.
//!
//! A store failure releases the operation's lock and leaves the live state as
//! it was. The computed step is kept as unsynced and is pushed again, with the
//! same history seqs, before anything else touches the store. Asking for the
//! same action again completes it instead of running it twice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::board::SquareId;
use crate::game::{
    ActionLock, ActionPayload, GameAction, GameConfig, GameError, GameEvent, GameState,
    HistoryEntry, Landing, PlayerState, StepOutcome, TradeId, TradeResponse, TradeTerms,
};
use crate::game::state::MAX_PLAYERS;
use crate::players::scoring::{purchase_score, trade_favorability};
use crate::store::{GameStore, sync_events};
use crate::types::{ActionType, SessionStatus};

pub struct SessionHandle<S> {
    store: Arc<S>,
    id: Uuid,
    code: String,
    state: Mutex<GameState>,
    gate: tokio::sync::Mutex<()>,
    unsynced: Mutex<Option<Unsynced>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Request {
    Start,
    Cancel,
    Action(GameAction),
}

/// A step whose events did not fully reach the store.
struct Unsynced {
    request: Request,
    next: GameState,
    outcome: StepOutcome,
}

impl<S: GameStore> SessionHandle<S> {
    /// Registers a new WAITING session with the given seats.
    pub async fn create(
        store: Arc<S>,
        config: GameConfig,
        seats: Vec<PlayerState>,
    ) -> Result<Self, GameError> {
        if !(2..=MAX_PLAYERS).contains(&seats.len()) {
            return Err(GameError::InvalidPayload("sessions seat between 2 and 8 players"));
        }
        let mut state = GameState::new(GameConfig {
            num_players: seats.len(),
            ..config
        });
        for (seat, player) in seats.into_iter().enumerate() {
            state.seat_player(seat, player)?;
        }
        store.create_session(state.snapshot()).await?;
        info!(session = %state.id, code = %state.code, "session registered");
        Ok(Self::wrap(store, state))
    }

    /// Attaches to an existing session by its join code.
    pub async fn join(store: Arc<S>, code: &str) -> Result<Self, GameError> {
        let snapshot = store.get_session_by_code(code).await?;
        let state = GameState::from_snapshot(snapshot);
        debug!(session = %state.id, code, "joined session");
        Ok(Self::wrap(store, state))
    }

    fn wrap(store: Arc<S>, state: GameState) -> Self {
        Self {
            store,
            id: state.id,
            code: state.code.clone(),
            state: Mutex::new(state),
            gate: tokio::sync::Mutex::new(()),
            unsynced: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn live(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current local view.
    pub fn state(&self) -> GameState {
        self.live().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.live().status
    }

    pub fn lock_state(&self) -> Option<ActionLock> {
        self.live().lock().copied()
    }

    pub fn active_landing(&self) -> Option<Landing> {
        self.live().active_landing()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.live().history().to_vec()
    }

    /// Purchase hint for the property `player` is standing on, if it is for sale.
    pub fn purchase_hint(&self, player: usize) -> Option<u8> {
        let state = self.live();
        let property = match state.active_landing()? {
            Landing::Buyable { property, .. } => property,
            _ => return None,
        };
        Some(purchase_score(
            state.board(),
            &state.ownership,
            &state.players,
            property,
            player,
        ))
    }

    pub fn trade_hint(&self, trade: TradeId) -> Option<i32> {
        let state = self.live();
        let offer = state.trades.get(trade)?;
        Some(trade_favorability(state.board(), &state.ownership, offer))
    }

    pub async fn start(&self) -> Result<StepOutcome, GameError> {
        self.run(Request::Start, None).await
    }

    pub async fn cancel(&self) -> Result<StepOutcome, GameError> {
        self.run(Request::Cancel, None).await
    }

    pub async fn roll(&self, player: usize) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::roll(player)).await
    }

    pub async fn roll_with(&self, player: usize, die1: u8, die2: u8) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::roll_with(player, die1, die2)).await
    }

    pub async fn buy(&self, player: usize, property: SquareId) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::buy(player, property)).await
    }

    pub async fn skip(&self, player: usize, property: SquareId) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::skip(player, property)).await
    }

    pub async fn end_turn(&self, player: usize) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::end_turn(player)).await
    }

    pub async fn pay_jail_fine(&self, player: usize) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::new(player, ActionType::PayJailFine)).await
    }

    pub async fn use_jail_card(&self, player: usize) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::new(player, ActionType::UseJailCard)).await
    }

    pub async fn mortgage(&self, player: usize, property: SquareId) -> Result<StepOutcome, GameError> {
        self.perform(
            GameAction::new(player, ActionType::Mortgage)
                .with_payload(ActionPayload::Property(property)),
        )
        .await
    }

    pub async fn unmortgage(&self, player: usize, property: SquareId) -> Result<StepOutcome, GameError> {
        self.perform(
            GameAction::new(player, ActionType::Unmortgage)
                .with_payload(ActionPayload::Property(property)),
        )
        .await
    }

    pub async fn declare_bankruptcy(&self, player: usize) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::new(player, ActionType::DeclareBankruptcy)).await
    }

    pub async fn propose_trade(
        &self,
        player: usize,
        counterparty: usize,
        offered: TradeTerms,
        requested: TradeTerms,
    ) -> Result<TradeId, GameError> {
        let outcome = self
            .perform(GameAction::propose_trade(player, counterparty, offered, requested))
            .await?;
        outcome
            .events
            .iter()
            .find_map(|entry| match &entry.event {
                GameEvent::TradeProposed { offer } => Some(offer.id),
                _ => None,
            })
            .ok_or(GameError::IllegalAction)
    }

    pub async fn respond_trade(
        &self,
        player: usize,
        trade: TradeId,
        response: TradeResponse,
    ) -> Result<StepOutcome, GameError> {
        self.perform(GameAction::respond(player, trade, response)).await
    }

    /// Runs one action through lock, preview, store sync and commit.
    ///
    /// A second ROLL or END while one is in flight fails with `Locked` right away.
    pub async fn perform(&self, action: GameAction) -> Result<StepOutcome, GameError> {
        let held = self
            .live()
            .acquire_lock(action.player_index, action.action_type)?;
        self.run(Request::Action(action), held).await
    }

    async fn run(&self, request: Request, held: Option<ActionLock>) -> Result<StepOutcome, GameError> {
        let mut held = held;
        let gate = self.gate.lock().await;
        let result = self.run_gated(&request, &mut held).await;
        if let Some(lock) = &held {
            self.live().release_held(lock);
        }
        if result.is_ok() {
            if let Err(err) = self.merge_from_store().await {
                warn!(session = %self.id, error = %err, "revalidate after commit failed");
            }
        }
        drop(gate);
        result
    }

    async fn run_gated(
        &self,
        request: &Request,
        held: &mut Option<ActionLock>,
    ) -> Result<StepOutcome, GameError> {
        if let Some(unsynced) = self.take_unsynced() {
            let repeat = unsynced.request == *request;
            let outcome = self.flush(unsynced, held.as_ref()).await?;
            if repeat {
                debug!(session = %self.id, "unsynced step completed on retry");
                return Ok(outcome);
            }
        }
        self.confirm_held(request, held)?;

        let (next, outcome) = {
            let live = self.live();
            match request {
                Request::Start => {
                    let mut next = live.clone();
                    let outcome = next.start()?;
                    (next, outcome)
                }
                Request::Cancel => {
                    let mut next = live.clone();
                    let outcome = next.cancel()?;
                    (next, outcome)
                }
                Request::Action(action) => live.preview(action.clone())?,
            }
        };
        self.commit(request.clone(), next, outcome, held.as_ref()).await
    }

    /// Makes sure the lock taken for `request` is still in place on the live state.
    ///
    /// It may have been dropped while a step ahead of it was installed.
    fn confirm_held(&self, request: &Request, held: &mut Option<ActionLock>) -> Result<(), GameError> {
        let (Some(lock), Request::Action(action)) = (held.as_ref(), request) else {
            return Ok(());
        };
        let mut live = self.live();
        if live.lock() != Some(lock) {
            *held = None;
            *held = live.acquire_lock(action.player_index, action.action_type)?;
        }
        Ok(())
    }

    async fn commit(
        &self,
        request: Request,
        next: GameState,
        outcome: StepOutcome,
        held: Option<&ActionLock>,
    ) -> Result<StepOutcome, GameError> {
        match sync_events(self.store.as_ref(), self.id, &outcome.events).await {
            Ok(()) => {
                self.install(next, held);
                Ok(outcome)
            }
            Err(err) => {
                warn!(session = %self.id, error = %err, "store rejected update, step kept for resync");
                self.stash(Unsynced {
                    request,
                    next,
                    outcome,
                });
                Err(err.into())
            }
        }
    }

    /// Pushes a previously failed step again and installs it once it lands.
    async fn flush(&self, unsynced: Unsynced, held: Option<&ActionLock>) -> Result<StepOutcome, GameError> {
        match sync_events(self.store.as_ref(), self.id, &unsynced.outcome.events).await {
            Ok(()) => {
                info!(session = %self.id, events = unsynced.outcome.events.len(), "unsynced step flushed");
                self.install(unsynced.next, held);
                Ok(unsynced.outcome)
            }
            Err(err) => {
                self.stash(unsynced);
                Err(err.into())
            }
        }
    }

    /// Replaces the live state with `next`.
    ///
    /// `own` is the lock of the operation being installed and is dropped. A lock
    /// some other operation is waiting on is carried over if its holder may still
    /// take it.
    fn install(&self, next: GameState, own: Option<&ActionLock>) {
        let mut live = self.live();
        let waiting = live.lock().copied().filter(|lock| Some(lock) != own);
        *live = next;
        if live.lock() == waiting.as_ref() {
            return;
        }
        live.release_lock();
        if let Some(lock) = waiting {
            if let Err(err) = live.acquire_lock(lock.player, lock.action) {
                debug!(session = %self.id, error = %err, "waiting lock dropped");
            }
        }
    }

    fn take_unsynced(&self) -> Option<Unsynced> {
        self.unsynced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn stash(&self, unsynced: Unsynced) {
        *self.unsynced.lock().unwrap_or_else(PoisonError::into_inner) = Some(unsynced);
    }

    pub fn has_unsynced(&self) -> bool {
        self.unsynced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Pulls the store snapshot and merges it, last writer wins.
    ///
    /// Returns whether the snapshot was applied; it is skipped while an operation is in flight.
    pub async fn revalidate(&self) -> Result<bool, GameError> {
        let _gate = self.gate.lock().await;
        if let Some(unsynced) = self.take_unsynced() {
            self.flush(unsynced, None).await?;
        }
        self.merge_from_store().await
    }

    async fn merge_from_store(&self) -> Result<bool, GameError> {
        let snapshot = self.store.get_session_by_code(&self.code).await?;
        Ok(self.live().apply_snapshot(snapshot))
    }

    /// Revalidates on a fixed cadence until the session reaches a terminal status.
    pub async fn poll(&self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.revalidate().await {
                warn!(session = %self.id, error = %err, "poll failed");
            }
            if self.status().is_terminal() {
                debug!(session = %self.id, "polling stopped");
                return;
            }
        }
    }
}
