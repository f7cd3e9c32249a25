use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::board::{BoardCatalog, SquareId};
use crate::game::{GameEvent, HistoryEntry, TradeId, TradeOffer, TradeResolution, TradeResponse, TradeStatus};
use crate::types::SessionStatus;

use super::{GameStore, SessionSnapshot, StoreError};

/// In-process store. Clones share the same sessions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<Mutex<HashMap<Uuid, Record>>>,
    offline: Arc<AtomicBool>,
}

struct Record {
    snapshot: SessionSnapshot,
    /// Operations with a lower seq have already been applied.
    next_op: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn session(&self, id: Uuid) -> Option<SessionSnapshot> {
        self.sessions
            .lock()
            .ok()?
            .get(&id)
            .map(|record| record.snapshot.clone())
    }

    fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionSnapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.with_record(id, |record| f(&mut record.snapshot))
    }

    /// Runs `f` unless the operation for `seq` already landed.
    fn apply_once(
        &self,
        id: Uuid,
        seq: u64,
        f: impl FnOnce(&mut SessionSnapshot) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.with_record(id, |record| {
            if seq < record.next_op {
                debug!(session = %id, seq, "operation already applied");
                return Ok(());
            }
            f(&mut record.snapshot)?;
            record.next_op = seq + 1;
            Ok(())
        })
    }

    fn with_record<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Record) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session map poisoned".into()))?;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(session)
    }
}

fn player_mut(
    session: &mut SessionSnapshot,
    player: usize,
) -> Result<&mut crate::game::PlayerState, StoreError> {
    session
        .players
        .get_mut(player)
        .ok_or_else(|| StoreError::Rejected(format!("unknown player {player}")))
}

impl GameStore for MemoryStore {
    async fn create_session(&self, snapshot: SessionSnapshot) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session map poisoned".into()))?;
        if sessions
            .values()
            .any(|existing| existing.snapshot.code == snapshot.code)
        {
            return Err(StoreError::Rejected(format!("join code {} in use", snapshot.code)));
        }
        let next_op = snapshot.history.len() as u64;
        sessions.insert(snapshot.id, Record { snapshot, next_op });
        Ok(())
    }

    async fn move_player(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        position: SquareId,
    ) -> Result<(), StoreError> {
        self.apply_once(session, seq, |state| {
            player_mut(state, player)?.position = position;
            Ok(())
        })
    }

    async fn buy_property(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        property: SquareId,
        price: i64,
    ) -> Result<(), StoreError> {
        self.apply_once(session, seq, |state| {
            state
                .ownership
                .acquire(BoardCatalog::standard(), property, player)
                .map_err(|err| StoreError::Rejected(err.to_string()))?;
            player_mut(state, player)?.debit(price);
            Ok(())
        })
    }

    async fn end_turn(
        &self,
        session: Uuid,
        seq: u64,
        next_player: usize,
        turn: u32,
    ) -> Result<(), StoreError> {
        self.apply_once(session, seq, |state| {
            state.next_player = next_player;
            state.turn = turn;
            Ok(())
        })
    }

    async fn create_trade(&self, session: Uuid, seq: u64, offer: TradeOffer) -> Result<(), StoreError> {
        self.apply_once(session, seq, |state| {
            state.trades.upsert(offer);
            Ok(())
        })
    }

    async fn respond_trade(
        &self,
        session: Uuid,
        seq: u64,
        trade: TradeId,
        responder: usize,
        resolution: TradeResolution,
    ) -> Result<(), StoreError> {
        self.apply_once(session, seq, |state| {
            let response = match resolution {
                TradeResolution::Accepted => TradeResponse::Accept,
                TradeResolution::Declined => TradeResponse::Decline,
                TradeResolution::Countered { .. } => {
                    let mut offer = state
                        .trades
                        .get(trade)
                        .cloned()
                        .ok_or_else(|| StoreError::NotFound(trade.to_string()))?;
                    offer.status = TradeStatus::Countered;
                    state.trades.upsert(offer);
                    return Ok(());
                }
            };
            state
                .trades
                .respond(
                    BoardCatalog::standard(),
                    &mut state.players,
                    &mut state.ownership,
                    trade,
                    responder,
                    response,
                )
                .map(|_| ())
                .map_err(|err| StoreError::Rejected(err.to_string()))
        })
    }

    async fn get_session_by_code(&self, code: &str) -> Result<SessionSnapshot, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session map poisoned".into()))?;
        sessions
            .values()
            .find(|record| record.snapshot.code == code)
            .map(|record| record.snapshot.clone())
            .ok_or_else(|| StoreError::NotFound(code.to_string()))
    }

    async fn adjust_balance(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        delta: i64,
    ) -> Result<(), StoreError> {
        self.apply_once(session, seq, |state| {
            player_mut(state, player)?.credit(delta);
            Ok(())
        })
    }

    async fn append_history(&self, session: Uuid, entry: HistoryEntry) -> Result<(), StoreError> {
        self.with_session(session, |state| {
            if (entry.seq as usize) < state.history.len() {
                warn!(%session, seq = entry.seq, "duplicate history entry ignored");
                return Ok(());
            }
            apply_event(state, &entry.event)?;
            state.history.push(entry);
            Ok(())
        })
    }
}

/// Applies the events that have no dedicated store operation.
fn apply_event(state: &mut SessionSnapshot, event: &GameEvent) -> Result<(), StoreError> {
    match event {
        GameEvent::SessionStarted => state.status = SessionStatus::Running,
        GameEvent::SessionCancelled => state.status = SessionStatus::Cancelled,
        GameEvent::SentToJail { player } => player_mut(state, *player)?.send_to_jail(),
        GameEvent::ReleasedFromJail { player } => player_mut(state, *player)?.release_from_jail(),
        GameEvent::JailAttemptFailed { player, attempts } => {
            player_mut(state, *player)?.jail_attempts = *attempts
        }
        GameEvent::JailCardGained { player, deck } => player_mut(state, *player)?.add_jail_card(*deck),
        GameEvent::JailCardUsed { player, deck } => {
            let held = &mut player_mut(state, *player)?.jail_cards[deck.index()];
            *held = held.saturating_sub(1);
        }
        GameEvent::MortgageChanged {
            player,
            property,
            mortgaged,
        } => {
            let result = if *mortgaged {
                state.ownership.mortgage(*property, *player)
            } else {
                state.ownership.unmortgage(*property, *player)
            };
            result.map_err(|err| StoreError::Rejected(err.to_string()))?;
        }
        GameEvent::PotChanged { pot } => state.free_parking_pot = *pot,
        GameEvent::PlayerBankrupt { player, .. } => {
            let bankrupt = player_mut(state, *player)?;
            bankrupt.bankrupt = true;
            bankrupt.in_jail = false;
            bankrupt.jail_cards = [0; 2];
            state.ownership.release_all(*player);
            state.trades.withdraw_player(*player);
        }
        GameEvent::GameWon { winner } => {
            state.status = SessionStatus::Finished;
            state.winner = Some(*winner);
        }
        _ => {}
    }
    Ok(())
}
