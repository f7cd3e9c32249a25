//! Boundary to the durable session store.
//!
//! The engine never talks to the store directly. [`sync_events`] replays the
//! history entries produced by one engine step as store operations, in order.
//!
//! Every state-changing operation carries the `seq` of the history entry it
//! belongs to. A store applies each seq at most once, so replaying a step that
//! was only partly written never repeats the parts that already landed.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::board::SquareId;
use crate::game::{
    GameConfig, GameError, GameEvent, HistoryEntry, OwnershipIndex, PlayerState, TradeBook,
    TradeId, TradeOffer, TradeResolution,
};
use crate::types::SessionStatus;

mod memory;

pub use memory::MemoryStore;

/// Everything the store knows about a session. Local turn flags are not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub code: String,
    pub config: GameConfig,
    pub status: SessionStatus,
    pub players: Vec<PlayerState>,
    pub next_player: usize,
    pub turn: u32,
    pub ownership: OwnershipIndex,
    pub trades: TradeBook,
    pub winner: Option<usize>,
    pub free_parking_pot: i64,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),
    #[error("session {0} not found")]
    NotFound(String),
    #[error("update rejected: {0}")]
    Rejected(String),
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => GameError::NotFound(what),
            err => GameError::StoreUnavailable(err.to_string()),
        }
    }
}

/// Request/response operations offered by the session store.
pub trait GameStore: Send + Sync + 'static {
    /// Register a new session.
    fn create_session(
        &self,
        snapshot: SessionSnapshot,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// State-changing operations apply at most once per `seq`; a repeat is acknowledged and ignored.
    fn move_player(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        position: SquareId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn buy_property(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        property: SquareId,
        price: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn end_turn(
        &self,
        session: Uuid,
        seq: u64,
        next_player: usize,
        turn: u32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_trade(
        &self,
        session: Uuid,
        seq: u64,
        offer: TradeOffer,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn respond_trade(
        &self,
        session: Uuid,
        seq: u64,
        trade: TradeId,
        responder: usize,
        resolution: TradeResolution,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_session_by_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<SessionSnapshot, StoreError>> + Send;

    fn adjust_balance(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        delta: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Append to the history feed. Events without a dedicated operation
    /// (jail, mortgages, bankruptcy, session status) are applied from here.
    fn append_history(
        &self,
        session: Uuid,
        entry: HistoryEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Pushes the entries of one step to the store. Stops at the first failure.
///
/// Safe to call again with the same entries after a failure.
pub async fn sync_events<S: GameStore>(
    store: &S,
    session: Uuid,
    entries: &[HistoryEntry],
) -> Result<(), StoreError> {
    for entry in entries {
        let seq = entry.seq;
        match &entry.event {
            GameEvent::Moved { player, to, .. } => {
                store.move_player(session, seq, *player, *to).await?
            }
            GameEvent::BalanceChanged { player, delta, .. } => {
                store.adjust_balance(session, seq, *player, *delta).await?
            }
            GameEvent::PropertyBought {
                player,
                property,
                price,
            } => {
                store
                    .buy_property(session, seq, *player, *property, *price)
                    .await?
            }
            GameEvent::TurnAdvanced {
                next_player, turn, ..
            } => store.end_turn(session, seq, *next_player, *turn).await?,
            GameEvent::TradeProposed { offer } => {
                store.create_trade(session, seq, offer.clone()).await?
            }
            GameEvent::TradeResolved {
                trade,
                responder,
                resolution,
            } => {
                store
                    .respond_trade(session, seq, *trade, *responder, *resolution)
                    .await?
            }
            _ => {}
        }
        store.append_history(session, entry.clone()).await?;
    }
    debug!(%session, entries = entries.len(), "events synced");
    Ok(())
}
