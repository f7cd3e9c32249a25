//! Store-backed session tests.
//!
//! Uses the in-process store to check that committed actions are mirrored,
//! that store failures leave the local session untouched, and that a second
//! client converges by revalidating. [`ScriptedStore`] wraps the in-process
//! store to slow down moves and offers or drop a single history write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use monopolist_rs::game::{
    GameConfig, GameError, GameEvent, HistoryEntry, PlayerState, TradeId, TradeOffer,
    TradeResolution, TradeResponse, TradeTerms, TurnViolation,
};
use monopolist_rs::types::{LockKind, SessionStatus, Token, TurnPhase};
use monopolist_rs::{GameStore, MemoryStore, SessionHandle, SessionSnapshot, SquareId, StoreError};
use uuid::Uuid;

fn seats(count: usize) -> Vec<PlayerState> {
    Token::ORDERED
        .iter()
        .take(count)
        .enumerate()
        .map(|(order, token)| {
            PlayerState::new(order, *token, 1500).with_identity(format!("wallet-{order}"), token.to_string())
        })
        .collect()
}

async fn running_session<S: GameStore>(store: &Arc<S>, players: usize) -> SessionHandle<S> {
    seated_session(store, seats(players)).await
}

async fn seated_session<S: GameStore>(store: &Arc<S>, seats: Vec<PlayerState>) -> SessionHandle<S> {
    let handle = SessionHandle::create(Arc::clone(store), GameConfig::default(), seats)
        .await
        .expect("session registered");
    handle.start().await.expect("session starts");
    handle
}

/// In-process store with slow moves and offers, or a one-shot history failure.
#[derive(Default)]
struct ScriptedStore {
    inner: MemoryStore,
    delay: Option<Duration>,
    fail_next_balance_entry: AtomicBool,
}

impl ScriptedStore {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn failing_once() -> Self {
        Self {
            fail_next_balance_entry: AtomicBool::new(true),
            ..Self::default()
        }
    }
}

impl GameStore for ScriptedStore {
    async fn create_session(&self, snapshot: SessionSnapshot) -> Result<(), StoreError> {
        self.inner.create_session(snapshot).await
    }

    async fn move_player(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        position: SquareId,
    ) -> Result<(), StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.move_player(session, seq, player, position).await
    }

    async fn buy_property(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        property: SquareId,
        price: i64,
    ) -> Result<(), StoreError> {
        self.inner
            .buy_property(session, seq, player, property, price)
            .await
    }

    async fn end_turn(
        &self,
        session: Uuid,
        seq: u64,
        next_player: usize,
        turn: u32,
    ) -> Result<(), StoreError> {
        self.inner.end_turn(session, seq, next_player, turn).await
    }

    async fn create_trade(&self, session: Uuid, seq: u64, offer: TradeOffer) -> Result<(), StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.create_trade(session, seq, offer).await
    }

    async fn respond_trade(
        &self,
        session: Uuid,
        seq: u64,
        trade: TradeId,
        responder: usize,
        resolution: TradeResolution,
    ) -> Result<(), StoreError> {
        self.inner
            .respond_trade(session, seq, trade, responder, resolution)
            .await
    }

    async fn get_session_by_code(&self, code: &str) -> Result<SessionSnapshot, StoreError> {
        self.inner.get_session_by_code(code).await
    }

    async fn adjust_balance(
        &self,
        session: Uuid,
        seq: u64,
        player: usize,
        delta: i64,
    ) -> Result<(), StoreError> {
        self.inner.adjust_balance(session, seq, player, delta).await
    }

    async fn append_history(&self, session: Uuid, entry: HistoryEntry) -> Result<(), StoreError> {
        if matches!(entry.event, GameEvent::BalanceChanged { .. })
            && self.fail_next_balance_entry.swap(false, Ordering::SeqCst)
        {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.append_history(session, entry).await
    }
}

/// Seats with player 0 parked three squares before Go.
fn seats_near_go() -> Vec<PlayerState> {
    let mut seats = seats(2);
    seats[0].position = 38;
    seats
}

// ============================================================================
// Commit path
// ============================================================================

/// Test that every committed action shows up in the store.
#[tokio::test]
async fn test_commit_is_mirrored_in_store() {
    let store = Arc::new(MemoryStore::new());
    let host = running_session(&store, 2).await;

    host.roll_with(0, 1, 2).await.unwrap();
    assert_eq!(store.session(host.id()).unwrap().players[0].position, 3);
    assert!(host.purchase_hint(0).is_some());

    host.buy(0, 3).await.unwrap();
    host.end_turn(0).await.unwrap();

    let snapshot = store.session(host.id()).unwrap();
    assert_eq!(snapshot.status, SessionStatus::Running);
    assert_eq!(snapshot.ownership.owner_of(3), Some(0));
    assert_eq!(snapshot.players[0].balance, 1440);
    assert_eq!(snapshot.next_player, 1);
    assert_eq!(snapshot.turn, 1);
    assert_eq!(snapshot.history, host.history());
    assert_eq!(host.lock_state(), None);
}

/// Test that sessions need between two and eight seats.
#[tokio::test]
async fn test_create_validates_seat_count() {
    let store = Arc::new(MemoryStore::new());
    let result = SessionHandle::create(Arc::clone(&store), GameConfig::default(), seats(1)).await;
    assert!(matches!(result, Err(GameError::InvalidPayload(_))));
}

/// Test that a store failure releases the lock and keeps the local state.
#[tokio::test]
async fn test_store_failure_leaves_state_untouched() {
    let store = Arc::new(MemoryStore::new());
    let host = running_session(&store, 2).await;
    let before = host.history().len();

    store.set_offline(true);
    let result = host.roll_with(0, 1, 2).await;

    assert!(matches!(result, Err(GameError::StoreUnavailable(_))));
    assert_eq!(host.lock_state(), None);
    assert!(host.has_unsynced());
    let state = host.state();
    assert_eq!(state.players[0].position, 0);
    assert_eq!(state.phase(), TurnPhase::WaitingForRoll);
    assert!(!state.turn_state.has_rolled);
    assert_eq!(host.history().len(), before);

    store.set_offline(false);
    host.roll_with(0, 1, 2).await.unwrap();
    assert_eq!(host.state().players[0].position, 3);
    assert!(!host.has_unsynced());
}

/// Test that validation errors never reach the store.
#[tokio::test]
async fn test_rejected_action_is_not_synced() {
    let store = Arc::new(MemoryStore::new());
    let host = running_session(&store, 2).await;
    let before = store.session(host.id()).unwrap().history.len();

    assert!(host.end_turn(0).await.is_err());
    assert!(host.roll_with(1, 1, 2).await.is_err());

    assert_eq!(store.session(host.id()).unwrap().history.len(), before);
    assert_eq!(host.lock_state(), None);
}

// ============================================================================
// Multiple clients
// ============================================================================

/// Test that a client joining by code converges on the host's actions.
#[tokio::test]
async fn test_joiner_revalidates() {
    let store = Arc::new(MemoryStore::new());
    let host = SessionHandle::create(Arc::clone(&store), GameConfig::default(), seats(2))
        .await
        .unwrap();
    let guest = SessionHandle::join(Arc::clone(&store), host.code()).await.unwrap();
    assert_eq!(guest.id(), host.id());
    assert_eq!(guest.status(), SessionStatus::Waiting);

    host.start().await.unwrap();
    host.roll_with(0, 1, 2).await.unwrap();
    host.skip(0, 3).await.unwrap();
    host.end_turn(0).await.unwrap();

    assert!(guest.revalidate().await.unwrap());
    let view = guest.state();
    assert_eq!(view.status, SessionStatus::Running);
    assert_eq!(view.players[0].position, 3);
    assert_eq!(view.next_player, 1);
    assert_eq!(view.phase(), TurnPhase::WaitingForRoll);

    guest.roll_with(1, 2, 3).await.unwrap();
    host.revalidate().await.unwrap();
    assert_eq!(host.state().players[1].position, 5);
}

/// Test that an unknown join code is reported as not found.
#[tokio::test]
async fn test_join_unknown_code() {
    let store = Arc::new(MemoryStore::new());
    let result = SessionHandle::join(Arc::clone(&store), "ZZZZZZ").await;
    assert!(matches!(result, Err(GameError::NotFound(code)) if code == "ZZZZZZ"));

    store.set_offline(true);
    let result = SessionHandle::join(store, "ZZZZZZ").await;
    assert!(matches!(result, Err(GameError::StoreUnavailable(_))));
}

/// Test that trades go through the store's own trade book.
#[tokio::test]
async fn test_trade_through_store() {
    let store = Arc::new(MemoryStore::new());
    let host = running_session(&store, 2).await;
    host.roll_with(0, 1, 2).await.unwrap();
    host.buy(0, 3).await.unwrap();

    let id = host
        .propose_trade(0, 1, TradeTerms::new([3], 0), TradeTerms::cash(100))
        .await
        .unwrap();
    assert!(host.trade_hint(id).is_some());
    assert!(store.session(host.id()).unwrap().trades.get(id).is_some());

    host.respond_trade(1, id, TradeResponse::Accept).await.unwrap();

    let snapshot = store.session(host.id()).unwrap();
    assert_eq!(snapshot.ownership.owner_of(3), Some(1));
    assert_eq!(snapshot.players[0].balance, 1540);
    assert_eq!(snapshot.players[1].balance, 1400);
    assert_eq!(host.state().ownership.owner_of(3), Some(1));
}

/// Test that polling stops once the session is over.
#[tokio::test]
async fn test_poll_stops_when_cancelled() {
    let store = Arc::new(MemoryStore::new());
    let host = running_session(&store, 2).await;
    host.cancel().await.unwrap();
    assert_eq!(store.session(host.id()).unwrap().status, SessionStatus::Cancelled);

    tokio::time::timeout(Duration::from_secs(1), host.poll(Duration::from_millis(5)))
        .await
        .expect("poll returns once the session is terminal");
}

// ============================================================================
// In-flight operations
// ============================================================================

/// Test that a second ROLL is refused while the first waits on the store.
#[tokio::test]
async fn test_second_roll_rejected_while_first_in_flight() {
    let store = Arc::new(ScriptedStore::slow(Duration::from_millis(200)));
    let host = Arc::new(running_session(&store, 2).await);

    let first = tokio::spawn({
        let host = Arc::clone(&host);
        async move { host.roll_with(0, 1, 2).await }
    });
    while host.lock_state().is_none() {
        tokio::task::yield_now().await;
    }

    let second = host.roll_with(0, 4, 5).await;
    assert!(matches!(
        second,
        Err(GameError::InvalidTurn(TurnViolation::Locked(LockKind::Roll)))
    ));

    // Trades are not gated by the lock. This one lands after the roll.
    let id = host
        .propose_trade(1, 0, TradeTerms::cash(10), TradeTerms::default())
        .await
        .unwrap();
    first.await.unwrap().unwrap();

    let state = host.state();
    assert_eq!(state.players[0].position, 3);
    assert_eq!(state.phase(), TurnPhase::AwaitingBuyDecision);
    assert!(state.trades.get(id).is_some());
    assert_eq!(host.lock_state(), None);

    let snapshot = store.inner.session(host.id()).unwrap();
    assert_eq!(snapshot.players[0].position, 3);
    assert!(snapshot.trades.get(id).is_some());
    assert_eq!(snapshot.history, host.history());
}

/// Test that a trade landing ahead of a waiting roll keeps the roll's lock.
#[tokio::test]
async fn test_trade_commit_keeps_waiting_lock() {
    let store = Arc::new(ScriptedStore::slow(Duration::from_millis(100)));
    let host = Arc::new(running_session(&store, 2).await);
    host.roll_with(0, 1, 2).await.unwrap();
    host.buy(0, 3).await.unwrap();
    host.end_turn(0).await.unwrap();

    let offer = tokio::spawn({
        let host = Arc::clone(&host);
        async move {
            host.propose_trade(0, 1, TradeTerms::new([3], 0), TradeTerms::cash(80))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let roll = tokio::spawn({
        let host = Arc::clone(&host);
        async move { host.roll_with(1, 1, 2).await }
    });
    while host.lock_state().is_none() {
        tokio::task::yield_now().await;
    }

    let id = offer.await.unwrap().unwrap();
    let lock = host.lock_state().expect("roll still holds the lock");
    assert_eq!((lock.kind, lock.player), (LockKind::Roll, 1));
    assert!(host.state().trades.get(id).is_some());
    assert!(matches!(
        host.roll_with(1, 2, 2).await,
        Err(GameError::InvalidTurn(TurnViolation::Locked(LockKind::Roll)))
    ));

    roll.await.unwrap().unwrap();
    let state = host.state();
    assert_eq!(state.players[1].position, 3);
    assert!(state.trades.get(id).is_some());
    assert_eq!(host.lock_state(), None);
}

/// Test that cancelling during an in-flight roll leaves the session cancelled.
#[tokio::test]
async fn test_cancel_during_roll_wins() {
    let store = Arc::new(ScriptedStore::slow(Duration::from_millis(100)));
    let host = Arc::new(running_session(&store, 2).await);

    let roll = tokio::spawn({
        let host = Arc::clone(&host);
        async move { host.roll_with(0, 1, 2).await }
    });
    while host.lock_state().is_none() {
        tokio::task::yield_now().await;
    }
    host.cancel().await.unwrap();
    roll.await.unwrap().unwrap();

    assert_eq!(host.status(), SessionStatus::Cancelled);
    assert_eq!(host.lock_state(), None);
    assert_eq!(
        store.inner.session(host.id()).unwrap().status,
        SessionStatus::Cancelled
    );
}

// ============================================================================
// Partial writes
// ============================================================================

/// Test that retrying after a partial write credits passing Go once.
#[tokio::test]
async fn test_retry_after_partial_write_credits_once() {
    let store = Arc::new(ScriptedStore::failing_once());
    let host = seated_session(&store, seats_near_go()).await;

    let result = host.roll_with(0, 5, 2).await;
    assert!(matches!(result, Err(GameError::StoreUnavailable(_))));
    assert_eq!(host.lock_state(), None);
    assert_eq!(host.state().players[0].balance, 1500);
    assert_eq!(host.state().players[0].position, 38);

    host.roll_with(0, 5, 2).await.unwrap();

    let state = host.state();
    let snapshot = store.inner.session(host.id()).unwrap();
    assert_eq!(state.players[0].position, 5);
    assert_eq!(state.players[0].balance, 1700);
    assert_eq!(snapshot.players[0].position, 5);
    assert_eq!(snapshot.players[0].balance, 1700);
    assert_eq!(snapshot.history, host.history());
    assert!(!host.has_unsynced());
}

/// Test that the next operation pushes an unsynced step before its own.
#[tokio::test]
async fn test_other_action_flushes_unsynced_step_first() {
    let store = Arc::new(ScriptedStore::failing_once());
    let host = seated_session(&store, seats_near_go()).await;

    assert!(host.roll_with(0, 5, 2).await.is_err());
    let id = host
        .propose_trade(1, 0, TradeTerms::cash(25), TradeTerms::default())
        .await
        .unwrap();

    let state = host.state();
    let snapshot = store.inner.session(host.id()).unwrap();
    assert_eq!(state.players[0].position, 5);
    assert_eq!(snapshot.players[0].balance, 1700);
    assert!(snapshot.trades.get(id).is_some());
    assert_eq!(snapshot.history, host.history());

    // The roll already happened; asking again is a phase error, not a second move.
    assert!(matches!(
        host.roll_with(0, 5, 2).await,
        Err(GameError::InvalidTurn(TurnViolation::WrongPhase { .. }))
    ));
}
