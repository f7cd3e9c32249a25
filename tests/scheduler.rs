//! Automated turn driver tests.
//!
//! Delays are shortened to milliseconds so the driver plays whole turns
//! against the in-process store.

use std::sync::Arc;
use std::time::Duration;

use monopolist_rs::game::{GameConfig, PlayerState, TradeStatus, TradeTerms};
use monopolist_rs::players::AutomatedPlayer;
use monopolist_rs::scheduler::{SchedulerConfig, drive};
use monopolist_rs::types::Token;
use monopolist_rs::{MemoryStore, SessionHandle};

fn fast() -> SchedulerConfig {
    SchedulerConfig {
        roll_delay_ms: 1,
        decision_delay_ms: 1,
        end_delay_ms: 1,
        poll_interval_ms: 5,
    }
}

fn seat(order: usize, automated: bool) -> PlayerState {
    let player = PlayerState::new(order, Token::ORDERED[order], 1500);
    if automated { player.automated() } else { player }
}

/// Test that automated seats take their turns without intervention.
#[tokio::test]
async fn test_driver_plays_automated_turns() {
    let store = Arc::new(MemoryStore::new());
    let handle = SessionHandle::create(
        Arc::clone(&store),
        GameConfig::default(),
        vec![seat(0, true), seat(1, true)],
    )
    .await
    .unwrap();
    handle.start().await.unwrap();
    let player = AutomatedPlayer::default();

    let waiter = async {
        while handle.state().turn < 3 && !handle.status().is_terminal() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::select! {
            _ = drive(&handle, &player, fast()) => {}
            _ = waiter => {}
        }
    })
    .await;

    assert!(finished.is_ok());
    let state = handle.state();
    assert!(state.turn >= 3 || state.status.is_terminal());
    assert_eq!(store.session(handle.id()).unwrap().turn, state.turn);
}

/// Test that the driver leaves a human seat's turn alone.
#[tokio::test]
async fn test_driver_waits_for_human_seat() {
    let store = Arc::new(MemoryStore::new());
    let handle = SessionHandle::create(
        Arc::clone(&store),
        GameConfig::default(),
        vec![seat(0, true), seat(1, false)],
    )
    .await
    .unwrap();
    handle.start().await.unwrap();
    let player = AutomatedPlayer::default();

    let result = tokio::time::timeout(Duration::from_millis(200), drive(&handle, &player, fast())).await;

    assert!(result.is_err(), "driver keeps waiting on the human seat");
    let state = handle.state();
    assert_eq!(state.next_player, 1);
    assert_eq!(state.turn, 1);
    assert!(!state.turn_state.has_rolled);
}

/// Test that the driver returns once the session is cancelled.
#[tokio::test]
async fn test_driver_stops_on_cancel() {
    let store = Arc::new(MemoryStore::new());
    let handle = SessionHandle::create(
        Arc::clone(&store),
        GameConfig::default(),
        vec![seat(0, true), seat(1, true)],
    )
    .await
    .unwrap();
    handle.start().await.unwrap();
    handle.cancel().await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(1),
        drive(&handle, &AutomatedPlayer::default(), fast()),
    )
    .await
    .expect("driver exits for a cancelled session");
}

/// Test that an accept refused as stale is turned into a decline.
#[tokio::test]
async fn test_driver_declines_stale_offer() {
    let store = Arc::new(MemoryStore::new());
    let handle = SessionHandle::create(
        Arc::clone(&store),
        GameConfig::default(),
        vec![seat(0, false), seat(1, true), seat(2, true)],
    )
    .await
    .unwrap();
    handle.start().await.unwrap();
    handle.roll_with(0, 1, 2).await.unwrap();
    handle.buy(0, 3).await.unwrap();

    // Both automated seats want Baltic for free; only one can have it.
    let first = handle
        .propose_trade(0, 1, TradeTerms::new([3], 0), TradeTerms::default())
        .await
        .unwrap();
    let second = handle
        .propose_trade(0, 2, TradeTerms::new([3], 0), TradeTerms::default())
        .await
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        drive(&handle, &AutomatedPlayer::default(), fast()),
    )
    .await;
    assert!(result.is_err(), "driver keeps waiting on the human seat");

    let state = handle.state();
    let mut statuses = [first, second].map(|id| state.trades.get(id).unwrap().status);
    statuses.sort_by_key(|status| *status == TradeStatus::Declined);
    assert_eq!(statuses, [TradeStatus::Accepted, TradeStatus::Declined]);
    let owner = state.ownership.owner_of(3);
    assert!(owner == Some(1) || owner == Some(2));
}
