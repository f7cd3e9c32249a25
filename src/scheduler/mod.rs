//! Timers that drive automated seats through their turns.
//!
//! At most one action is pending per session. Every entry carries the
//! [`TurnToken`] observed when it was scheduled; any change to the token
//! (turn handoff, another player's action) cancels it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::{GameAction, GameState};
use crate::players::AutomatedPlayer;
use crate::types::{SessionStatus, TurnPhase};

mod driver;

pub use driver::drive;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub roll_delay_ms: u64,
    pub decision_delay_ms: u64,
    pub end_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            roll_delay_ms: 1500,
            decision_delay_ms: 2000,
            end_delay_ms: 1000,
            poll_interval_ms: 6000,
        }
    }
}

impl SchedulerConfig {
    pub fn delay(&self, kind: ScheduledKind) -> Duration {
        Duration::from_millis(match kind {
            ScheduledKind::Roll => self.roll_delay_ms,
            ScheduledKind::Decide => self.decision_delay_ms,
            ScheduledKind::End => self.end_delay_ms,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduledKind {
    Roll,
    Decide,
    End,
}

/// Identifies the exact moment an action was scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnToken {
    pub player: usize,
    pub turn: u32,
    /// Length of the history feed; any recorded action bumps it.
    pub epoch: u64,
}

impl TurnToken {
    pub fn of(state: &GameState) -> Self {
        Self {
            player: state.next_player,
            turn: state.turn,
            epoch: state.history().len() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAction {
    pub session: Uuid,
    pub kind: ScheduledKind,
    pub due: Instant,
    pub token: TurnToken,
}

impl ScheduledAction {
    /// The concrete action to run, if the session is still where it was when scheduled.
    pub fn resolve(&self, state: &GameState, player: &AutomatedPlayer) -> Option<GameAction> {
        if TurnToken::of(state) != self.token || expected_kind(state) != Some(self.kind) {
            return None;
        }
        let seat = self.token.player;
        match self.kind {
            ScheduledKind::Roll => player.choose(state, state.legal_actions()),
            ScheduledKind::Decide => player.purchase_action(state, seat),
            ScheduledKind::End => Some(GameAction::end_turn(seat)),
        }
    }
}

/// What an automated seat would do next, guarded by the turn flags.
fn expected_kind(state: &GameState) -> Option<ScheduledKind> {
    if state.status != SessionStatus::Running || state.lock().is_some() {
        return None;
    }
    let seat = state.players.get(state.next_player)?;
    if !seat.automated || !seat.is_active() {
        return None;
    }
    let turn = &state.turn_state;
    match turn.phase {
        TurnPhase::WaitingForRoll if !turn.has_rolled || turn.extra_roll => Some(ScheduledKind::Roll),
        TurnPhase::AwaitingBuyDecision if !turn.landing_resolved => Some(ScheduledKind::Decide),
        TurnPhase::EndingTurn => Some(ScheduledKind::End),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
    pending: HashMap<Uuid, ScheduledAction>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn pending(&self, session: Uuid) -> Option<&ScheduledAction> {
        self.pending.get(&session)
    }

    /// Reconciles the queue with the latest view of `state`.
    ///
    /// Drops a pending entry whose token no longer matches, then schedules the
    /// next action for an automated seat if nothing is pending.
    pub fn observe(&mut self, state: &GameState, now: Instant) -> Option<&ScheduledAction> {
        let session = state.id;
        let token = TurnToken::of(state);
        let kind = expected_kind(state);

        if let Some(existing) = self.pending.get(&session) {
            if existing.token != token || Some(existing.kind) != kind {
                warn!(%session, kind = ?existing.kind, "pending automated action cancelled");
                self.pending.remove(&session);
            }
        }

        if let Some(kind) = kind {
            let due = now + self.config.delay(kind);
            self.pending.entry(session).or_insert_with(|| {
                debug!(%session, ?kind, player = token.player, "automated action scheduled");
                ScheduledAction {
                    session,
                    kind,
                    due,
                    token,
                }
            });
        }
        self.pending.get(&session)
    }

    pub fn cancel(&mut self, session: Uuid) -> Option<ScheduledAction> {
        self.pending.remove(&session)
    }

    /// Removes and returns every entry whose timer has expired.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledAction> {
        let due: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.due <= now)
            .map(|(session, _)| *session)
            .collect();
        due.into_iter()
            .filter_map(|session| self.pending.remove(&session))
            .collect()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|entry| entry.due).min()
    }
}
