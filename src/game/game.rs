use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::action::GameAction;
use crate::game::{GameConfig, GameError, GameState};
use crate::players::BasePlayer;
use crate::types::{SessionStatus, TurnPhase};

const TURNS_LIMIT: u32 = 1000;
const MAX_TRADE_ROUNDS: usize = 16;

/// A local, fully automated session: every seat is driven by a [`BasePlayer`].
pub struct Game {
    pub seed: u64,
    pub id: Uuid,
    pub state: GameState,
    last_proposal_turn: Option<u32>,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        let seed = config.seed;
        let mut state = GameState::new(config);
        for player in &mut state.players {
            player.automated = true;
        }
        Self {
            seed,
            id: state.id,
            state,
            last_proposal_turn: None,
        }
    }

    pub fn play<P: BasePlayer>(&mut self, players: &[P]) -> Option<usize> {
        if self.state.status == SessionStatus::Waiting {
            if let Err(err) = self.state.start() {
                warn!(error = %err, "could not start session");
                return None;
            }
        }
        while self.state.status == SessionStatus::Running && self.state.turn < TURNS_LIMIT {
            if self.play_tick(players).is_none() {
                break;
            }
        }
        self.winner()
    }

    pub fn play_tick<P: BasePlayer>(&mut self, players: &[P]) -> Option<GameAction> {
        let current_idx = self.state.next_player;
        if current_idx >= players.len() {
            return None;
        }
        self.resolve_trades(players);
        self.maybe_propose(&players[current_idx], current_idx);

        let legal_actions = self.state.legal_actions();
        if legal_actions.is_empty() {
            return None;
        }
        let action = players[current_idx].decide(self, legal_actions)?;
        match self.execute(action.clone()) {
            Ok(()) => Some(action),
            Err(err) => {
                warn!(error = %err, ?action, "player chose an illegal action");
                None
            }
        }
    }

    pub fn execute(&mut self, action: GameAction) -> Result<(), GameError> {
        self.state.step(action).map(|_| ())
    }

    pub fn winner(&self) -> Option<usize> {
        self.state.winner
    }

    pub fn copy(&self) -> Self {
        Self {
            seed: self.seed,
            id: self.id,
            state: self.state.clone(),
            last_proposal_turn: self.last_proposal_turn,
        }
    }

    fn maybe_propose<P: BasePlayer>(&mut self, player: &P, idx: usize) {
        let turn_start = self.state.phase() == TurnPhase::WaitingForRoll
            && !self.state.turn_state.has_rolled;
        if !turn_start || self.last_proposal_turn == Some(self.state.turn) {
            return;
        }
        self.last_proposal_turn = Some(self.state.turn);
        if let Some(action) = player.propose(self, idx) {
            if let Err(err) = self.execute(action) {
                debug!(error = %err, player = idx, "proposal rejected");
            }
        }
    }

    /// Lets every counterparty answer the offers addressed to them, counters included.
    fn resolve_trades<P: BasePlayer>(&mut self, players: &[P]) {
        for _ in 0..MAX_TRADE_ROUNDS {
            let Some(offer) = self
                .state
                .trades
                .offers()
                .iter()
                .find(|offer| offer.status.is_open())
                .cloned()
            else {
                return;
            };
            let Some(player) = players.get(offer.counterparty) else {
                return;
            };
            let action = GameAction::respond(offer.counterparty, offer.id, player.respond(self, &offer));
            if let Err(err) = self.execute(action) {
                debug!(error = %err, trade = %offer.id, "trade response failed, declining");
                let decline = GameAction::decline_trade(offer.counterparty, offer.id);
                if self.execute(decline).is_err() {
                    return;
                }
            }
        }
        // Counter chains that outlive the round cap are declined.
        let open: Vec<_> = self
            .state
            .trades
            .offers()
            .iter()
            .filter(|offer| offer.status.is_open())
            .map(|offer| GameAction::decline_trade(offer.counterparty, offer.id))
            .collect();
        for decline in open {
            let _ = self.execute(decline);
        }
    }
}
