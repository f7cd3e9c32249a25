use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::action::GameAction;
use crate::game::game::Game;
use crate::game::landing::Landing;
use crate::game::state::GameState;
use crate::game::trade::{TradeOffer, TradeResponse, TradeTerms};
use crate::players::BasePlayer;
use crate::players::scoring::{cash_shortfall, purchase_score, trade_favorability};
use crate::types::{ActionType, PropertyGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomatedParams {
    /// Buy when the purchase score reaches this value.
    pub buy_threshold: u8,
    /// Accept offers at or above this favorability.
    pub accept_threshold: i32,
    /// Decline offers below this favorability; anything in between is countered.
    pub reject_threshold: i32,
    /// Cash kept back when buying or paying to leave jail early.
    pub cash_reserve: i64,
    /// Premium over list price offered when asking for a set-completing property.
    pub completion_premium: f64,
}

impl Default for AutomatedParams {
    fn default() -> Self {
        Self {
            buy_threshold: 60,
            accept_threshold: 15,
            reject_threshold: -25,
            cash_reserve: 50,
            completion_premium: 0.5,
        }
    }
}

/// Counterparty driven entirely by the scores in [`crate::players::scoring`].
#[derive(Debug, Clone, Default)]
pub struct AutomatedPlayer {
    pub params: AutomatedParams,
}

impl AutomatedPlayer {
    pub fn new(params: AutomatedParams) -> Self {
        Self { params }
    }

    pub fn decide_purchase(&self, score: u8) -> bool {
        score >= self.params.buy_threshold
    }

    /// Buy or skip for the landing `player` is waiting on.
    pub fn purchase_action(&self, state: &GameState, player: usize) -> Option<GameAction> {
        let (property, price) = match state.active_landing()? {
            Landing::Buyable { property, price } => (property, price),
            _ => return None,
        };
        let score = purchase_score(
            state.board(),
            &state.ownership,
            &state.players,
            property,
            player,
        );
        let keeps_reserve = state.players[player].balance - price >= self.params.cash_reserve;
        let buy = self.decide_purchase(score) && keeps_reserve;
        debug!(player, property, score, buy, "purchase decision");
        Some(if buy {
            GameAction::buy(player, property)
        } else {
            GameAction::skip(player, property)
        })
    }

    /// Picks among `actions` for the phase the session is in.
    pub fn choose(&self, state: &GameState, actions: &[GameAction]) -> Option<GameAction> {
        let player = actions.first()?.player_index;
        if actions
            .iter()
            .any(|action| action.action_type == ActionType::SkipProperty)
        {
            return self.purchase_action(state, player);
        }
        let balance = state.players[player].balance;
        let find = |kind: ActionType| actions.iter().find(|action| action.action_type == kind).cloned();
        if let Some(card) = find(ActionType::UseJailCard) {
            return Some(card);
        }
        if balance - state.config.jail_fine >= self.params.cash_reserve * 10 {
            if let Some(fine) = find(ActionType::PayJailFine) {
                return Some(fine);
            }
        }
        find(ActionType::Roll)
            .or_else(|| find(ActionType::EndTurn))
            .or_else(|| actions.first().cloned())
    }

    pub fn respond_to(&self, state: &GameState, offer: &TradeOffer) -> TradeResponse {
        let favorability = trade_favorability(state.board(), &state.ownership, offer);
        if favorability >= self.params.accept_threshold {
            return TradeResponse::Accept;
        }
        if favorability < self.params.reject_threshold {
            return TradeResponse::Decline;
        }
        if offer.parent.is_some() {
            return TradeResponse::Decline;
        }
        let shortfall = cash_shortfall(
            state.board(),
            &state.ownership,
            offer,
            self.params.accept_threshold,
        );
        let asked = offer.offered.cash + shortfall;
        let proposer_balance = state.players[offer.proposer].balance + offer.requested.cash;
        if shortfall == 0 || asked > proposer_balance {
            return TradeResponse::Decline;
        }
        debug!(trade = %offer.id, favorability, shortfall, "countering offer");
        TradeResponse::Counter {
            offered: offer.requested.clone(),
            requested: TradeTerms {
                properties: offer.offered.properties.clone(),
                cash: asked,
            },
        }
    }

    /// An offer for the one property that would complete a street group, if any.
    pub fn suggest_trade(&self, state: &GameState, player: usize) -> Option<GameAction> {
        let board = state.board();
        let balance = state.players.get(player)?.balance;
        for group in PropertyGroup::ALL.into_iter().filter(|group| group.is_street()) {
            let members = board.group_members(group);
            let mine = state.ownership.count_in_group(board, player, group);
            if mine + 1 != members.len() {
                continue;
            }
            let Some(missing) = members
                .iter()
                .copied()
                .find(|square| state.ownership.owner_of(*square) != Some(player))
            else {
                continue;
            };
            let Some(record) = state.ownership.get(missing) else {
                continue;
            };
            if record.houses > 0 || !state.players[record.owner].is_active() {
                continue;
            }
            let price = board.property(missing)?.price;
            let cash = (price as f64 * (1.0 + self.params.completion_premium)).round() as i64;
            if balance - cash < self.params.cash_reserve {
                continue;
            }
            return Some(GameAction::propose_trade(
                player,
                record.owner,
                TradeTerms::cash(cash),
                TradeTerms::new([missing], 0),
            ));
        }
        None
    }
}

impl BasePlayer for AutomatedPlayer {
    fn decide(&self, game: &Game, actions: &[GameAction]) -> Option<GameAction> {
        self.choose(&game.state, actions)
    }

    fn respond(&self, game: &Game, offer: &TradeOffer) -> TradeResponse {
        self.respond_to(&game.state, offer)
    }

    fn propose(&self, game: &Game, player: usize) -> Option<GameAction> {
        self.suggest_trade(&game.state, player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ActionPayload, GameConfig};

    #[test]
    fn threshold_governs_purchase() {
        let player = AutomatedPlayer::default();
        assert!(player.decide_purchase(61));
        assert!(player.decide_purchase(60));
        assert!(!player.decide_purchase(59));
    }

    fn offer_for_boardwalk(cash: i64) -> (GameState, TradeOffer) {
        let mut state = GameState::new(GameConfig {
            num_players: 2,
            ..GameConfig::default()
        });
        state.start().unwrap();
        let board = state.board();
        state.ownership.acquire(board, 39, 1).unwrap();
        state
            .step(GameAction::propose_trade(
                0,
                1,
                TradeTerms::cash(cash),
                TradeTerms::new([39], 0),
            ))
            .unwrap();
        let offer = state.trades.offers()[0].clone();
        (state, offer)
    }

    #[test]
    fn responds_by_favorability() {
        let player = AutomatedPlayer::default();

        let (state, generous) = offer_for_boardwalk(500);
        assert_eq!(player.respond_to(&state, &generous), TradeResponse::Accept);

        let (state, insulting) = offer_for_boardwalk(100);
        assert_eq!(player.respond_to(&state, &insulting), TradeResponse::Decline);

        let (state, close) = offer_for_boardwalk(350);
        match player.respond_to(&state, &close) {
            TradeResponse::Counter { offered, requested } => {
                assert_eq!(offered.properties.as_slice(), &[39]);
                assert_eq!(requested.cash, 480);
            }
            other => panic!("expected a counter, got {other:?}"),
        }

        let mut counter = close;
        counter.parent = Some(uuid::Uuid::new_v4());
        assert_eq!(player.respond_to(&state, &counter), TradeResponse::Decline);
    }

    #[test]
    fn suggests_set_completing_trade() {
        let mut state = GameState::new(GameConfig {
            num_players: 2,
            ..GameConfig::default()
        });
        let board = state.board();
        state.ownership.acquire(board, 37, 0).unwrap();
        state.ownership.acquire(board, 39, 1).unwrap();
        let action = AutomatedPlayer::default().suggest_trade(&state, 0).unwrap();
        assert_eq!(action.action_type, ActionType::ProposeTrade);
        match action.payload {
            ActionPayload::Trade {
                counterparty,
                offered,
                requested,
            } => {
                assert_eq!(counterparty, 1);
                assert_eq!(offered.cash, 600);
                assert_eq!(requested.properties.as_slice(), &[39]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
