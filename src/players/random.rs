use crate::game::action::GameAction;
use crate::game::game::Game;
use crate::game::trade::{TradeOffer, TradeResponse};
use crate::players::BasePlayer;
use rand::{Rng, seq::SliceRandom};

/// Picks uniformly among the legal actions and flips a coin on offers.
#[derive(Clone)]
pub struct RandomPlayer;

impl BasePlayer for RandomPlayer {
    fn decide(&self, _game: &Game, actions: &[GameAction]) -> Option<GameAction> {
        let mut rng = rand::thread_rng();
        actions.choose(&mut rng).cloned()
    }

    fn respond(&self, _game: &Game, _offer: &TradeOffer) -> TradeResponse {
        if rand::thread_rng().gen_bool(0.5) {
            TradeResponse::Accept
        } else {
            TradeResponse::Decline
        }
    }
}
