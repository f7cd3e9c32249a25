use crate::game::trade::{TradeOffer, TradeResponse};
use crate::game::{action::GameAction, game::Game};

pub trait BasePlayer {
    fn decide(&self, game: &Game, actions: &[GameAction]) -> Option<GameAction>;

    /// Answer an open offer addressed to this player. Declines unless overridden.
    fn respond(&self, _game: &Game, _offer: &TradeOffer) -> TradeResponse {
        TradeResponse::Decline
    }

    /// Optionally open a trade at the start of the player's turn.
    fn propose(&self, _game: &Game, _player: usize) -> Option<GameAction> {
        None
    }
}
