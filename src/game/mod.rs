pub mod action;
pub mod cards;
pub mod dice;
pub mod game;
pub mod landing;
pub mod ownership;
pub mod players;
pub mod state;
pub mod trade;

pub use action::{ActionPayload, GameAction};
pub use cards::{Card, CardDecks};
pub use dice::{DiceRoll, MAX_DOUBLES, Movement, resolve_movement};
pub use game::Game;
pub use landing::{Landing, RentModifier, classify, classify_with, rent_due};
pub use ownership::{OwnershipError, OwnershipIndex, OwnershipRecord};
pub use players::{PlayerState, wrap_position};
pub use state::{
    ActionLock, BalanceReason, Creditor, GameConfig, GameError, GameEvent, GameState,
    HistoryEntry, StepOutcome, TurnState, TurnViolation,
};
pub use trade::{TradeBook, TradeId, TradeOffer, TradeResolution, TradeResponse, TradeStatus, TradeTerms};
