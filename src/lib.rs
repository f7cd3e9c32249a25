#![warn(clippy::all)]
#![deny(rust_2018_idioms)]

pub mod board;
pub mod cli;
pub mod game;
pub mod players;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

pub use board::{BoardCatalog, BoardError, Property, Square, SquareId, SquareKind};
pub use game::{Game, GameConfig, GameError, GameState};
pub use session::SessionHandle;
pub use store::{GameStore, MemoryStore, SessionSnapshot, StoreError};
pub use types::{ActionType, SessionStatus, Token, TurnPhase};
