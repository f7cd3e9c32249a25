pub mod automated;
pub mod base;
pub mod random;
pub mod scoring;

pub use automated::{AutomatedParams, AutomatedPlayer};
pub use base::BasePlayer;
pub use random::RandomPlayer;
pub use scoring::{MAX_PURCHASE_SCORE, cash_shortfall, fair_value, purchase_score, trade_favorability};
