use crate::game::action::GameAction;
use crate::game::game::Game;
use crate::game::trade::{TradeOffer, TradeResponse};
use crate::players::{AutomatedParams, AutomatedPlayer, BasePlayer, RandomPlayer};

pub struct CliPlayer {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const CLI_PLAYERS: &[CliPlayer] = &[
    CliPlayer {
        code: "R",
        name: "RandomPlayer",
        description: "Chooses actions at random and flips a coin on offers.",
    },
    CliPlayer {
        code: "A",
        name: "AutomatedPlayer",
        description: "Buys by purchase score and answers offers by favorability. First param is BUY_THRESHOLD.",
    },
];

#[derive(Clone)]
pub enum PlayerInstance {
    Random(RandomPlayer),
    Automated(AutomatedPlayer),
}

impl PlayerInstance {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerInstance::Random(_) => "Random",
            PlayerInstance::Automated(_) => "Automated",
        }
    }
}

impl BasePlayer for PlayerInstance {
    fn decide(&self, game: &Game, actions: &[GameAction]) -> Option<GameAction> {
        match self {
            PlayerInstance::Random(p) => p.decide(game, actions),
            PlayerInstance::Automated(p) => p.decide(game, actions),
        }
    }

    fn respond(&self, game: &Game, offer: &TradeOffer) -> TradeResponse {
        match self {
            PlayerInstance::Random(p) => p.respond(game, offer),
            PlayerInstance::Automated(p) => p.respond(game, offer),
        }
    }

    fn propose(&self, game: &Game, player: usize) -> Option<GameAction> {
        match self {
            PlayerInstance::Random(p) => p.propose(game, player),
            PlayerInstance::Automated(p) => p.propose(game, player),
        }
    }
}

/// Builds a player from a code such as `R` or `A:65`.
pub fn create_player(code: &str, params: Vec<&str>, base: &AutomatedParams) -> Option<PlayerInstance> {
    match code {
        "R" => Some(PlayerInstance::Random(RandomPlayer)),
        "A" => {
            let mut params_for_seat = base.clone();
            if let Some(threshold) = params.first().and_then(|s| s.parse::<u8>().ok()) {
                params_for_seat.buy_threshold = threshold;
            }
            Some(PlayerInstance::Automated(AutomatedPlayer::new(params_for_seat)))
        }
        _ => None,
    }
}

pub fn print_player_help() {
    println!("Player Legend:");
    println!("{:<5} {:<25} {}", "CODE", "PLAYER", "DESCRIPTION");
    println!("{}", "-".repeat(80));
    for player in CLI_PLAYERS {
        println!("{:<5} {:<25} {}", player.code, player.name, player.description);
    }
}
