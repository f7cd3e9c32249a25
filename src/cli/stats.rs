use std::time::Duration;

use crate::game::game::Game;

#[derive(Debug, Default, Clone)]
pub struct GameStats {
    /// Wins per seat.
    pub wins: Vec<u32>,
    /// Final net worth (cash plus property list prices) per seat, per game.
    pub net_worth: Vec<Vec<i64>>,
    pub bankruptcies: Vec<u32>,
    pub games: u32,
    pub unfinished: u32,
    pub total_ticks: u64,
    pub total_turns: u64,
    pub total_duration: Duration,
}

impl GameStats {
    pub fn new(seats: usize) -> Self {
        Self {
            wins: vec![0; seats],
            net_worth: vec![Vec::new(); seats],
            bankruptcies: vec![0; seats],
            ..Self::default()
        }
    }

    pub fn record_game(&mut self, game: &Game, duration: Duration) {
        self.games += 1;
        self.total_duration += duration;
        self.total_turns += game.state.turn as u64;
        self.total_ticks += game.state.action_log().len() as u64;

        match game.winner() {
            Some(winner) if winner < self.wins.len() => self.wins[winner] += 1,
            _ => self.unfinished += 1,
        }

        let board = game.state.board();
        for (seat, player) in game.state.players.iter().enumerate().take(self.net_worth.len()) {
            let holdings: i64 = game
                .state
                .ownership
                .properties_of(seat)
                .into_iter()
                .filter_map(|square| board.property(square).map(|p| p.price))
                .sum();
            self.net_worth[seat].push(player.balance + holdings);
            if player.bankrupt {
                self.bankruptcies[seat] += 1;
            }
        }
    }

    pub fn merge(&mut self, other: GameStats) {
        for (seat, wins) in other.wins.into_iter().enumerate() {
            if let Some(total) = self.wins.get_mut(seat) {
                *total += wins;
            }
        }
        for (seat, worth) in other.net_worth.into_iter().enumerate() {
            if let Some(all) = self.net_worth.get_mut(seat) {
                all.extend(worth);
            }
        }
        for (seat, count) in other.bankruptcies.into_iter().enumerate() {
            if let Some(total) = self.bankruptcies.get_mut(seat) {
                *total += count;
            }
        }
        self.games += other.games;
        self.unfinished += other.unfinished;
        self.total_ticks += other.total_ticks;
        self.total_turns += other.total_turns;
        self.total_duration += other.total_duration;
    }

    pub fn avg_net_worth(&self, seat: usize) -> f64 {
        match self.net_worth.get(seat) {
            Some(values) if !values.is_empty() => {
                values.iter().sum::<i64>() as f64 / values.len() as f64
            }
            _ => 0.0,
        }
    }

    pub fn get_avg_ticks(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_ticks as f64 / self.games as f64
    }

    pub fn get_avg_turns(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_turns as f64 / self.games as f64
    }

    pub fn get_avg_duration(&self) -> Duration {
        if self.games == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.games
    }
}

pub struct StatisticsAccumulator {
    pub stats: GameStats,
}

impl StatisticsAccumulator {
    pub fn new(seats: usize) -> Self {
        Self {
            stats: GameStats::new(seats),
        }
    }

    pub fn after(&mut self, game: &Game, duration: Duration) {
        self.stats.record_game(game, duration);
    }
}
