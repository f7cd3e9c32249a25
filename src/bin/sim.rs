use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;
use monopolist_rs::cli::{PlayerInstance, StatisticsAccumulator, create_player, print_player_help};
use monopolist_rs::game::{Game, GameConfig};
use monopolist_rs::players::AutomatedParams;
use serde::Deserialize;
use tracing::{Level, info};

#[derive(Debug, Parser, Clone)]
#[command(name = "monopolist-sim")]
#[command(about = "Property-trading simulator - play automated sessions between player strategies")]
struct Args {
    /// Number of games to play
    #[arg(short = 'n', long, default_value_t = 5)]
    num: u32,

    /// Comma-separated player codes (e.g., A,A,R,R)
    /// Use ':' to set player-specific params (e.g., A:70 for buy threshold)
    /// Codes: R=Random, A=Automated
    #[arg(long, default_value = "A,A,A,A")]
    players: String,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Starting cash per player
    #[arg(long)]
    starting_cash: Option<i64>,

    /// Collect taxes and fines on Free Parking
    #[arg(long)]
    free_parking_pot: bool,

    /// JSON file with `game` and `automated` sections; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show player codes and exit
    #[arg(long)]
    help_players: bool,

    /// Silence console output
    #[arg(long)]
    quiet: bool,

    /// Log level for engine tracing (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: Level,

    /// Number of worker threads for parallel execution
    #[arg(long, default_value_t = 1)]
    workers: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    game: GameConfig,
    automated: AutomatedParams,
}

fn load_config(args: &Args) -> FileConfig {
    let Some(path) = &args.config else {
        return FileConfig::default();
    };
    let parsed = std::fs::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|err| err.to_string()));
    match parsed {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: could not load config {}: {}", path.display(), err);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    if args.help_players {
        print_player_help();
        return;
    }

    let file_config = load_config(&args);
    let player_keys: Vec<&str> = args.players.split(',').collect();
    if player_keys.len() < 2 || player_keys.len() > 8 {
        eprintln!("Error: Must specify 2-8 players");
        std::process::exit(1);
    }

    let mut players: Vec<PlayerInstance> = Vec::new();
    for key in &player_keys {
        let parts: Vec<&str> = key.split(':').collect();
        let code = parts[0];
        let params = parts[1..].to_vec();
        match create_player(code, params, &file_config.automated) {
            Some(player) => players.push(player),
            None => {
                eprintln!("Error: Unknown player code '{}'", code);
                eprintln!("Use --help-players to see available codes");
                std::process::exit(1);
            }
        }
    }

    let mut base = GameConfig {
        num_players: players.len(),
        ..file_config.game
    };
    if let Some(cash) = args.starting_cash {
        base.starting_cash = cash;
    }
    base.free_parking_pot |= args.free_parking_pot;

    let mut stats = StatisticsAccumulator::new(players.len());
    if args.workers > 1 {
        run_parallel_simulations(&args, &base, &players, &mut stats);
    } else {
        run_sequential_simulations(&args, &base, &players, &mut stats);
    }

    if !args.quiet {
        print_summary(&stats, &players);
    }
}

fn run_sequential_simulations(
    args: &Args,
    base: &GameConfig,
    players: &[PlayerInstance],
    stats: &mut StatisticsAccumulator,
) {
    for game_idx in 0..args.num {
        let config = GameConfig {
            seed: args.seed + game_idx as u64,
            ..base.clone()
        };

        let start = Instant::now();
        let mut game = Game::new(config);
        let winner = game.play(players);
        let duration = start.elapsed();
        stats.after(&game, duration);
        info!(game = game_idx + 1, ?winner, turns = game.state.turn, "game finished");

        if !args.quiet {
            let last_n = 10;
            if game_idx < last_n || game_idx >= args.num.saturating_sub(last_n) {
                let winner_str = winner
                    .map(|seat| format!("{}", game.state.players[seat].symbol))
                    .unwrap_or_else(|| "None".to_string());
                let seating: String = game
                    .state
                    .players
                    .iter()
                    .map(|p| p.symbol.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                println!(
                    "Game {:>4}: Seating=[{}], Winner={:>10}, Turns={:>4}, Duration={:?}",
                    game_idx + 1,
                    seating,
                    winner_str,
                    game.state.turn,
                    duration
                );
            } else if (game_idx + 1) % 100 == 0 {
                print!(".");
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
        }
    }
}

fn run_parallel_simulations(
    args: &Args,
    base: &GameConfig,
    players: &[PlayerInstance],
    stats: &mut StatisticsAccumulator,
) {
    let players = Arc::new(players.to_vec());
    let base = Arc::new(base.clone());
    let games_per_worker = args.num as usize / args.workers;
    let remainder = args.num as usize % args.workers;

    let mut handles = Vec::new();
    for worker_id in 0..args.workers {
        let players = Arc::clone(&players);
        let base = Arc::clone(&base);
        let seed = args.seed;
        let num_games = if worker_id < remainder {
            games_per_worker + 1
        } else {
            games_per_worker
        };

        handles.push(thread::spawn(move || {
            let mut local_stats = StatisticsAccumulator::new(players.len());
            let start_idx = worker_id * games_per_worker + worker_id.min(remainder);
            for local_idx in 0..num_games {
                let config = GameConfig {
                    seed: seed + (start_idx + local_idx) as u64,
                    ..(*base).clone()
                };
                let start = Instant::now();
                let mut game = Game::new(config);
                game.play(players.as_slice());
                local_stats.after(&game, start.elapsed());
            }
            local_stats
        }));
    }

    for handle in handles {
        match handle.join() {
            Ok(worker) => stats.stats.merge(worker.stats),
            Err(_) => eprintln!("Error: a simulation worker panicked"),
        }
    }
}

fn print_summary(stats: &StatisticsAccumulator, players: &[PlayerInstance]) {
    println!("\n{}", "=".repeat(80));
    println!("SIMULATION SUMMARY");
    println!("{}", "=".repeat(80));

    println!("\nPlayer Summary:");
    println!(
        "{:<20} {:<10} {:<12} {:<14} {:<12}",
        "Player", "Wins", "Win Rate", "Bankruptcies", "Avg Worth"
    );
    println!("{}", "-".repeat(70));

    for (seat, player) in players.iter().enumerate() {
        let wins = stats.stats.wins.get(seat).copied().unwrap_or(0);
        let win_rate = if stats.stats.games > 0 {
            (wins as f64 / stats.stats.games as f64) * 100.0
        } else {
            0.0
        };
        let bankruptcies = stats.stats.bankruptcies.get(seat).copied().unwrap_or(0);
        println!(
            "{:<20} {:<10} {:<11.1}% {:<14} {:<12.2}",
            format!("{} (seat {})", player.name(), seat + 1),
            wins,
            win_rate,
            bankruptcies,
            stats.stats.avg_net_worth(seat)
        );
    }

    println!("\nGame Summary:");
    println!("  Total Games: {}", stats.stats.games);
    println!("  Unfinished (turn limit): {}", stats.stats.unfinished);
    println!("  Avg Turns: {:.2}", stats.stats.get_avg_turns());
    println!("  Avg Ticks: {:.2}", stats.stats.get_avg_ticks());
    println!("  Avg Duration: {:.2?}", stats.stats.get_avg_duration());
}
