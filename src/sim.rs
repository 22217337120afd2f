//! Bulk self-play: a fixed pool of workers partitions a batch of games and
//! tracks the best result without blocking each other.
//!
//! The best score lives in an atomic updated by compare-and-swap; the
//! winning thread then stores the matching state and move count. The only
//! locks are the progress printer's and the thread joins at the end.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::board::State;
use crate::config::{PlayerConfig, SimConfig};
use crate::game::Game;
use crate::logger::{Group, Logger};

#[derive(Debug, Clone, Copy)]
pub struct SimOutcome {
    pub games: usize,
    pub best_score: u64,
    pub best_state: State,
    pub best_moves: u32,
}

/// Play `sim.num_games` games across `sim.num_threads` workers. Each worker
/// owns its game instance and builds its own policy from the shared player
/// config.
pub fn run_games(sim: &SimConfig, player: &PlayerConfig, logger: &Logger) -> SimOutcome {
    let num_games = sim.num_games;
    let threads = sim.num_threads.max(1).min(num_games.max(1));
    let initial = State::new(sim.initial_state);

    let best_score = AtomicU64::new(0);
    let best_state = AtomicU64::new(0);
    let best_moves = AtomicU32::new(0);
    let completed = AtomicUsize::new(0);
    let progress_lock = Mutex::new(());

    std::thread::scope(|scope| {
        let games_per_thread = num_games / threads;
        for t in 0..threads {
            let start = t * games_per_thread;
            let end = if t == threads - 1 {
                num_games
            } else {
                start + games_per_thread
            };
            let best_score = &best_score;
            let best_state = &best_state;
            let best_moves = &best_moves;
            let completed = &completed;
            let progress_lock = &progress_lock;
            scope.spawn(move || {
                let mut game = Game::new();
                let mut policy = player.build_player(logger);
                for _ in start..end {
                    let (score, state, moves) =
                        game.play_game(|s| policy.choose_action(s), initial);

                    // install a new best score by CAS; the companion cells
                    // follow only after winning the exchange
                    let mut current = best_score.load(Ordering::SeqCst);
                    while score > current {
                        match best_score.compare_exchange_weak(
                            current,
                            score,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        ) {
                            Ok(_) => {
                                best_state.store(state.raw(), Ordering::SeqCst);
                                best_moves.store(moves, Ordering::SeqCst);
                                break;
                            }
                            Err(observed) => current = observed,
                        }
                    }

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if sim.progress_interval > 0
                        && (done % sim.progress_interval == 0 || done == num_games)
                    {
                        let _guard = progress_lock.lock();
                        logger.info(
                            Group::Game,
                            format_args!(
                                "game {done}/{num_games} (best: {})",
                                best_score.load(Ordering::SeqCst)
                            ),
                        );
                        logger.wait();
                    }
                }
            });
        }
    });

    SimOutcome {
        games: num_games,
        best_score: best_score.load(Ordering::SeqCst),
        best_state: State::new(best_state.load(Ordering::SeqCst)),
        best_moves: best_moves.load(Ordering::SeqCst),
    }
}
