//! TDL player and the TD(0) self-play trainer.
//!
//! The player picks the move maximizing `reward + V(afterstate)` where V is
//! the n-tuple network. The trainer plays whole episodes greedily, records
//! the (afterstate, reward) path, and runs a backward TD(0) pass after each
//! episode. With more than one thread the weight tables are shared and
//! updated without locks (Hogwild).

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::prelude::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::board::{MoveResult, State};
use crate::game::TWO_SPAWN_PROB;
use crate::logger::{Group, Logger};
use crate::ntuple::Network;

use super::Player;

/// Plays greedily against a (possibly still training) n-tuple network.
pub struct TdlPlayer {
    network: Arc<Network>,
}

impl TdlPlayer {
    pub fn new(network: Arc<Network>) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}

/// Argmax of `reward + V(afterstate)`; first of equals wins.
fn greedy_move(network: &Network, state: State) -> Option<MoveResult> {
    let mut best: Option<(MoveResult, f32)> = None;
    for m in state.valid_moves() {
        let value = m.score as f32 + network.estimate(m.state);
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((m, value)),
        }
    }
    best.map(|(m, _)| m)
}

impl Player for TdlPlayer {
    fn choose_action(&mut self, state: State) -> Option<MoveResult> {
        greedy_move(&self.network, state)
    }

    fn name(&self) -> &'static str {
        "TDL"
    }
}

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub episodes: usize,
    pub alpha: f32,
    pub save_path: Option<PathBuf>,
    /// Report every this many episodes; 0 reports only at the end.
    pub stats_interval: usize,
    pub threads: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            episodes: 10_000,
            alpha: 0.1,
            save_path: None,
            stats_interval: 1_000,
            threads: 1,
        }
    }
}

/// One decision in an episode: the afterstate installed and the merge score
/// it earned.
struct Step {
    afterstate: State,
    reward: u32,
}

fn spawn_tile(state: State, rng: &mut impl Rng) -> State {
    match state.empty_tiles().choose(rng) {
        Some(&(row, col)) => {
            let value = if rng.gen_bool(TWO_SPAWN_PROB) { 1 } else { 2 };
            state.set_tile(row as usize, col as usize, value)
        }
        None => state,
    }
}

/// Play one greedy episode from the empty board, filling `path` with the
/// afterstates and rewards. Returns the total score and the final state.
fn run_episode(network: &Network, rng: &mut impl Rng, path: &mut Vec<Step>) -> (u64, State) {
    let mut state = spawn_tile(spawn_tile(State::default(), rng), rng);
    let mut total = 0u64;
    while let Some(m) = greedy_move(network, state) {
        total += m.score as u64;
        path.push(Step {
            afterstate: m.state,
            reward: m.score,
        });
        state = spawn_tile(m.state, rng);
    }
    (total, state)
}

/// TD(0) backward pass: walk the episode from its end, moving each
/// afterstate's value toward the reward-plus-value of its successor.
/// Returns the final target, which equals `reward_0 + V(afterstate_0)`
/// after the updates.
fn td_backward(network: &Network, path: &[Step], alpha: f32) -> f32 {
    let mut target = 0.0f32;
    for step in path.iter().rev() {
        let err = target - network.estimate(step.afterstate);
        let new_value = network.update(step.afterstate, alpha * err);
        target = step.reward as f32 + new_value;
    }
    target
}

#[derive(Default)]
struct StatsWindow {
    games: usize,
    score_sum: u64,
    peak_score: u64,
    /// Games since the last report whose final board topped out at each
    /// cell value.
    max_tile_counts: [usize; 16],
}

impl StatsWindow {
    fn record(&mut self, score: u64, final_state: State) {
        self.games += 1;
        self.score_sum += score;
        self.peak_score = self.peak_score.max(score);
        self.max_tile_counts[final_state.max_value() as usize] += 1;
    }

    fn report(&mut self, episode: usize, logger: &Logger) {
        if self.games == 0 {
            return;
        }
        let avg = self.score_sum as f64 / self.games as f64;
        logger.info(
            Group::Ai,
            format_args!("episode {episode}: avg = {avg:.1}, peak = {}", self.peak_score),
        );
        for tile in 1..16usize {
            let reached: usize = self.max_tile_counts[tile..].iter().sum();
            if reached == 0 {
                continue;
            }
            let reach_pct = 100.0 * reached as f64 / self.games as f64;
            let term_pct = 100.0 * self.max_tile_counts[tile] as f64 / self.games as f64;
            logger.info(
                Group::Ai,
                format_args!("  {:>6}: {reach_pct:.1}% ({term_pct:.1}%)", 1u32 << tile),
            );
        }
        // the peak survives across windows; everything else resets
        self.games = 0;
        self.score_sum = 0;
        self.max_tile_counts = [0; 16];
    }
}

/// Train the shared network by self-play. Worker threads claim episodes
/// from a common counter and update the same weight tables concurrently;
/// the races on individual cells are tolerated because each adjustment is
/// `alpha * err / 32`. The saved weights use the same format for any
/// thread count.
pub fn train(network: &Arc<Network>, config: &TrainConfig, logger: &Logger) {
    let claimed = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let stats = Mutex::new(StatsWindow::default());
    let threads = config.threads.max(1);

    std::thread::scope(|scope| {
        for _ in 0..threads {
            let claimed = &claimed;
            let completed = &completed;
            let stats = &stats;
            scope.spawn(move || {
                let mut rng = StdRng::from_entropy();
                let mut path: Vec<Step> = Vec::with_capacity(2_000);
                loop {
                    if claimed.fetch_add(1, Ordering::Relaxed) >= config.episodes {
                        break;
                    }
                    path.clear();
                    let (score, final_state) = run_episode(network, &mut rng, &mut path);
                    if path.is_empty() {
                        continue;
                    }
                    td_backward(network, &path, config.alpha);

                    let episode = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Ok(mut stats) = stats.lock() {
                        stats.record(score, final_state);
                        let at_interval =
                            config.stats_interval > 0 && episode % config.stats_interval == 0;
                        if at_interval || episode == config.episodes {
                            stats.report(episode, logger);
                        }
                    }
                }
            });
        }
    });

    if let Some(path) = &config.save_path {
        match network.save(path) {
            Ok(()) => logger.info(
                Group::Ai,
                format_args!("saved network weights to {}", path.display()),
            ),
            Err(e) => logger.error(
                Group::Ai,
                format_args!("failed to save network weights: {e}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::prelude::StdRng;
    use rand::SeedableRng;

    use super::super::Player;
    use super::{run_episode, td_backward, train, Step, TdlPlayer, TrainConfig};
    use crate::board::test_support::state_from_grid;
    use crate::board::Action;
    use crate::logger::Logger;
    use crate::ntuple::{Network, Pattern};

    fn small_network() -> Network {
        Network::new(vec![Pattern::new(vec![0, 1]), Pattern::new(vec![4, 5])])
    }

    #[test]
    fn zero_network_picks_by_reward() {
        // LEFT merges both pairs for 4 + 8 points; vertical moves score 0
        let s = state_from_grid([[1, 1, 2, 2], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        let mut player = TdlPlayer::new(Arc::new(small_network()));
        let chosen = player.choose_action(s).unwrap();
        assert_eq!(Action::Left, chosen.action);
        assert_eq!(12, chosen.score);
    }

    #[test]
    fn backward_pass_reaches_its_first_target() {
        let net = Network::new(vec![Pattern::new(vec![0, 1]), Pattern::new(vec![0, 4])]);
        // the first afterstate keeps all sampled cells distinct so its
        // update lands in 16 different table entries
        let path = vec![
            Step {
                afterstate: state_from_grid([
                    [1, 2, 3, 4],
                    [5, 0, 0, 6],
                    [7, 0, 0, 8],
                    [9, 10, 11, 12],
                ]),
                reward: 4,
            },
            Step {
                afterstate: state_from_grid([
                    [2, 1, 0, 0],
                    [0, 0, 0, 0],
                    [0, 0, 0, 0],
                    [0, 0, 0, 0],
                ]),
                reward: 0,
            },
            Step {
                afterstate: state_from_grid([
                    [3, 0, 0, 0],
                    [0, 0, 0, 0],
                    [0, 0, 0, 0],
                    [0, 0, 0, 0],
                ]),
                reward: 8,
            },
        ];

        let target = td_backward(&net, &path, 0.25);
        // by construction the final target is the first step's reward plus
        // its post-update value
        let expected = path[0].reward as f32 + net.estimate(path[0].afterstate);
        assert!(
            (target - expected).abs() < 1e-3,
            "target {target} vs expected {expected}"
        );
    }

    #[test]
    fn episodes_terminate_and_record_steps() {
        let net = small_network();
        let mut rng = StdRng::seed_from_u64(9);
        let mut path = Vec::new();
        let (score, final_state) = run_episode(&net, &mut rng, &mut path);
        assert!(!path.is_empty());
        assert!(score > 0);
        assert!(final_state.valid_moves().is_empty());
    }

    #[test]
    fn training_runs_across_threads() {
        let net = Arc::new(small_network());
        let config = TrainConfig {
            episodes: 6,
            alpha: 0.05,
            save_path: None,
            stats_interval: 0,
            threads: 2,
        };
        train(&net, &config, &Logger::quiet());
        // six greedy games leave some value behind
        let probe = state_from_grid([[1, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        let _ = net.estimate(probe);
    }
}
