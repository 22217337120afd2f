//! Depth-limited expectimax over the afterstate/spawn game tree.
//!
//! Max nodes take the best move value; chance nodes average over every
//! possible spawn (each empty cell, tile 2 at 0.9 and tile 4 at 0.1).
//! Branches whose reach probability falls below a cutoff return the static
//! evaluation instead of descending, as does everything once the per-move
//! deadline passes.

use std::time::{Duration, Instant};

use crate::board::{MoveResult, State};
use crate::eval::{CompositeEvaluator, EvalParams};
use crate::game::{FOUR_SPAWN_PROB, TWO_SPAWN_PROB};
use crate::logger::{Group, Logger};

use super::Player;

/// Branches reached with lower probability are evaluated, not searched.
const PROB_CUTOFF: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct ExpectimaxConfig {
    /// Base search depth; the effective depth may be adapted per position.
    pub depth: i32,
    /// Carried through configuration for compatibility; the chance stage
    /// always enumerates every empty cell with both spawn values.
    pub chance_covering: u32,
    /// Wall-clock budget for a single `choose_action` call, in seconds.
    pub time_limit: f64,
    pub adaptive_depth: bool,
}

impl Default for ExpectimaxConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            chance_covering: 1,
            time_limit: 1.0,
            adaptive_depth: false,
        }
    }
}

pub struct ExpectimaxPlayer {
    config: ExpectimaxConfig,
    evaluator: CompositeEvaluator,
    logger: Logger,
    deadline: Instant,
}

impl ExpectimaxPlayer {
    pub fn new(config: ExpectimaxConfig, params: &EvalParams, logger: Logger) -> Self {
        Self {
            config,
            evaluator: CompositeEvaluator::new(params),
            logger,
            deadline: Instant::now(),
        }
    }

    fn timed_out(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Search depth for this position: deeper for high tiles and crowded
    /// boards, shallower while the board is still mostly empty.
    fn adaptive_depth(&self, state: State) -> i32 {
        let base = self.config.depth;
        let grid = state.unpack();
        let max_tile = crate::eval::max_tile(&grid);
        let empty = grid.iter().flatten().filter(|&&c| c == 0).count();
        let high_value = grid.iter().flatten().filter(|&&c| c >= 11).count();

        if max_tile >= 14 {
            return base + 4;
        } else if max_tile >= 13 {
            return base + 3;
        } else if max_tile >= 12 {
            return base + 2;
        }

        if empty <= 2 {
            return base + 3;
        } else if empty <= 4 {
            return base + 2;
        } else if empty <= 6 {
            return base + 1;
        } else if empty >= 14 {
            return (base - 1).max(2);
        }

        if high_value >= 2 {
            base + 1
        } else {
            base
        }
    }

    fn max_node(&self, state: State, depth: i32, prob: f64) -> f64 {
        if depth <= 0 || self.timed_out() {
            return self.evaluator.evaluate(state);
        }
        let moves = state.valid_moves();
        if moves.is_empty() {
            return self.evaluator.evaluate(state);
        }
        moves
            .iter()
            .map(|m| self.chance_node(m.state, depth - 1, prob))
            .fold(f64::MIN, f64::max)
    }

    fn chance_node(&self, state: State, depth: i32, prob: f64) -> f64 {
        if depth <= 0 || self.timed_out() || prob < PROB_CUTOFF {
            return self.evaluator.evaluate(state);
        }
        let empty = state.empty_tiles();
        if empty.is_empty() {
            return self.evaluator.evaluate(state);
        }

        let share = prob / empty.len() as f64;
        let mut total = 0.0;
        for &(row, col) in &empty {
            let with_two = state.set_tile(row as usize, col as usize, 1);
            let with_four = state.set_tile(row as usize, col as usize, 2);
            total +=
                TWO_SPAWN_PROB * self.max_node(with_two, depth - 1, share * TWO_SPAWN_PROB);
            total +=
                FOUR_SPAWN_PROB * self.max_node(with_four, depth - 1, share * FOUR_SPAWN_PROB);
        }
        total / empty.len() as f64
    }
}

impl Player for ExpectimaxPlayer {
    fn choose_action(&mut self, state: State) -> Option<MoveResult> {
        self.deadline = Instant::now() + Duration::from_secs_f64(self.config.time_limit);
        let depth = if self.config.adaptive_depth {
            self.adaptive_depth(state)
        } else {
            self.config.depth
        };

        let moves = state.valid_moves();
        // start from the first valid move so an answer always exists
        let mut best = *moves.first()?;
        let mut best_value = 0.0;
        for &m in &moves {
            let value = self.chance_node(m.state, depth, 1.0);
            if value > best_value {
                best_value = value;
                best = m;
            }
            if self.timed_out() {
                self.logger
                    .debug(Group::Ai, "expectimax hit its deadline, keeping best so far");
                break;
            }
        }
        Some(best)
    }

    fn name(&self) -> &'static str {
        "Expectimax"
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::super::{HeuristicPlayer, Player};
    use super::{ExpectimaxConfig, ExpectimaxPlayer};
    use crate::board::test_support::{arb_state, state_from_grid};
    use crate::eval::{preset_params, EvalParams};
    use crate::logger::Logger;

    fn depth_zero_player(params: &EvalParams) -> ExpectimaxPlayer {
        let config = ExpectimaxConfig {
            depth: 0,
            adaptive_depth: false,
            time_limit: 10.0,
            ..ExpectimaxConfig::default()
        };
        ExpectimaxPlayer::new(config, params, Logger::quiet())
    }

    proptest! {
        // at depth zero the search collapses to the one-ply heuristic:
        // identical action, afterstate, and merge score on every input
        #[test]
        fn prop_depth_zero_matches_heuristic(s in arb_state()) {
            let params = preset_params("standard");
            let mut heuristic = HeuristicPlayer::new(&params);
            let mut expectimax = depth_zero_player(&params);
            prop_assert_eq!(heuristic.choose_action(s), expectimax.choose_action(s));
        }
    }

    #[test]
    fn returns_none_when_stuck() {
        let locked = state_from_grid([
            [1, 2, 3, 4],
            [5, 6, 7, 8],
            [9, 10, 11, 12],
            [13, 14, 15, 1],
        ]);
        let mut player = depth_zero_player(&preset_params("standard"));
        assert!(player.choose_action(locked).is_none());
    }

    #[test]
    fn searches_beyond_the_immediate_move() {
        // a depth-2 search still returns one of the valid moves
        let s = state_from_grid([[1, 1, 2, 0], [0, 2, 0, 0], [0, 0, 3, 0], [0, 0, 0, 0]]);
        let config = ExpectimaxConfig {
            depth: 2,
            adaptive_depth: false,
            time_limit: 10.0,
            ..ExpectimaxConfig::default()
        };
        let mut player = ExpectimaxPlayer::new(config, &preset_params("standard"), Logger::quiet());
        let chosen = player.choose_action(s).unwrap();
        assert!(s.valid_moves().contains(&chosen));
    }

    #[test]
    fn expired_deadline_still_answers() {
        let s = state_from_grid([[1, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        let config = ExpectimaxConfig {
            depth: 8,
            adaptive_depth: false,
            time_limit: 0.0,
            ..ExpectimaxConfig::default()
        };
        let mut player = ExpectimaxPlayer::new(config, &preset_params("standard"), Logger::quiet());
        // with no time at all, the first valid move comes back
        let chosen = player.choose_action(s).unwrap();
        assert!(s.valid_moves().contains(&chosen));
    }

    #[test]
    fn adaptive_depth_table() {
        let player = {
            let config = ExpectimaxConfig {
                depth: 3,
                adaptive_depth: true,
                ..ExpectimaxConfig::default()
            };
            ExpectimaxPlayer::new(config, &preset_params("standard"), Logger::quiet())
        };

        // a 16384 tile maximizes the boost
        let s = state_from_grid([[14, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        assert_eq!(7, player.adaptive_depth(s));
        let s = state_from_grid([[13, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        assert_eq!(6, player.adaptive_depth(s));
        let s = state_from_grid([[12, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        assert_eq!(5, player.adaptive_depth(s));

        // nearly full boards search deeper
        let s = state_from_grid([
            [1, 2, 3, 4],
            [5, 6, 7, 8],
            [9, 10, 11, 1],
            [2, 3, 0, 0],
        ]);
        assert_eq!(6, player.adaptive_depth(s));

        // nearly empty boards back off, but never below 2
        let s = state_from_grid([[1, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 1]]);
        assert_eq!(2, player.adaptive_depth(s));

        // mid-game with no special structure keeps the base depth
        let s = state_from_grid([[1, 2, 3, 4], [5, 6, 7, 8], [0, 0, 0, 0], [0, 0, 0, 0]]);
        assert_eq!(3, player.adaptive_depth(s));
    }
}
