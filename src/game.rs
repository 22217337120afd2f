//! Game driver: owns the current state, the merge-score accumulator, and the
//! random tile stream, and runs whole episodes for a decision policy.

use rand::prelude::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::board::{Action, MoveResult, State};

pub const FOUR_SPAWN_PROB: f64 = 0.1;
pub const TWO_SPAWN_PROB: f64 = 1.0 - FOUR_SPAWN_PROB;

/// A single game of 2048. Each instance owns its own PRNG stream, seeded
/// from system entropy by default; tests pass an explicit rng.
pub struct Game<Rn: Rng = StdRng> {
    rng: Rn,
    state: State,
    score: u64,
    moves: u32,
}

impl Game<StdRng> {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }
}

impl Default for Game<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Rn: Rng> Game<Rn> {
    pub fn from_rng(rng: Rn) -> Self {
        let mut game = Self {
            rng,
            state: State::default(),
            score: 0,
            moves: 0,
        };
        game.reset();
        game
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn moves(&self) -> u32 {
        self.moves
    }

    /// Clear the board and spawn the two starting tiles.
    pub fn reset(&mut self) {
        self.state = State::default();
        self.score = 0;
        self.moves = 0;
        self.spawn_random_tile();
        self.spawn_random_tile();
    }

    /// Place a 2 (probability 0.9) or a 4 on a uniformly chosen empty cell.
    /// Does nothing on a full board.
    pub fn spawn_random_tile(&mut self) {
        if let Some(&(row, col)) = self.state.empty_tiles().choose(&mut self.rng) {
            let value = if self.rng.gen_bool(TWO_SPAWN_PROB) {
                1 // cells hold the power of two
            } else {
                2
            };
            self.state = self.state.set_tile(row as usize, col as usize, value);
        }
    }

    /// Apply a move the policy chose. The `(action, next_state)` pair must
    /// appear in the current valid-move set; anything else returns false and
    /// leaves the game untouched.
    pub fn play_move(&mut self, action: Action, next_state: State) -> bool {
        for m in self.state.valid_moves() {
            if m.action == action && m.state == next_state {
                self.state = next_state;
                self.score += m.score as u64;
                self.moves += 1;
                self.spawn_random_tile();
                return true;
            }
        }
        false
    }

    /// Run an episode to quiescence, asking `choose` for each move. A
    /// non-empty `initial_state` is installed instead of the two-tile reset.
    /// Returns the final score, state, and move count.
    pub fn play_game(
        &mut self,
        mut choose: impl FnMut(State) -> Option<MoveResult>,
        initial_state: State,
    ) -> (u64, State, u32) {
        if initial_state.is_empty() {
            self.reset();
        } else {
            self.state = initial_state;
            self.score = 0;
            self.moves = 0;
        }

        loop {
            let chosen = match choose(self.state) {
                Some(m) => m,
                None => break,
            };
            if !self.play_move(chosen.action, chosen.state) {
                break;
            }
        }
        (self.score, self.state, self.moves)
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::StdRng;
    use rand::SeedableRng;

    use super::Game;
    use crate::board::{Action, State};

    fn seeded(seed: u64) -> Game<StdRng> {
        Game::from_rng(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn reset_spawns_two_tiles() {
        for seed in 0..20 {
            let game = seeded(seed);
            assert_eq!(14, game.state().count_empty());
            let valid = game.state().valid_moves().len();
            assert!(
                (2..=4).contains(&valid),
                "two starting tiles allow 2..4 moves, got {valid}"
            );
        }
    }

    #[test]
    fn play_move_rejects_mismatched_pairs() {
        let mut game = seeded(7);
        let before = game.state();
        // the pair must match exactly; the current state itself never does
        assert!(!game.play_move(Action::Left, before));
        assert_eq!(before, game.state());
        assert_eq!(0, game.moves());
    }

    #[test]
    fn play_move_applies_and_spawns() {
        let mut game = seeded(3);
        let m = game.state().valid_moves()[0];
        assert!(game.play_move(m.action, m.state));
        assert_eq!(1, game.moves());
        assert_eq!(m.score as u64, game.score());
        // the spawn fills one cell of the afterstate
        assert_eq!(m.state.count_empty() - 1, game.state().count_empty());
    }

    #[test]
    fn play_game_runs_to_quiescence() {
        let mut game = seeded(11);
        let (score, state, moves) =
            game.play_game(|s| s.valid_moves().into_iter().next(), State::default());
        assert!(moves > 0);
        assert!(score > 0);
        assert!(state.valid_moves().is_empty());
    }

    #[test]
    fn play_game_installs_initial_state() {
        let mut game = seeded(5);
        let initial = State::new(0x1234_5678_9ABC_DEF0);
        let (score, state, moves) = game.play_game(|_| None, initial);
        // the initial state replaces the two-tile reset
        assert_eq!(initial, state);
        assert_eq!(0, score);
        assert_eq!(0, moves);
    }
}
