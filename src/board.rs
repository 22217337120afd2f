//! 2048 board states and move application.
//!
//! A [`State`] packs the 4x4 grid into a single u64: the cell at row `r`,
//! column `c` occupies the 4 bits starting at `(r*4 + c)*4`, storing the
//! log2 of the displayed tile (0 is empty). Moves are implemented with the
//! precomputed row tables in the (private) tables module; vertical moves go
//! through [`State::transpose`].

mod tables;

use std::fmt;

pub use tables::{reverse_row, slide_left, slide_right};

/// One of the four slide directions, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Left,
    Right,
    Up,
    Down,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Left, Action::Right, Action::Up, Action::Down];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
            Action::Up => "UP",
            Action::Down => "DOWN",
        };
        write!(f, "{name}")
    }
}

/// A chosen move: the action, the afterstate, and the merge score it earns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveResult {
    pub action: Action,
    pub state: State,
    pub score: u32,
}

/// A packed 4x4 board. States are pure values; all operations return new
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct State(u64);

assert_eq_size!(u64, State);

impl State {
    pub fn new(raw: u64) -> Self {
        State(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the cell value (log2 of the tile) at `row`, `col`.
    #[inline]
    pub fn get(self, row: usize, col: usize) -> u8 {
        debug_assert!(row < 4 && col < 4);
        ((self.0 >> ((row * 4 + col) * 4)) & 0xF) as u8
    }

    /// OR a value into an empty cell.
    ///
    /// Should only be used when the targeted cell is empty.
    #[inline]
    pub fn set_tile(self, row: usize, col: usize, value: u8) -> Self {
        debug_assert_eq!(0, self.get(row, col), "set_tile over a non-empty cell");
        debug_assert!(value < 16, "{value} will not fit in a cell");
        State(self.0 | ((value as u64) << ((row * 4 + col) * 4)))
    }

    /// Unpack into a grid of cell values, `grid[row][col]`.
    pub fn unpack(self) -> [[u8; 4]; 4] {
        let mut grid = [[0u8; 4]; 4];
        for (r, row) in grid.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = self.get(r, c);
            }
        }
        grid
    }

    /// Returns the coordinates of empty cells in row-major order.
    pub fn empty_tiles(self) -> Vec<(u8, u8)> {
        let mut empty = Vec::with_capacity(16);
        for row in 0..4 {
            let row_val = (self.0 >> (row * 16)) & 0xFFFF;
            for col in 0..4 {
                if (row_val >> (col * 4)) & 0xF == 0 {
                    empty.push((row as u8, col as u8));
                }
            }
        }
        empty
    }

    pub fn count_empty(self) -> u32 {
        let mut count = 0;
        let mut s = self.0;
        for _ in 0..16 {
            if s & 0xF == 0 {
                count += 1;
            }
            s >>= 4;
        }
        count
    }

    /// The largest cell value on the board.
    pub fn max_value(self) -> u8 {
        let mut max = 0;
        let mut s = self.0;
        for _ in 0..16 {
            max = max.max((s & 0xF) as u8);
            s >>= 4;
        }
        max
    }

    /// The largest tile as its displayed power of two.
    pub fn highest_tile(self) -> u32 {
        1 << self.max_value()
    }

    /// Board score: the sum of `2^v` over cells with `v >= 2`. Matches the
    /// cumulative merge score of a game played forward from the empty board.
    pub fn board_score(self) -> u64 {
        let mut score = 0u64;
        let mut s = self.0;
        for _ in 0..16 {
            let v = s & 0xF;
            if v > 1 {
                score += 1 << v;
            }
            s >>= 4;
        }
        score
    }

    /// Exchange rows and columns with a three-step mask and shift.
    pub fn transpose(self) -> Self {
        let s = self.0;
        let a = (s & 0xF0F0_0F0F_F0F0_0F0F)
            | ((s & 0x0000_F0F0_0000_F0F0) << 12)
            | ((s & 0x0F0F_0000_0F0F_0000) >> 12);
        State(
            (a & 0xFF00_FF00_00FF_00FF)
                | ((a & 0x00FF_00FF_0000_0000) >> 24)
                | ((a & 0x0000_0000_FF00_FF00) << 24),
        )
    }

    /// Exchange columns (horizontal mirror).
    pub fn mirror(self) -> Self {
        let mut out = 0u64;
        for row in 0..4 {
            let shift = row * 16;
            let row_val = ((self.0 >> shift) & 0xFFFF) as u16;
            out |= (tables::reverse_row(row_val) as u64) << shift;
        }
        State(out)
    }

    /// Rotate a quarter turn clockwise.
    pub fn rotate_clockwise(self) -> Self {
        self.transpose().mirror()
    }

    /// Simulate all four moves. Returns afterstates and merge scores indexed
    /// by [`Action::ALL`]; an invalid move leaves the state unchanged.
    pub fn simulate_moves(self) -> [(State, u32); 4] {
        let tables = &*tables::TABLES;
        let transposed = self.transpose().0;
        let mut states = [0u64; 4];
        let mut scores = [0u32; 4];
        for k in 0..4 {
            let shift = 16 * k;
            let row = ((self.0 >> shift) & 0xFFFF) as usize;
            let col = ((transposed >> shift) & 0xFFFF) as usize;
            states[0] |= (tables.left[row] as u64) << shift;
            scores[0] += tables.left_score[row];
            states[1] |= (tables.right[row] as u64) << shift;
            scores[1] += tables.right_score[row];
            states[2] |= (tables.left[col] as u64) << shift;
            scores[2] += tables.left_score[col];
            states[3] |= (tables.right[col] as u64) << shift;
            scores[3] += tables.right_score[col];
        }
        [
            (State(states[0]), scores[0]),
            (State(states[1]), scores[1]),
            (State(states[2]).transpose(), scores[2]),
            (State(states[3]).transpose(), scores[3]),
        ]
    }

    /// Generate legal moves with their afterstates and scores.
    ///
    /// Only moves that change the state are legal; order is
    /// LEFT, RIGHT, UP, DOWN.
    pub fn valid_moves(self) -> Vec<MoveResult> {
        Action::ALL
            .iter()
            .zip(self.simulate_moves())
            .filter_map(|(&action, (state, score))| {
                if state != self {
                    Some(MoveResult {
                        action,
                        state,
                        score,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in 0..4 {
            writeln!(
                f,
                "{:>2} {:>2} {:>2} {:>2}",
                self.get(row, 0),
                self.get(row, 1),
                self.get(row, 2),
                self.get(row, 3)
            )?;
        }
        Ok(())
    }
}

impl fmt::LowerHex for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use proptest::prelude::*;

    use super::State;

    prop_compose! {
        /// Arbitrary packed states over the full nibble range.
        pub fn arb_state()(raw in any::<u64>()) -> State {
            State::new(raw)
        }
    }

    /// Build a state from a grid of cell values, `grid[row][col]`.
    pub fn state_from_grid(grid: [[u8; 4]; 4]) -> State {
        let mut s = State::default();
        for (r, row) in grid.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                if v != 0 {
                    s = s.set_tile(r, c, v);
                }
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::test_support::{arb_state, state_from_grid};
    use super::{Action, State};

    #[test]
    fn get_and_set() {
        let s = State::default().set_tile(0, 0, 1).set_tile(1, 2, 2);
        assert_eq!(1, s.get(0, 0));
        assert_eq!(2, s.get(1, 2));
        assert_eq!(0, s.get(3, 3));
        assert_eq!(0x200_0001, s.raw());
    }

    #[test]
    fn empty_tiles_row_major() {
        let s = state_from_grid([[1, 0, 0, 2], [0, 2, 1, 3], [3, 4, 2, 5], [1, 2, 1, 0]]);
        assert_eq!(vec![(0, 1), (0, 2), (1, 0), (3, 3)], s.empty_tiles());
        assert_eq!(4, s.count_empty());
    }

    #[test]
    fn transpose_moves_single_tile() {
        // tile at (0,1) moves to (1,0)
        assert_eq!(State::new(0x10000), State::new(0x10).transpose());
        assert_eq!(State::new(0x10), State::new(0x10000).transpose());
        // the diagonal is fixed
        let diag = State::new(0x4000_0300_0020_0001);
        assert_eq!(diag, diag.transpose());
        // first row becomes first column
        assert_eq!(
            State::new(0x4_0003_0002_0001),
            State::new(0x4321).transpose()
        );
    }

    proptest! {
        #[test]
        fn prop_transpose_involution(s in arb_state()) {
            prop_assert_eq!(s, s.transpose().transpose());
        }

        #[test]
        fn prop_mirror_involution(s in arb_state()) {
            prop_assert_eq!(s, s.mirror().mirror());
        }

        #[test]
        fn prop_four_rotations_are_identity(s in arb_state()) {
            let r = s
                .rotate_clockwise()
                .rotate_clockwise()
                .rotate_clockwise()
                .rotate_clockwise();
            prop_assert_eq!(s, r);
        }

        #[test]
        fn prop_valid_moves_change_state(s in arb_state()) {
            let simulated = s.simulate_moves();
            let valid = s.valid_moves();
            // every listed move strictly changes the state
            for m in valid.iter() {
                prop_assert_ne!(m.state, s);
            }
            // and every unchanged simulation is absent from the list
            for (&action, (next, _)) in Action::ALL.iter().zip(simulated) {
                let listed = valid.iter().any(|m| m.action == action);
                prop_assert_eq!(listed, next != s);
            }
        }
    }

    #[test]
    fn moves_single_tile() {
        let s = state_from_grid([[0, 0, 0, 0], [0, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        let [(left, _), (right, _), (up, _), (down, _)] = s.simulate_moves();
        assert_eq!(
            state_from_grid([[0, 0, 0, 0], [1, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
            left
        );
        assert_eq!(
            state_from_grid([[0, 0, 0, 0], [0, 0, 0, 1], [0, 0, 0, 0], [0, 0, 0, 0]]),
            right
        );
        assert_eq!(
            state_from_grid([[0, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
            up
        );
        assert_eq!(
            state_from_grid([[0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 1, 0, 0]]),
            down
        );
    }

    #[test]
    fn move_scores() {
        // two 2-tiles merge for 4 points in every direction that joins them
        let s = state_from_grid([[1, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        let [(_, left), (_, right), (_, up), (_, down)] = s.simulate_moves();
        assert_eq!(4, left);
        assert_eq!(4, right);
        assert_eq!(0, up);
        assert_eq!(0, down);
    }

    #[test]
    fn full_board_without_merges_has_no_moves() {
        let s = state_from_grid([
            [1, 2, 3, 4],
            [5, 6, 7, 8],
            [9, 10, 11, 12],
            [13, 14, 15, 1],
        ]);
        assert!(s.valid_moves().is_empty());
    }

    #[test]
    fn saturated_board_has_no_moves() {
        // 32768 tiles cannot merge
        let s = State::new(u64::MAX);
        assert!(s.valid_moves().is_empty());
    }

    #[test]
    fn empty_board_has_no_moves() {
        assert!(State::default().valid_moves().is_empty());
    }

    #[test]
    fn board_score_counts_merged_tiles() {
        // 2-tiles score nothing; a 4 and an 8 score their face value
        let s = state_from_grid([[1, 2, 3, 0], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]);
        assert_eq!(4 + 8, s.board_score());
        assert_eq!(0, State::default().board_score());
        assert_eq!(3, s.max_value());
        assert_eq!(8, s.highest_tile());
    }

    #[test]
    fn printing() {
        assert_eq!(
            " 0  1  2  3\n 4  5  6  7\n 8  9 10 11\n12 13 14 15\n",
            format!(
                "{}",
                state_from_grid([[0, 1, 2, 3], [4, 5, 6, 7], [8, 9, 10, 11], [12, 13, 14, 15]])
            )
        );
    }
}
