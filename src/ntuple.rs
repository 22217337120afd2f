//! N-tuple network value function over packed board states.
//!
//! A pattern samples a fixed list of board positions; the joint cell values
//! key a lookup into a 16^k weight table. Each pattern also carries an
//! 8-row isomorphism index (4 rotations x identity/mirror) so one stored
//! table serves every symmetry of the board.
//!
//! Weight cells are f32 bits in `AtomicU32`. Training threads read and
//! write them with relaxed ordering and no locks (Hogwild); an occasional
//! lost update is tolerated because each adjustment is tiny compared to the
//! stochastic noise of self-play.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::board::State;

/// The board whose cell at position `i` holds the value `i`; transforming it
/// and reading it back yields the position permutation of that transform.
const INDEX_BOARD: u64 = 0xFEDC_BA98_7654_3210;

#[derive(Debug, Error)]
pub enum NetworkIoError {
    #[error("network file i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored network shape does not match this network")]
    ShapeMismatch,
}

#[inline]
fn tile(state: State, pos: usize) -> usize {
    ((state.raw() >> (pos * 4)) & 0xF) as usize
}

/// The 8 symmetric views of the index board: identity, three clockwise
/// rotations, then the same four starting from the mirror.
fn symmetric_index_boards() -> [State; 8] {
    let mut boards = [State::default(); 8];
    let mut s = State::new(INDEX_BOARD);
    for slot in boards.iter_mut().take(4) {
        *slot = s;
        s = s.rotate_clockwise();
    }
    let mut s = State::new(INDEX_BOARD).mirror();
    for slot in boards.iter_mut().skip(4) {
        *slot = s;
        s = s.rotate_clockwise();
    }
    boards
}

/// A single n-tuple: sampled positions, isomorphism index, weight table.
pub struct Pattern {
    positions: Vec<usize>,
    iso: Vec<Vec<usize>>,
    weights: Box<[AtomicU32]>,
}

impl Pattern {
    /// `positions` are board cells in 0..16; the weight table has 16^len
    /// entries and starts at zero.
    pub fn new(positions: Vec<usize>) -> Self {
        debug_assert!(!positions.is_empty());
        debug_assert!(positions.iter().all(|&p| p < 16));
        let table_len = 1usize << (4 * positions.len());
        let iso = symmetric_index_boards()
            .iter()
            .map(|&board| positions.iter().map(|&p| tile(board, p)).collect())
            .collect();
        let weights = std::iter::repeat_with(|| AtomicU32::new(0))
            .take(table_len)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            positions,
            iso,
            weights,
        }
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn table_len(&self) -> usize {
        self.weights.len()
    }

    /// Base-16 little-endian packing of the cells sampled by one symmetry.
    #[inline]
    fn index_of(iso_row: &[usize], state: State) -> usize {
        iso_row
            .iter()
            .enumerate()
            .fold(0, |index, (j, &pos)| index | (tile(state, pos) << (4 * j)))
    }

    #[inline]
    fn weight(&self, index: usize) -> f32 {
        f32::from_bits(self.weights[index].load(Ordering::Relaxed))
    }

    /// Sum of the table entries selected by all 8 symmetries.
    pub fn estimate(&self, state: State) -> f32 {
        self.iso
            .iter()
            .map(|row| self.weight(Self::index_of(row, state)))
            .sum()
    }

    /// Add `adjust` split evenly over the 8 symmetric lookups; returns the
    /// new sum. The read-add-store is deliberately not atomic (Hogwild).
    pub fn update(&self, state: State, adjust: f32) -> f32 {
        let share = adjust / self.iso.len() as f32;
        let mut value = 0.0;
        for row in &self.iso {
            let index = Self::index_of(row, state);
            let new = self.weight(index) + share;
            self.weights[index].store(new.to_bits(), Ordering::Relaxed);
            value += new;
        }
        value
    }

    fn save(&self, out: &mut impl io::Write) -> io::Result<()> {
        out.write_u64::<LittleEndian>(self.positions.len() as u64)?;
        for &pos in &self.positions {
            out.write_i32::<LittleEndian>(pos as i32)?;
        }
        for cell in self.weights.iter() {
            out.write_f32::<LittleEndian>(f32::from_bits(cell.load(Ordering::Relaxed)))?;
        }
        Ok(())
    }

    fn load(&self, input: &mut impl io::Read) -> Result<(), NetworkIoError> {
        let len = input.read_u64::<LittleEndian>()? as usize;
        if len != self.positions.len() {
            return Err(NetworkIoError::ShapeMismatch);
        }
        // stored positions are advisory; the receiving pattern keeps its own
        for _ in 0..len {
            input.read_i32::<LittleEndian>()?;
        }
        for cell in self.weights.iter() {
            cell.store(
                input.read_f32::<LittleEndian>()?.to_bits(),
                Ordering::Relaxed,
            );
        }
        Ok(())
    }
}

/// An ordered collection of patterns sharing the input state.
pub struct Network {
    patterns: Vec<Pattern>,
}

impl Default for Network {
    fn default() -> Self {
        Self::default_patterns()
    }
}

impl Network {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    /// The standard four overlapping 6-tuples. Each table holds 16^6 f32
    /// weights (~64 MiB), ~256 MiB for the network.
    pub fn default_patterns() -> Self {
        Self::new(vec![
            Pattern::new(vec![0, 1, 2, 3, 4, 5]),
            Pattern::new(vec![4, 5, 6, 7, 8, 9]),
            Pattern::new(vec![0, 1, 2, 4, 5, 6]),
            Pattern::new(vec![4, 5, 6, 8, 9, 10]),
        ])
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn estimate(&self, state: State) -> f32 {
        self.patterns.iter().map(|p| p.estimate(state)).sum()
    }

    /// Distribute `adjust` over the patterns (and, inside each, the 8
    /// symmetries); returns the updated estimate.
    pub fn update(&self, state: State, adjust: f32) -> f32 {
        let share = adjust / self.patterns.len() as f32;
        self.patterns.iter().map(|p| p.update(state, share)).sum()
    }

    /// Dump the network: pattern count, then each pattern's length,
    /// positions, and weights, all little-endian.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_u64::<LittleEndian>(self.patterns.len() as u64)?;
        for pattern in &self.patterns {
            pattern.save(&mut out)?;
        }
        Ok(())
    }

    /// Load weights dumped by [`Network::save`] into this network. Refuses
    /// a file whose pattern count or lengths differ from this network's
    /// shape; callers are expected to validate shape beforehand.
    pub fn load(&self, path: &Path) -> Result<(), NetworkIoError> {
        let mut input = BufReader::new(File::open(path)?);
        let count = input.read_u64::<LittleEndian>()? as usize;
        if count != self.patterns.len() {
            return Err(NetworkIoError::ShapeMismatch);
        }
        for pattern in &self.patterns {
            pattern.load(&mut input)?;
        }
        Ok(())
    }
}
