//! A 2048 engine built around a bit-packed board with precomputed row move
//! tables, a family of decision policies (random, one-ply heuristic,
//! expectimax, and an n-tuple network trained by TD(0) self-play), and
//! parallel drivers for bulk evaluation and evolutionary weight tuning.

#[macro_use]
extern crate static_assertions;

#[macro_use]
extern crate lazy_static;

pub mod ai;
pub mod board;
pub mod config;
pub mod eval;
pub mod game;
pub mod logger;
pub mod ntuple;
pub mod sim;
pub mod tuner;

pub use ai::Player;
pub use board::{Action, MoveResult, State};
pub use game::Game;
