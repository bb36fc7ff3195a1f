//! Connect Four rules: board representation, win detection and the turn-keeping
//! engine. Pure data, no I/O and no locking.

mod board;
mod engine;
mod winner;

pub use board::{Board, Color, Piece, Position, COLS, ROWS};
pub use engine::{GameEngine, GameOutcome, Move};
pub use winner::{WinnerChecker, WinningLine, CONNECT};
