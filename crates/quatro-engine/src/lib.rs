//! Connect Four rules and the computer opponent.
//!
//! This crate is pure and synchronous: no I/O, no clocks. The match layer
//! owns a [`Board`] per session and calls [`Board::drop_token`] followed by
//! [`Board::is_winning_drop`] for every accepted move, and asks a
//! [`BotStrategy`] for a column when the bot seat is to move.
//!
//! ```
//! use quatro_engine::{Board, Token};
//!
//! let mut board = Board::new();
//! let row = board.drop_token(3, Token::A).unwrap();
//! assert_eq!(row, 5);
//! assert!(!board.is_winning_drop(row, 3, Token::A));
//! ```

mod board;
mod bot;
mod error;

pub use board::{Board, COLS, CONNECT, Cell, ROWS, Token};
pub use bot::{BotProfile, BotStrategy, Difficulty, best_move, evaluate, immediate_win};
pub use error::BoardError;
