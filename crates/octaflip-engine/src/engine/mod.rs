//! Move generation and game progression.
//!
//! - [`Move`] - A clone or jump, validated against its geometry
//! - [`GameState`] - Board plus side to move, pass counter and history
//! - [`GameResult`] - Final outcome by piece count
//!
//! # Game Flow
//!
//! 1. Start from [`GameState::new`] (Red to move)
//! 2. Pick one of [`GameState::legal_moves`], or pass with `None` when the list is empty
//! 3. [`GameState::apply_move`] places the piece and flips neighbours
//! 4. Repeat until [`GameState::is_terminal`]
//!
//! # Example
//!
//! ```
//! use octaflip_engine::GameState;
//!
//! let mut state = GameState::new();
//! while !state.is_terminal() && state.ply() < 60 {
//!     let mv = state.legal_moves().first().copied();
//!     state.apply_move(mv).unwrap();
//! }
//! println!("{:?}", state.result());
//! ```

pub use self::{game_state::*, moves::*};

mod game_state;
mod moves;
