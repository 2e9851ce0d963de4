//! Authoritative game state for a human-vs-engine chess session.
//!
//! A [`PositionStore`] is an immutable snapshot rebuilt from the full move
//! history; [`resolver::apply`] validates a candidate move against that history
//! and yields the extended history, never mutating a shared board.

pub mod error;
pub mod position;
pub mod resolver;

pub use error::MoveError;
pub use position::{DrawReason, MoveRequest, PositionStore, Terminal};
pub use shakmaty::{uci::UciMove, Color, Role, Square};
