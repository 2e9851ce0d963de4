//! Move resolution errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Recorded move {uci} at ply {ply} no longer replays")]
    RulesEngineDesync { ply: usize, uci: String },

    #[error("Invalid notation: {0}")]
    InvalidNotation(String),
}
