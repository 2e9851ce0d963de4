//! Candidate move validation against a replayed history.

use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Move, Position, Role, Square};
use tracing::debug;

use crate::error::MoveError;
use crate::position::{MoveRequest, PositionStore};

/// Validate `candidate` against the position reached by `history` and return
/// the extended history.
///
/// The rules state is rebuilt from the standard start on every call. A
/// promotion with no piece chosen promotes to a queen.
pub fn apply(history: &[UciMove], candidate: &MoveRequest) -> Result<Vec<UciMove>, MoveError> {
    let store = PositionStore::replay(history.to_vec())?;
    let board = store.board();

    let legal = board.legal_moves();
    let matched = legal
        .iter()
        .find(|mv| matches_squares(mv, candidate))
        .ok_or_else(|| illegal(candidate))?;

    // Castling may be requested as king-takes-rook; normalize to the king step.
    let (from, to) = match matched.to_uci(CastlingMode::Standard) {
        UciMove::Normal { from, to, .. } => (from, to),
        _ => return Err(illegal(candidate)),
    };

    let promotion = match (matched.promotion(), candidate.promotion) {
        (Some(_), None) => Some(Role::Queen),
        (_, chosen) => chosen,
    };

    let mv = match to_legal(board, from, to, promotion) {
        Some(mv) => mv,
        None if promotion.is_some() => {
            debug!(%from, %to, "promotion rejected, retrying without");
            to_legal(board, from, to, None).ok_or_else(|| illegal(candidate))?
        }
        None => return Err(illegal(candidate)),
    };

    let mut next = history.to_vec();
    next.push(mv.to_uci(CastlingMode::Standard));
    Ok(next)
}

fn matches_squares(mv: &Move, candidate: &MoveRequest) -> bool {
    [CastlingMode::Standard, CastlingMode::Chess960]
        .into_iter()
        .any(|mode| match mv.to_uci(mode) {
            UciMove::Normal { from, to, .. } => from == candidate.from && to == candidate.to,
            _ => false,
        })
}

fn to_legal(board: &Chess, from: Square, to: Square, promotion: Option<Role>) -> Option<Move> {
    UciMove::Normal {
        from,
        to,
        promotion,
    }
    .to_move(board)
    .ok()
}

fn illegal(candidate: &MoveRequest) -> MoveError {
    MoveError::IllegalMove(format!("{}{}", candidate.from, candidate.to))
}
