//! Immutable position snapshots rebuilt from move history.

use std::collections::BTreeMap;

use serde::Serialize;
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position, Role, Square};

use crate::error::MoveError;
use crate::resolver;

/// A move as reported by the board widget: origin, destination and an
/// optional promotion choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl MoveRequest {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, role: Role) -> Self {
        self.promotion = Some(role);
        self
    }

    /// Parse square names ("e7", "e8") and an optional promotion letter ("q").
    pub fn parse(from: &str, to: &str, promotion: Option<&str>) -> Result<Self, MoveError> {
        let from_sq: Square = from
            .trim()
            .parse()
            .map_err(|_| MoveError::InvalidNotation(format!("bad square '{from}'")))?;
        let to_sq: Square = to
            .trim()
            .parse()
            .map_err(|_| MoveError::InvalidNotation(format!("bad square '{to}'")))?;

        let promotion = match promotion.map(str::trim).filter(|p| !p.is_empty()) {
            None => None,
            Some(p) => {
                let role = p
                    .chars()
                    .next()
                    .and_then(|c| Role::from_char(c.to_ascii_lowercase()))
                    .ok_or_else(|| MoveError::InvalidNotation(format!("bad promotion '{p}'")))?;
                Some(role)
            }
        };

        Ok(Self {
            from: from_sq,
            to: to_sq,
            promotion,
        })
    }

    /// Build a request from an engine's UCI move such as `e7e8q`.
    pub fn from_uci(uci: &UciMove) -> Result<Self, MoveError> {
        match uci {
            UciMove::Normal {
                from,
                to,
                promotion,
            } => Ok(Self {
                from: *from,
                to: *to,
                promotion: *promotion,
            }),
            other => Err(MoveError::InvalidNotation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
}

/// Rules-level end of game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Checkmate { winner: Color },
    Draw(DrawReason),
}

/// A game position plus the history that reaches it from the standard start.
///
/// There are no mutating methods: every applied move yields a new store
/// replayed from scratch, so two continuations of the same game never share
/// rules state.
#[derive(Debug, Clone)]
pub struct PositionStore {
    board: Chess,
    moves: Vec<UciMove>,
    san: Vec<String>,
    /// Repetition keys of every position reached, including the start.
    seen: Vec<String>,
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::initial()
    }
}

impl PositionStore {
    /// The standard starting position with an empty history.
    pub fn initial() -> Self {
        let board = Chess::default();
        let seen = vec![repetition_key(&board)];
        Self {
            board,
            moves: Vec::new(),
            san: Vec::new(),
            seen,
        }
    }

    /// Rebuild a position by replaying `moves` from the standard start.
    pub fn replay(moves: Vec<UciMove>) -> Result<Self, MoveError> {
        let mut store = Self::initial();
        for (ply, uci) in moves.into_iter().enumerate() {
            let mv = uci
                .to_move(&store.board)
                .map_err(|_| MoveError::RulesEngineDesync {
                    ply,
                    uci: uci.to_string(),
                })?;
            store.san.push(San::from_move(&store.board, mv.clone()).to_string());
            store.moves.push(mv.to_uci(CastlingMode::Standard));
            store.board.play_unchecked(mv);
            store.seen.push(repetition_key(&store.board));
        }
        Ok(store)
    }

    /// Validate `candidate` and return the position after it.
    pub fn play(&self, candidate: &MoveRequest) -> Result<Self, MoveError> {
        let history = resolver::apply(&self.moves, candidate)?;
        Self::replay(history)
    }

    pub fn board(&self) -> &Chess {
        &self.board
    }

    pub fn moves(&self) -> &[UciMove] {
        &self.moves
    }

    /// History in UCI notation, e.g. `["e2e4", "e7e5"]`.
    pub fn uci_history(&self) -> Vec<String> {
        self.moves.iter().map(|m| m.to_string()).collect()
    }

    pub fn san_history(&self) -> &[String] {
        &self.san
    }

    pub fn ply(&self) -> usize {
        self.moves.len()
    }

    pub fn turn(&self) -> Color {
        self.board.turn()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.board, EnPassantMode::Legal).to_string()
    }

    /// Legal destination squares grouped by origin square, as the board
    /// widget wants them. Castling is reported as the king's two-square step.
    pub fn legal_destinations(&self) -> BTreeMap<String, Vec<String>> {
        let mut dests: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for mv in self.board.legal_moves() {
            if let UciMove::Normal { from, to, .. } = mv.to_uci(CastlingMode::Standard) {
                let targets = dests.entry(from.to_string()).or_default();
                let to = to.to_string();
                // promotions yield one move per piece on the same square
                if !targets.contains(&to) {
                    targets.push(to);
                }
            }
        }
        for targets in dests.values_mut() {
            targets.sort();
        }
        dests
    }

    /// Checkmate or draw, if the game is over by the rules.
    pub fn terminal(&self) -> Option<Terminal> {
        if self.board.is_checkmate() {
            return Some(Terminal::Checkmate {
                winner: !self.board.turn(),
            });
        }
        if self.board.is_stalemate() {
            return Some(Terminal::Draw(DrawReason::Stalemate));
        }
        if self.board.is_insufficient_material() {
            return Some(Terminal::Draw(DrawReason::InsufficientMaterial));
        }
        if self.board.halfmoves() >= 100 {
            return Some(Terminal::Draw(DrawReason::FiftyMoveRule));
        }
        if let Some(current) = self.seen.last() {
            if self.seen.iter().filter(|k| *k == current).count() >= 3 {
                return Some(Terminal::Draw(DrawReason::ThreefoldRepetition));
            }
        }
        None
    }
}

/// Board, side to move, castling rights and en passant square.
fn repetition_key(board: &Chess) -> String {
    let fen = Fen::from_position(board, EnPassantMode::Legal).to_string();
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn history(moves: &[&str]) -> Vec<UciMove> {
        moves.iter().map(|m| m.parse().unwrap()).collect()
    }

    #[test]
    fn test_initial_position() {
        let store = PositionStore::initial();
        assert_eq!(store.fen(), START_FEN);
        assert_eq!(store.turn(), Color::White);
        assert_eq!(store.ply(), 0);
        assert!(store.terminal().is_none());
    }

    #[test]
    fn test_legal_destinations_grouped_by_origin() {
        let dests = PositionStore::initial().legal_destinations();
        assert_eq!(dests.len(), 10);
        assert_eq!(dests["e2"], vec!["e3".to_string(), "e4".to_string()]);
        assert_eq!(dests["g1"].len(), 2);
        let total: usize = dests.values().map(Vec::len).sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn test_replay_records_san() {
        let store = PositionStore::replay(history(&["e2e4", "e7e5", "g1f3"])).unwrap();
        assert_eq!(store.san_history(), &["e4", "e5", "Nf3"]);
        assert_eq!(store.uci_history(), vec!["e2e4", "e7e5", "g1f3"]);
        assert_eq!(store.turn(), Color::Black);
    }

    #[test]
    fn test_replay_rejects_impossible_history() {
        let err = PositionStore::replay(history(&["e2e4", "e2e4"])).unwrap_err();
        assert_eq!(
            err,
            MoveError::RulesEngineDesync {
                ply: 1,
                uci: "e2e4".to_string()
            }
        );
    }

    #[test]
    fn test_fools_mate_is_checkmate_for_black() {
        let store = PositionStore::replay(history(&["f2f3", "e7e5", "g2g4", "d8h4"])).unwrap();
        assert_eq!(
            store.terminal(),
            Some(Terminal::Checkmate {
                winner: Color::Black
            })
        );
        assert!(store.legal_destinations().is_empty());
    }

    #[test]
    fn test_threefold_repetition_is_a_draw() {
        let shuffle = [
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ];
        let before = PositionStore::replay(history(&shuffle[..7])).unwrap();
        assert!(before.terminal().is_none());

        let store = PositionStore::replay(history(&shuffle)).unwrap();
        assert_eq!(
            store.terminal(),
            Some(Terminal::Draw(DrawReason::ThreefoldRepetition))
        );
    }

    #[test]
    fn test_shortest_stalemate() {
        let moves = [
            "e2e3", "a7a5", "d1h5", "a8a6", "h5a5", "h7h5", "h2h4", "a6h6", "a5c7", "f7f6",
            "c7d7", "e8f7", "d7b7", "d8d3", "b7b8", "d3h7", "b8c8", "f7g6", "c8e6",
        ];
        let store = PositionStore::replay(history(&moves)).unwrap();
        assert_eq!(store.terminal(), Some(Terminal::Draw(DrawReason::Stalemate)));
    }

    /// A store sitting on an arbitrary position, for endgame rules.
    fn from_fen(fen: &str) -> PositionStore {
        let board: Chess = fen
            .parse::<Fen>()
            .unwrap()
            .into_position(CastlingMode::Standard)
            .unwrap();
        let seen = vec![repetition_key(&board)];
        PositionStore {
            board,
            moves: Vec::new(),
            san: Vec::new(),
            seen,
        }
    }

    fn push(store: &mut PositionStore, uci: &str) {
        let mv = uci.parse::<UciMove>().unwrap().to_move(&store.board).unwrap();
        store.board.play_unchecked(mv);
        store.seen.push(repetition_key(&store.board));
    }

    #[test]
    fn test_king_takes_last_rook_is_insufficient_material() {
        let mut store = from_fen("4k3/8/8/8/8/8/3r4/4K3 w - - 0 1");
        assert!(store.terminal().is_none());
        push(&mut store, "e1d2");
        assert_eq!(
            store.terminal(),
            Some(Terminal::Draw(DrawReason::InsufficientMaterial))
        );
    }

    #[test]
    fn test_lone_bishop_after_capture_is_insufficient_material() {
        let mut store = from_fen("4k3/8/8/8/8/8/3r4/2B1K3 w - - 0 1");
        assert!(store.terminal().is_none());
        push(&mut store, "c1d2");
        assert_eq!(
            store.terminal(),
            Some(Terminal::Draw(DrawReason::InsufficientMaterial))
        );
    }

    #[test]
    fn test_hundredth_quiet_halfmove_is_a_draw() {
        let mut store = from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 99 80");
        assert!(store.terminal().is_none());
        push(&mut store, "a1a2");
        assert_eq!(store.board().halfmoves(), 100);
        assert_eq!(store.terminal(), Some(Terminal::Draw(DrawReason::FiftyMoveRule)));
    }

    #[test]
    fn test_mate_on_hundredth_halfmove_still_wins() {
        let mut store = from_fen("k7/8/1K6/8/8/8/8/7R w - - 99 80");
        assert!(store.terminal().is_none());
        push(&mut store, "h1h8");
        assert_eq!(store.board().halfmoves(), 100);
        assert_eq!(
            store.terminal(),
            Some(Terminal::Checkmate {
                winner: Color::White
            })
        );
    }

    #[test]
    fn test_parse_move_request() {
        let req = MoveRequest::parse("e7", "e8", Some("Q")).unwrap();
        assert_eq!(req.from, Square::E7);
        assert_eq!(req.to, Square::E8);
        assert_eq!(req.promotion, Some(Role::Queen));

        assert!(MoveRequest::parse("e9", "e8", None).is_err());
        assert!(MoveRequest::parse("e7", "e8", Some("x")).is_err());
        assert_eq!(MoveRequest::parse("e2", "e4", Some("")).unwrap().promotion, None);
    }

    #[test]
    fn test_move_request_from_uci() {
        let uci: UciMove = "b7a8n".parse().unwrap();
        let req = MoveRequest::from_uci(&uci).unwrap();
        assert_eq!(req, MoveRequest::new(Square::B7, Square::A8).with_promotion(Role::Knight));
    }
}
