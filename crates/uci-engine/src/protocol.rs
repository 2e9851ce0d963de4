//! Parsing of UCI engine output

use serde::Serialize;
use shakmaty::uci::UciMove;
use tracing::warn;

/// Engine score, always from White's point of view once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Centipawns
    Cp(i32),
    /// Mate in N moves (positive = White mates)
    Mate(i32),
}

impl Score {
    /// Convert a side-to-move relative score into White's point of view.
    pub fn for_white(self, white_to_move: bool) -> Self {
        if white_to_move {
            return self;
        }
        match self {
            Score::Cp(cp) => Score::Cp(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

/// A running assessment of the analysed position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationSample {
    pub score: Score,
    pub depth: u32,
    /// Position the search was started on
    #[serde(skip)]
    pub fen: String,
}

/// One line of engine output, as far as the channel cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineOutput {
    Info {
        depth: Option<u32>,
        score: Option<Score>,
    },
    /// `None` for `bestmove (none)` or an unparseable move
    BestMove(Option<UciMove>),
    Other,
}

pub(crate) fn parse_line(line: &str) -> EngineOutput {
    let line = line.trim();

    if line.starts_with("bestmove") {
        let token = line.split_whitespace().nth(1).unwrap_or("(none)");
        let mv = match token {
            "(none)" | "0000" => None,
            token => match token.parse::<UciMove>() {
                Ok(mv) => Some(mv),
                Err(_) => {
                    warn!(token, "unparseable bestmove");
                    None
                }
            },
        };
        return EngineOutput::BestMove(mv);
    }

    if line.starts_with("info") && !line.starts_with("info string") {
        let score = match (parse_cp(line), parse_mate(line)) {
            (_, Some(mate)) => Some(Score::Mate(mate)),
            (Some(cp), None) => Some(Score::Cp(cp)),
            (None, None) => None,
        };
        return EngineOutput::Info {
            depth: parse_depth(line),
            score,
        };
    }

    EngineOutput::Other
}

/// Numeric value following `key` on an info line
fn value_after<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

fn parse_cp(line: &str) -> Option<i32> {
    value_after(line, "cp")
}

fn parse_mate(line: &str) -> Option<i32> {
    value_after(line, "mate")
}

fn parse_depth(line: &str) -> Option<u32> {
    value_after(line, "depth")
}

/// Whether the side to move in `fen` is White.
pub(crate) fn white_to_move(fen: &str) -> bool {
    fen.split_whitespace().nth(1) != Some("b")
}
