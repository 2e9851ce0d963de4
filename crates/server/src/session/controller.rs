//! Session state machine: Setup -> InProgress -> GameOver.
//!
//! The controller is the single writer of the position, the clock and the
//! outcome. It performs no I/O; every transition returns the engine work the
//! caller has to carry out as [`Directive`]s, and engine results come back in
//! through [`SessionController::on_best_move`] and friends tagged with the
//! [`MoveTicket`] they were requested for.

use std::collections::BTreeMap;

use chess_core::{DrawReason, MoveError, MoveRequest, PositionStore, Terminal};
use serde::Serialize;
use shakmaty::uci::UciMove;
use shakmaty::Color;
use tracing::{debug, info, warn};
use uci_engine::{EngineError, EvaluationSample};

use crate::clock::{format_time, Clock, TimeControl};
use crate::rating::{Category, GameResult, RatingEngine, RatingsView};

/// The human always plays White.
pub const HUMAN: Color = Color::White;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    InProgress,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Checkmate { winner: Color },
    Draw(DrawReason),
    Timeout { loser: Color },
}

impl Outcome {
    pub fn text(&self) -> String {
        match self {
            Outcome::Checkmate { winner } => format!("Checkmate! {} wins", display_name(*winner)),
            Outcome::Draw(DrawReason::Stalemate) => "Draw by stalemate".to_string(),
            Outcome::Draw(DrawReason::InsufficientMaterial) => "Draw by insufficient material".to_string(),
            Outcome::Draw(DrawReason::FiftyMoveRule) => "Draw by the fifty-move rule".to_string(),
            Outcome::Draw(DrawReason::ThreefoldRepetition) => "Draw by threefold repetition".to_string(),
            Outcome::Timeout { loser } => format!("Time's up! {} wins on time", display_name(!*loser)),
        }
    }

    pub fn result_for(&self, side: Color) -> GameResult {
        match self {
            Outcome::Checkmate { winner } if *winner == side => GameResult::Win,
            Outcome::Checkmate { .. } => GameResult::Loss,
            Outcome::Draw(_) => GameResult::Draw,
            Outcome::Timeout { loser } if *loser == side => GameResult::Loss,
            Outcome::Timeout { .. } => GameResult::Win,
        }
    }
}

impl From<Terminal> for Outcome {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Checkmate { winner } => Outcome::Checkmate { winner },
            Terminal::Draw(reason) => Outcome::Draw(reason),
        }
    }
}

/// Identifies one opponent turn. A resolution is applied only if its ticket
/// is still the pending one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTicket {
    pub generation: u64,
    pub ply: usize,
    pub fen: String,
}

/// Engine work requested by a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    ConfigureStrength(u32),
    NewGame,
    RequestBestMove(MoveTicket),
    StartAnalysis { fen: String },
    StopEngine,
}

pub struct SessionController {
    phase: Phase,
    position: PositionStore,
    clock: Clock,
    time_control: Option<TimeControl>,
    outcome: Option<Outcome>,
    ratings: RatingEngine,
    evaluation: Option<EvaluationSample>,
    /// Bumped on every commit, start, reset and game end
    generation: u64,
    pending: Option<MoveTicket>,
    engine_retries: u32,
    attempts: u32,
    engine_unavailable: bool,
    paused: bool,
}

impl SessionController {
    /// `engine_retries` is how many timed-out best-move requests are reissued
    /// before the opponent counts as unavailable.
    pub fn new(ratings: RatingEngine, engine_retries: u32) -> Self {
        Self {
            phase: Phase::Setup,
            position: PositionStore::initial(),
            clock: Clock::new(None),
            time_control: None,
            outcome: None,
            ratings,
            evaluation: None,
            generation: 0,
            pending: None,
            engine_retries,
            attempts: 0,
            engine_unavailable: false,
            paused: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn position(&self) -> &PositionStore {
        &self.position
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn ratings(&self) -> &RatingEngine {
        &self.ratings
    }

    pub fn evaluation(&self) -> Option<&EvaluationSample> {
        self.evaluation.as_ref()
    }

    pub fn pending_ticket(&self) -> Option<&MoveTicket> {
        self.pending.as_ref()
    }

    pub fn is_bot_thinking(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_engine_unavailable(&self) -> bool {
        self.engine_unavailable
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Begin a new game from the initial position.
    pub fn start(&mut self, time_control: Option<TimeControl>) -> Vec<Directive> {
        self.clear_game(time_control);
        self.phase = Phase::InProgress;
        self.resume_clock();
        info!(?time_control, opponent = self.ratings.opponent_strength(), "game started");

        vec![
            Directive::StopEngine,
            Directive::ConfigureStrength(self.ratings.opponent_strength()),
            Directive::NewGame,
            Directive::StartAnalysis {
                fen: self.position.fen(),
            },
        ]
    }

    /// Back to Setup from any state. Pending engine work is abandoned.
    pub fn reset(&mut self) -> Vec<Directive> {
        self.clear_game(self.time_control);
        self.phase = Phase::Setup;
        debug!("session reset");
        vec![Directive::StopEngine]
    }

    /// Apply a move from the board widget. A rejection leaves the session
    /// untouched.
    pub fn human_move(&mut self, request: &MoveRequest) -> Result<Vec<Directive>, MoveError> {
        if self.phase != Phase::InProgress {
            return Err(MoveError::IllegalMove("no game in progress".into()));
        }
        if self.position.turn() != HUMAN {
            return Err(MoveError::IllegalMove("not your turn".into()));
        }
        if self.paused {
            return Err(MoveError::IllegalMove("game is paused".into()));
        }
        self.commit(request, HUMAN)
    }

    /// A best move arrived for `ticket`. Stale tickets are ignored.
    pub fn on_best_move(&mut self, ticket: &MoveTicket, mv: &UciMove) -> Vec<Directive> {
        if !self.is_current(ticket) {
            debug!(generation = ticket.generation, %mv, "discarding stale best move");
            return Vec::new();
        }
        self.pending = None;
        self.attempts = 0;

        let committed = MoveRequest::from_uci(mv).and_then(|request| self.commit(&request, !HUMAN));
        match committed {
            Ok(directives) => directives,
            Err(e) => {
                warn!(%mv, error = %e, "engine move rejected");
                self.mark_unavailable()
            }
        }
    }

    /// A best-move request for `ticket` failed.
    pub fn on_engine_failure(&mut self, ticket: &MoveTicket, error: &EngineError) -> Vec<Directive> {
        if !self.is_current(ticket) {
            return Vec::new();
        }
        let retryable = matches!(
            error,
            EngineError::Unavailable(_) | EngineError::Cancelled | EngineError::NoMove
        );
        if retryable && self.attempts < self.engine_retries {
            self.attempts += 1;
            warn!(attempt = self.attempts, error = %error, "retrying opponent move");
            return vec![Directive::RequestBestMove(ticket.clone())];
        }
        warn!(error = %error, "opponent unavailable");
        self.pending = None;
        self.mark_unavailable()
    }

    /// Ask the opponent again after it was unavailable.
    pub fn retry_opponent(&mut self) -> Vec<Directive> {
        if self.phase != Phase::InProgress || !self.engine_unavailable {
            return Vec::new();
        }
        self.engine_unavailable = false;
        self.attempts = 0;
        self.resume_clock();
        info!("retrying opponent");
        vec![Directive::RequestBestMove(self.issue_ticket())]
    }

    /// Suspend or resume the game clock, e.g. while menus are open.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if self.phase == Phase::InProgress {
            self.resume_clock();
        }
    }

    /// One-second tick from the driver.
    pub fn tick(&mut self) -> Vec<Directive> {
        if self.phase != Phase::InProgress {
            return Vec::new();
        }
        match self.clock.tick() {
            Some(loser) => self.finish(Outcome::Timeout { loser }),
            None => Vec::new(),
        }
    }

    /// Latest streamed evaluation; only kept while a game is running and
    /// only for the position currently on the board.
    pub fn on_evaluation(&mut self, sample: Option<EvaluationSample>) {
        if self.phase != Phase::InProgress {
            return;
        }
        match sample {
            Some(sample) if sample.fen != self.position.fen() => {
                debug!(depth = sample.depth, "discarding evaluation of a previous position");
            }
            sample => self.evaluation = sample,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let turn = self.position.turn();
        let dests = if self.phase == Phase::InProgress && turn == HUMAN && !self.paused {
            self.position.legal_destinations()
        } else {
            BTreeMap::new()
        };
        let ratings = self.ratings.view();

        SessionSnapshot {
            phase: self.phase,
            fen: self.position.fen(),
            turn: side_name(turn),
            moves: self.position.uci_history(),
            san: self.position.san_history().to_vec(),
            dests,
            is_bot_thinking: self.is_bot_thinking(),
            evaluation: self.evaluation.clone(),
            outcome: self.outcome.map(|o| OutcomeView::new(o, self.category())),
            clock: ClockView::new(&self.clock),
            time_control: self.time_control,
            category: self.category(),
            opponent_strength: ratings.opponent_strength,
            skill_level: ratings.skill_level,
            ratings,
            engine_unavailable: self.engine_unavailable,
            paused: self.paused,
        }
    }

    fn category(&self) -> Category {
        Category::from_time_control(self.time_control)
    }

    fn clear_game(&mut self, time_control: Option<TimeControl>) {
        self.time_control = time_control;
        self.position = PositionStore::initial();
        self.clock.reset(time_control);
        self.outcome = None;
        self.evaluation = None;
        self.pending = None;
        self.attempts = 0;
        self.engine_unavailable = false;
        self.paused = false;
        self.generation += 1;
    }

    fn is_current(&self, ticket: &MoveTicket) -> bool {
        self.phase == Phase::InProgress
            && self.pending.as_ref() == Some(ticket)
            && self.position.ply() == ticket.ply
            && self.position.fen() == ticket.fen
    }

    /// Shared commit path for both sides.
    fn commit(&mut self, request: &MoveRequest, side: Color) -> Result<Vec<Directive>, MoveError> {
        let next = self.position.play(request)?;
        self.position = next;
        self.generation += 1;
        self.evaluation = None;
        self.clock.add_increment(side);

        if let Some(terminal) = self.position.terminal() {
            return Ok(self.finish(terminal.into()));
        }

        self.resume_clock();
        if self.position.turn() == HUMAN {
            Ok(vec![Directive::StartAnalysis {
                fen: self.position.fen(),
            }])
        } else {
            Ok(vec![Directive::RequestBestMove(self.issue_ticket())])
        }
    }

    fn issue_ticket(&mut self) -> MoveTicket {
        let ticket = MoveTicket {
            generation: self.generation,
            ply: self.position.ply(),
            fen: self.position.fen(),
        };
        self.pending = Some(ticket.clone());
        ticket
    }

    fn mark_unavailable(&mut self) -> Vec<Directive> {
        self.engine_unavailable = true;
        self.clock.set_active_side(None);
        vec![Directive::StopEngine]
    }

    /// Tick for the side to move unless paused or waiting on a dead engine.
    fn resume_clock(&mut self) {
        if self.paused || self.engine_unavailable || self.phase != Phase::InProgress {
            self.clock.set_active_side(None);
        } else {
            self.clock.set_active_side(Some(self.position.turn()));
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Vec<Directive> {
        self.phase = Phase::GameOver;
        self.outcome = Some(outcome);
        self.clock.set_active_side(None);
        self.pending = None;
        self.evaluation = None;
        self.generation += 1;

        info!(outcome = %outcome.text(), "game over");
        self.ratings.settle_game(self.category(), outcome.result_for(HUMAN));
        vec![Directive::StopEngine]
    }
}

fn side_name(side: Color) -> &'static str {
    match side {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Capitalized side for human-readable outcome text.
fn display_name(side: Color) -> &'static str {
    match side {
        Color::White => "White",
        Color::Black => "Black",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeView {
    pub kind: &'static str,
    pub winner: Option<&'static str>,
    pub reason: Option<DrawReason>,
    pub text: String,
    pub result: GameResult,
    pub category: Category,
}

impl OutcomeView {
    fn new(outcome: Outcome, category: Category) -> Self {
        let (kind, winner, reason) = match outcome {
            Outcome::Checkmate { winner } => ("checkmate", Some(side_name(winner)), None),
            Outcome::Draw(reason) => ("draw", None, Some(reason)),
            Outcome::Timeout { loser } => ("timeout", Some(side_name(!loser)), None),
        };
        Self {
            kind,
            winner,
            reason,
            text: outcome.text(),
            result: outcome.result_for(HUMAN),
            category,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClockView {
    pub timed: bool,
    pub white: u32,
    pub black: u32,
    pub white_display: String,
    pub black_display: String,
    pub active: Option<&'static str>,
}

impl ClockView {
    fn new(clock: &Clock) -> Self {
        let white = clock.remaining(Color::White);
        let black = clock.remaining(Color::Black);
        Self {
            timed: clock.is_timed(),
            white,
            black,
            white_display: format_time(white),
            black_display: format_time(black),
            active: clock.active_side().map(side_name),
        }
    }
}

/// Everything the UI renders.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub fen: String,
    pub turn: &'static str,
    pub moves: Vec<String>,
    pub san: Vec<String>,
    pub dests: BTreeMap<String, Vec<String>>,
    pub is_bot_thinking: bool,
    pub evaluation: Option<EvaluationSample>,
    pub outcome: Option<OutcomeView>,
    pub clock: ClockView,
    pub time_control: Option<TimeControl>,
    pub category: Category,
    pub ratings: RatingsView,
    pub opponent_strength: u32,
    pub skill_level: u8,
    pub engine_unavailable: bool,
    pub paused: bool,
}
