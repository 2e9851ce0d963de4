//! Async event loop around a [`SessionController`].
//!
//! All mutation happens on this one task. UI commands, best-move answers,
//! streamed evaluations and the one-second clock tick are multiplexed with
//! `select!`, and the resulting directives are carried out against the
//! opponent before the next event is looked at.

use std::time::Duration;

use chess_core::MoveRequest;
use futures::future::BoxFuture;
use shakmaty::uci::UciMove;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};
use uci_engine::EngineError;

use crate::clock::TimeControl;
use crate::session::controller::{Directive, MoveTicket, SessionController, SessionSnapshot};
use crate::session::opponent::Opponent;

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Minimum time before the opponent's move is shown
    pub bot_move_delay: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            bot_move_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Start(Option<TimeControl>),
    Move(MoveRequest),
    Reset,
    Pause(bool),
    RetryOpponent,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    State(SessionSnapshot),
    MoveRejected {
        from: String,
        to: String,
        reason: String,
    },
}

type PendingMove = (MoveTicket, BoxFuture<'static, Result<UciMove, EngineError>>);

struct Driver<O> {
    controller: SessionController,
    opponent: O,
    pending: Option<PendingMove>,
    settings: DriverSettings,
}

impl<O: Opponent> Driver<O> {
    fn handle(&mut self, command: SessionCommand) -> Option<SessionEvent> {
        match command {
            SessionCommand::Start(time_control) => {
                let directives = self.controller.start(time_control);
                self.execute(directives);
            }
            SessionCommand::Move(request) => match self.controller.human_move(&request) {
                Ok(directives) => self.execute(directives),
                Err(e) => {
                    debug!(from = %request.from, to = %request.to, error = %e, "move rejected");
                    return Some(SessionEvent::MoveRejected {
                        from: request.from.to_string(),
                        to: request.to.to_string(),
                        reason: e.to_string(),
                    });
                }
            },
            SessionCommand::Reset => {
                let directives = self.controller.reset();
                self.execute(directives);
            }
            SessionCommand::Pause(paused) => self.controller.set_paused(paused),
            SessionCommand::RetryOpponent => {
                let directives = self.controller.retry_opponent();
                self.execute(directives);
            }
        }
        None
    }

    fn on_answer(&mut self, ticket: MoveTicket, answer: Result<UciMove, EngineError>) {
        let directives = match answer {
            Ok(mv) => self.controller.on_best_move(&ticket, &mv),
            Err(e) => self.controller.on_engine_failure(&ticket, &e),
        };
        self.execute(directives);
    }

    fn execute(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::ConfigureStrength(rating) => self.opponent.configure_strength(rating),
                Directive::NewGame => self.opponent.new_game(),
                Directive::RequestBestMove(ticket) => {
                    let answer = self.opponent.request_best_move(&ticket.fen);
                    let delay = self.settings.bot_move_delay;
                    let reply = Box::pin(async move {
                        let (result, ()) = tokio::join!(answer, time::sleep(delay));
                        result
                    });
                    self.pending = Some((ticket, reply));
                }
                Directive::StartAnalysis { fen } => {
                    self.pending = None;
                    self.opponent.start_continuous_analysis(&fen);
                }
                Directive::StopEngine => {
                    self.pending = None;
                    self.opponent.stop();
                }
            }
        }
    }
}

/// Wait for the outstanding best move, or forever if there is none.
async fn next_answer(pending: &mut Option<PendingMove>) -> (MoveTicket, Result<UciMove, EngineError>) {
    match pending {
        Some((ticket, reply)) => {
            let answer = reply.await;
            (ticket.clone(), answer)
        }
        None => std::future::pending().await,
    }
}

/// Drive one session until the command channel closes or the event receiver
/// goes away. A state snapshot is published after every event. Returns the
/// opponent so the caller can shut it down.
pub async fn run_session<O: Opponent>(
    controller: SessionController,
    opponent: O,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
    settings: DriverSettings,
) -> O {
    let mut evaluations = opponent.subscribe();
    let mut evaluations_open = true;
    let mut driver = Driver {
        controller,
        opponent,
        pending: None,
        settings,
    };

    let mut ticker = time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_ticking = false;

    info!("session opened");
    let mut outgoing = vec![SessionEvent::State(driver.controller.snapshot())];

    'session: loop {
        for event in outgoing.drain(..) {
            if events.send(event).await.is_err() {
                break 'session;
            }
        }

        // a fresh second starts whenever the clock starts running
        let ticking = driver.controller.clock().is_ticking();
        if ticking && !was_ticking {
            ticker.reset();
        }
        was_ticking = ticking;

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                if let Some(event) = driver.handle(command) {
                    outgoing.push(event);
                }
            }
            (ticket, answer) = next_answer(&mut driver.pending) => {
                driver.pending = None;
                driver.on_answer(ticket, answer);
            }
            _ = ticker.tick(), if ticking => {
                let directives = driver.controller.tick();
                driver.execute(directives);
            }
            changed = evaluations.changed(), if evaluations_open => {
                match changed {
                    Ok(()) => {
                        let sample = evaluations.borrow_and_update().clone();
                        driver.controller.on_evaluation(sample);
                    }
                    Err(_) => {
                        debug!("evaluation stream closed");
                        evaluations_open = false;
                    }
                }
            }
        }

        outgoing.push(SessionEvent::State(driver.controller.snapshot()));
    }

    driver.opponent.stop();
    info!("session closed");
    driver.opponent
}
