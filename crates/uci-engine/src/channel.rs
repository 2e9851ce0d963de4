//! Long-lived duplex channel to a UCI engine (async I/O)
//!
//! One actor task owns the engine's pipes. Every search is tagged with an
//! intent id; issuing a new search first sends `stop` for the one in flight,
//! and a `bestmove` is only delivered to the intent that is still current.
//! UCI answers searches in order, so the oldest outstanding search is the one
//! that the next `info`/`bestmove` lines belong to.

use std::collections::VecDeque;
use std::future::Future;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use shakmaty::uci::UciMove;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::protocol::{self, EngineOutput, EvaluationSample};
use crate::strength;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Search depth for best-move requests
    pub move_depth: u32,
    /// Bound on a best-move request before the engine counts as unavailable
    pub move_timeout: Duration,
    /// Bound on the `uci`/`isready` handshake
    pub handshake_timeout: Duration,
    pub threads: u32,
    pub hash_mb: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            move_depth: 10,
            move_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(10),
            threads: 1,
            hash_mb: 64,
        }
    }
}

type Reply = oneshot::Sender<Result<UciMove, EngineError>>;

enum Command {
    SetOption { name: &'static str, value: String },
    NewGame,
    Search(Search),
    /// Stop whatever is running
    Stop,
    /// Stop only if `intent` is still the current one
    Cancel { intent: u64 },
    Quit,
}

struct Search {
    intent: u64,
    fen: String,
    go: String,
    reply: Option<Reply>,
}

/// A search the engine has been told to run and has not answered yet.
struct Outstanding {
    intent: u64,
    fen: String,
    white_to_move: bool,
    stopped: bool,
    reply: Option<Reply>,
}

/// Handle to a running engine.
pub struct EngineChannel {
    commands: mpsc::UnboundedSender<Command>,
    evaluations: watch::Receiver<Option<EvaluationSample>>,
    next_intent: AtomicU64,
    settings: EngineSettings,
    actor: JoinHandle<()>,
    process: Option<Child>,
}

impl EngineChannel {
    /// Spawn an engine binary and complete the UCI handshake.
    pub async fn spawn(path: &str, settings: EngineSettings) -> Result<Self, EngineError> {
        let mut process = ProcessCommand::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("stdout not captured".into()))?;

        let mut channel = Self::connect(stdout, stdin, settings).await?;
        channel.process = Some(process);
        info!(path, "engine ready");
        Ok(channel)
    }

    /// Run the channel over any byte stream speaking UCI.
    pub async fn connect<R, W>(reader: R, writer: W, settings: EngineSettings) -> Result<Self, EngineError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut writer = writer;
        handshake(&mut lines, &mut writer, &settings).await?;

        let (evaluations_tx, evaluations) = watch::channel(None);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let actor = Actor {
            writer,
            outstanding: VecDeque::new(),
            current: None,
            evaluations: evaluations_tx,
        };

        Ok(Self {
            commands,
            evaluations,
            next_intent: AtomicU64::new(1),
            settings,
            actor: tokio::spawn(actor.run(lines, command_rx)),
            process: None,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Limit playing strength to `target_rating`.
    pub fn configure_strength(&self, target_rating: u32) {
        debug!(target_rating, level = strength::skill_level(target_rating), "configuring strength");
        for (name, value) in strength::strength_options(target_rating) {
            self.send(Command::SetOption { name, value });
        }
    }

    /// Tell the engine a new game begins.
    pub fn new_game(&self) {
        self.send(Command::NewGame);
    }

    /// Stream evaluations of `fen` until superseded or stopped.
    pub fn start_continuous_analysis(&self, fen: &str) {
        self.send(Command::Search(Search {
            intent: self.next_intent(),
            fen: fen.to_string(),
            go: "go infinite".to_string(),
            reply: None,
        }));
    }

    /// Ask for the engine's move in `fen`.
    ///
    /// The request is issued immediately; the returned future resolves with
    /// the move, `Cancelled` if superseded, or `Unavailable` after the
    /// configured timeout (in which case the search is stopped).
    pub fn request_best_move(
        &self,
        fen: &str,
    ) -> impl Future<Output = Result<UciMove, EngineError>> + Send + 'static {
        let intent = self.next_intent();
        let (reply, response) = oneshot::channel();
        let sent = self
            .commands
            .send(Command::Search(Search {
                intent,
                fen: fen.to_string(),
                go: format!("go depth {}", self.settings.move_depth),
                reply: Some(reply),
            }))
            .is_ok();

        let commands = self.commands.clone();
        let wait = self.settings.move_timeout;
        async move {
            if !sent {
                return Err(EngineError::Closed);
            }
            match timeout(wait, response).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(EngineError::Closed),
                Err(_) => {
                    warn!(intent, ?wait, "best move timed out");
                    let _ = commands.send(Command::Cancel { intent });
                    Err(EngineError::Unavailable(wait))
                }
            }
        }
    }

    /// Cancel any running search. Safe to call when idle.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Latest evaluation of the current intent; `None` after a stop or a
    /// change of position.
    pub fn subscribe(&self) -> watch::Receiver<Option<EvaluationSample>> {
        self.evaluations.clone()
    }

    /// Send `quit` and wait for the engine to exit.
    pub async fn quit(mut self) {
        self.send(Command::Quit);
        let _ = (&mut self.actor).await;
        if let Some(mut process) = self.process.take() {
            if timeout(Duration::from_secs(2), process.wait()).await.is_err() {
                let _ = process.start_kill();
            }
        }
    }

    fn next_intent(&self) -> u64 {
        self.next_intent.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("engine channel closed, command dropped");
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, cmd: &str) -> Result<(), EngineError> {
    debug!(cmd, "SF <");
    writer.write_all(format!("{cmd}\n").as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read until a line equal to `expected`
async fn wait_for<R: AsyncRead + Unpin>(
    lines: &mut Lines<BufReader<R>>,
    expected: &str,
) -> Result<(), EngineError> {
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        debug!(line = trimmed, "SF >");
        if trimmed == expected {
            return Ok(());
        }
    }
    Err(EngineError::Closed)
}

async fn handshake<R, W>(
    lines: &mut Lines<BufReader<R>>,
    writer: &mut W,
    settings: &EngineSettings,
) -> Result<(), EngineError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let exchange = async {
        write_line(writer, "uci").await?;
        wait_for(lines, "uciok").await?;
        write_line(writer, &format!("setoption name Threads value {}", settings.threads)).await?;
        write_line(writer, &format!("setoption name Hash value {}", settings.hash_mb)).await?;
        write_line(writer, "isready").await?;
        wait_for(lines, "readyok").await
    };
    timeout(settings.handshake_timeout, exchange)
        .await
        .map_err(|_| EngineError::Unavailable(settings.handshake_timeout))?
}

struct Actor<W> {
    writer: W,
    outstanding: VecDeque<Outstanding>,
    /// The intent whose output is forwarded
    current: Option<u64>,
    evaluations: watch::Sender<Option<EvaluationSample>>,
}

impl<W: AsyncWrite + Unpin> Actor<W> {
    async fn run<R: AsyncRead + Unpin>(
        mut self,
        mut lines: Lines<BufReader<R>>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        let _ = write_line(&mut self.writer, "quit").await;
                        break;
                    };
                    match self.handle(command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            warn!(error = %e, "engine write failed");
                            break;
                        }
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        debug!(line = trimmed, "SF >");
                        self.on_line(trimmed);
                    }
                    Ok(None) => {
                        warn!("engine closed its output");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "engine read failed");
                        break;
                    }
                }
            }
        }

        for search in self.outstanding.iter_mut() {
            if let Some(reply) = search.reply.take() {
                let _ = reply.send(Err(EngineError::Closed));
            }
        }
        self.evaluations.send_replace(None);
    }

    /// Returns `false` once the engine has been told to quit.
    async fn handle(&mut self, command: Command) -> Result<bool, EngineError> {
        match command {
            Command::SetOption { name, value } => {
                write_line(&mut self.writer, &format!("setoption name {name} value {value}")).await?;
            }
            Command::NewGame => {
                write_line(&mut self.writer, "ucinewgame").await?;
            }
            Command::Search(search) => {
                self.stop_outstanding().await?;
                self.evaluations.send_replace(None);
                write_line(&mut self.writer, &format!("position fen {}", search.fen)).await?;
                write_line(&mut self.writer, &search.go).await?;
                self.current = Some(search.intent);
                self.outstanding.push_back(Outstanding {
                    intent: search.intent,
                    white_to_move: protocol::white_to_move(&search.fen),
                    fen: search.fen,
                    stopped: false,
                    reply: search.reply,
                });
            }
            Command::Stop => {
                self.stop_outstanding().await?;
                self.current = None;
                self.evaluations.send_replace(None);
            }
            Command::Cancel { intent } => {
                if self.current == Some(intent) {
                    self.stop_outstanding().await?;
                    self.current = None;
                }
            }
            Command::Quit => {
                self.stop_outstanding().await?;
                write_line(&mut self.writer, "quit").await?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Send `stop` for the running search (if not already stopped) and fail
    /// every pending reply with `Cancelled`. Their `bestmove` lines are
    /// swallowed when they arrive.
    async fn stop_outstanding(&mut self) -> Result<(), EngineError> {
        let running = self.outstanding.back().is_some_and(|s| !s.stopped);
        for search in self.outstanding.iter_mut() {
            search.stopped = true;
            if let Some(reply) = search.reply.take() {
                let _ = reply.send(Err(EngineError::Cancelled));
            }
        }
        if running {
            write_line(&mut self.writer, "stop").await?;
        }
        Ok(())
    }

    fn on_line(&mut self, line: &str) {
        match protocol::parse_line(line) {
            EngineOutput::Info { depth, score } => {
                let Some(front) = self.outstanding.front() else {
                    return;
                };
                if front.stopped || self.current != Some(front.intent) {
                    return;
                }
                if let (Some(depth), Some(score)) = (depth, score) {
                    self.evaluations.send_replace(Some(EvaluationSample {
                        score: score.for_white(front.white_to_move),
                        depth,
                        fen: front.fen.clone(),
                    }));
                }
            }
            EngineOutput::BestMove(mv) => {
                let Some(mut search) = self.outstanding.pop_front() else {
                    warn!(line, "bestmove with no search outstanding");
                    return;
                };
                if self.current == Some(search.intent) {
                    self.current = None;
                }
                if let Some(reply) = search.reply.take() {
                    let _ = reply.send(mv.ok_or(EngineError::NoMove));
                } else if !search.stopped {
                    debug!(intent = search.intent, "analysis finished on its own");
                }
            }
            EngineOutput::Other => {}
        }
    }
}
