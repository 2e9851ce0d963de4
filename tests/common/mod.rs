#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use server::rating::{RatingEngine, RatingRecord, DEFAULT_FLOOR};
use server::session::{run_session, DriverSettings, SessionCommand, SessionController, SessionEvent, SessionSnapshot};
use server::store::LocalStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use uci_engine::{EngineChannel, EngineSettings};

/// Generate a unique suffix based on timestamp to avoid collisions.
pub fn unique_suffix() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}", ts % 1_000_000_000)
}

/// Fresh ratings file under the system temp dir.
pub fn ratings_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("gambit-it-{name}-{}", unique_suffix()))
        .join("ratings.json")
}

/// How the fake engine answers the next `go depth`.
pub enum Reply {
    Now(&'static str),
    After(Duration, &'static str),
}

pub type Script = Arc<Mutex<VecDeque<Reply>>>;

pub fn script(replies: Vec<Reply>) -> Script {
    Arc::new(Mutex::new(replies.into()))
}

/// A UCI engine on the far end of an in-memory pipe. Analysis reports
/// `cp 20` for the side to move; best-move searches follow the script and
/// hang once it runs dry. `stop` answers the running search immediately.
pub async fn fake_engine(script: Script, settings: EngineSettings) -> EngineChannel {
    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    let (their_read, mut their_write) = tokio::io::split(theirs);

    tokio::spawn(async move {
        let mut lines = BufReader::new(their_read).lines();
        // answer owed for the running search, and when it is due
        let mut running: Option<(Option<Instant>, String)> = None;

        loop {
            let due = running.as_ref().and_then(|(at, _)| *at);
            let mut out: Vec<String> = Vec::new();

            tokio::select! {
                line = lines.next_line() => {
                    let Ok(Some(line)) = line else {
                        return;
                    };
                    match line.as_str() {
                        "uci" => out.extend(["id name Fake".to_string(), "uciok".to_string()]),
                        "isready" => out.push("readyok".to_string()),
                        "quit" => return,
                        "stop" => {
                            if let Some((_, mv)) = running.take() {
                                out.push(format!("bestmove {mv}"));
                            }
                        }
                        "go infinite" => {
                            out.push("info depth 12 score cp 20 pv e2e4".to_string());
                            running = Some((None, "e2e4".to_string()));
                        }
                        l if l.starts_with("go depth") => {
                            let next = script.lock().unwrap().pop_front();
                            match next {
                                Some(Reply::Now(mv)) => {
                                    out.push(format!("info depth 10 score cp 15 pv {mv}"));
                                    out.push(format!("bestmove {mv}"));
                                }
                                Some(Reply::After(wait, mv)) => {
                                    running = Some((Some(Instant::now() + wait), mv.to_string()));
                                }
                                None => running = Some((None, "0000".to_string())),
                            }
                        }
                        _ => {}
                    }
                }
                _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    if let Some((_, mv)) = running.take() {
                        out.push(format!("bestmove {mv}"));
                    }
                }
            }

            for line in out {
                if their_write.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    });

    let (reader, writer) = tokio::io::split(ours);
    EngineChannel::connect(reader, writer, settings)
        .await
        .expect("fake engine handshake")
}

pub fn fast_engine_settings() -> EngineSettings {
    EngineSettings {
        move_timeout: Duration::from_millis(300),
        ..EngineSettings::default()
    }
}

pub struct Session {
    pub commands: mpsc::Sender<SessionCommand>,
    pub events: mpsc::Receiver<SessionEvent>,
    pub task: JoinHandle<EngineChannel>,
}

/// Run a session against `engine` with a guest rating record stored at
/// `ratings`.
pub fn start_session(engine: EngineChannel, ratings: PathBuf) -> Session {
    let ratings = RatingEngine::new(RatingRecord::default(), DEFAULT_FLOOR, LocalStore::new(ratings), None);
    let (commands, command_rx) = mpsc::channel(16);
    let (event_tx, events) = mpsc::channel(256);
    let settings = DriverSettings {
        bot_move_delay: Duration::from_millis(10),
    };
    let task = tokio::spawn(run_session(
        SessionController::new(ratings, 1),
        engine,
        command_rx,
        event_tx,
        settings,
    ));
    Session {
        commands,
        events,
        task,
    }
}

impl Session {
    pub async fn send(&self, command: SessionCommand) {
        self.commands.send(command).await.expect("session closed");
    }

    /// Next state snapshot satisfying `done`.
    pub async fn wait_for(&mut self, done: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        timeout(Duration::from_secs(10), async {
            loop {
                match self.events.recv().await {
                    Some(SessionEvent::State(state)) if done(&state) => return state,
                    Some(_) => continue,
                    None => panic!("session ended"),
                }
            }
        })
        .await
        .expect("condition never reached")
    }

    /// Close the session and shut the engine down.
    pub async fn close(self) {
        drop(self.commands);
        drop(self.events);
        let engine = self.task.await.expect("session task");
        engine.quit().await;
    }
}
